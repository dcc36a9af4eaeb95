//! OpenSearch backend implementation.
//!
//! This module provides the remote implementation of `IndexBackend` using the
//! OpenSearch Rust crate.

use std::collections::HashMap;

use async_trait::async_trait;
use opensearch::{
    http::{
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesExistsParts, IndicesGetMappingParts, IndicesRefreshParts,
    },
    params::Refresh,
    DeleteParts, IndexParts, OpenSearch, SearchParts, UpdateParts,
};
use search_sync_shared::{FieldKind, IndexDocument, IndexSchema, StructuredQuery};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::IndexBackend;
use crate::opensearch::index_config::{get_index_settings, schema_from_mapping, IndexConfig};

/// Hits requested when the caller sets no limit (the default `max_result_window`).
const MAX_HITS: usize = 10_000;

/// OpenSearch backend implementation.
///
/// One physical index per index identifier, named `<prefix><index_id>`.
///
/// # Example
///
/// ```ignore
/// use search_sync_repository::opensearch::{IndexConfig, OpenSearchBackend};
///
/// let backend = OpenSearchBackend::new("http://localhost:9200", IndexConfig::new("blog_")).await?;
/// let registry = IndexRegistry::new(Arc::new(backend));
/// ```
pub struct OpenSearchBackend {
    client: OpenSearch,
    index_config: IndexConfig,
    schemas: RwLock<HashMap<String, IndexSchema>>,
}

impl OpenSearchBackend {
    /// Create a new OpenSearch backend connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - Prefix and shard settings for created indices
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchBackend)` - A new backend instance
    /// * `Err(SearchIndexError)` - If the URL is invalid or the transport cannot be built
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::configuration(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::unavailable(e.to_string()))?;

        info!(
            url = %url,
            prefix = %index_config.prefix,
            "Created OpenSearch backend"
        );

        Ok(Self::with_client(OpenSearch::new(transport), index_config))
    }

    pub fn with_client(client: OpenSearch, index_config: IndexConfig) -> Self {
        Self {
            client,
            index_config,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Check that the cluster answers.
    pub async fn ping(&self) -> Result<(), SearchIndexError> {
        let response = self.client.ping().send().await.map_err(transport_error)?;
        ensure_success(response, "ping").await.map(|_| ())
    }

    fn index_name(&self, index_id: &str) -> String {
        self.index_config.index_name(index_id)
    }

    async fn remember_schema(&self, index_id: &str, schema: IndexSchema) {
        self.schemas
            .write()
            .await
            .insert(index_id.to_string(), schema);
    }

    async fn source_for(&self, index_id: &str, document: &IndexDocument) -> Value {
        let schemas = self.schemas.read().await;
        to_source(document, schemas.get(index_id))
    }
}

/// Transport failures mean the cluster could not be reached.
fn transport_error(e: opensearch::Error) -> SearchIndexError {
    SearchIndexError::unavailable(e.to_string())
}

/// Map an unsuccessful status to an error for the given operation.
///
/// Server-side failures and throttling are retryable; everything else is not.
fn status_error(operation: &str, status: u16, body: &str) -> SearchIndexError {
    let message = format!("{} failed with status {}: {}", operation, status, body);
    match status {
        429 | 500..=599 => SearchIndexError::unavailable(message),
        _ => match operation {
            "create" => SearchIndexError::index_creation(message),
            "put" => SearchIndexError::index(message),
            "update" => SearchIndexError::update(message),
            "delete" => SearchIndexError::delete(message),
            "search" => SearchIndexError::query(message),
            _ => SearchIndexError::unknown(message),
        },
    }
}

async fn ensure_success(response: Response, operation: &str) -> Result<Response, SearchIndexError> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }
    let error_body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %error_body, operation, "OpenSearch request failed");
    Err(status_error(operation, status.as_u16(), &error_body))
}

/// Build the `_source` of a document.
///
/// Empty values of non-text fields are sent as `null` so typed mappings accept them.
fn to_source(document: &IndexDocument, schema: Option<&IndexSchema>) -> Value {
    let Some(schema) = schema else {
        return document.to_json();
    };
    let source: Map<String, Value> = document
        .fields
        .iter()
        .map(|(name, value)| {
            let typed = schema
                .get(name)
                .is_some_and(|d| !matches!(d.kind, FieldKind::Text | FieldKind::Identifier));
            let value = if typed && value.is_empty() {
                Value::Null
            } else {
                json!(value)
            };
            (name.clone(), value)
        })
        .collect();
    Value::Object(source)
}

/// Build a `query_string` search body.
///
/// `lenient` and `analyze_wildcard` are on by default; options in
/// `query.extra` are merged into the `query_string` clause and override them.
fn build_search_body(query: &StructuredQuery, limit: Option<usize>) -> Value {
    let mut query_string = Map::new();
    query_string.insert("query".to_string(), json!(query.text));
    query_string.insert("fields".to_string(), json!(query.fields));
    query_string.insert(
        "default_operator".to_string(),
        json!(query.operator.as_keyword()),
    );
    query_string.insert("lenient".to_string(), json!(true));
    query_string.insert("analyze_wildcard".to_string(), json!(true));
    for (key, value) in &query.extra {
        query_string.insert(key.clone(), value.clone());
    }

    json!({
        "query": { "query_string": query_string },
        "_source": false,
        "size": limit.unwrap_or(MAX_HITS).min(MAX_HITS)
    })
}

/// Extract document ids from a search response, in rank order.
fn parse_hit_ids(body: &Value) -> Result<Vec<String>, SearchIndexError> {
    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchIndexError::parse("Search response has no hits array"))?;

    hits.iter()
        .map(|hit| {
            hit.get("_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| SearchIndexError::parse("Search hit has no _id"))
        })
        .collect()
}

fn refresh_param(commit_now: bool) -> Refresh {
    if commit_now {
        Refresh::True
    } else {
        Refresh::False
    }
}

#[async_trait]
impl IndexBackend for OpenSearchBackend {
    async fn exists(&self, index_id: &str) -> Result<bool, SearchIndexError> {
        let index = self.index_name(index_id);
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&index]))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(status_error("exists", status, "")),
        }
    }

    async fn create(&self, index_id: &str, schema: &IndexSchema) -> Result<(), SearchIndexError> {
        let index = self.index_name(index_id);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index))
            .body(get_index_settings(schema, &self.index_config))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("resource_already_exists_exception") {
                return Err(SearchIndexError::index_already_exists(index));
            }
            error!(status = %status, body = %body, index = %index, "Index creation failed");
            return Err(status_error("create", status.as_u16(), &body));
        }

        self.remember_schema(index_id, schema.clone()).await;
        info!(index = %index, "Created OpenSearch index");
        Ok(())
    }

    async fn open(&self, index_id: &str) -> Result<Option<IndexSchema>, SearchIndexError> {
        let index = self.index_name(index_id);
        let response = self
            .client
            .indices()
            .get_mapping(IndicesGetMappingParts::Index(&[&index]))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        let body: Value = ensure_success(response, "open")
            .await?
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let schema = schema_from_mapping(&index, &body)?;
        if let Some(schema) = &schema {
            self.remember_schema(index_id, schema.clone()).await;
        }
        debug!(index = %index, recovered = schema.is_some(), "Opened OpenSearch index");
        Ok(schema)
    }

    async fn put(
        &self,
        index_id: &str,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        let index = self.index_name(index_id);
        let source = self.source_for(index_id, document).await;

        let response = self
            .client
            .index(IndexParts::IndexId(&index, &document.id))
            .refresh(refresh_param(commit_now))
            .body(source)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response, "put").await?;

        debug!(index = %index, doc_id = %document.id, "Document indexed");
        Ok(())
    }

    async fn partial_update(
        &self,
        index_id: &str,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        let index = self.index_name(index_id);
        let source = self.source_for(index_id, document).await;

        let response = self
            .client
            .update(UpdateParts::IndexId(&index, &document.id))
            .refresh(refresh_param(commit_now))
            .body(json!({ "doc": source }))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::document_not_found(&index, &document.id));
        }
        ensure_success(response, "update").await?;

        debug!(index = %index, doc_id = %document.id, "Document updated");
        Ok(())
    }

    async fn delete(
        &self,
        index_id: &str,
        doc_id: &str,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        let index = self.index_name(index_id);
        let response = self
            .client
            .delete(DeleteParts::IndexId(&index, doc_id))
            .refresh(refresh_param(commit_now))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::document_not_found(&index, doc_id));
        }
        ensure_success(response, "delete").await?;

        debug!(index = %index, doc_id = %doc_id, "Document deleted");
        Ok(())
    }

    async fn query(
        &self,
        index_id: &str,
        query: &StructuredQuery,
        limit: Option<usize>,
    ) -> Result<Vec<String>, SearchIndexError> {
        let index = self.index_name(index_id);
        let response = self
            .client
            .search(SearchParts::Index(&[&index]))
            .body(build_search_body(query, limit))
            .send()
            .await
            .map_err(transport_error)?;

        let body: Value = ensure_success(response, "search")
            .await?
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        parse_hit_ids(&body)
    }

    async fn refresh(&self, index_id: &str) -> Result<(), SearchIndexError> {
        let index = self.index_name(index_id);
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[&index]))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response, "refresh").await?;
        Ok(())
    }
}
