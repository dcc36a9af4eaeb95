//! Search index service implementation.
//!
//! This module provides the query façade: it translates free text plus search
//! options into a `StructuredQuery`, runs it against the entity kind's index and
//! returns matching record identifiers in relevance order. Resolving the
//! identifiers back to records is left to the caller.

use std::sync::Arc;

use search_sync_shared::{EntityKind, SearchOptions, StructuredQuery};
use tracing::debug;

use crate::config::SearchIndexServiceConfig;
use crate::errors::SearchIndexError;
use crate::registry::IndexRegistry;
use crate::retry::retry_with_timeout;

/// The query service for searching entity kind indices.
///
/// Shares the `IndexRegistry` with the sync engine, so a query against a kind
/// that was never synced creates its (empty) index and returns no results.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use search_sync_repository::{EmbeddedBackend, IndexRegistry, SearchIndexService};
/// use search_sync_shared::{EntityKind, SearchOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(IndexRegistry::new(Arc::new(EmbeddedBackend::in_memory())));
/// let service = SearchIndexService::new(registry);
///
/// let article = EntityKind::new("article").with_text_field("title");
/// let ids = service.search(&article, "hello", &SearchOptions::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct SearchIndexService {
    registry: Arc<IndexRegistry>,
    config: SearchIndexServiceConfig,
}

impl SearchIndexService {
    /// Create a new SearchIndexService with default configuration.
    ///
    /// # Arguments
    ///
    /// * `registry` - The shared index registry
    pub fn new(registry: Arc<IndexRegistry>) -> Self {
        Self::with_config(registry, SearchIndexServiceConfig::default())
    }

    /// Create a new SearchIndexService with custom configuration.
    ///
    /// # Arguments
    ///
    /// * `registry` - The shared index registry
    /// * `config` - Timeout and retry settings for queries
    pub fn with_config(registry: Arc<IndexRegistry>, config: SearchIndexServiceConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Build the structured query for a search.
    ///
    /// Fields default to the kind's declared searchable set; explicitly requested
    /// fields must be part of that set.
    ///
    /// # Returns
    ///
    /// * `Ok(StructuredQuery)` - The query to hand to the backend
    /// * `Err(SearchIndexError::ValidationError)` - If a requested field is not searchable
    pub fn build_query(
        kind: &EntityKind,
        text: &str,
        options: &SearchOptions,
    ) -> Result<StructuredQuery, SearchIndexError> {
        let fields: Vec<String> = match &options.fields {
            Some(fields) if !fields.is_empty() => {
                if let Some(unknown) = fields.iter().find(|f| kind.field(f).is_none()) {
                    return Err(SearchIndexError::validation(format!(
                        "Field '{}' is not searchable on '{}'",
                        unknown, kind.name
                    )));
                }
                fields.clone()
            }
            _ => kind.field_names().map(str::to_string).collect(),
        };

        Ok(StructuredQuery::new(text, fields, options.operator()).with_extra(options.extra.clone()))
    }

    /// Search an entity kind and return matching record identifiers.
    ///
    /// # Arguments
    ///
    /// * `kind` - The entity kind to search
    /// * `text` - Free query text
    /// * `options` - Fields, limit, operator and backend-specific options
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Identifiers in relevance order; empty when nothing matched
    ///   or the query text is blank
    /// * `Err(SearchIndexError)` - If the query failed; never used for "no results"
    pub async fn search(
        &self,
        kind: &EntityKind,
        text: &str,
        options: &SearchOptions,
    ) -> Result<Vec<String>, SearchIndexError> {
        let query = Self::build_query(kind, text, options)?;
        if query.is_blank() || query.fields.is_empty() {
            return Ok(Vec::new());
        }

        let handle = self.registry.index_for(kind).await?;
        let limit = options.effective_limit();

        let ids = retry_with_timeout(
            "search",
            &self.config.retry,
            self.config.query_timeout,
            || handle.query(&query, limit),
        )
        .await?;

        debug!(
            entity_kind = %kind.name,
            index = %handle.index_id(),
            hits = ids.len(),
            "Search completed"
        );
        Ok(ids)
    }
}
