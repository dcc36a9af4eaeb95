//! Index registry.
//!
//! Owns one `IndexHandle` per entity kind for the lifetime of the process.
//! The first request for a kind opens its index, or creates it from the
//! derived schema. Concurrent first requests for the same kind share a single
//! initialisation, so the backend sees at most one creation call per kind.

use std::collections::HashMap;
use std::sync::Arc;

use search_sync_shared::{EntityKind, IndexDocument, IndexSchema, StructuredQuery};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::errors::SearchIndexError;
use crate::interfaces::IndexBackend;
use crate::mapping::{derive_schema, map_type};

/// Live binding between an entity kind and its index.
pub struct IndexHandle {
    entity_kind: String,
    index_id: String,
    schema: IndexSchema,
    backend: Arc<dyn IndexBackend>,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("entity_kind", &self.entity_kind)
            .field("index_id", &self.index_id)
            .field("schema", &self.schema)
            .finish()
    }
}

impl IndexHandle {
    pub fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    /// The schema the index was created with, or the derived schema when the
    /// backend could not report it.
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Check that every declared field of `kind` is part of the index schema
    /// with the type it maps to.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the declaration matches the index
    /// * `Err(SearchIndexError::SchemaMismatch)` - For the first field that does not
    pub fn verify_kind(&self, kind: &EntityKind) -> Result<(), SearchIndexError> {
        for field in &kind.fields {
            let expected = map_type(&field.field_type, kind.is_primary_key(&field.name));
            match self.schema.get(&field.name) {
                None => {
                    return Err(SearchIndexError::schema_mismatch(
                        &self.index_id,
                        &field.name,
                        "field is declared searchable but is not part of the index schema",
                    ));
                }
                Some(actual) if actual.kind != expected.kind => {
                    return Err(SearchIndexError::schema_mismatch(
                        &self.index_id,
                        &field.name,
                        format!(
                            "indexed as {:?} but declared as {:?}",
                            actual.kind, expected.kind
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub async fn put(
        &self,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        self.backend.put(&self.index_id, document, commit_now).await
    }

    pub async fn partial_update(
        &self,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        self.backend
            .partial_update(&self.index_id, document, commit_now)
            .await
    }

    pub async fn delete(&self, doc_id: &str, commit_now: bool) -> Result<(), SearchIndexError> {
        self.backend.delete(&self.index_id, doc_id, commit_now).await
    }

    pub async fn query(
        &self,
        query: &StructuredQuery,
        limit: Option<usize>,
    ) -> Result<Vec<String>, SearchIndexError> {
        self.backend.query(&self.index_id, query, limit).await
    }

    pub async fn refresh(&self) -> Result<(), SearchIndexError> {
        self.backend.refresh(&self.index_id).await
    }
}

/// Per-entity-kind cache of index handles.
///
/// Construct one registry at startup and share it (`Arc<IndexRegistry>`) with
/// the sync engine and the query service. Cached handles are never invalidated;
/// schema changes require an external reindex.
pub struct IndexRegistry {
    backend: Arc<dyn IndexBackend>,
    handles: Mutex<HashMap<String, Arc<OnceCell<Arc<IndexHandle>>>>>,
}

impl IndexRegistry {
    pub fn new(backend: Arc<dyn IndexBackend>) -> Self {
        Self {
            backend,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the index handle of an entity kind, opening or creating the index
    /// on first access.
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<IndexHandle>)` - The cached handle
    /// * `Err(SearchIndexError::ConfigurationError)` - If the kind declaration is invalid
    /// * `Err(SearchIndexError)` - If opening or creating the index fails; the
    ///   next call will try again
    pub async fn index_for(&self, kind: &EntityKind) -> Result<Arc<IndexHandle>, SearchIndexError> {
        kind.validate().map_err(SearchIndexError::configuration)?;

        let cell = {
            let mut handles = self.handles.lock().await;
            handles.entry(kind.name.clone()).or_default().clone()
        };

        let handle = cell.get_or_try_init(|| self.open_or_create(kind)).await?;
        Ok(handle.clone())
    }

    /// The cached handle of an entity kind, without touching the backend.
    pub async fn cached(&self, kind_name: &str) -> Option<Arc<IndexHandle>> {
        let handles = self.handles.lock().await;
        handles.get(kind_name).and_then(|cell| cell.get().cloned())
    }

    /// Number of initialised handles.
    pub async fn len(&self) -> usize {
        let handles = self.handles.lock().await;
        handles.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn open_or_create(&self, kind: &EntityKind) -> Result<Arc<IndexHandle>, SearchIndexError> {
        let index_id = kind.index_id();
        let derived = derive_schema(kind);

        let stored = if self.backend.exists(index_id).await? {
            let stored = self.backend.open(index_id).await?;
            info!(entity_kind = %kind.name, index = %index_id, "Opened existing index");
            stored
        } else {
            match self.backend.create(index_id, &derived).await {
                Ok(()) => {
                    info!(
                        entity_kind = %kind.name,
                        index = %index_id,
                        fields = derived.len(),
                        "Created index"
                    );
                    Some(derived.clone())
                }
                Err(SearchIndexError::IndexAlreadyExists(_)) => {
                    debug!(index = %index_id, "Index was created concurrently, opening it");
                    self.backend.open(index_id).await?
                }
                Err(e) => return Err(e),
            }
        };

        Ok(Arc::new(IndexHandle {
            entity_kind: kind.name.clone(),
            index_id: index_id.to_string(),
            schema: stored.unwrap_or(derived),
            backend: self.backend.clone(),
        }))
    }
}
