//! Sync engine.
//!
//! Mirrors committed record writes into the entity kind's index. Each call
//! resolves the index through the shared `IndexRegistry`, extracts the document
//! with the `DocumentProcessor` and dispatches a put, partial update or delete.
//! Unavailable backends are retried with backoff; every backend call is bounded
//! by the configured timeout.

mod backfill;

use std::sync::Arc;

use search_sync_repository::{retry_with_timeout, IndexHandle, IndexRegistry, SearchIndexError};
use search_sync_shared::{EntityKind, Record, SyncEvent, SyncOperation};
use tracing::{debug, instrument};

use crate::config::SyncEngineConfig;
use crate::errors::SyncError;
use crate::processor::{DocumentProcessor, ProcessedRecord};
use crate::record_store::RecordStore;

pub use backfill::{BackfillReport, FailedPage};

/// Options of a single sync call.
///
/// `update` and `delete` are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Issue a partial update instead of a full put.
    pub update: bool,
    /// Remove the record's document.
    pub delete: bool,
    /// Make the write visible to queries before returning.
    pub commit_now: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            update: false,
            delete: false,
            commit_now: true,
        }
    }
}

impl SyncOptions {
    /// Options mirroring a record-store operation, committed immediately.
    pub fn for_operation(operation: SyncOperation) -> Self {
        Self {
            update: operation == SyncOperation::Update,
            delete: operation == SyncOperation::Delete,
            ..Self::default()
        }
    }

    pub fn update() -> Self {
        Self::for_operation(SyncOperation::Update)
    }

    pub fn delete() -> Self {
        Self::for_operation(SyncOperation::Delete)
    }

    /// Leave the write buffered in the backend.
    pub fn buffered(mut self) -> Self {
        self.commit_now = false;
        self
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.update && self.delete {
            return Err(SyncError::config(
                "update and delete are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// What a sync call did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The full document was written.
    Indexed,
    /// Changed fields were written onto the existing document.
    Updated,
    /// The document was removed.
    Deleted,
    /// A delete found no document to remove.
    AlreadyAbsent,
    /// The entity kind has no searchable fields; nothing was written.
    Skipped,
}

/// The write-through sync engine.
pub struct SyncEngine {
    registry: Arc<IndexRegistry>,
    store: Arc<dyn RecordStore>,
    processor: DocumentProcessor,
    config: SyncEngineConfig,
}

impl SyncEngine {
    /// Create a new sync engine with default configuration.
    pub fn new(registry: Arc<IndexRegistry>, store: Arc<dyn RecordStore>) -> Self {
        Self::with_config(registry, store, SyncEngineConfig::default())
    }

    /// Create a new sync engine with custom configuration.
    pub fn with_config(
        registry: Arc<IndexRegistry>,
        store: Arc<dyn RecordStore>,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            processor: DocumentProcessor::new(),
            config,
        }
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Run a backend call under the configured timeout and retry policy.
    async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, SearchIndexError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, SearchIndexError>>,
    {
        retry_with_timeout(
            operation,
            &self.config.retry,
            self.config.operation_timeout,
            f,
        )
        .await
    }

    async fn resolve_handle(&self, kind: &EntityKind) -> Result<Arc<IndexHandle>, SyncError> {
        let handle = self
            .call("resolve_index", || self.registry.index_for(kind))
            .await?;
        handle.verify_kind(kind)?;
        Ok(handle)
    }

    /// Mirror a committed record into its index.
    ///
    /// # Arguments
    ///
    /// * `kind` - The record's entity kind
    /// * `record` - The committed record
    /// * `options` - Which write to issue and whether to commit it immediately
    ///
    /// # Returns
    ///
    /// * `Ok(SyncOutcome)` - What was written
    /// * `Err(SyncError::ConfigError)` - If `update` and `delete` are both set; no
    ///   backend call is made
    /// * `Err(SyncError::Index)` - If the write failed after retries, or the kind's
    ///   declaration no longer matches its index (`SchemaMismatch`)
    #[instrument(
        skip(self, kind, record),
        fields(entity_kind = %kind.name, update = options.update, delete = options.delete)
    )]
    pub async fn on_commit(
        &self,
        kind: &EntityKind,
        record: &dyn Record,
        options: SyncOptions,
    ) -> Result<SyncOutcome, SyncError> {
        options.validate()?;
        if !kind.is_searchable() {
            debug!("Entity kind has no searchable fields, skipping");
            return Ok(SyncOutcome::Skipped);
        }

        let processed = self.processor.process(kind, record, options.delete)?;
        let handle = self.resolve_handle(kind).await?;
        let commit_now = options.commit_now;

        match processed {
            ProcessedRecord::Delete { doc_id } => {
                match self
                    .call("delete", || handle.delete(&doc_id, commit_now))
                    .await
                {
                    Ok(()) => {
                        debug!(index = %handle.index_id(), doc_id = %doc_id, "Document deleted");
                        Ok(SyncOutcome::Deleted)
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(
                            index = %handle.index_id(),
                            doc_id = %doc_id,
                            "Document to delete was not indexed"
                        );
                        Ok(SyncOutcome::AlreadyAbsent)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ProcessedRecord::Index(document) if options.update => {
                match self
                    .call("partial_update", || handle.partial_update(&document, commit_now))
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(
                            index = %handle.index_id(),
                            doc_id = %document.id,
                            "Document to update was not indexed, writing it in full"
                        );
                        self.call("put", || handle.put(&document, commit_now))
                            .await?;
                    }
                    Err(e) => return Err(e.into()),
                }
                debug!(index = %handle.index_id(), doc_id = %document.id, "Document updated");
                Ok(SyncOutcome::Updated)
            }
            ProcessedRecord::Index(document) => {
                self.call("put", || handle.put(&document, commit_now))
                    .await?;
                debug!(index = %handle.index_id(), doc_id = %document.id, "Document indexed");
                Ok(SyncOutcome::Indexed)
            }
        }
    }

    /// Mirror a record-store operation, committing immediately.
    pub async fn sync_on_commit(
        &self,
        kind: &EntityKind,
        record: &dyn Record,
        operation: SyncOperation,
    ) -> Result<SyncOutcome, SyncError> {
        self.on_commit(kind, record, SyncOptions::for_operation(operation))
            .await
    }

    /// Handle a commit event, looking up the record's entity kind in the store.
    ///
    /// Records of kinds the store does not know are skipped.
    pub async fn handle_event(&self, event: &SyncEvent) -> Result<SyncOutcome, SyncError> {
        let Some(kind) = self.store.entity_kind(event.entity_kind()).await? else {
            debug!(
                event_id = %event.event_id,
                entity_kind = %event.entity_kind(),
                "No metadata for entity kind, skipping event"
            );
            return Ok(SyncOutcome::Skipped);
        };
        self.sync_on_commit(&kind, event.record.as_ref(), event.operation)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_store::MemoryRecordStore;
    use async_trait::async_trait;
    use search_sync_repository::{IndexBackend, RetryConfig};
    use search_sync_shared::{IndexDocument, IndexSchema, MapRecord, StructuredQuery};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Mock backend recording every call by name.
    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<String>>,
        missing_docs: bool,
        unavailable_puts: AtomicUsize,
    }

    impl MockBackend {
        async fn record(&self, call: &str) {
            self.calls.lock().await.push(call.to_string());
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl IndexBackend for MockBackend {
        async fn exists(&self, _index_id: &str) -> Result<bool, SearchIndexError> {
            self.record("exists").await;
            Ok(false)
        }

        async fn create(&self, _index_id: &str, _schema: &IndexSchema) -> Result<(), SearchIndexError> {
            self.record("create").await;
            Ok(())
        }

        async fn open(&self, _index_id: &str) -> Result<Option<IndexSchema>, SearchIndexError> {
            self.record("open").await;
            Ok(None)
        }

        async fn put(
            &self,
            _index_id: &str,
            document: &IndexDocument,
            commit_now: bool,
        ) -> Result<(), SearchIndexError> {
            if self.unavailable_puts.load(Ordering::SeqCst) > 0 {
                self.unavailable_puts.fetch_sub(1, Ordering::SeqCst);
                return Err(SearchIndexError::unavailable("connection refused"));
            }
            self.record(&format!("put:{}:{}", document.id, commit_now)).await;
            Ok(())
        }

        async fn partial_update(
            &self,
            index_id: &str,
            document: &IndexDocument,
            _commit_now: bool,
        ) -> Result<(), SearchIndexError> {
            self.record(&format!("update:{}", document.id)).await;
            if self.missing_docs {
                return Err(SearchIndexError::document_not_found(index_id, &document.id));
            }
            Ok(())
        }

        async fn delete(
            &self,
            index_id: &str,
            doc_id: &str,
            _commit_now: bool,
        ) -> Result<(), SearchIndexError> {
            self.record(&format!("delete:{}", doc_id)).await;
            if self.missing_docs {
                return Err(SearchIndexError::document_not_found(index_id, doc_id));
            }
            Ok(())
        }

        async fn query(
            &self,
            _index_id: &str,
            _query: &StructuredQuery,
            _limit: Option<usize>,
        ) -> Result<Vec<String>, SearchIndexError> {
            Ok(vec![])
        }

        async fn refresh(&self, _index_id: &str) -> Result<(), SearchIndexError> {
            self.record("refresh").await;
            Ok(())
        }
    }

    fn article_kind() -> EntityKind {
        EntityKind::new("article")
            .with_text_field("title")
            .with_text_field("body")
    }

    fn article() -> MapRecord {
        MapRecord::new("article")
            .with_value("id", 1)
            .with_value("title", "Hello")
            .with_value("body", "World")
    }

    fn engine(backend: Arc<MockBackend>) -> SyncEngine {
        let config = SyncEngineConfig::default().with_retry(RetryConfig {
            base_millis: 2,
            factor: 1,
            max_delay: Duration::from_millis(5),
            max_attempts: 3,
            jitter: false,
        });
        SyncEngine::with_config(
            Arc::new(IndexRegistry::new(backend)),
            Arc::new(MemoryRecordStore::new()),
            config,
        )
    }

    #[test]
    fn test_options_for_operation() {
        assert_eq!(SyncOptions::for_operation(SyncOperation::Create), SyncOptions::default());
        assert!(SyncOptions::update().update);
        assert!(SyncOptions::delete().delete);
        assert!(SyncOptions::default().commit_now);
        assert!(!SyncOptions::default().buffered().commit_now);
    }

    #[tokio::test]
    async fn test_update_and_delete_is_rejected_without_backend_calls() {
        let backend = Arc::new(MockBackend::default());
        let engine = engine(backend.clone());
        let options = SyncOptions {
            update: true,
            delete: true,
            commit_now: true,
        };

        let err = engine
            .on_commit(&article_kind(), &article(), options)
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_puts_full_document() {
        let backend = Arc::new(MockBackend::default());
        let engine = engine(backend.clone());

        let outcome = engine
            .sync_on_commit(&article_kind(), &article(), SyncOperation::Create)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Indexed);
        assert_eq!(backend.calls().await, vec!["exists", "create", "put:1:true"]);
    }

    #[tokio::test]
    async fn test_update_not_found_falls_back_to_put() {
        let backend = Arc::new(MockBackend {
            missing_docs: true,
            ..MockBackend::default()
        });
        let engine = engine(backend.clone());

        let outcome = engine
            .on_commit(&article_kind(), &article(), SyncOptions::update().buffered())
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Updated);
        assert_eq!(
            backend.calls().await[2..],
            ["update:1".to_string(), "put:1:false".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_not_found_is_swallowed() {
        let backend = Arc::new(MockBackend {
            missing_docs: true,
            ..MockBackend::default()
        });
        let engine = engine(backend.clone());

        let outcome = engine
            .sync_on_commit(&article_kind(), &article(), SyncOperation::Delete)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_retried() {
        let backend = Arc::new(MockBackend::default());
        backend.unavailable_puts.store(2, Ordering::SeqCst);
        let engine = engine(backend.clone());

        let outcome = engine
            .sync_on_commit(&article_kind(), &article(), SyncOperation::Create)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Indexed);
        assert!(backend.calls().await.contains(&"put:1:true".to_string()));
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_surfaces_error() {
        let backend = Arc::new(MockBackend::default());
        backend.unavailable_puts.store(10, Ordering::SeqCst);
        let engine = engine(backend.clone());

        let err = engine
            .sync_on_commit(&article_kind(), &article(), SyncOperation::Create)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(backend.unavailable_puts.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_kind_without_searchable_fields_is_skipped() {
        let backend = Arc::new(MockBackend::default());
        let engine = engine(backend.clone());

        let outcome = engine
            .sync_on_commit(&EntityKind::new("tag"), &article(), SyncOperation::Create)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_reported() {
        let backend = Arc::new(MockBackend::default());
        let engine = engine(backend.clone());
        engine
            .sync_on_commit(&article_kind(), &article(), SyncOperation::Create)
            .await
            .unwrap();

        let grown = article_kind().with_text_field("summary");
        let err = engine
            .sync_on_commit(&grown, &article(), SyncOperation::Create)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Index(SearchIndexError::SchemaMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_handle_event_skips_unknown_kinds() {
        let backend = Arc::new(MockBackend::default());
        let engine = engine(backend.clone());
        let event = SyncEvent::create(Arc::new(article()));

        let outcome = engine.handle_event(&event).await.unwrap();

        assert_eq!(outcome, SyncOutcome::Skipped);
        assert!(backend.calls().await.is_empty());
    }
}
