//! Bulk backfill.
//!
//! Walks every record of an entity kind in bounded pages, writes each one with
//! `commit_now` off, and refreshes the index once at the end. Failed pages are
//! recorded with their cursor so a later run can resume instead of starting over.

use search_sync_shared::{EntityKind, SyncOperation};
use tracing::{info, instrument, warn};

use crate::engine::{SyncEngine, SyncOptions};
use crate::errors::SyncError;
use crate::record_store::PageCursor;

/// A page whose records could not all be synced.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedPage {
    /// Cursor the page was fetched with; `None` for the first page.
    pub cursor: Option<PageCursor>,
    /// 1-based page number within the run.
    pub page_number: usize,
    pub failed_records: usize,
    /// Last error seen on the page.
    pub error: String,
}

/// Outcome of a backfill run for one entity kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    pub entity_kind: String,
    pub pages_fetched: usize,
    pub records_synced: usize,
    pub records_failed: usize,
    pub failed_pages: Vec<FailedPage>,
    /// Whether the trailing index refresh succeeded.
    pub flushed: bool,
    /// Set when enumeration stopped early; pass it back to resume.
    pub resume_from: Option<PageCursor>,
    /// Whether enumeration stopped before the last page.
    pub interrupted: bool,
    /// Why the run could not start or had to stop.
    pub error: Option<String>,
}

impl BackfillReport {
    fn new(kind: &EntityKind) -> Self {
        Self {
            entity_kind: kind.name.clone(),
            ..Self::default()
        }
    }

    /// A run that failed before any page was fetched.
    fn failed(kind: &EntityKind, error: &SyncError) -> Self {
        Self {
            interrupted: true,
            error: Some(error.to_string()),
            ..Self::new(kind)
        }
    }

    /// Whether every record was synced and the index was refreshed.
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.failed_pages.is_empty() && self.flushed
    }
}

impl SyncEngine {
    /// Backfill one entity kind.
    ///
    /// # Arguments
    ///
    /// * `kind` - The entity kind to walk
    /// * `operation` - The write to issue for every record
    /// * `resume_from` - Cursor to start from, typically `resume_from` or a failed
    ///   page's cursor from an earlier report
    ///
    /// # Returns
    ///
    /// * `Ok(BackfillReport)` - Page and record counts; failures of single records,
    ///   pages or the refresh are recorded in the report
    /// * `Err(SyncError)` - If the kind's index could not be resolved
    #[instrument(skip(self, kind, resume_from), fields(entity_kind = %kind.name, operation = %operation))]
    pub async fn reindex_kind(
        &self,
        kind: &EntityKind,
        operation: SyncOperation,
        resume_from: Option<PageCursor>,
    ) -> Result<BackfillReport, SyncError> {
        let mut report = BackfillReport::new(kind);
        if !kind.is_searchable() {
            report.flushed = true;
            return Ok(report);
        }

        let handle = self.resolve_handle(kind).await?;
        let options = SyncOptions::for_operation(operation).buffered();
        let page_size = self.config.page_size;
        let mut cursor = resume_from;

        loop {
            let page = match self
                .store
                .fetch_page(kind, cursor.as_ref(), page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        cursor = ?cursor,
                        error = %e,
                        "Failed to fetch page, stopping enumeration"
                    );
                    report.interrupted = true;
                    report.resume_from = cursor.clone();
                    report.error = Some(e.to_string());
                    break;
                }
            };
            report.pages_fetched += 1;

            let mut failed_records = 0;
            let mut last_error = None;
            for record in &page.records {
                match self.on_commit(kind, record.as_ref(), options).await {
                    Ok(_) => report.records_synced += 1,
                    Err(e) => {
                        failed_records += 1;
                        last_error = Some(e.to_string());
                    }
                }
            }

            if let Some(error) = last_error {
                warn!(
                    page_number = report.pages_fetched,
                    failed_records,
                    error = %error,
                    "Backfill page had failures"
                );
                report.records_failed += failed_records;
                report.failed_pages.push(FailedPage {
                    cursor: cursor.clone(),
                    page_number: report.pages_fetched,
                    failed_records,
                    error,
                });
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        match self.call("refresh", || handle.refresh()).await {
            Ok(()) => report.flushed = true,
            Err(e) => {
                warn!(error = %e, "Trailing refresh failed");
                report.error.get_or_insert_with(|| e.to_string());
            }
        }

        info!(
            pages_fetched = report.pages_fetched,
            records_synced = report.records_synced,
            records_failed = report.records_failed,
            failed_pages = report.failed_pages.len(),
            flushed = report.flushed,
            "Backfill finished"
        );
        Ok(report)
    }

    /// Backfill several entity kinds, or every kind the store knows when `kinds` is `None`.
    ///
    /// Kinds without searchable fields are left out. A kind that fails does not
    /// stop the others; its report carries the error.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<BackfillReport>)` - One report per searchable kind, in order
    /// * `Err(SyncError)` - If the store could not list its entity kinds
    pub async fn reindex_all(
        &self,
        kinds: Option<Vec<EntityKind>>,
        operation: SyncOperation,
    ) -> Result<Vec<BackfillReport>, SyncError> {
        let kinds = match kinds {
            Some(kinds) => kinds,
            None => self.store.entity_kinds().await?,
        };

        let mut reports = Vec::new();
        for kind in kinds.iter().filter(|k| k.is_searchable()) {
            let report = match self.reindex_kind(kind, operation, None).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(entity_kind = %kind.name, error = %e, "Backfill could not start");
                    BackfillReport::failed(kind, &e)
                }
            };
            reports.push(report);
        }

        info!(
            kinds = reports.len(),
            complete = reports.iter().filter(|r| r.is_complete()).count(),
            "Backfill of all entity kinds finished"
        );
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncEngineConfig;
    use crate::record_store::{MemoryRecordStore, RecordPage, RecordStore};
    use async_trait::async_trait;
    use search_sync_repository::{EmbeddedBackend, IndexRegistry, RetryConfig};
    use search_sync_shared::{MapRecord, Record};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Record store whose `fail_on`-th fetch (1-based) fails.
    struct FlakyStore {
        inner: MemoryRecordStore,
        fetches: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn entity_kinds(&self) -> Result<Vec<EntityKind>, SyncError> {
            self.inner.entity_kinds().await
        }

        async fn entity_kind(&self, name: &str) -> Result<Option<EntityKind>, SyncError> {
            self.inner.entity_kind(name).await
        }

        async fn fetch_page(
            &self,
            kind: &EntityKind,
            cursor: Option<&PageCursor>,
            page_size: usize,
        ) -> Result<RecordPage, SyncError> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(SyncError::record_store("connection lost"));
            }
            self.inner.fetch_page(kind, cursor, page_size).await
        }
    }

    fn article_kind() -> EntityKind {
        EntityKind::new("article").with_text_field("title")
    }

    async fn seeded_store(count: i64) -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        store.register_kind(article_kind()).await;
        for id in 1..=count {
            let record: Arc<dyn Record> = Arc::new(
                MapRecord::new("article")
                    .with_value("id", id)
                    .with_value("title", format!("post {}", id)),
            );
            store.seed(record).await.unwrap();
        }
        store
    }

    fn engine_over(store: Arc<dyn RecordStore>) -> SyncEngine {
        let config = SyncEngineConfig::default()
            .with_page_size(10)
            .with_retry(RetryConfig::none());
        SyncEngine::with_config(
            Arc::new(IndexRegistry::new(Arc::new(EmbeddedBackend::in_memory()))),
            store,
            config,
        )
    }

    #[tokio::test]
    async fn test_failed_fetch_reports_resume_cursor() {
        let store = Arc::new(FlakyStore {
            inner: seeded_store(25).await,
            fetches: AtomicUsize::new(0),
            fail_on: 2,
        });
        let engine = engine_over(store.clone());

        let report = engine
            .reindex_kind(&article_kind(), SyncOperation::Create, None)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert!(!report.is_complete());
        assert_eq!(report.pages_fetched, 1);
        assert_eq!(report.records_synced, 10);
        assert_eq!(report.resume_from, Some(PageCursor::new("10")));
        assert!(report.flushed);

        let resumed = engine
            .reindex_kind(&article_kind(), SyncOperation::Create, report.resume_from)
            .await
            .unwrap();

        assert!(resumed.is_complete());
        assert_eq!(resumed.pages_fetched, 2);
        assert_eq!(resumed.records_synced, 15);
    }

    /// Record store serving fixed pages, addressed by page index.
    struct PagedStore {
        pages: Vec<Vec<Arc<dyn Record>>>,
    }

    #[async_trait]
    impl RecordStore for PagedStore {
        async fn entity_kinds(&self) -> Result<Vec<EntityKind>, SyncError> {
            Ok(vec![article_kind()])
        }

        async fn entity_kind(&self, _name: &str) -> Result<Option<EntityKind>, SyncError> {
            Ok(Some(article_kind()))
        }

        async fn fetch_page(
            &self,
            _kind: &EntityKind,
            cursor: Option<&PageCursor>,
            _page_size: usize,
        ) -> Result<RecordPage, SyncError> {
            let index = cursor
                .map(|c| c.as_str().parse::<usize>().unwrap_or(0))
                .unwrap_or(0);
            let next = index + 1;
            Ok(RecordPage {
                records: self.pages.get(index).cloned().unwrap_or_default(),
                next_cursor: (next < self.pages.len()).then(|| PageCursor::new(next.to_string())),
            })
        }
    }

    fn article(id: Option<i64>) -> Arc<dyn Record> {
        let record = MapRecord::new("article").with_value("title", "post");
        Arc::new(match id {
            Some(id) => record.with_value("id", id),
            None => record,
        })
    }

    #[tokio::test]
    async fn test_record_failures_are_recorded_per_page() {
        let store = PagedStore {
            pages: vec![
                vec![article(Some(1)), article(Some(2))],
                vec![article(Some(3)), article(None), article(None)],
                vec![article(Some(4))],
            ],
        };
        let engine = engine_over(Arc::new(store));

        let report = engine
            .reindex_kind(&article_kind(), SyncOperation::Create, None)
            .await
            .unwrap();

        assert_eq!(report.pages_fetched, 3);
        assert_eq!(report.records_synced, 4);
        assert_eq!(report.records_failed, 2);
        assert!(!report.interrupted);
        assert!(report.flushed);
        assert!(!report.is_complete());

        assert_eq!(report.failed_pages.len(), 1);
        let failed = &report.failed_pages[0];
        assert_eq!(failed.page_number, 2);
        assert_eq!(failed.cursor, Some(PageCursor::new("1")));
        assert_eq!(failed.failed_records, 2);
    }

    #[tokio::test]
    async fn test_reindex_all_skips_kinds_without_fields() {
        let store = seeded_store(3).await;
        store.register_kind(EntityKind::new("tag")).await;
        let engine = engine_over(Arc::new(store));

        let reports = engine
            .reindex_all(None, SyncOperation::Create)
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].entity_kind, "article");
        assert!(reports[0].is_complete());
    }

    #[tokio::test]
    async fn test_reindex_all_continues_after_invalid_kind() {
        let store = seeded_store(3).await;
        let engine = engine_over(Arc::new(store));
        let invalid = EntityKind::new("broken")
            .with_text_field("title")
            .with_text_field("title");

        let reports = engine
            .reindex_all(Some(vec![invalid, article_kind()]), SyncOperation::Create)
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[0].error.is_some());
        assert!(!reports[0].is_complete());
        assert!(reports[1].is_complete());
    }
}
