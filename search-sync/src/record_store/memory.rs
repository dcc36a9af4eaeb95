use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use search_sync_shared::{EntityKind, Record, SyncEvent, SyncOperation};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::errors::SyncError;
use crate::processor::primary_key;
use crate::record_store::{CommitFeed, PageCursor, RecordPage, RecordStore, SubscriptionId};

type Rows = Vec<(String, Arc<dyn Record>)>;

/// In-memory record store and commit feed.
///
/// Records are kept per entity kind in insertion order and enumerated with
/// offset cursors. `commit` applies a write and then notifies every subscriber.
#[derive(Default)]
pub struct MemoryRecordStore {
    kinds: RwLock<Vec<EntityKind>>,
    records: RwLock<HashMap<String, Rows>>,
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::Sender<SyncEvent>>>,
    pages_fetched: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity kind, replacing a previous declaration of the same name.
    pub async fn register_kind(&self, kind: EntityKind) {
        let mut kinds = self.kinds.write().await;
        match kinds.iter_mut().find(|k| k.name == kind.name) {
            Some(existing) => *existing = kind,
            None => kinds.push(kind),
        }
    }

    async fn kind_of(&self, record: &dyn Record) -> Result<EntityKind, SyncError> {
        let kinds = self.kinds.read().await;
        kinds
            .iter()
            .find(|k| k.name == record.entity_kind())
            .cloned()
            .ok_or_else(|| {
                SyncError::record_store(format!(
                    "Entity kind '{}' is not registered",
                    record.entity_kind()
                ))
            })
    }

    async fn apply(&self, record: &Arc<dyn Record>, operation: SyncOperation) -> Result<(), SyncError> {
        let kind = self.kind_of(record.as_ref()).await?;
        let id = primary_key(&kind, record.as_ref())?;

        let mut records = self.records.write().await;
        let rows = records.entry(kind.name.clone()).or_default();
        let position = rows.iter().position(|(row_id, _)| *row_id == id);

        match (operation, position) {
            (SyncOperation::Delete, Some(position)) => {
                rows.remove(position);
            }
            (SyncOperation::Delete, None) => {}
            (_, Some(position)) => rows[position].1 = record.clone(),
            (_, None) => rows.push((id, record.clone())),
        }
        Ok(())
    }

    /// Store a record without notifying subscribers.
    pub async fn seed(&self, record: Arc<dyn Record>) -> Result<(), SyncError> {
        self.apply(&record, SyncOperation::Create).await
    }

    /// Apply a committed write and publish it to every subscriber.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of subscribers the event was delivered to
    /// * `Err(SyncError)` - If the record's kind is unknown or it has no primary key
    pub async fn commit(
        &self,
        record: Arc<dyn Record>,
        operation: SyncOperation,
    ) -> Result<usize, SyncError> {
        self.apply(&record, operation).await?;

        let event = SyncEvent::new(record, operation);
        let mut subscribers = self.subscribers.lock().await;
        let mut closed = Vec::new();
        let mut delivered = 0;

        for (id, sender) in subscribers.iter() {
            match sender.send(event.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(*id),
            }
        }
        for id in closed {
            warn!(subscription = %id, "Dropping closed commit subscriber");
            subscribers.remove(&id);
        }

        debug!(
            event_id = %event.event_id,
            entity_kind = %event.entity_kind(),
            operation = %operation,
            delivered,
            "Published commit event"
        );
        Ok(delivered)
    }

    pub async fn record_count(&self, kind_name: &str) -> usize {
        let records = self.records.read().await;
        records.get(kind_name).map(Vec::len).unwrap_or(0)
    }

    /// Number of `fetch_page` calls served so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn entity_kinds(&self) -> Result<Vec<EntityKind>, SyncError> {
        Ok(self.kinds.read().await.clone())
    }

    async fn entity_kind(&self, name: &str) -> Result<Option<EntityKind>, SyncError> {
        let kinds = self.kinds.read().await;
        Ok(kinds.iter().find(|k| k.name == name).cloned())
    }

    async fn fetch_page(
        &self,
        kind: &EntityKind,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<RecordPage, SyncError> {
        if page_size == 0 {
            return Err(SyncError::config("Page size must be greater than zero"));
        }
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);

        let offset = match cursor {
            Some(cursor) => cursor.as_str().parse::<usize>().map_err(|_| {
                SyncError::record_store(format!("Invalid page cursor '{}'", cursor))
            })?,
            None => 0,
        };

        let records = self.records.read().await;
        let rows = records.get(&kind.name).map(Vec::as_slice).unwrap_or(&[]);
        let end = offset.saturating_add(page_size).min(rows.len());
        let page: Vec<Arc<dyn Record>> = rows
            .get(offset..end)
            .unwrap_or(&[])
            .iter()
            .map(|(_, record)| record.clone())
            .collect();

        let next_cursor = (end < rows.len()).then(|| PageCursor::new(end.to_string()));
        Ok(RecordPage {
            records: page,
            next_cursor,
        })
    }
}

#[async_trait]
impl CommitFeed for MemoryRecordStore {
    async fn subscribe(&self, sender: mpsc::Sender<SyncEvent>) -> Result<SubscriptionId, SyncError> {
        let id = SubscriptionId::new();
        self.subscribers.lock().await.insert(id, sender);
        debug!(subscription = %id, "Commit subscriber registered");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SyncError> {
        if self.subscribers.lock().await.remove(&id).is_some() {
            debug!(subscription = %id, "Commit subscriber removed");
        }
        Ok(())
    }
}
