//! Record store collaborator interfaces.
//!
//! The sync engine reads from the host's record store through two traits:
//! `RecordStore` for entity kind metadata and paged enumeration, and
//! `CommitFeed` for commit notifications. `MemoryRecordStore` implements both.

mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use search_sync_shared::{EntityKind, Record, SyncEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::SyncError;

pub use memory::MemoryRecordStore;

/// Opaque position in an entity kind's enumeration.
///
/// Only the record store that issued a cursor can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(position: impl Into<String>) -> Self {
        Self(position.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bounded page of records.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<Arc<dyn Record>>,
    /// Cursor of the following page, `None` once the enumeration is exhausted.
    pub next_cursor: Option<PageCursor>,
}

/// Metadata and enumeration access to the host's record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All entity kinds the store knows about.
    async fn entity_kinds(&self) -> Result<Vec<EntityKind>, SyncError>;

    /// Metadata of a single entity kind.
    async fn entity_kind(&self, name: &str) -> Result<Option<EntityKind>, SyncError>;

    /// Fetch at most `page_size` records of `kind`, starting at `cursor`
    /// (the beginning when `None`).
    async fn fetch_page(
        &self,
        kind: &EntityKind,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<RecordPage, SyncError>;
}

/// Handle of a commit feed registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commit notifications from the record store.
///
/// Events are delivered after the originating transaction committed; a full or
/// closed channel never affects the transaction.
#[async_trait]
pub trait CommitFeed: Send + Sync {
    /// Register a channel that receives every subsequent commit event.
    async fn subscribe(&self, sender: mpsc::Sender<SyncEvent>) -> Result<SubscriptionId, SyncError>;

    /// Remove a registration. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SyncError>;
}
