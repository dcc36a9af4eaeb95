//! Sync events delivered by the record store's commit notification.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::record::Record;

/// The write a committed record went through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A committed record plus the operation to mirror into the index.
///
/// Produced at transaction-commit time and consumed once by the sync engine.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    /// Identifier for log correlation.
    pub event_id: Uuid,
    pub record: Arc<dyn Record>,
    pub operation: SyncOperation,
    pub committed_at: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(record: Arc<dyn Record>, operation: SyncOperation) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            record,
            operation,
            committed_at: Utc::now(),
        }
    }

    pub fn create(record: Arc<dyn Record>) -> Self {
        Self::new(record, SyncOperation::Create)
    }

    pub fn update(record: Arc<dyn Record>) -> Self {
        Self::new(record, SyncOperation::Update)
    }

    pub fn delete(record: Arc<dyn Record>) -> Self {
        Self::new(record, SyncOperation::Delete)
    }

    /// Name of the entity kind of the committed record.
    pub fn entity_kind(&self) -> &str {
        self.record.entity_kind()
    }
}
