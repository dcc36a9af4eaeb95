//! # Search Sync
//!
//! Write-through synchronization of record-store commits into per-entity-kind
//! search indices.
//!
//! ## Architecture
//!
//! 1. **Record store**: entity kind metadata, paged enumeration and commit events
//! 2. **Processor**: extracts the index document of a record
//! 3. **Engine**: dispatches put, partial update or delete, and runs backfills
//! 4. **Listener**: routes commit events through the engine
//!
//! Index access (backends, registry, queries) lives in `search-sync-repository`.
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`record_store`]: Record store collaborator traits and an in-memory store
//! - [`processor`]: Transforms records into index documents
//! - [`engine`]: Single-record sync and bulk backfill
//! - [`listener`]: Commit feed listener
//! - [`telemetry`]: Tracing initialization
//! - [`errors`]: Error types for the sync engine

pub mod config;
pub mod engine;
pub mod errors;
pub mod listener;
pub mod processor;
pub mod record_store;
pub mod telemetry;

pub use config::{BackendKind, ConnectionMode, Dependencies, SyncEngineConfig};
pub use engine::{BackfillReport, FailedPage, SyncEngine, SyncOptions, SyncOutcome};
pub use errors::SyncError;
pub use listener::{CommitListener, ListenerConfig, ListenerStats};
pub use processor::{DocumentProcessor, ProcessedRecord};
pub use record_store::{
    CommitFeed, MemoryRecordStore, PageCursor, RecordPage, RecordStore, SubscriptionId,
};
