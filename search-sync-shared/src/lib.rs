//! # Search Sync Shared
//!
//! This crate defines shared data structures and types used across the search
//! sync ecosystem: source field types and index field descriptors, entity kinds,
//! the record capability trait, index documents, search options and sync events.

pub mod types;

pub use types::entity_kind::{EntityKind, SearchableField};
pub use types::field::{FieldDescriptor, FieldKind, FieldType, IndexSchema, SchemaField};
pub use types::index_document::IndexDocument;
pub use types::record::{FieldLookup, FieldValue, MapRecord, Record};
pub use types::search_query::{MatchOperator, SearchOptions, StructuredQuery};
pub use types::sync_event::{SyncEvent, SyncOperation};
