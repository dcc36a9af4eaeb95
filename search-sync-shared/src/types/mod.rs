//! This module defines the core data structures and types used across the search sync crates.

pub mod entity_kind;
pub mod field;
pub mod index_document;
pub mod record;
pub mod search_query;
pub mod sync_event;

pub use entity_kind::{EntityKind, SearchableField};
pub use field::{FieldDescriptor, FieldKind, FieldType, IndexSchema, SchemaField};
pub use index_document::IndexDocument;
pub use record::{FieldLookup, FieldValue, MapRecord, Record};
pub use search_query::{MatchOperator, SearchOptions, StructuredQuery};
pub use sync_event::{SyncEvent, SyncOperation};
