//! # Search Sync Repository
//!
//! This crate provides everything that touches a search index: the unified
//! error type, the `IndexBackend` capability trait with an embedded and an
//! OpenSearch implementation, the field type mapper, the index registry and
//! the query service.

pub mod config;
pub mod embedded;
pub mod errors;
pub mod interfaces;
pub mod mapping;
pub mod opensearch;
pub mod registry;
pub mod retry;
pub mod service;

pub use config::SearchIndexServiceConfig;
pub use embedded::EmbeddedBackend;
pub use errors::SearchIndexError;
pub use interfaces::IndexBackend;
pub use mapping::{derive_schema, map_type};
pub use opensearch::{IndexConfig, OpenSearchBackend};
pub use registry::{IndexHandle, IndexRegistry};
pub use retry::{retry, retry_with_timeout, with_timeout, RetryConfig};
pub use service::SearchIndexService;
