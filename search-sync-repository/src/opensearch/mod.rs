//! OpenSearch implementation of the index backend.
//!
//! This module provides a remote implementation of `IndexBackend` using
//! OpenSearch, with one physical index per entity kind.

mod backend;
mod index_config;

pub use backend::OpenSearchBackend;
pub use index_config::{get_index_settings, schema_from_mapping, IndexConfig};
