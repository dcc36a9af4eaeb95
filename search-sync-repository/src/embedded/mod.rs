//! Embedded implementation of the index backend.
//!
//! This module provides `IndexBackend` on top of tantivy: one index directory
//! per entity kind under a base path, English stemming for full-text fields
//! and case-insensitive exact matching for the others.

mod analysis;
mod backend;
mod index;

pub use analysis::tokenize;
pub use backend::EmbeddedBackend;
