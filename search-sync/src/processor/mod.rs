//! Processor module for the sync engine.
//!
//! Extracts index documents from committed records.

mod document_processor;

pub use document_processor::{primary_key, resolve_path, DocumentProcessor, ProcessedRecord};
