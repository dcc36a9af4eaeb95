//! Search index error types.
//!
//! This module defines the unified error type for all index operations, from
//! backend transport failures up to configuration and schema errors.

use thiserror::Error;

/// Unified errors from search index operations.
///
/// Used by the `IndexBackend` trait, the `IndexRegistry` and the
/// `SearchIndexService`. Only `BackendUnavailable` is retryable.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Invalid configuration or a precondition violation (e.g. mutually exclusive flags).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Validation error (e.g. empty identifiers).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The backend could not be reached or did not answer in time.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The index already exists.
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// The index does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Failed to create the index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// The entity kind's declared fields no longer match the index schema.
    #[error("Schema mismatch on index '{index}' for field '{field}': {detail}. Reindex required")]
    SchemaMismatch {
        index: String,
        field: String,
        detail: String,
    },

    /// Failed to index a document.
    #[error("Index error: {0}")]
    IndexError(String),

    /// Failed to update a document.
    #[error("Update error: {0}")]
    UpdateError(String),

    /// Failed to delete a document.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Failed to execute a query.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Failed to parse response from the backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchIndexError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a backend unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create an index already exists error.
    pub fn index_already_exists(index: impl Into<String>) -> Self {
        Self::IndexAlreadyExists(index.into())
    }

    /// Create an index not found error.
    pub fn index_not_found(index: impl Into<String>) -> Self {
        Self::IndexNotFound(index.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a document not found error.
    pub fn document_not_found(index: &str, doc_id: &str) -> Self {
        Self::DocumentNotFound(format!("index={}, id={}", index, doc_id))
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(
        index: impl Into<String>,
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            index: index.into(),
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    /// Create an update error.
    pub fn update(msg: impl Into<String>) -> Self {
        Self::UpdateError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether the operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Whether the target document was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DocumentNotFound(_))
    }
}
