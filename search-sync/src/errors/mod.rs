//! Error types for the sync engine.

use search_sync_repository::SearchIndexError;
use thiserror::Error;

/// Errors that can occur while syncing records into the search index.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid configuration or a precondition violation. No work was attempted.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error from the index side.
    #[error("Index error: {0}")]
    Index(#[from] SearchIndexError),

    /// The record store failed to enumerate records or metadata.
    #[error("Record store error: {0}")]
    RecordStoreError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl SyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a record store error.
    pub fn record_store(msg: impl Into<String>) -> Self {
        Self::RecordStoreError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }

    /// Whether the failure was a configuration error, on either side.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::Index(SearchIndexError::ConfigurationError(_))
        )
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Index(e) => e.is_retryable(),
            Self::RecordStoreError(_) => true,
            _ => false,
        }
    }
}
