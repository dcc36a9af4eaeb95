//! Index backend trait definition.
//!
//! This module defines the capability set every index technology must expose,
//! whether it is an embedded inverted index or a remote search cluster.

use async_trait::async_trait;
use search_sync_shared::{IndexDocument, IndexSchema, StructuredQuery};

use crate::errors::SearchIndexError;

/// Abstracts the underlying index technology (embedded index, OpenSearch, etc.).
///
/// Every method addresses a single index by its identifier. Implementations are
/// responsible for their own internal concurrency control; callers may invoke
/// writes and queries concurrently.
///
/// # Visibility
///
/// Writes issued with `commit_now = false` may be buffered by the backend and
/// only become visible to `query` after a `refresh` (or on the backend's own
/// schedule). Writes issued with `commit_now = true` are visible when the call
/// returns.
///
/// # Errors
///
/// Transport failures and timeouts must be reported as
/// `SearchIndexError::BackendUnavailable` so callers can retry them. A missing
/// document on `partial_update` or `delete` must be reported as
/// `SearchIndexError::DocumentNotFound`.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Whether an index with this identifier exists.
    async fn exists(&self, index_id: &str) -> Result<bool, SearchIndexError>;

    /// Create a new index with the given schema.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created
    /// * `Err(SearchIndexError::IndexAlreadyExists)` - If the index already exists
    /// * `Err(SearchIndexError)` - If creation fails
    async fn create(&self, index_id: &str, schema: &IndexSchema) -> Result<(), SearchIndexError>;

    /// Open an existing index.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(schema))` - The schema the index was created with, if the backend can report it
    /// * `Ok(None)` - The index is open but its schema is not known
    /// * `Err(SearchIndexError::IndexNotFound)` - If the index does not exist
    async fn open(&self, index_id: &str) -> Result<Option<IndexSchema>, SearchIndexError>;

    /// Index a full document, replacing any previous document with the same id.
    async fn put(
        &self,
        index_id: &str,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError>;

    /// Update the given fields of an existing document.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was updated
    /// * `Err(SearchIndexError::DocumentNotFound)` - If no document has this id
    async fn partial_update(
        &self,
        index_id: &str,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError>;

    /// Delete a document by identifier.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was deleted
    /// * `Err(SearchIndexError::DocumentNotFound)` - If no document has this id
    async fn delete(
        &self,
        index_id: &str,
        doc_id: &str,
        commit_now: bool,
    ) -> Result<(), SearchIndexError>;

    /// Execute a query and return matching document ids in relevance order.
    ///
    /// `limit = None` leaves the result size to the backend.
    async fn query(
        &self,
        index_id: &str,
        query: &StructuredQuery,
        limit: Option<usize>,
    ) -> Result<Vec<String>, SearchIndexError>;

    /// Make all buffered writes visible to subsequent queries.
    async fn refresh(&self, index_id: &str) -> Result<(), SearchIndexError>;
}
