use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use search_sync_shared::{IndexDocument, IndexSchema, StructuredQuery};
use tantivy::{Index, TantivyError};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::embedded::index::{backend_error, recover_schema, tantivy_schema, EmbeddedIndex};
use crate::errors::SearchIndexError;
use crate::interfaces::IndexBackend;

/// File tantivy writes once an index directory holds an index.
const META_FILE: &str = "meta.json";

/// File holding the index schema next to the tantivy files.
const SCHEMA_FILE: &str = "index_schema.json";

#[derive(Debug, Clone)]
enum Storage {
    /// One sub-directory per index under the base path.
    Directory(PathBuf),
    /// RAM directories, lost when the backend is dropped.
    Memory,
}

/// Index backend built on an embedded tantivy index per entity kind.
///
/// Indices live in `<base_path>/<index_id>` and survive restarts; an index
/// found on disk is opened on first use. Writes are buffered by the index
/// writer and become visible to queries after a refresh, either explicit or
/// through `commit_now`.
///
/// Each open index holds its directory's writer lock, so a directory is
/// served by one backend at a time.
#[derive(Debug)]
pub struct EmbeddedBackend {
    storage: Storage,
    indices: RwLock<HashMap<String, Arc<EmbeddedIndex>>>,
}

impl EmbeddedBackend {
    /// Create a backend storing its indices under `base_path`.
    ///
    /// The directory is created on the first index creation.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            storage: Storage::Directory(base_path.into()),
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Create a backend whose indices live in memory only.
    pub fn in_memory() -> Self {
        Self {
            storage: Storage::Memory,
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Base directory of the indices, if they are stored on disk.
    pub fn base_path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Directory(path) => Some(path.as_path()),
            Storage::Memory => None,
        }
    }

    /// Number of committed documents in an index.
    pub async fn document_count(&self, index_id: &str) -> Result<usize, SearchIndexError> {
        Ok(self.loaded(index_id).await?.document_count())
    }

    /// Number of documents written since the last commit.
    pub async fn pending_count(&self, index_id: &str) -> Result<usize, SearchIndexError> {
        Ok(self.loaded(index_id).await?.pending_count().await)
    }

    /// Names of the indices open in this backend, sorted.
    pub async fn index_names(&self) -> Vec<String> {
        let indices = self.indices.read().await;
        let mut names: Vec<String> = indices.keys().cloned().collect();
        names.sort();
        names
    }

    fn index_dir(&self, index_id: &str) -> Result<Option<PathBuf>, SearchIndexError> {
        let Storage::Directory(base) = &self.storage else {
            return Ok(None);
        };
        if index_id.is_empty()
            || index_id == "."
            || index_id == ".."
            || index_id.contains(['/', '\\'])
        {
            return Err(SearchIndexError::validation(format!(
                "Index id '{}' cannot be used as a directory name",
                index_id
            )));
        }
        Ok(Some(base.join(index_id)))
    }

    /// The open index, loading it from disk if this backend has not used it yet.
    async fn loaded(&self, index_id: &str) -> Result<Arc<EmbeddedIndex>, SearchIndexError> {
        if let Some(index) = self.indices.read().await.get(index_id) {
            return Ok(index.clone());
        }

        let mut indices = self.indices.write().await;
        if let Some(index) = indices.get(index_id) {
            return Ok(index.clone());
        }
        let dir = match self.index_dir(index_id)? {
            Some(dir) if dir.join(META_FILE).exists() => dir,
            _ => return Err(SearchIndexError::index_not_found(index_id)),
        };

        let index = Index::open_in_dir(&dir)
            .map_err(|e| backend_error(&format!("Failed to open index '{}'", index_id), e))?;
        let schema = match read_schema_file(&dir)? {
            Some(schema) => schema,
            None => recover_schema(&index.schema()),
        };
        let index = Arc::new(EmbeddedIndex::load(index_id, index, schema)?);
        info!(index = %index_id, path = %dir.display(), "Loaded embedded index from disk");

        indices.insert(index_id.to_string(), index.clone());
        Ok(index)
    }
}

fn read_schema_file(dir: &Path) -> Result<Option<IndexSchema>, SearchIndexError> {
    let path = dir.join(SCHEMA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(&path).map_err(|e| {
        SearchIndexError::unavailable(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| SearchIndexError::parse(format!("Invalid schema in '{}': {}", path.display(), e)))
}

fn write_schema_file(dir: &Path, schema: &IndexSchema) -> Result<(), SearchIndexError> {
    let raw = serde_json::to_vec_pretty(schema)
        .map_err(|e| SearchIndexError::serialization(e.to_string()))?;
    let path = dir.join(SCHEMA_FILE);
    fs::write(&path, raw).map_err(|e| {
        SearchIndexError::index_creation(format!("Failed to write '{}': {}", path.display(), e))
    })
}

#[async_trait]
impl IndexBackend for EmbeddedBackend {
    async fn exists(&self, index_id: &str) -> Result<bool, SearchIndexError> {
        if self.indices.read().await.contains_key(index_id) {
            return Ok(true);
        }
        Ok(self
            .index_dir(index_id)?
            .is_some_and(|dir| dir.join(META_FILE).exists()))
    }

    #[instrument(skip(self, schema), fields(fields = schema.len()))]
    async fn create(&self, index_id: &str, schema: &IndexSchema) -> Result<(), SearchIndexError> {
        let mut indices = self.indices.write().await;
        if indices.contains_key(index_id) {
            return Err(SearchIndexError::index_already_exists(index_id));
        }

        let tantivy_schema = tantivy_schema(index_id, schema)?;
        let index = match self.index_dir(index_id)? {
            Some(dir) => {
                fs::create_dir_all(&dir).map_err(|e| {
                    SearchIndexError::index_creation(format!(
                        "Failed to create directory '{}': {}",
                        dir.display(),
                        e
                    ))
                })?;
                let index = Index::create_in_dir(&dir, tantivy_schema).map_err(|e| match e {
                    TantivyError::IndexAlreadyExists => {
                        SearchIndexError::index_already_exists(index_id)
                    }
                    other => SearchIndexError::index_creation(format!(
                        "Failed to create index '{}': {}",
                        index_id, other
                    )),
                })?;
                write_schema_file(&dir, schema)?;
                index
            }
            None => Index::create_in_ram(tantivy_schema),
        };

        let index = EmbeddedIndex::load(index_id, index, schema.clone())?;
        indices.insert(index_id.to_string(), Arc::new(index));
        debug!("Embedded index created");
        Ok(())
    }

    async fn open(&self, index_id: &str) -> Result<Option<IndexSchema>, SearchIndexError> {
        let index = self.loaded(index_id).await?;
        let schema_known = match self.index_dir(index_id)? {
            Some(dir) => dir.join(SCHEMA_FILE).exists(),
            None => true,
        };
        Ok(schema_known.then(|| index.schema().clone()))
    }

    async fn put(
        &self,
        index_id: &str,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        self.loaded(index_id).await?.put(document, commit_now).await
    }

    async fn partial_update(
        &self,
        index_id: &str,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        self.loaded(index_id)
            .await?
            .partial_update(document, commit_now)
            .await
    }

    async fn delete(
        &self,
        index_id: &str,
        doc_id: &str,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        self.loaded(index_id).await?.delete(doc_id, commit_now).await
    }

    async fn query(
        &self,
        index_id: &str,
        query: &StructuredQuery,
        limit: Option<usize>,
    ) -> Result<Vec<String>, SearchIndexError> {
        self.loaded(index_id).await?.search(query, limit)
    }

    async fn refresh(&self, index_id: &str) -> Result<(), SearchIndexError> {
        self.loaded(index_id).await?.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_shared::{FieldDescriptor, FieldKind, MatchOperator};

    fn schema() -> IndexSchema {
        IndexSchema::new()
            .with_field(
                "id",
                FieldDescriptor::plain(FieldKind::Identifier).stored().unique(),
            )
            .with_field(
                "title",
                FieldDescriptor::plain(FieldKind::Text).stored().analyzed(),
            )
            .with_field(
                "body",
                FieldDescriptor::plain(FieldKind::Text).stored().analyzed(),
            )
    }

    fn title_query(text: &str) -> StructuredQuery {
        StructuredQuery::new(text, vec!["title".to_string()], MatchOperator::All)
    }

    async fn backend() -> EmbeddedBackend {
        let backend = EmbeddedBackend::in_memory();
        backend.create("article", &schema()).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let backend = backend().await;

        let err = backend.create("article", &schema()).await.unwrap_err();

        assert!(matches!(err, SearchIndexError::IndexAlreadyExists(_)));
        assert!(backend.exists("article").await.unwrap());
        assert_eq!(backend.index_names().await, vec!["article"]);
    }

    #[tokio::test]
    async fn test_open_returns_stored_schema() {
        let backend = backend().await;

        assert_eq!(backend.open("article").await.unwrap(), Some(schema()));
        assert!(matches!(
            backend.open("missing").await,
            Err(SearchIndexError::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_without_commit_is_buffered() {
        let backend = backend().await;
        let doc = IndexDocument::new("1").with_field("title", "Hello");

        backend.put("article", &doc, false).await.unwrap();
        assert_eq!(backend.pending_count("article").await.unwrap(), 1);
        assert!(backend
            .query("article", &title_query("hello"), None)
            .await
            .unwrap()
            .is_empty());

        backend.refresh("article").await.unwrap();
        assert_eq!(
            backend
                .query("article", &title_query("hello"), None)
                .await
                .unwrap(),
            vec!["1"]
        );
    }

    #[tokio::test]
    async fn test_partial_update_merges_fields() {
        let backend = backend().await;
        let doc = IndexDocument::new("1")
            .with_field("title", "Hello")
            .with_field("body", "first body");
        backend.put("article", &doc, true).await.unwrap();

        let change = IndexDocument::new("1").with_field("title", "Goodbye");
        backend.partial_update("article", &change, true).await.unwrap();

        let body = StructuredQuery::new("first", vec!["body".to_string()], MatchOperator::All);
        assert_eq!(
            backend.query("article", &body, None).await.unwrap(),
            vec!["1"]
        );
        assert!(backend
            .query("article", &title_query("hello"), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_partial_update_sees_buffered_put() {
        let backend = backend().await;
        backend
            .put("article", &IndexDocument::new("1").with_field("title", "a"), false)
            .await
            .unwrap();

        let change = IndexDocument::new("1").with_field("body", "b");
        backend.partial_update("article", &change, true).await.unwrap();

        assert_eq!(backend.document_count("article").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_documents_report_not_found() {
        let backend = backend().await;
        let change = IndexDocument::new("42").with_field("title", "x");

        assert!(backend
            .partial_update("article", &change, true)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(backend
            .delete("article", "42", true)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let backend = backend().await;
        let doc = IndexDocument::new("1").with_field("title", "Hello");
        backend.put("article", &doc, true).await.unwrap();

        backend.delete("article", "1", true).await.unwrap();

        assert_eq!(backend.document_count("article").await.unwrap(), 0);
        assert!(backend
            .query("article", &title_query("hello"), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_put_rejects_fields_outside_schema() {
        let backend = backend().await;
        let doc = IndexDocument::new("1").with_field("summary", "x");

        let err = backend.put("article", &doc, true).await.unwrap_err();

        assert!(matches!(err, SearchIndexError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_operations_on_missing_index() {
        let backend = EmbeddedBackend::in_memory();
        let doc = IndexDocument::new("1");

        assert!(!backend.exists("article").await.unwrap());
        assert!(matches!(
            backend.put("article", &doc, true).await,
            Err(SearchIndexError::IndexNotFound(_))
        ));
        assert!(matches!(
            backend.refresh("article").await,
            Err(SearchIndexError::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_index_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = EmbeddedBackend::new(dir.path());
            backend.create("article", &schema()).await.unwrap();
            let doc = IndexDocument::new("1").with_field("title", "Hello");
            backend.put("article", &doc, true).await.unwrap();
        }

        let backend = EmbeddedBackend::new(dir.path());
        assert!(backend.exists("article").await.unwrap());
        assert_eq!(backend.open("article").await.unwrap(), Some(schema()));
        assert_eq!(
            backend
                .query("article", &title_query("hello"), None)
                .await
                .unwrap(),
            vec!["1"]
        );
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_lost_on_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = EmbeddedBackend::new(dir.path());
            backend.create("article", &schema()).await.unwrap();
            let doc = IndexDocument::new("1").with_field("title", "Hello");
            backend.put("article", &doc, false).await.unwrap();
        }

        let backend = EmbeddedBackend::new(dir.path());
        assert_eq!(backend.document_count("article").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_over_existing_directory_reports_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let first = EmbeddedBackend::new(dir.path());
        first.create("article", &schema()).await.unwrap();

        let second = EmbeddedBackend::new(dir.path());
        let err = second.create("article", &schema()).await.unwrap_err();

        assert!(matches!(err, SearchIndexError::IndexAlreadyExists(_)));
        assert!(second.exists("article").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_schema_file_is_recovered_from_index() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = EmbeddedBackend::new(dir.path());
            backend.create("article", &schema()).await.unwrap();
        }
        fs::remove_file(dir.path().join("article").join(SCHEMA_FILE)).unwrap();

        let backend = EmbeddedBackend::new(dir.path());
        assert_eq!(backend.open("article").await.unwrap(), None);
        let doc = IndexDocument::new("2").with_field("title", "recovered");
        backend.put("article", &doc, true).await.unwrap();
        assert_eq!(
            backend
                .query("article", &title_query("recovered"), None)
                .await
                .unwrap(),
            vec!["2"]
        );
    }

    #[tokio::test]
    async fn test_index_id_must_be_a_directory_name() {
        let backend = EmbeddedBackend::new("unused");

        assert!(matches!(
            backend.exists("../article").await,
            Err(SearchIndexError::ValidationError(_))
        ));
        assert_eq!(backend.base_path(), Some(Path::new("unused")));
    }
}
