//! Document processor implementation.
//!
//! Turns a committed record into the `IndexDocument` written for it, following
//! dotted relation paths and coercing every value to its index text.

use search_sync_repository::SearchIndexError;
use search_sync_shared::{EntityKind, FieldLookup, FieldValue, IndexDocument, Record};
use tracing::{debug, instrument};

use crate::errors::SyncError;

/// Processed result from the document processor.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedRecord {
    /// Document to be indexed (create or update).
    Index(IndexDocument),
    /// Document to be deleted.
    Delete { doc_id: String },
}

impl ProcessedRecord {
    pub fn doc_id(&self) -> &str {
        match self {
            ProcessedRecord::Index(document) => &document.id,
            ProcessedRecord::Delete { doc_id } => doc_id,
        }
    }
}

/// Read the primary key value of a record as a document id.
///
/// # Returns
///
/// * `Ok(String)` - The primary key in its index text form
/// * `Err(SyncError)` - If the record has no usable primary key value
pub fn primary_key(kind: &EntityKind, record: &dyn Record) -> Result<String, SyncError> {
    let missing = || {
        SyncError::from(SearchIndexError::validation(format!(
            "Record of '{}' has no value for primary key '{}'",
            kind.name, kind.primary_key
        )))
    };

    match record.get_field(&kind.primary_key) {
        FieldLookup::Value(value) if !value.is_null() => {
            let id = value.to_index_text();
            if id.is_empty() {
                Err(missing())
            } else {
                Ok(id)
            }
        }
        _ => Err(missing()),
    }
}

/// Resolve a possibly dotted field path against a record.
///
/// Every segment but the last must be a related record. Returns `None` if any
/// hop is absent or the path does not end at a scalar value.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use search_sync::processor::resolve_path;
/// use search_sync_shared::{FieldValue, MapRecord};
///
/// let author = MapRecord::new("author").with_value("name", "Ada");
/// let article = MapRecord::new("article").with_relation("author", Arc::new(author));
///
/// assert_eq!(resolve_path(&article, "author.name"), Some(FieldValue::from("Ada")));
/// assert_eq!(resolve_path(&article, "editor.name"), None);
/// ```
pub fn resolve_path(record: &dyn Record, path: &str) -> Option<FieldValue> {
    let segments: Vec<&str> = path.split('.').collect();
    resolve_segments(record, &segments)
}

fn resolve_segments(record: &dyn Record, segments: &[&str]) -> Option<FieldValue> {
    let (first, rest) = segments.split_first()?;
    match (record.get_field(first), rest.is_empty()) {
        (FieldLookup::Value(value), true) => Some(value),
        (FieldLookup::Related(related), false) => resolve_segments(related.as_ref(), rest),
        _ => None,
    }
}

/// Processor that extracts index documents from records.
///
/// The processor is responsible for:
/// - Reading the primary key as the document id
/// - Reading every declared searchable field, following relation paths
/// - Writing the empty-string sentinel for values that cannot be resolved
#[derive(Debug, Clone, Default)]
pub struct DocumentProcessor {}

impl DocumentProcessor {
    /// Create a new document processor.
    pub fn new() -> Self {
        Self {}
    }

    /// Build the index document of a record.
    ///
    /// The document holds exactly the kind's declared searchable fields.
    #[instrument(skip(self, kind, record), fields(entity_kind = %kind.name))]
    pub fn build_document(
        &self,
        kind: &EntityKind,
        record: &dyn Record,
    ) -> Result<IndexDocument, SyncError> {
        let mut document = IndexDocument::new(primary_key(kind, record)?);

        for field in &kind.fields {
            let text = match resolve_path(record, &field.name) {
                Some(value) => value.to_index_text(),
                None => {
                    debug!(field = %field.name, "Field not resolvable, indexing empty value");
                    String::new()
                }
            };
            document.insert(field.name.clone(), text);
        }

        Ok(document)
    }

    /// Process a record for the given write.
    ///
    /// # Arguments
    ///
    /// * `kind` - The record's entity kind
    /// * `record` - The committed record
    /// * `delete` - Whether the record is being removed from the index
    ///
    /// # Returns
    ///
    /// The processed record ready for dispatch.
    pub fn process(
        &self,
        kind: &EntityKind,
        record: &dyn Record,
        delete: bool,
    ) -> Result<ProcessedRecord, SyncError> {
        if delete {
            return Ok(ProcessedRecord::Delete {
                doc_id: primary_key(kind, record)?,
            });
        }
        self.build_document(kind, record).map(ProcessedRecord::Index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use search_sync_shared::{FieldType, MapRecord};
    use std::sync::Arc;

    fn article_kind() -> EntityKind {
        EntityKind::new("article")
            .with_text_field("title")
            .with_field("views", FieldType::Integer)
            .with_field("published_on", FieldType::Date)
            .with_text_field("author.name")
    }

    #[test]
    fn test_build_document_coerces_values() {
        let record = MapRecord::new("article")
            .with_value("id", 7)
            .with_value("title", "Hello")
            .with_value("views", 42)
            .with_value("published_on", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .with_relation(
                "author",
                Arc::new(MapRecord::new("author").with_value("name", "Ada")),
            );

        let document = DocumentProcessor::new()
            .build_document(&article_kind(), &record)
            .unwrap();

        assert_eq!(document.id, "7");
        assert_eq!(document.get("title"), Some("Hello"));
        assert_eq!(document.get("views"), Some("42"));
        assert_eq!(document.get("published_on"), Some("2024-03-01"));
        assert_eq!(document.get("author.name"), Some("Ada"));
        assert_eq!(document.len(), 4);
    }

    #[test]
    fn test_absent_relation_indexes_empty_sentinel() {
        let record = MapRecord::new("article")
            .with_value("id", 1)
            .with_value("title", "Hello");

        let document = DocumentProcessor::new()
            .build_document(&article_kind(), &record)
            .unwrap();

        assert_eq!(document.get("author.name"), Some(""));
        assert_eq!(document.get("views"), Some(""));
    }

    #[test]
    fn test_scalar_in_the_middle_of_a_path_is_absent() {
        let record = MapRecord::new("article").with_value("author", "Ada");
        assert_eq!(resolve_path(&record, "author.name"), None);

        let related = MapRecord::new("article").with_relation(
            "author",
            Arc::new(MapRecord::new("author").with_value("name", "Ada")),
        );
        assert_eq!(resolve_path(&related, "author"), None);
    }

    #[test]
    fn test_multi_hop_path() {
        let country = MapRecord::new("country").with_value("name", "France");
        let city = MapRecord::new("city").with_relation("country", Arc::new(country));
        let author = MapRecord::new("author").with_relation("city", Arc::new(city));
        let record = MapRecord::new("article").with_relation("author", Arc::new(author));

        assert_eq!(
            resolve_path(&record, "author.city.country.name"),
            Some(FieldValue::from("France"))
        );
    }

    #[test]
    fn test_missing_primary_key_is_an_error() {
        let record = MapRecord::new("article").with_value("title", "Hello");

        let err = DocumentProcessor::new()
            .build_document(&article_kind(), &record)
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Index(SearchIndexError::ValidationError(_))
        ));
    }

    #[test]
    fn test_process_delete_only_needs_the_id() {
        let record = MapRecord::new("article").with_value("id", "abc");

        let processed = DocumentProcessor::new()
            .process(&article_kind(), &record, true)
            .unwrap();

        assert_eq!(
            processed,
            ProcessedRecord::Delete {
                doc_id: "abc".to_string()
            }
        );
        assert_eq!(processed.doc_id(), "abc");
    }
}
