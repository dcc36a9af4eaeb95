//! Index document types.
//!
//! This module defines the document structure that is written to the search index
//! for one record instance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The materialized attribute map written to the backend for one record.
///
/// The document is keyed by the record's primary-key value converted to text,
/// and holds one text value per declared searchable field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Backend identifier of the document (the primary-key value).
    pub id: String,
    /// Field name to indexed text.
    pub fields: BTreeMap<String, String>,
}

impl IndexDocument {
    /// Create an empty document for the given identifier.
    ///
    /// # Example
    ///
    /// ```
    /// use search_sync_shared::IndexDocument;
    ///
    /// let doc = IndexDocument::new("1")
    ///     .with_field("title", "Hello")
    ///     .with_field("body", "World");
    ///
    /// assert_eq!(doc.get("title"), Some("Hello"));
    /// assert_eq!(doc.len(), 2);
    /// ```
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Overwrite this document's fields with the fields of `partial`.
    pub fn merge(&mut self, partial: &IndexDocument) {
        for (name, value) in &partial.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The fields as a JSON object, the body format of remote backends.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}
