//! Entity kind metadata.
//!
//! An entity kind is a record-store model whose instances are mirrored into a
//! search index. It declares which fields are searchable and how the index is named.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::field::FieldType;

/// A named, typed attribute included in the index document.
///
/// Names containing dots (e.g. `author.name`) are relation paths: the value is
/// read from a related record rather than the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableField {
    pub name: String,
    pub field_type: FieldType,
}

impl SearchableField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Shorthand for a text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    /// Whether the value is read through one or more relations.
    pub fn is_relation(&self) -> bool {
        self.name.contains('.')
    }

    /// The path segments of the field name.
    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.name.split('.')
    }
}

/// Metadata for a record-store model whose instances are indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKind {
    /// Unique name of the kind; the registry key.
    pub name: String,
    /// Declared searchable fields, in order.
    pub fields: Vec<SearchableField>,
    /// Name of the primary key field.
    pub primary_key: String,
    /// Explicit index identifier. Defaults to `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

impl EntityKind {
    /// Create a kind with no searchable fields and the primary key `id`.
    ///
    /// # Example
    ///
    /// ```
    /// use search_sync_shared::{EntityKind, FieldType};
    ///
    /// let kind = EntityKind::new("article")
    ///     .with_text_field("title")
    ///     .with_field("published_at", FieldType::DateTime);
    ///
    /// assert_eq!(kind.index_id(), "article");
    /// assert_eq!(kind.field_names().collect::<Vec<_>>(), vec!["title", "published_at"]);
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            primary_key: "id".to_string(),
            index_name: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(SearchableField::new(name, field_type));
        self
    }

    pub fn with_text_field(self, name: impl Into<String>) -> Self {
        self.with_field(name, FieldType::Text)
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// The identifier of the backing index.
    pub fn index_id(&self) -> &str {
        self.index_name.as_deref().unwrap_or(&self.name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&SearchableField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_searchable(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn is_primary_key(&self, field_name: &str) -> bool {
        self.primary_key == field_name
    }

    /// Validate the declaration.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Entity kind name cannot be empty".to_string());
        }

        if self.primary_key.trim().is_empty() {
            return Err(format!(
                "Entity kind '{}' has an empty primary key name",
                self.name
            ));
        }

        if let Some(index_name) = &self.index_name {
            if index_name.trim().is_empty() {
                return Err(format!(
                    "Entity kind '{}' has an empty index name",
                    self.name
                ));
            }
        }

        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.is_empty() || field.path().any(str::is_empty) {
                return Err(format!(
                    "Entity kind '{}' declares an invalid field name '{}'",
                    self.name, field.name
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!(
                    "Entity kind '{}' declares field '{}' more than once",
                    self.name, field.name
                ));
            }
        }

        Ok(())
    }
}
