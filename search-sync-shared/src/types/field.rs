//! Field types on both sides of the mapping.
//!
//! `FieldType` is the column type declared by the record store, `FieldKind` and
//! `FieldDescriptor` describe how a field is stored in the search index.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Column type of a searchable field as declared by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    Date,
    DateTime,
    Binary,
    Text,
    /// Any other column type. Indexed as analyzed text.
    Other(String),
}

impl FieldType {
    /// Resolve a type name, falling back to `Other` for names that are not recognised.
    ///
    /// # Example
    ///
    /// ```
    /// use search_sync_shared::FieldType;
    ///
    /// assert_eq!(FieldType::from_name("DateTime"), FieldType::DateTime);
    /// assert_eq!(FieldType::from_name("uuid"), FieldType::Other("uuid".to_string()));
    /// ```
    pub fn from_name(name: &str) -> Self {
        name.parse()
            .unwrap_or_else(|_| FieldType::Other(name.to_string()))
    }

    /// The canonical type name.
    pub fn name(&self) -> &str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Binary => "binary",
            FieldType::Text => "text",
            FieldType::Other(name) => name,
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    /// Strict parsing: unknown type names are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "integer" | "int" | "biginteger" | "smallinteger" => Ok(FieldType::Integer),
            "float" | "numeric" | "decimal" => Ok(FieldType::Float),
            "date" => Ok(FieldType::Date),
            "datetime" | "timestamp" => Ok(FieldType::DateTime),
            "binary" | "largebinary" => Ok(FieldType::Binary),
            "text" | "string" | "unicode" | "unicodetext" => Ok(FieldType::Text),
            other => Err(format!("Unknown field type '{}'", other)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage type of a field inside the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Exact-match, non-analyzed identifier.
    Identifier,
    /// Sortable date or timestamp.
    Date,
    /// 64-bit integer.
    Integer,
    /// Floating point number.
    Float,
    Boolean,
    /// Opaque bytes, never analyzed.
    Binary,
    /// Analyzed full-text.
    Text,
}

/// Index field type plus indexing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    pub stored: bool,
    pub sortable: bool,
    pub unique: bool,
    pub analyzed: bool,
}

impl FieldDescriptor {
    /// Descriptor with every option disabled.
    pub const fn plain(kind: FieldKind) -> Self {
        Self {
            kind,
            stored: false,
            sortable: false,
            unique: false,
            analyzed: false,
        }
    }

    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn analyzed(mut self) -> Self {
        self.analyzed = true;
        self
    }
}

/// A named field of an index schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub descriptor: FieldDescriptor,
}

/// Ordered set of fields an index was created with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    fields: Vec<SchemaField>,
}

impl IndexSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing an existing field of the same name.
    pub fn with_field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Add a field, replacing an existing field of the same name.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: FieldDescriptor) {
        let name = name.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.descriptor = descriptor,
            None => self.fields.push(SchemaField { name, descriptor }),
        }
    }

    /// Look up a field descriptor by name.
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_strict_parse() {
        assert_eq!("boolean".parse::<FieldType>(), Ok(FieldType::Boolean));
        assert_eq!("Integer".parse::<FieldType>(), Ok(FieldType::Integer));
        assert_eq!("datetime".parse::<FieldType>(), Ok(FieldType::DateTime));
        assert_eq!("string".parse::<FieldType>(), Ok(FieldType::Text));
        assert!("jsonb".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_field_type_lenient_parse() {
        assert_eq!(FieldType::from_name("float"), FieldType::Float);
        assert_eq!(
            FieldType::from_name("jsonb"),
            FieldType::Other("jsonb".to_string())
        );
        assert_eq!(FieldType::from_name("jsonb").name(), "jsonb");
    }

    #[test]
    fn test_schema_insert_replaces_existing() {
        let mut schema = IndexSchema::new()
            .with_field("title", FieldDescriptor::plain(FieldKind::Text))
            .with_field("views", FieldDescriptor::plain(FieldKind::Integer));

        schema.insert("title", FieldDescriptor::plain(FieldKind::Identifier));

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("title").unwrap().kind, FieldKind::Identifier);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["title", "views"]);
    }

    #[test]
    fn test_descriptor_builders() {
        let descriptor = FieldDescriptor::plain(FieldKind::Text)
            .stored()
            .sortable()
            .analyzed();

        assert!(descriptor.stored);
        assert!(descriptor.sortable);
        assert!(descriptor.analyzed);
        assert!(!descriptor.unique);
    }
}
