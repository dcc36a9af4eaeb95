//! Record access.
//!
//! The sync engine never reflects on record structure. Hosts expose their
//! records through the `Record` trait, which answers field lookups by name and
//! hands out related records for relation traversal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A scalar value read from a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl FieldValue {
    /// Text representation written to the index.
    ///
    /// Null becomes the empty string, dates use ISO-8601, binary is base64.
    pub fn to_index_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339(),
            FieldValue::Binary(bytes) => BASE64.encode(bytes),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_index_text())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Binary(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Result of looking up one attribute on a record.
#[derive(Debug, Clone)]
pub enum FieldLookup {
    /// A scalar column value.
    Value(FieldValue),
    /// A related record, used when following a dotted relation path.
    Related(Arc<dyn Record>),
    /// The attribute is not set (or the relation is empty).
    Absent,
}

impl FieldLookup {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldLookup::Absent)
    }
}

/// Capability interface the record store exposes for each record instance.
pub trait Record: Send + Sync + fmt::Debug {
    /// Name of the entity kind this record belongs to.
    fn entity_kind(&self) -> &str;

    /// Look up a single attribute by name. Dotted paths are resolved by the caller.
    fn get_field(&self, name: &str) -> FieldLookup;
}

/// A record backed by a map of attribute names to lookups.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use search_sync_shared::{FieldLookup, FieldValue, MapRecord, Record};
///
/// let author = MapRecord::new("author").with_value("name", "Ada");
/// let article = MapRecord::new("article")
///     .with_value("id", 1)
///     .with_relation("author", Arc::new(author));
///
/// assert!(matches!(article.get_field("id"), FieldLookup::Value(FieldValue::Integer(1))));
/// assert!(matches!(article.get_field("author"), FieldLookup::Related(_)));
/// assert!(article.get_field("missing").is_absent());
/// ```
#[derive(Debug, Clone)]
pub struct MapRecord {
    kind: String,
    fields: HashMap<String, FieldLookup>,
}

impl MapRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_value(name, value);
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>, related: Arc<dyn Record>) -> Self {
        self.fields
            .insert(name.into(), FieldLookup::Related(related));
        self
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields
            .insert(name.into(), FieldLookup::Value(value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.fields.remove(name);
    }
}

impl Record for MapRecord {
    fn entity_kind(&self) -> &str {
        &self.kind
    }

    fn get_field(&self, name: &str) -> FieldLookup {
        self.fields.get(name).cloned().unwrap_or(FieldLookup::Absent)
    }
}
