//! OpenSearch index configuration and mappings.
//!
//! Translates an `IndexSchema` into index settings and mappings, and recovers
//! the schema from the mapping of an existing index.

use search_sync_shared::{FieldDescriptor, FieldKind, IndexSchema};
use serde_json::{json, Map, Value};

use crate::errors::SearchIndexError;

/// Key under `_meta` holding the field descriptors an index was created with.
const META_FIELDS_KEY: &str = "search_sync_fields";

/// Configuration shared by every index the backend manages.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Prefix prepended to every index identifier (e.g. "myapp_").
    pub prefix: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            number_of_shards: 1,
            number_of_replicas: 1,
        }
    }
}

impl IndexConfig {
    /// Create a new index configuration.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for physical index names, may be empty
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_shards(mut self, shards: u32, replicas: u32) -> Self {
        self.number_of_shards = shards;
        self.number_of_replicas = replicas;
        self
    }

    /// Physical index name for an index identifier.
    ///
    /// OpenSearch index names must be lower case.
    pub fn index_name(&self, index_id: &str) -> String {
        format!("{}{}", self.prefix, index_id).to_lowercase()
    }
}

/// Mapping of a single field.
fn field_mapping(descriptor: &FieldDescriptor) -> Value {
    match descriptor.kind {
        FieldKind::Identifier => json!({ "type": "keyword" }),
        FieldKind::Date => json!({ "type": "date" }),
        FieldKind::Integer => json!({ "type": "long" }),
        FieldKind::Float => json!({ "type": "float" }),
        FieldKind::Boolean => json!({ "type": "boolean" }),
        FieldKind::Binary => json!({ "type": "binary" }),
        FieldKind::Text if descriptor.sortable => json!({
            "type": "text",
            "fields": {
                "raw": { "type": "keyword" }
            }
        }),
        FieldKind::Text => json!({ "type": "text" }),
    }
}

/// Get the index settings and mappings for a schema.
///
/// Field descriptors are also recorded under `_meta` so that `schema_from_mapping`
/// can restore them exactly.
pub fn get_index_settings(schema: &IndexSchema, config: &IndexConfig) -> Value {
    let properties: Map<String, Value> = schema
        .fields()
        .iter()
        .map(|field| (field.name.clone(), field_mapping(&field.descriptor)))
        .collect();

    let descriptors: Map<String, Value> = schema
        .fields()
        .iter()
        .map(|field| (field.name.clone(), json!(field.descriptor)))
        .collect();

    json!({
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas
        },
        "mappings": {
            "_meta": {
                META_FIELDS_KEY: descriptors,
                "field_order": schema.names().collect::<Vec<_>>()
            },
            "properties": properties
        }
    })
}

/// Recover an index schema from a `GET /<index>/_mapping` response.
///
/// # Returns
///
/// * `Ok(Some(schema))` - The schema recorded at creation, or one inferred from
///   the field types when the index carries no metadata
/// * `Ok(None)` - If the index has no mapped fields
/// * `Err(SearchIndexError::ParseError)` - If the response has an unexpected shape
pub fn schema_from_mapping(
    index_name: &str,
    response: &Value,
) -> Result<Option<IndexSchema>, SearchIndexError> {
    let mappings = response
        .get(index_name)
        .or_else(|| response.as_object().and_then(|o| o.values().next()))
        .and_then(|index| index.get("mappings"))
        .ok_or_else(|| {
            SearchIndexError::parse(format!("Mapping response for '{}' has no mappings", index_name))
        })?;

    if let Some(meta) = mappings.get("_meta") {
        if let Some(descriptors) = meta.get(META_FIELDS_KEY).and_then(Value::as_object) {
            let order: Vec<String> = meta
                .get("field_order")
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|n| n.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_else(|| descriptors.keys().cloned().collect());

            let mut schema = IndexSchema::new();
            for name in order {
                let Some(raw) = descriptors.get(&name) else {
                    continue;
                };
                let descriptor: FieldDescriptor = serde_json::from_value(raw.clone())
                    .map_err(|e| SearchIndexError::parse(e.to_string()))?;
                schema.insert(name, descriptor);
            }
            return Ok((!schema.is_empty()).then_some(schema));
        }
    }

    let mut schema = IndexSchema::new();
    if let Some(properties) = mappings.get("properties").and_then(Value::as_object) {
        infer_fields(&mut schema, "", properties);
    }
    Ok((!schema.is_empty()).then_some(schema))
}

/// Walk mapping properties, flattening object fields into dotted names.
fn infer_fields(schema: &mut IndexSchema, prefix: &str, properties: &Map<String, Value>) {
    for (name, mapping) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        if let Some(nested) = mapping.get("properties").and_then(Value::as_object) {
            infer_fields(schema, &path, nested);
            continue;
        }

        let descriptor = match mapping.get("type").and_then(Value::as_str) {
            Some("keyword") => FieldDescriptor::plain(FieldKind::Identifier).stored(),
            Some("date") => FieldDescriptor::plain(FieldKind::Date).stored().sortable(),
            Some("long") | Some("integer") | Some("short") => {
                FieldDescriptor::plain(FieldKind::Integer).stored()
            }
            Some("float") | Some("double") => FieldDescriptor::plain(FieldKind::Float).stored(),
            Some("boolean") => FieldDescriptor::plain(FieldKind::Boolean).stored(),
            Some("binary") => FieldDescriptor::plain(FieldKind::Binary).stored(),
            _ => {
                let sortable = mapping.pointer("/fields/raw").is_some();
                let text = FieldDescriptor::plain(FieldKind::Text).stored().analyzed();
                if sortable {
                    text.sortable()
                } else {
                    text
                }
            }
        };
        schema.insert(path, descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> IndexSchema {
        IndexSchema::new()
            .with_field(
                "id",
                FieldDescriptor::plain(FieldKind::Identifier).stored().unique(),
            )
            .with_field(
                "title",
                FieldDescriptor::plain(FieldKind::Text)
                    .stored()
                    .sortable()
                    .analyzed(),
            )
            .with_field(
                "published_at",
                FieldDescriptor::plain(FieldKind::Date).stored().sortable(),
            )
            .with_field("views", FieldDescriptor::plain(FieldKind::Integer).stored())
    }

    #[test]
    fn test_index_name_applies_prefix() {
        assert_eq!(IndexConfig::default().index_name("Article"), "article");
        assert_eq!(IndexConfig::new("blog_").index_name("article"), "blog_article");
    }

    #[test]
    fn test_index_settings_structure() {
        let settings = get_index_settings(&schema(), &IndexConfig::default().with_shards(2, 0));

        assert_eq!(settings["settings"]["number_of_shards"], 2);
        assert_eq!(settings["settings"]["number_of_replicas"], 0);

        let properties = &settings["mappings"]["properties"];
        assert_eq!(properties["id"]["type"], "keyword");
        assert_eq!(properties["title"]["type"], "text");
        assert_eq!(properties["title"]["fields"]["raw"]["type"], "keyword");
        assert_eq!(properties["published_at"]["type"], "date");
        assert_eq!(properties["views"]["type"], "long");
    }

    #[test]
    fn test_schema_round_trips_through_meta() {
        let settings = get_index_settings(&schema(), &IndexConfig::default());
        let response = json!({ "article": { "mappings": settings["mappings"].clone() } });

        let recovered = schema_from_mapping("article", &response).unwrap();

        assert_eq!(recovered, Some(schema()));
    }

    #[test]
    fn test_schema_inferred_without_meta() {
        let response = json!({
            "article": {
                "mappings": {
                    "properties": {
                        "title": { "type": "text" },
                        "author": {
                            "properties": {
                                "name": { "type": "text", "fields": { "raw": { "type": "keyword" } } }
                            }
                        },
                        "views": { "type": "long" }
                    }
                }
            }
        });

        let schema = schema_from_mapping("article", &response).unwrap().unwrap();

        assert_eq!(schema.get("title").unwrap().kind, FieldKind::Text);
        assert!(schema.get("author.name").unwrap().sortable);
        assert_eq!(schema.get("views").unwrap().kind, FieldKind::Integer);
    }

    #[test]
    fn test_empty_mapping_has_no_schema() {
        let response = json!({ "article": { "mappings": {} } });
        assert_eq!(schema_from_mapping("article", &response).unwrap(), None);
    }

    #[test]
    fn test_malformed_mapping_response() {
        let response = json!({});
        assert!(matches!(
            schema_from_mapping("article", &response),
            Err(SearchIndexError::ParseError(_))
        ));
    }
}
