//! Field type mapping.
//!
//! Maps record-store column types to index field descriptors and derives the
//! schema of an entity kind's index. Both functions are pure: re-opening an
//! index must derive exactly the schema it was created with.

use search_sync_shared::{EntityKind, FieldDescriptor, FieldKind, FieldType, IndexSchema};

/// Map a source column type to an index field descriptor.
///
/// Primary keys always become exact-match identifiers. Unknown types fall
/// through to stored, sortable, analyzed text.
///
/// # Example
///
/// ```
/// use search_sync_repository::mapping::map_type;
/// use search_sync_shared::{FieldKind, FieldType};
///
/// assert_eq!(map_type(&FieldType::DateTime, false).kind, FieldKind::Date);
/// assert_eq!(map_type(&FieldType::Text, true).kind, FieldKind::Identifier);
/// ```
pub fn map_type(field_type: &FieldType, is_primary_key: bool) -> FieldDescriptor {
    if is_primary_key {
        return FieldDescriptor::plain(FieldKind::Identifier)
            .stored()
            .unique();
    }

    match field_type {
        FieldType::Date | FieldType::DateTime => {
            FieldDescriptor::plain(FieldKind::Date).stored().sortable()
        }
        FieldType::Integer => FieldDescriptor::plain(FieldKind::Integer).stored(),
        FieldType::Float => FieldDescriptor::plain(FieldKind::Float).stored(),
        FieldType::Boolean => FieldDescriptor::plain(FieldKind::Boolean).stored(),
        FieldType::Binary => FieldDescriptor::plain(FieldKind::Binary).stored(),
        FieldType::Text | FieldType::Other(_) => FieldDescriptor::plain(FieldKind::Text)
            .stored()
            .sortable()
            .analyzed(),
    }
}

/// Derive the index schema of an entity kind from its declared searchable fields.
pub fn derive_schema(kind: &EntityKind) -> IndexSchema {
    kind.fields.iter().fold(IndexSchema::new(), |schema, field| {
        schema.with_field(
            field.name.clone(),
            map_type(&field.field_type, kind.is_primary_key(&field.name)),
        )
    })
}
