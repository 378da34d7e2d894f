use crate::custom_field::FieldDefinition;
use crate::firestore::value::Value;
use crate::firestore::Document;
use std::collections::BTreeMap;
use tracing::warn;

pub const CUSTOM_FIELDS: &str = "customFields";

/// The `customFields` map of an organization document with `category` replaced by `fields`.
///
/// A missing or null `customFields` counts as an empty map, and so does any other
/// non-map value. Categories other than `category` are carried over unchanged.
pub fn merge_custom_fields(
    document: &Document,
    category: &str,
    fields: &[FieldDefinition],
) -> BTreeMap<String, Value> {
    let mut custom_fields = match document.fields.get(CUSTOM_FIELDS) {
        Some(Value::MapValue(it)) => it.fields.clone(),
        Some(other) if !other.is_null() => {
            warn!("{CUSTOM_FIELDS} of {} is not a map, replacing {other:?}", document.name);
            BTreeMap::new()
        }
        _ => BTreeMap::new(),
    };
    custom_fields.insert(
        category.to_string(),
        Value::array(fields.iter().map(Value::from)),
    );
    custom_fields
}
