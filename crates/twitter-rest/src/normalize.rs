//! Key normalization for parsed payloads.
//!
//! Object keys in a parsed payload are owned `String`s, which is already the
//! canonical key form callers index and deserialize by. Normalizing rebuilds
//! the value recursively through arrays and objects and keeps every key's
//! text as sent, so no two keys can ever merge.

use serde_json::{Map, Value};

/// Recursively normalize all object keys in `value`.
#[must_use]
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}
