//! Record value helpers shared by the service layer and the restriction
//! engine: null-stripping (patch semantics), shallow merging, projection,
//! and typed materialization of raw store documents.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Remove null-valued keys from an object. Inputs use patch semantics:
/// an absent or null key must never clear a stored field.
pub fn strip_nulls(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, v| !v.is_null());
    }
}

/// Shallow per-key merge of `patch` onto `existing`. Null patch values are
/// skipped, matching [`strip_nulls`] semantics.
pub fn merge_into(existing: &mut Value, patch: &Value) {
    let (Value::Object(base), Value::Object(changes)) = (existing, patch) else {
        return;
    };
    for (key, value) in changes {
        if value.is_null() {
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Remove the named keys from an object, in place.
pub fn omit(value: &mut Value, keys: &[String]) {
    if let Value::Object(map) = value {
        for key in keys {
            map.remove(key);
        }
    }
}

/// A copy of `value` containing only the named keys.
pub fn pick(value: &Value, keys: &[String]) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut out = serde_json::Map::new();
    for key in keys {
        if let Some(v) = map.get(key) {
            out.insert(key.clone(), v.clone());
        }
    }
    Value::Object(out)
}

/// Materialize a typed result from a raw store document.
pub fn from_document<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}
