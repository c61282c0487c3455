//! Identifier normalization.
//!
//! Records, references and user contexts carry identifiers in several
//! shapes: a plain string, the store-native extended-JSON form
//! `{"$oid": "<hex>"}`, or a whole document exposing an `id`/`_id` field.
//! Everything that compares identifiers goes through this module so the
//! shapes stay interchangeable.

use serde_json::{json, Value};

const OBJECT_ID_LEN: usize = 24;

/// True when `s` has the shape of a store-native object id (24 hex chars).
pub fn looks_like_object_id(s: &str) -> bool {
    s.len() == OBJECT_ID_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Canonical string form of any identifier representation.
///
/// Accepts a raw string, the native `{"$oid": ...}` form, or an object
/// carrying an `id` or `_id` field (one level deep). Returns `None` for
/// values that carry no identifier.
pub fn normalize(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => {
            if let Some(Value::String(oid)) = map.get("$oid") {
                return Some(oid.clone());
            }
            for key in ["id", "_id"] {
                match map.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                    Some(Value::Object(inner)) => {
                        if let Some(Value::String(oid)) = inner.get("$oid") {
                            return Some(oid.clone());
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// Normalize every element of `values`, dropping elements without an
/// identifier. With `unique`, later duplicates are removed while the first
/// occurrence keeps its position.
pub fn normalize_many(values: &[Value], unique: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if let Some(id) = normalize(value) {
            if !unique || !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

/// The value to place in a query predicate when comparing against an
/// identifier field: id-shaped strings become the native `{"$oid": ...}`
/// form, everything else is left as-is.
pub fn to_query_value(value: &Value) -> Value {
    match normalize(value) {
        Some(id) if looks_like_object_id(&id) => json!({ "$oid": id }),
        Some(id) => Value::String(id),
        None => value.clone(),
    }
}

/// Identifier equality under normalization.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Set membership under normalization. `pool` may mix representations.
pub fn contains(pool: &[Value], candidate: &Value) -> bool {
    let Some(target) = normalize(candidate) else {
        return false;
    };
    pool.iter().any(|v| normalize(v).as_deref() == Some(target.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_all_shapes() {
        let hex = "507f1f77bcf86cd799439011";
        assert_eq!(normalize(&json!(hex)).as_deref(), Some(hex));
        assert_eq!(normalize(&json!({ "$oid": hex })).as_deref(), Some(hex));
        assert_eq!(normalize(&json!({ "id": hex })).as_deref(), Some(hex));
        assert_eq!(normalize(&json!({ "_id": { "$oid": hex } })).as_deref(), Some(hex));
        assert_eq!(normalize(&json!(42)), None);
        assert_eq!(normalize(&json!("")), None);
    }

    #[test]
    fn query_value_wraps_only_id_shaped_strings() {
        let hex = "507f1f77bcf86cd799439011";
        assert_eq!(to_query_value(&json!(hex)), json!({ "$oid": hex }));
        assert_eq!(to_query_value(&json!("alice")), json!("alice"));
    }

    #[test]
    fn unique_normalization_keeps_first_occurrence() {
        let values = vec![json!("a"), json!({ "id": "b" }), json!("a")];
        assert_eq!(normalize_many(&values, true), vec!["a", "b"]);
        assert_eq!(normalize_many(&values, false), vec!["a", "b", "a"]);
    }

    #[test]
    fn membership_mixes_representations() {
        let pool = vec![json!({ "$oid": "507f1f77bcf86cd799439011" }), json!("u2")];
        assert!(contains(&pool, &json!("507f1f77bcf86cd799439011")));
        assert!(contains(&pool, &json!({ "id": "u2" })));
        assert!(!contains(&pool, &json!("u3")));
    }
}
