//! In-memory document store.
//!
//! Evaluates the predicate and pipeline dialect against plain JSON values
//! behind one `RwLock`. Aggregations run under a single read guard, so a
//! find-and-count fan-out sees one consistent snapshot.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::RegexBuilder;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::filter::FindOptions;

use super::{DocumentStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fixture documents, bypassing id assignment and uniqueness
    /// checks.
    pub fn seed(&self, collection: &str, documents: Vec<Value>) {
        let mut guard = self.collections.write().expect("store lock poisoned");
        guard.entry(collection.to_string()).or_default().extend(documents);
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Value>>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Value>>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        predicate: &Value,
        options: Option<&FindOptions>,
    ) -> Result<Vec<Value>, StoreError> {
        let guard = self.read()?;
        let mut rows: Vec<Value> = match guard.get(collection) {
            Some(docs) => docs
                .iter()
                .filter_map(|d| match matches(d, predicate) {
                    Ok(true) => Some(Ok(d.clone())),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                })
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
        };
        if let Some(options) = options {
            sort_rows(&mut rows, &options.sort);
            if let Some(skip) = options.skip {
                rows = rows.split_off((skip as usize).min(rows.len()));
            }
            rows.truncate(options.limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn find_one(
        &self,
        collection: &str,
        predicate: &Value,
    ) -> Result<Option<Value>, StoreError> {
        let guard = self.read()?;
        let Some(docs) = guard.get(collection) else {
            return Ok(None);
        };
        for doc in docs {
            if matches(doc, predicate)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Value>, StoreError> {
        let guard = self.read()?;
        let rows = guard.get(collection).cloned().unwrap_or_default();
        run_pipeline(rows, pipeline)
    }

    async fn insert_one(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        let mut document = document;
        let Value::Object(ref mut map) = document else {
            return Err(StoreError::InvalidQuery(
                "insert requires a document".to_string(),
            ));
        };
        if !map.contains_key("id") {
            map.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let id = map.get("id").cloned().unwrap_or(Value::Null);

        let mut guard = self.write()?;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| values_equal(&d["id"], &id)) {
            return Err(StoreError::DuplicateKey(format!(
                "{collection}.id: {id}"
            )));
        }
        docs.push(document.clone());
        Ok(document)
    }

    async fn update_one(
        &self,
        collection: &str,
        predicate: &Value,
        update: &Value,
    ) -> Result<Option<Value>, StoreError> {
        let set = update.get("$set").ok_or_else(|| {
            StoreError::InvalidQuery("update requires a $set document".to_string())
        })?;
        let Value::Object(changes) = set else {
            return Err(StoreError::InvalidQuery(
                "$set requires a document".to_string(),
            ));
        };

        let mut guard = self.write()?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(None);
        };
        for doc in docs.iter_mut() {
            if matches(doc, predicate)? {
                if let Value::Object(map) = doc {
                    for (key, value) in changes {
                        map.insert(key.clone(), value.clone());
                    }
                }
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn delete_one(&self, collection: &str, predicate: &Value) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(false);
        };
        for (idx, doc) in docs.iter().enumerate() {
            if matches(doc, predicate)? {
                docs.remove(idx);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn count(&self, collection: &str, predicate: &Value) -> Result<i64, StoreError> {
        let guard = self.read()?;
        let Some(docs) = guard.get(collection) else {
            return Ok(0);
        };
        let mut n = 0;
        for doc in docs {
            if matches(doc, predicate)? {
                n += 1;
            }
        }
        Ok(n)
    }
}

/// Evaluate a predicate document against a record.
pub fn matches(doc: &Value, predicate: &Value) -> Result<bool, StoreError> {
    let Value::Object(clauses) = predicate else {
        return Err(StoreError::InvalidQuery(
            "predicate must be a document".to_string(),
        ));
    };
    for (key, operand) in clauses {
        let ok = match key.as_str() {
            "$and" => combinator(doc, operand, key)?.iter().all(|b| *b),
            "$or" => combinator(doc, operand, key)?.iter().any(|b| *b),
            "$nor" => !combinator(doc, operand, key)?.iter().any(|b| *b),
            _ => field_condition(resolve_path(doc, key), operand)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn combinator(doc: &Value, operand: &Value, op: &str) -> Result<Vec<bool>, StoreError> {
    let children = operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{op} requires an array")))?;
    children.iter().map(|child| matches(doc, child)).collect()
}

fn field_condition(actual: &Value, condition: &Value) -> Result<bool, StoreError> {
    if let Value::Object(ops) = condition {
        if ops.keys().any(|k| k.starts_with('$')) && ops.get("$oid").is_none() {
            for (op, operand) in ops {
                let ok = match op.as_str() {
                    "$eq" => values_equal(actual, operand),
                    "$ne" => !values_equal(actual, operand),
                    "$gt" => compare_values(actual, operand) == Some(Ordering::Greater),
                    "$gte" => matches!(
                        compare_values(actual, operand),
                        Some(Ordering::Greater) | Some(Ordering::Equal)
                    ),
                    "$lt" => compare_values(actual, operand) == Some(Ordering::Less),
                    "$lte" => matches!(
                        compare_values(actual, operand),
                        Some(Ordering::Less) | Some(Ordering::Equal)
                    ),
                    "$in" => in_set(actual, operand)?,
                    "$nin" => !in_set(actual, operand)?,
                    "$regex" => regex_match(actual, operand, ops.get("$options"))?,
                    "$options" => true,
                    "$not" => !field_condition(actual, operand)?,
                    other => {
                        return Err(StoreError::InvalidQuery(format!(
                            "unsupported operator: {other}"
                        )))
                    }
                };
                if !ok {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(values_equal(actual, condition))
}

fn in_set(actual: &Value, operand: &Value) -> Result<bool, StoreError> {
    let set = operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery("$in/$nin require an array".to_string()))?;
    Ok(set.iter().any(|v| values_equal(actual, v)))
}

fn regex_match(
    actual: &Value,
    pattern: &Value,
    options: Option<&Value>,
) -> Result<bool, StoreError> {
    let Some(text) = actual.as_str() else {
        return Ok(false);
    };
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::InvalidQuery("$regex requires a string".to_string()))?;
    let flags = options.and_then(Value::as_str).unwrap_or_default();
    let re = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| StoreError::InvalidQuery(format!("invalid regex: {e}")))?;
    Ok(re.is_match(text))
}

fn oid_str(value: &Value) -> Option<&str> {
    value.as_object()?.get("$oid")?.as_str()
}

/// Structural equality, with the native id form `{"$oid": s}` comparing
/// equal to the bare string `s` on either side.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (oid_str(a), oid_str(b)) {
        (Some(ida), None) => Some(ida) == b.as_str(),
        (None, Some(idb)) => a.as_str() == Some(idb),
        _ => false,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Resolve a dot-separated path, yielding null for missing segments.
fn resolve_path<'a>(doc: &'a Value, path: &str) -> &'a Value {
    let mut current = doc;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) => current = v,
            None => return &Value::Null,
        }
    }
    current
}

fn sort_rows(rows: &mut [Value], sort: &[(String, i64)]) {
    if sort.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for (field, direction) in sort {
            let ord = compare_values(resolve_path(a, field), resolve_path(b, field))
                .unwrap_or(Ordering::Equal);
            let ord = if *direction < 0 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn run_pipeline(mut rows: Vec<Value>, pipeline: &[Value]) -> Result<Vec<Value>, StoreError> {
    for stage in pipeline {
        let Value::Object(spec) = stage else {
            return Err(StoreError::InvalidQuery(
                "pipeline stage must be a document".to_string(),
            ));
        };
        let Some((op, operand)) = spec.iter().next() else {
            return Err(StoreError::InvalidQuery("empty pipeline stage".to_string()));
        };
        rows = match op.as_str() {
            "$match" => {
                let mut kept = Vec::with_capacity(rows.len());
                for row in rows {
                    if matches(&row, operand)? {
                        kept.push(row);
                    }
                }
                kept
            }
            "$sort" => {
                let Value::Object(keys) = operand else {
                    return Err(StoreError::InvalidQuery(
                        "$sort requires a document".to_string(),
                    ));
                };
                let sort: Vec<(String, i64)> = keys
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_i64().unwrap_or(1)))
                    .collect();
                sort_rows(&mut rows, &sort);
                rows
            }
            "$skip" => {
                let n = operand.as_i64().unwrap_or(0).max(0) as usize;
                rows.split_off(n.min(rows.len()))
            }
            "$limit" => {
                let n = operand.as_i64().unwrap_or(0).max(0) as usize;
                rows.truncate(n);
                rows
            }
            "$count" => {
                let name = operand
                    .as_str()
                    .ok_or_else(|| StoreError::InvalidQuery("$count requires a name".to_string()))?;
                vec![json!({ name: rows.len() })]
            }
            "$sample" => {
                let n = operand
                    .get("size")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        StoreError::InvalidQuery("$sample requires a size".to_string())
                    })?
                    .max(0) as usize;
                let mut rng = rand::thread_rng();
                rows.choose_multiple(&mut rng, n.min(rows.len()))
                    .cloned()
                    .collect()
            }
            "$facet" => {
                let Value::Object(branches) = operand else {
                    return Err(StoreError::InvalidQuery(
                        "$facet requires a document".to_string(),
                    ));
                };
                let mut out = Map::new();
                for (name, sub) in branches {
                    let sub_pipeline = sub.as_array().ok_or_else(|| {
                        StoreError::InvalidQuery("$facet branch must be a pipeline".to_string())
                    })?;
                    let result = run_pipeline(rows.clone(), sub_pipeline)?;
                    out.insert(name.clone(), Value::Array(result));
                }
                vec![Value::Object(out)]
            }
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unsupported pipeline stage: {other}"
                )))
            }
        };
    }
    Ok(rows)
}
