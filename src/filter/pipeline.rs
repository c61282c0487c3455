use serde_json::{json, Value};

use super::compiler::FilterCompiler;
use super::error::FilterError;
use super::types::PaginationArgs;

impl FilterCompiler {
    /// Build the combined find-and-count aggregation pipeline:
    /// match, sort, then a fan-out producing the windowed item list and the
    /// total count in one store round trip. Splitting this into two queries
    /// would let concurrent writes produce a page whose items and total
    /// disagree.
    ///
    /// With `samples` set, the skip/limit window is replaced by a random
    /// sample of that size.
    pub fn find_and_count_pipeline(
        &self,
        predicate: &Value,
        args: &PaginationArgs,
    ) -> Result<Vec<Value>, FilterError> {
        let options = self.find_options(args)?;

        let mut pipeline = vec![json!({ "$match": predicate })];
        if !options.sort.is_empty() {
            pipeline.push(json!({ "$sort": options.sort_document() }));
        }

        let window: Vec<Value> = match args.samples {
            Some(n) if n <= 0 => {
                return Err(FilterError::InvalidSampleSize(format!(
                    "samples must be positive, got {n}"
                )));
            }
            Some(n) => vec![json!({ "$sample": { "size": n } })],
            None => {
                let mut stages = Vec::with_capacity(2);
                if let Some(skip) = options.skip {
                    stages.push(json!({ "$skip": skip }));
                }
                stages.push(json!({ "$limit": options.limit }));
                stages
            }
        };

        pipeline.push(json!({
            "$facet": {
                "items": window,
                "total": [{ "$count": "count" }],
            }
        }));
        Ok(pipeline)
    }
}

/// Unpack the single-document fan-out result of a find-and-count pipeline
/// into the item window and the total count. An absent count bucket (empty
/// match set) reads as zero.
pub fn parse_find_and_count(rows: &[Value]) -> (Vec<Value>, i64) {
    let Some(doc) = rows.first() else {
        return (Vec::new(), 0);
    };
    let items = doc
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let total = doc
        .get("total")
        .and_then(Value::as_array)
        .and_then(|buckets| buckets.first())
        .and_then(|b| b.get("count"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    (items, total)
}
