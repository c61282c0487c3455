use serde_json::{json, Value};

use crate::config;
use crate::ident;

use super::error::FilterError;
use super::types::{ComparisonOperator, FilterExpression, SingleFilter};

/// Compiler tuning, passed by value at construction. Defaults come from the
/// process config but callers may override per instance.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub default_limit: i64,
    pub max_limit: i64,
    pub auto_detect_ids: bool,
    pub debug_logging: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        let cfg = &config::CONFIG.filter;
        Self {
            default_limit: cfg.default_limit,
            max_limit: cfg.max_limit,
            auto_detect_ids: cfg.auto_detect_ids,
            debug_logging: cfg.debug_logging,
        }
    }
}

/// Stateless translator from [`FilterExpression`] trees to store predicates.
pub struct FilterCompiler {
    pub(crate) settings: FilterSettings,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCompiler {
    pub fn new() -> Self {
        Self::with_settings(FilterSettings::default())
    }

    pub fn with_settings(settings: FilterSettings) -> Self {
        Self { settings }
    }

    /// Compile a filter tree into a predicate document.
    ///
    /// A populated `combined_filter` always wins; the `single_filter` branch
    /// of the same node is ignored rather than merged. An empty combinator
    /// collapses to the empty predicate and a one-element combinator
    /// collapses to its child, since some dialects treat an empty `$and` as
    /// "match nothing".
    pub fn compile(&self, expr: &FilterExpression) -> Result<Value, FilterError> {
        if let Some(combined) = &expr.combined_filter {
            let mut parts = Vec::with_capacity(combined.filters.len());
            for child in &combined.filters {
                parts.push(self.compile(child)?);
            }
            return Ok(match parts.len() {
                0 => json!({}),
                1 => parts.pop().unwrap(),
                _ => json!({ combined.logical_operator.token(): parts }),
            });
        }
        if let Some(single) = &expr.single_filter {
            return self.compile_single(single);
        }
        Err(FilterError::InvalidExpression(
            "expected combinedFilter or singleFilter".to_string(),
        ))
    }

    fn compile_single(&self, filter: &SingleFilter) -> Result<Value, FilterError> {
        // Opt-in id detection: the same logical field may be stored as a
        // native id in one collection and a plain string in another, so an
        // id-looking value compiles to an OR over both typings. Each
        // alternative goes through the full operator translation.
        if self.settings.auto_detect_ids
            && !filter.convert_to_identifier
            && Self::value_is_id_like(&filter.value)
        {
            if self.settings.debug_logging {
                tracing::debug!(field = %filter.field, "compiling id-typed alternative for filter");
            }
            let mut id_variant = filter.clone();
            id_variant.convert_to_identifier = true;
            let id_clause = self.translate(&id_variant)?;
            let plain_clause = self.translate(filter)?;
            return Ok(json!({ "$or": [id_clause, plain_clause] }));
        }
        self.translate(filter)
    }

    /// Operator translation, including the `not` duality: operators with a
    /// native complement swap to it, the rest take the `$not` wrapper form.
    fn translate(&self, filter: &SingleFilter) -> Result<Value, FilterError> {
        use ComparisonOperator::*;

        let field = &filter.field;
        match filter.operator {
            Eq | Ne => {
                let value = self.comparison_value(filter, &filter.value);
                let flipped = matches!(filter.operator, Ne) != filter.not;
                let token = if flipped { "$ne" } else { "$eq" };
                Ok(json!({ field: { token: value } }))
            }
            Gt | Gte | Lt | Lte => {
                let value = self.comparison_value(filter, &filter.value);
                let token = match filter.operator {
                    Gt => "$gt",
                    Gte => "$gte",
                    Lt => "$lt",
                    _ => "$lte",
                };
                if filter.not {
                    // No native negated comparison in the dialect.
                    Ok(json!({ field: { "$not": { token: value } } }))
                } else {
                    Ok(json!({ field: { token: value } }))
                }
            }
            In | Nin => {
                let items = filter.value.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData(format!(
                        "{:?} requires an array value for field '{}'",
                        filter.operator, field
                    ))
                })?;
                let values: Vec<Value> = items
                    .iter()
                    .map(|v| self.comparison_value(filter, v))
                    .collect();
                let flipped = matches!(filter.operator, Nin) != filter.not;
                let token = if flipped { "$nin" } else { "$in" };
                Ok(json!({ field: { token: values } }))
            }
            Regex => {
                let pattern = filter.value.as_str().ok_or_else(|| {
                    FilterError::InvalidOperatorData(format!(
                        "REGEX requires a string pattern for field '{}'",
                        field
                    ))
                })?;
                let mut body = serde_json::Map::new();
                body.insert("$regex".to_string(), Value::from(pattern));
                if let Some(options) = &filter.regex_options {
                    body.insert("$options".to_string(), Value::from(options.clone()));
                }
                if filter.not {
                    Ok(json!({ field: { "$not": Value::Object(body) } }))
                } else {
                    Ok(json!({ field: Value::Object(body) }))
                }
            }
        }
    }

    fn comparison_value(&self, filter: &SingleFilter, value: &Value) -> Value {
        if filter.convert_to_identifier {
            ident::to_query_value(value)
        } else {
            value.clone()
        }
    }

    fn value_is_id_like(value: &Value) -> bool {
        match value {
            Value::String(s) => ident::looks_like_object_id(s),
            Value::Array(items) => items
                .iter()
                .any(|v| v.as_str().is_some_and(ident::looks_like_object_id)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::{ComparisonOperator as Op, LogicalOperator};

    fn compiler() -> FilterCompiler {
        FilterCompiler::with_settings(FilterSettings {
            default_limit: 25,
            max_limit: 100,
            auto_detect_ids: false,
            debug_logging: false,
        })
    }

    fn single(field: &str, op: Op, value: Value) -> FilterExpression {
        FilterExpression::single(SingleFilter::new(field, op, value))
    }

    #[test]
    fn eq_and_its_negation_are_duals() {
        let c = compiler();
        let plain = c
            .compile(&single("status", Op::Eq, json!("active")))
            .unwrap();
        assert_eq!(plain, json!({ "status": { "$eq": "active" } }));

        let negated = c
            .compile(&FilterExpression::single(
                SingleFilter::new("status", Op::Eq, json!("active")).negated(),
            ))
            .unwrap();
        assert_eq!(negated, json!({ "status": { "$ne": "active" } }));
    }

    #[test]
    fn ordering_operators_negate_with_wrapper() {
        let c = compiler();
        let negated = c
            .compile(&FilterExpression::single(
                SingleFilter::new("age", Op::Gte, json!(18)).negated(),
            ))
            .unwrap();
        assert_eq!(negated, json!({ "age": { "$not": { "$gte": 18 } } }));
    }

    #[test]
    fn in_and_nin_swap_under_not() {
        let c = compiler();
        let nin = c
            .compile(&FilterExpression::single(
                SingleFilter::new("status", Op::In, json!(["a", "b"])).negated(),
            ))
            .unwrap();
        assert_eq!(nin, json!({ "status": { "$nin": ["a", "b"] } }));

        let back = c
            .compile(&FilterExpression::single(
                SingleFilter::new("status", Op::Nin, json!(["a", "b"])).negated(),
            ))
            .unwrap();
        assert_eq!(back, json!({ "status": { "$in": ["a", "b"] } }));
    }

    #[test]
    fn in_requires_array_value() {
        let c = compiler();
        let err = c
            .compile(&single("status", Op::In, json!("oops")))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperatorData(_)));
    }

    #[test]
    fn regex_carries_options_and_negates_with_wrapper() {
        let c = compiler();
        let mut filter = SingleFilter::new("name", Op::Regex, json!("^al"));
        filter.regex_options = Some("i".to_string());
        let plain = c.compile(&FilterExpression::single(filter.clone())).unwrap();
        assert_eq!(plain, json!({ "name": { "$regex": "^al", "$options": "i" } }));

        let negated = c
            .compile(&FilterExpression::single(filter.negated()))
            .unwrap();
        assert_eq!(
            negated,
            json!({ "name": { "$not": { "$regex": "^al", "$options": "i" } } })
        );
    }

    #[test]
    fn combined_wins_over_single_on_the_same_node() {
        let c = compiler();
        let mut expr = single("ignored", Op::Eq, json!("x"));
        expr.combined_filter = Some(
            FilterExpression::combined(
                LogicalOperator::Or,
                vec![
                    single("status", Op::Eq, json!("active")),
                    single("status", Op::Eq, json!("pending")),
                ],
            )
            .combined_filter
            .unwrap(),
        );
        let predicate = c.compile(&expr).unwrap();
        assert_eq!(
            predicate,
            json!({ "$or": [
                { "status": { "$eq": "active" } },
                { "status": { "$eq": "pending" } }
            ]})
        );
    }

    #[test]
    fn empty_combinator_collapses_to_empty_predicate() {
        let c = compiler();
        let expr = FilterExpression::combined(LogicalOperator::And, vec![]);
        assert_eq!(c.compile(&expr).unwrap(), json!({}));
    }

    #[test]
    fn single_element_combinator_collapses_to_child() {
        let c = compiler();
        let child = single("status", Op::Eq, json!("active"));
        let wrapped = FilterExpression::combined(LogicalOperator::And, vec![child.clone()]);
        assert_eq!(c.compile(&wrapped).unwrap(), c.compile(&child).unwrap());
    }

    #[test]
    fn empty_expression_is_an_error() {
        let c = compiler();
        assert!(matches!(
            c.compile(&FilterExpression::default()),
            Err(FilterError::InvalidExpression(_))
        ));
    }

    #[test]
    fn convert_to_identifier_wraps_id_shaped_values() {
        let c = compiler();
        let hex = "507f1f77bcf86cd799439011";
        let mut filter = SingleFilter::new("owner", Op::Eq, json!(hex));
        filter.convert_to_identifier = true;
        let predicate = c.compile(&FilterExpression::single(filter)).unwrap();
        assert_eq!(predicate, json!({ "owner": { "$eq": { "$oid": hex } } }));
    }

    #[test]
    fn auto_detection_compiles_both_typings() {
        let c = FilterCompiler::with_settings(FilterSettings {
            default_limit: 25,
            max_limit: 100,
            auto_detect_ids: true,
            debug_logging: false,
        });
        let hex = "507f1f77bcf86cd799439011";
        let predicate = c.compile(&single("owner", Op::Eq, json!(hex))).unwrap();
        assert_eq!(
            predicate,
            json!({ "$or": [
                { "owner": { "$eq": { "$oid": hex } } },
                { "owner": { "$eq": hex } }
            ]})
        );
    }

    #[test]
    fn auto_detection_reapplies_operator_translation() {
        let c = FilterCompiler::with_settings(FilterSettings {
            default_limit: 25,
            max_limit: 100,
            auto_detect_ids: true,
            debug_logging: false,
        });
        let hex = "507f1f77bcf86cd799439011";
        let predicate = c
            .compile(&FilterExpression::single(
                SingleFilter::new("owner", Op::In, json!([hex])).negated(),
            ))
            .unwrap();
        assert_eq!(
            predicate,
            json!({ "$or": [
                { "owner": { "$nin": [{ "$oid": hex }] } },
                { "owner": { "$nin": [hex] } }
            ]})
        );
    }
}
