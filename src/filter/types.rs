use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node of a declarative filter tree. Exactly one of the two branches
/// is expected; when both are populated the combined branch wins and the
/// single branch is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterExpression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_filter: Option<CombinedFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_filter: Option<SingleFilter>,
}

impl FilterExpression {
    pub fn combined(operator: LogicalOperator, filters: Vec<FilterExpression>) -> Self {
        Self {
            combined_filter: Some(CombinedFilter {
                logical_operator: operator,
                filters,
            }),
            single_filter: None,
        }
    }

    pub fn single(filter: SingleFilter) -> Self {
        Self {
            combined_filter: None,
            single_filter: Some(filter),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedFilter {
    pub logical_operator: LogicalOperator,
    pub filters: Vec<FilterExpression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "NOR")]
    Nor,
}

impl LogicalOperator {
    pub fn token(&self) -> &'static str {
        match self {
            LogicalOperator::And => "$and",
            LogicalOperator::Or => "$or",
            LogicalOperator::Nor => "$nor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleFilter {
    pub field: String,
    pub operator: ComparisonOperator,
    pub value: Value,
    #[serde(default)]
    pub not: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_options: Option<String>,
    #[serde(default)]
    pub convert_to_identifier: bool,
}

impl SingleFilter {
    pub fn new(field: impl Into<String>, operator: ComparisonOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            not: false,
            regex_options: None,
            convert_to_identifier: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.not = !self.not;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Regex,
}

/// Client-supplied pagination and sorting. `limit`/`take` and
/// `offset`/`skip` are alias pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortArg>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortArg {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn direction(&self) -> i64 {
        match self {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        }
    }
}

/// Compiled query options handed to the store alongside a predicate.
/// `sort` is ordered; the first entry is the primary sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub limit: i64,
    pub skip: Option<i64>,
    pub sort: Vec<(String, i64)>,
}

impl FindOptions {
    /// Ordered `$sort` document form (relies on serde_json preserving
    /// insertion order).
    pub fn sort_document(&self) -> Value {
        let mut doc = Map::new();
        for (field, direction) in &self.sort {
            doc.insert(field.clone(), Value::from(*direction));
        }
        Value::Object(doc)
    }
}
