use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid filter expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid offset: {0}")]
    InvalidOffset(String),

    #[error("Invalid sample size: {0}")]
    InvalidSampleSize(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
