use std::collections::HashMap;

use thiserror::Error;

use crate::filter::FilterError;
use crate::restrict::RestrictError;
use crate::store::StoreError;

/// Crate-level error taxonomy surfaced by the CRUD service layer.
///
/// NotFound and Unauthorized are distinct on purpose: callers may need to
/// tell "doesn't exist" apart from "exists but you can't see it".
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{message}")]
    Validation {
        message: String,
        field_errors: HashMap<String, String>,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ServiceError::Unauthorized(message.into())
    }

    pub fn validation(
        message: impl Into<String>,
        field_errors: HashMap<String, String>,
    ) -> Self {
        ServiceError::Validation {
            message: message.into(),
            field_errors,
        }
    }

    /// Stable error code for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::Validation { .. } => "VALIDATION_FAILED",
            ServiceError::Filter(_) => "INVALID_FILTER",
            ServiceError::Store(_) => "BACKEND_FAILURE",
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            other => ServiceError::Store(other),
        }
    }
}

impl From<RestrictError> for ServiceError {
    fn from(err: RestrictError) -> Self {
        match err {
            RestrictError::AccessDenied { .. } => ServiceError::Unauthorized(err.to_string()),
            RestrictError::DepthExceeded(_) => {
                ServiceError::validation(err.to_string(), HashMap::new())
            }
        }
    }
}
