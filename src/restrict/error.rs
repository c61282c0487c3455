use thiserror::Error;

use super::rules::ProcessType;

#[derive(Error, Debug)]
pub enum RestrictError {
    #[error("access denied for {direction} on {location}")]
    AccessDenied {
        /// `Type.property`, or just `Type` for class-level failures.
        location: String,
        direction: ProcessType,
    },

    #[error("restriction walk exceeded depth budget of {0}")]
    DepthExceeded(u32),
}
