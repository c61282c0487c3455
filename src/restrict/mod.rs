//! Field-level restriction enforcement.
//!
//! A process-wide [`RestrictionRegistry`] records which roles or membership
//! rules may read or write each registered type and property; the
//! [`RestrictionEngine`] walks arbitrary record values and redacts or
//! rejects whatever the current user may not access.

pub mod engine;
pub mod error;
pub mod registry;
pub mod rules;
pub mod user;

pub use engine::{EnforceOptions, RestrictionEngine};
pub use error::RestrictError;
pub use registry::{RegistryBuilder, RestrictionRegistry};
pub use rules::{roles, ProcessType, RestrictionRule};
pub use user::UserContext;
