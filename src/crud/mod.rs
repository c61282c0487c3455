//! Generic CRUD orchestration.
//!
//! [`CrudService`] sequences the per-call stage machine (input restriction,
//! input preparation, record authorization, the backend operation, output
//! preparation, output restriction) for one entity type, with `_force` and
//! `_raw` variants that skip the authorization and preparation stages.

pub mod events;
pub mod options;
pub mod service;

pub use events::{BroadcastSink, CrudEvent, CrudOperation, EventSink};
pub use options::ServiceOptions;
pub use service::{CrudService, EntityDescriptor, FindAndCountResult, FindQuery};
