//! Flowline Facade
//!
//! Read-only query surface over a parsed [`ProcessModel`](flowline_model::ProcessModel).
//!
//! The facade answers the structural questions an orchestrator asks while it
//! drives a process instance: which nodes follow this one, which boundary
//! events are attached to it, which lane it belongs to, and which converging
//! gateway closes a given split ([`ProcessModelFacade::find_join`]).
//!
//! All queries are pure. A facade can be shared across any number of process
//! instances; [`FacadeCache`] keeps one per instance and identity for the
//! lifetime of the instance.

mod cache;
mod error;
mod facade;
mod join;

pub use cache::{CacheKey, FacadeCache};
pub use error::{FacadeError, ModelIntegrityError};
pub use facade::{FacadeConfig, ProcessModelFacade};
