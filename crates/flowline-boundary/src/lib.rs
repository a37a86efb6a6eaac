//! Flowline Boundary
//!
//! Boundary events are triggers attached to an activity: a timer, a message,
//! a signal or an error. While the activity runs, each attached boundary event
//! is represented by a [`BoundaryTrigger`] that waits for its source and, when
//! it fires, reports the flow node execution continues with.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted ──wait_for_trigger/resume──▶ Waiting ──fire──▶ Triggered ──▶ Finished
//!                                            │  ▲
//!                                            │  └── non-interrupting fire
//!                                            ├──cancel────▶ Cancelled
//!                                            ├──terminate─▶ Terminated
//!                                            └──failure───▶ Errored
//! ```
//!
//! Every transition that leaves `NotStarted` or enters a terminal state is
//! checkpointed through [`FlowNodePersistence`](flowline_store::FlowNodePersistence)
//! before it is committed in memory.

mod error;
mod kind;
mod state;
mod trigger;

pub use error::BoundaryError;
pub use kind::{BoundaryKind, matches_error};
pub use state::BoundaryState;
pub use trigger::{BoundaryServices, BoundaryTrigger, BoundaryTriggerResult, OnTriggered};
