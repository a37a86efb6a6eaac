use flowline_bus::TopicError;
use flowline_facade::FacadeError;
use flowline_store::{FlowNodeInstanceState, StoreError};
use flowline_timer::TimerError;
use thiserror::Error;

use crate::state::BoundaryState;

#[derive(Debug, Error)]
pub enum BoundaryError {
  #[error("flow node '{0}' is not a boundary event")]
  NotABoundaryEvent(String),

  #[error("boundary instance '{boundary_instance_id}' is {actual:?}, expected {expected:?}")]
  InvalidState {
    boundary_instance_id: String,
    expected: BoundaryState,
    actual: BoundaryState,
  },

  /// The persisted instance has already completed and cannot be resumed.
  #[error("boundary instance '{boundary_instance_id}' cannot be resumed from persisted state {state:?}")]
  NotResumable {
    boundary_instance_id: String,
    state: FlowNodeInstanceState,
  },

  #[error("persistence error: {0}")]
  Store(#[from] StoreError),

  #[error("timer error: {0}")]
  Timer(#[from] TimerError),

  #[error("topic error: {0}")]
  Topic(#[from] TopicError),

  #[error("process model error: {0}")]
  Facade(#[from] FacadeError),

  #[error("failed to encode trigger payload: {0}")]
  Payload(#[from] serde_json::Error),
}
