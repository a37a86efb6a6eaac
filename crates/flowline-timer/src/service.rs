use std::sync::Arc;

use flowline_model::{FlowNode, ProcessToken, TimerEventDefinition};

use crate::error::TimerError;

/// Invoked each time a scheduled timer elapses.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerHandle {
  pub id: String,
  pub flow_node_id: String,
}

/// Timer capability consumed by timer boundary events.
pub trait TimerService: Send + Sync {
  /// Schedule `on_elapsed` according to `definition`.
  ///
  /// Duration and date timers fire once; cycle timers fire once per
  /// repetition until exhausted or cancelled.
  fn schedule(
    &self,
    flow_node: &FlowNode,
    definition: &TimerEventDefinition,
    token: &ProcessToken,
    on_elapsed: TimerCallback,
  ) -> Result<TimerHandle, TimerError>;

  /// Cancel a timer. Returns false if it already finished or was cancelled.
  fn cancel(&self, handle: &TimerHandle) -> bool;
}
