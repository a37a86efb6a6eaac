use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryState {
  NotStarted,
  Waiting,
  Triggered,
  Finished,
  Cancelled,
  Terminated,
  Errored,
}

impl BoundaryState {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      BoundaryState::Finished | BoundaryState::Cancelled | BoundaryState::Terminated | BoundaryState::Errored
    )
  }
}
