use chrono::{DateTime, Utc};
use flowline_model::{ActivityError, ProcessToken};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a flow node instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeInstanceState {
  Running,
  Suspended,
  Finished,
  Terminated,
  Error,
}

impl FlowNodeInstanceState {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      FlowNodeInstanceState::Finished | FlowNodeInstanceState::Terminated | FlowNodeInstanceState::Error
    )
  }
}

/// Which checkpoint a stored token was written by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
  OnEnter,
  OnExit,
  OnTerminate,
  OnError,
  OnSuspend,
  OnResume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
  pub kind: TokenKind,
  pub token: ProcessToken,
  pub recorded_at: DateTime<Utc>,
}

/// A flow node execution as recorded by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNodeInstance {
  pub id: String,
  pub flow_node_id: String,
  pub process_instance_id: String,
  pub state: FlowNodeInstanceState,
  /// Checkpoints in write order. The first one is always the enter checkpoint.
  pub tokens: Vec<StoredToken>,
  pub previous_flow_node_instance_id: Option<String>,
  pub error: Option<ActivityError>,
}

impl FlowNodeInstance {
  /// The most recently written checkpoint.
  pub fn latest_token(&self) -> Option<&StoredToken> {
    self.tokens.last()
  }

  pub fn tokens_of(&self, kind: TokenKind) -> impl Iterator<Item = &StoredToken> {
    self.tokens.iter().filter(move |t| t.kind == kind)
  }
}
