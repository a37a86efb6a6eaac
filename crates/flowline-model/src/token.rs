//! Process token: the execution context threaded through the graph.
//!
//! A token is created once per process instance start. Each step through a
//! flow node produces a new version of it (a checkpoint); the orchestrator
//! driving the instance owns the token exclusively and hands out clones or
//! borrows to the components it calls.

use serde::{Deserialize, Serialize};

/// Identity of the user on whose behalf an instance runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub user_id: String,
  /// Opaque auth token. Evaluated by the identity service, never by this core.
  pub token: String,
}

impl Identity {
  pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      token: token.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessToken {
  pub correlation_id: String,
  pub process_instance_id: String,
  pub process_model_id: String,
  pub payload: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_lane: Option<String>,
  pub identity: Identity,
  /// Process instance that started this one (call activities).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub caller_id: Option<String>,
}

impl ProcessToken {
  /// Create the initial token for a new process instance.
  pub fn new(
    correlation_id: impl Into<String>,
    process_model_id: impl Into<String>,
    identity: Identity,
    payload: serde_json::Value,
  ) -> Self {
    Self {
      correlation_id: correlation_id.into(),
      process_instance_id: uuid::Uuid::new_v4().to_string(),
      process_model_id: process_model_id.into(),
      payload,
      current_lane: None,
      identity,
      caller_id: None,
    }
  }

  /// Produce the next checkpoint of this token carrying a new payload.
  pub fn with_payload(&self, payload: serde_json::Value) -> Self {
    Self {
      payload,
      ..self.clone()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_new_token_gets_instance_id() {
    let a = ProcessToken::new("corr", "order", Identity::new("u1", "t"), json!({}));
    let b = ProcessToken::new("corr", "order", Identity::new("u1", "t"), json!({}));

    assert!(!a.process_instance_id.is_empty());
    assert_ne!(a.process_instance_id, b.process_instance_id);
    assert_eq!(a.current_lane, None);
  }

  #[test]
  fn test_with_payload_keeps_metadata() {
    let mut token = ProcessToken::new("corr", "order", Identity::new("u1", "t"), json!({"a": 1}));
    token.current_lane = Some("Sales".to_string());

    let next = token.with_payload(json!({"b": 2}));

    assert_eq!(next.payload, json!({"b": 2}));
    assert_eq!(next.process_instance_id, token.process_instance_id);
    assert_eq!(next.current_lane.as_deref(), Some("Sales"));
    assert_eq!(token.payload, json!({"a": 1}));
  }
}
