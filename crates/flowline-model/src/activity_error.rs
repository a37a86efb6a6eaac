use serde::{Deserialize, Serialize};

/// Error raised by a failing activity.
///
/// Error boundary events decide whether to catch it by comparing `name`,
/// `code` and `message` against their error definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("activity failed (name: {name:?}, code: {code:?}): {message:?}")]
pub struct ActivityError {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default)]
  pub details: serde_json::Value,
}

impl ActivityError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: Some(message.into()),
      ..Self::default()
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = Some(code.into());
    self
  }
}
