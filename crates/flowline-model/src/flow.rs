use serde::{Deserialize, Serialize};

/// Directed edge between two flow nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub source_ref: String,
  pub target_ref: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition_expression: Option<String>,
}

impl SequenceFlow {
  pub fn new(id: impl Into<String>, source_ref: impl Into<String>, target_ref: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: None,
      source_ref: source_ref.into(),
      target_ref: target_ref.into(),
      condition_expression: None,
    }
  }
}
