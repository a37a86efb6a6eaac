use serde::{Deserialize, Serialize};

/// A named partition of the process model.
///
/// Lanes nest: a lane may carry its own [`LaneSet`] of child lanes. A flow node
/// id appears in at most one lane per nesting level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub flow_node_references: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub child_lane_set: Option<LaneSet>,
}

impl Lane {
  /// Whether this lane references the flow node directly (child lanes are not searched).
  pub fn references(&self, flow_node_id: &str) -> bool {
    self.flow_node_references.iter().any(|id| id == flow_node_id)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSet {
  #[serde(default)]
  pub lanes: Vec<Lane>,
}
