use serde::{Deserialize, Serialize};

/// Notification published when a boundary event fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryTriggered {
  pub process_instance_id: String,
  pub correlation_id: String,
  pub boundary_event_id: String,
  pub flow_node_instance_id: String,
  pub attached_to_ref: String,
  pub interrupts: bool,
  pub payload: serde_json::Value,
}

impl BoundaryTriggered {
  pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(self)
  }
}
