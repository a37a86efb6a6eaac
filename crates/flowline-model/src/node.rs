use std::fmt;

use serde::{Deserialize, Serialize};

/// Any BPMN graph element capable of holding a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(flatten)]
  pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
  StartEvent,
  EndEvent,
  IntermediateCatchEvent(IntermediateEvent),
  IntermediateThrowEvent(IntermediateEvent),
  Task,
  UserTask,
  ServiceTask,
  ScriptTask,
  Gateway(Gateway),
  BoundaryEvent(BoundaryEvent),
}

/// Intermediate catch/throw event. Only link definitions are modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntermediateEvent {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link: Option<LinkEventDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEventDefinition {
  pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayType {
  Parallel,
  Exclusive,
  Inclusive,
  EventBased,
  Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayDirection {
  Diverging,
  Converging,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
  pub gateway_type: GatewayType,
  pub direction: GatewayDirection,
  /// Id of the default outgoing flow (exclusive/inclusive splits).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<String>,
}

/// A trigger attached to exactly one activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryEvent {
  pub attached_to_ref: String,
  /// Interrupting boundary events cancel the activity they are attached to.
  #[serde(default = "default_cancel_activity")]
  pub cancel_activity: bool,
  pub definition: BoundaryDefinition,
}

fn default_cancel_activity() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoundaryDefinition {
  Error {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEventDefinition>,
  },
  Message(MessageEventDefinition),
  Signal(SignalEventDefinition),
  Timer(TimerEventDefinition),
}

/// Error matching criteria. Unset or empty fields match any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEventDefinition {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEventDefinition {
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEventDefinition {
  pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerType {
  /// ISO 8601 duration, e.g. `PT30S`.
  Duration,
  /// RFC 3339 timestamp.
  Date,
  /// ISO 8601 repetition, e.g. `R3/PT10S`.
  Cycle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEventDefinition {
  pub timer_type: TimerType,
  pub expression: String,
}

/// BPMN element type, as reported by the `bpmn:` element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BpmnType {
  StartEvent,
  EndEvent,
  IntermediateCatchEvent,
  IntermediateThrowEvent,
  BoundaryEvent,
  Task,
  UserTask,
  ServiceTask,
  ScriptTask,
  ParallelGateway,
  ExclusiveGateway,
  InclusiveGateway,
  EventBasedGateway,
  ComplexGateway,
}

impl BpmnType {
  pub fn is_gateway(self) -> bool {
    matches!(
      self,
      BpmnType::ParallelGateway
        | BpmnType::ExclusiveGateway
        | BpmnType::InclusiveGateway
        | BpmnType::EventBasedGateway
        | BpmnType::ComplexGateway
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      BpmnType::StartEvent => "bpmn:StartEvent",
      BpmnType::EndEvent => "bpmn:EndEvent",
      BpmnType::IntermediateCatchEvent => "bpmn:IntermediateCatchEvent",
      BpmnType::IntermediateThrowEvent => "bpmn:IntermediateThrowEvent",
      BpmnType::BoundaryEvent => "bpmn:BoundaryEvent",
      BpmnType::Task => "bpmn:Task",
      BpmnType::UserTask => "bpmn:UserTask",
      BpmnType::ServiceTask => "bpmn:ServiceTask",
      BpmnType::ScriptTask => "bpmn:ScriptTask",
      BpmnType::ParallelGateway => "bpmn:ParallelGateway",
      BpmnType::ExclusiveGateway => "bpmn:ExclusiveGateway",
      BpmnType::InclusiveGateway => "bpmn:InclusiveGateway",
      BpmnType::EventBasedGateway => "bpmn:EventBasedGateway",
      BpmnType::ComplexGateway => "bpmn:ComplexGateway",
    }
  }
}

impl fmt::Display for BpmnType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<GatewayType> for BpmnType {
  fn from(gateway_type: GatewayType) -> Self {
    match gateway_type {
      GatewayType::Parallel => BpmnType::ParallelGateway,
      GatewayType::Exclusive => BpmnType::ExclusiveGateway,
      GatewayType::Inclusive => BpmnType::InclusiveGateway,
      GatewayType::EventBased => BpmnType::EventBasedGateway,
      GatewayType::Complex => BpmnType::ComplexGateway,
    }
  }
}

impl FlowNode {
  pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
    Self {
      id: id.into(),
      name: None,
      kind,
    }
  }

  pub fn bpmn_type(&self) -> BpmnType {
    match &self.kind {
      NodeKind::StartEvent => BpmnType::StartEvent,
      NodeKind::EndEvent => BpmnType::EndEvent,
      NodeKind::IntermediateCatchEvent(_) => BpmnType::IntermediateCatchEvent,
      NodeKind::IntermediateThrowEvent(_) => BpmnType::IntermediateThrowEvent,
      NodeKind::Task => BpmnType::Task,
      NodeKind::UserTask => BpmnType::UserTask,
      NodeKind::ServiceTask => BpmnType::ServiceTask,
      NodeKind::ScriptTask => BpmnType::ScriptTask,
      NodeKind::Gateway(gateway) => gateway.gateway_type.into(),
      NodeKind::BoundaryEvent(_) => BpmnType::BoundaryEvent,
    }
  }

  pub fn as_gateway(&self) -> Option<&Gateway> {
    match &self.kind {
      NodeKind::Gateway(gateway) => Some(gateway),
      _ => None,
    }
  }

  pub fn as_boundary_event(&self) -> Option<&BoundaryEvent> {
    match &self.kind {
      NodeKind::BoundaryEvent(boundary) => Some(boundary),
      _ => None,
    }
  }

  pub fn is_gateway(&self) -> bool {
    self.as_gateway().is_some()
  }

  /// Whether this node is a gateway with the given direction.
  pub fn has_direction(&self, direction: GatewayDirection) -> bool {
    self
      .as_gateway()
      .is_some_and(|gateway| gateway.direction == direction)
  }

  /// Name of the link definition, for intermediate link events.
  pub fn link_name(&self) -> Option<&str> {
    match &self.kind {
      NodeKind::IntermediateCatchEvent(event) | NodeKind::IntermediateThrowEvent(event) => {
        event.link.as_ref().map(|link| link.name.as_str())
      }
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_gateway_bpmn_type() {
    let node = FlowNode::new(
      "split",
      NodeKind::Gateway(Gateway {
        gateway_type: GatewayType::Parallel,
        direction: GatewayDirection::Diverging,
        default: None,
      }),
    );

    assert_eq!(node.bpmn_type(), BpmnType::ParallelGateway);
    assert!(node.bpmn_type().is_gateway());
    assert!(node.has_direction(GatewayDirection::Diverging));
    assert!(!node.has_direction(GatewayDirection::Converging));
    assert_eq!(node.bpmn_type().to_string(), "bpmn:ParallelGateway");
  }

  #[test]
  fn test_deserialize_boundary_event() {
    let node: FlowNode = serde_json::from_value(json!({
      "id": "on_payment",
      "type": "boundary_event",
      "attached_to_ref": "await_payment",
      "cancel_activity": false,
      "definition": { "kind": "message", "name": "PaymentReceived" }
    }))
    .expect("failed to deserialize");

    let boundary = node.as_boundary_event().expect("not a boundary event");
    assert_eq!(boundary.attached_to_ref, "await_payment");
    assert!(!boundary.cancel_activity);
    assert_eq!(
      boundary.definition,
      BoundaryDefinition::Message(MessageEventDefinition {
        name: "PaymentReceived".to_string()
      })
    );
  }

  #[test]
  fn test_boundary_event_defaults_to_interrupting() {
    let node: FlowNode = serde_json::from_value(json!({
      "id": "on_error",
      "type": "boundary_event",
      "attached_to_ref": "charge_card",
      "definition": { "kind": "error" }
    }))
    .expect("failed to deserialize");

    let boundary = node.as_boundary_event().expect("not a boundary event");
    assert!(boundary.cancel_activity);
    assert_eq!(boundary.definition, BoundaryDefinition::Error { error: None });
  }

  #[test]
  fn test_link_name() {
    let node: FlowNode = serde_json::from_value(json!({
      "id": "catch",
      "type": "intermediate_catch_event",
      "link": { "name": "retry" }
    }))
    .expect("failed to deserialize");

    assert_eq!(node.link_name(), Some("retry"));
    assert_eq!(FlowNode::new("task", NodeKind::Task).link_name(), None);
  }
}
