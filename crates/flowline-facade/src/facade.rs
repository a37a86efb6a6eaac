use std::collections::HashMap;
use std::sync::Arc;

use flowline_model::{Definitions, FlowNode, Lane, LaneSet, NodeKind, ProcessModel, SequenceFlow};
use serde::{Deserialize, Serialize};

use crate::error::{FacadeError, ModelIntegrityError};

/// Configuration for the process model facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacadeConfig {
  /// Maximum nesting of split gateways followed by [`ProcessModelFacade::find_join`].
  #[serde(default = "default_max_join_depth")]
  pub max_join_depth: usize,
}

fn default_max_join_depth() -> usize {
  64
}

impl Default for FacadeConfig {
  fn default() -> Self {
    Self {
      max_join_depth: default_max_join_depth(),
    }
  }
}

/// Query surface over a parsed process graph.
#[derive(Debug, Clone)]
pub struct ProcessModelFacade {
  model: Arc<ProcessModel>,
  /// flow node id -> index into `model.flow_nodes`.
  node_index: HashMap<String, usize>,
  pub(crate) config: FacadeConfig,
}

impl ProcessModelFacade {
  /// Build a facade over the given model with the default configuration.
  pub fn new(model: Arc<ProcessModel>) -> Result<Self, FacadeError> {
    Self::with_config(model, FacadeConfig::default())
  }

  /// Build a facade with a custom configuration.
  ///
  /// Fails if the model holds no flow nodes or if a sequence flow references
  /// an unknown node.
  pub fn with_config(model: Arc<ProcessModel>, config: FacadeConfig) -> Result<Self, FacadeError> {
    if model.flow_nodes.is_empty() {
      return Err(FacadeError::MissingProcessModel);
    }

    let node_index: HashMap<String, usize> = model
      .flow_nodes
      .iter()
      .enumerate()
      .map(|(i, node)| (node.id.clone(), i))
      .collect();

    for flow in &model.sequence_flows {
      for node_ref in [&flow.source_ref, &flow.target_ref] {
        if !node_index.contains_key(node_ref) {
          return Err(
            ModelIntegrityError::DanglingSequenceFlow {
              flow_id: flow.id.clone(),
              missing_ref: node_ref.clone(),
            }
            .into(),
          );
        }
      }
    }

    Ok(Self {
      model,
      node_index,
      config,
    })
  }

  /// Build a facade for a process of a parsed document.
  ///
  /// With `process_id = None` the first executable process is used.
  pub fn from_definitions(
    definitions: &Definitions,
    process_id: Option<&str>,
  ) -> Result<Self, FacadeError> {
    let process = match process_id {
      Some(id) => definitions.process(id),
      None => definitions.executable_process(),
    }
    .ok_or(FacadeError::MissingProcessModel)?;

    Self::new(Arc::new(process.clone()))
  }

  pub fn process_model(&self) -> &ProcessModel {
    &self.model
  }

  pub fn flow_nodes(&self) -> &[FlowNode] {
    &self.model.flow_nodes
  }

  pub fn flow_node_by_id(&self, id: &str) -> Option<&FlowNode> {
    self
      .node_index
      .get(id)
      .and_then(|&i| self.model.flow_nodes.get(i))
  }

  pub fn start_events(&self) -> Vec<&FlowNode> {
    self.nodes_where(|kind| matches!(kind, NodeKind::StartEvent))
  }

  pub fn end_events(&self) -> Vec<&FlowNode> {
    self.nodes_where(|kind| matches!(kind, NodeKind::EndEvent))
  }

  pub fn user_tasks(&self) -> Vec<&FlowNode> {
    self.nodes_where(|kind| matches!(kind, NodeKind::UserTask))
  }

  pub fn start_event_by_id(&self, id: &str) -> Result<&FlowNode, FacadeError> {
    self
      .flow_node_by_id(id)
      .filter(|node| matches!(node.kind, NodeKind::StartEvent))
      .ok_or_else(|| FacadeError::NotFound(id.to_string()))
  }

  pub fn incoming_flows(&self, id: &str) -> Vec<&SequenceFlow> {
    self
      .model
      .sequence_flows
      .iter()
      .filter(|flow| flow.target_ref == id)
      .collect()
  }

  pub fn outgoing_flows(&self, id: &str) -> Vec<&SequenceFlow> {
    self
      .model
      .sequence_flows
      .iter()
      .filter(|flow| flow.source_ref == id)
      .collect()
  }

  /// Targets of the node's outgoing flows.
  ///
  /// Only gateways may branch: a non-gateway node with more than one
  /// outgoing flow is a model-integrity error.
  pub fn next_nodes(&self, node: &FlowNode) -> Result<Vec<&FlowNode>, FacadeError> {
    let flows = self.outgoing_flows(&node.id);

    if flows.len() > 1 && !node.is_gateway() {
      return Err(
        ModelIntegrityError::MultipleOutgoingFlows {
          node_id: node.id.clone(),
          bpmn_type: node.bpmn_type().to_string(),
          flow_ids: flows.iter().map(|flow| flow.id.clone()).collect(),
        }
        .into(),
      );
    }

    Ok(
      flows
        .iter()
        .filter_map(|flow| self.flow_node_by_id(&flow.target_ref))
        .collect(),
    )
  }

  /// Sources of the node's incoming flows.
  ///
  /// A boundary event source is replaced by the activity it is attached to,
  /// so execution history reads as if boundary events were pass-throughs.
  pub fn previous_nodes(&self, node: &FlowNode) -> Vec<&FlowNode> {
    self
      .incoming_flows(&node.id)
      .into_iter()
      .filter_map(|flow| self.flow_node_by_id(&flow.source_ref))
      .filter_map(|source| match source.as_boundary_event() {
        Some(boundary) => self.flow_node_by_id(&boundary.attached_to_ref),
        None => Some(source),
      })
      .collect()
  }

  pub fn boundary_events_for(&self, node: &FlowNode) -> Vec<&FlowNode> {
    self
      .model
      .flow_nodes
      .iter()
      .filter(|candidate| {
        candidate
          .as_boundary_event()
          .is_some_and(|boundary| boundary.attached_to_ref == node.id)
      })
      .collect()
  }

  /// The edge from `source` to `target`.
  ///
  /// Falls back to an edge into `target` leaving a boundary event attached to
  /// `source`.
  pub fn sequence_flow_between(&self, source: &FlowNode, target: &FlowNode) -> Option<&SequenceFlow> {
    let incoming = self.incoming_flows(&target.id);

    if let Some(direct) = incoming
      .iter()
      .copied()
      .find(|flow| flow.source_ref == source.id)
    {
      return Some(direct);
    }

    incoming.into_iter().find(|flow| {
      self
        .flow_node_by_id(&flow.source_ref)
        .and_then(|node| node.as_boundary_event())
        .is_some_and(|boundary| boundary.attached_to_ref == source.id)
    })
  }

  /// The innermost lane referencing the flow node.
  pub fn lane_for(&self, flow_node_id: &str) -> Option<&Lane> {
    self
      .model
      .lane_set
      .as_ref()
      .and_then(|lane_set| find_lane(lane_set, flow_node_id))
  }

  pub fn link_catch_events_by_name(&self, link_name: &str) -> Vec<&FlowNode> {
    self
      .model
      .flow_nodes
      .iter()
      .filter(|node| matches!(node.kind, NodeKind::IntermediateCatchEvent(_)))
      .filter(|node| node.link_name() == Some(link_name))
      .collect()
  }

  fn nodes_where(&self, predicate: impl Fn(&NodeKind) -> bool) -> Vec<&FlowNode> {
    self
      .model
      .flow_nodes
      .iter()
      .filter(|node| predicate(&node.kind))
      .collect()
  }
}

fn find_lane<'a>(lane_set: &'a LaneSet, flow_node_id: &str) -> Option<&'a Lane> {
  lane_set.lanes.iter().find_map(|lane| {
    lane
      .child_lane_set
      .as_ref()
      .and_then(|children| find_lane(children, flow_node_id))
      .or_else(|| lane.references(flow_node_id).then_some(lane))
  })
}
