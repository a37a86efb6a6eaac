//! Facade error types.

use thiserror::Error;

/// Errors returned by facade construction and queries.
#[derive(Debug, Error)]
pub enum FacadeError {
  /// No process graph was supplied, or the supplied graph is empty.
  #[error("no process model supplied")]
  MissingProcessModel,

  /// A flow node or start event id did not resolve.
  #[error("flow node not found: {0}")]
  NotFound(String),

  /// The model violates a structural rule. Fatal for the owning process instance.
  #[error(transparent)]
  Integrity(#[from] ModelIntegrityError),
}

impl FacadeError {
  /// Whether the error must abort the owning process instance.
  pub fn is_fatal(&self) -> bool {
    !matches!(self, FacadeError::NotFound(_))
  }
}

/// Structural violations found in a process model.
///
/// These are never retried: the same model produces the same error again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelIntegrityError {
  #[error("sequence flow '{flow_id}' references unknown flow node '{missing_ref}'")]
  DanglingSequenceFlow { flow_id: String, missing_ref: String },

  #[error("flow node '{node_id}' ({bpmn_type}) has {} outgoing flows; only gateways may branch", .flow_ids.len())]
  MultipleOutgoingFlows {
    node_id: String,
    bpmn_type: String,
    flow_ids: Vec<String>,
  },

  #[error(
    "branches of split gateway '{split_gateway}' (parent: {parent_split_gateway:?}) converge on different join gateways: {candidates:?}"
  )]
  AmbiguousJoin {
    split_gateway: String,
    parent_split_gateway: Option<String>,
    candidates: Vec<String>,
  },

  #[error("cycle detected at '{node_id}' while searching the join of split gateway '{split_gateway}'")]
  CyclicBranch { split_gateway: String, node_id: String },

  #[error("join search for split gateway '{split_gateway}' exceeded nesting depth {max_depth}")]
  JoinDepthExceeded { split_gateway: String, max_depth: usize },
}
