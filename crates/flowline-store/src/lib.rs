//! Flowline Store
//!
//! This crate provides the persistence capability for flow node executions.
//! The execution core never talks to a database directly: every state change
//! of a flow node instance goes through [`FlowNodePersistence`].
//!
//! Each write records a checkpoint of the [`ProcessToken`] under a
//! [`TokenKind`], so the history of an instance can be replayed in order.
//! [`MemoryStore`] keeps everything in process memory.

mod memory;
mod types;

pub use memory::MemoryStore;
pub use types::{FlowNodeInstance, FlowNodeInstanceState, StoredToken, TokenKind};

use async_trait::async_trait;
use flowline_model::{ActivityError, FlowNode, ProcessToken};

/// Error type for persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested flow node instance was not found.
  #[error("flow node instance not found: {0}")]
  NotFound(String),

  /// The write is not valid for the instance's current state.
  #[error("flow node instance '{id}' cannot go from {from:?} via {via:?}")]
  InvalidTransition {
    id: String,
    from: FlowNodeInstanceState,
    via: TokenKind,
  },

  /// The storage backend failed.
  #[error("storage backend error: {0}")]
  Backend(String),
}

impl StoreError {
  /// Whether retrying the same write may succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, StoreError::Backend(_))
  }
}

/// Persistence trait for flow node instances.
#[async_trait]
pub trait FlowNodePersistence: Send + Sync {
  /// Record that a flow node instance started.
  async fn persist_on_enter(
    &self,
    flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
    previous_flow_node_instance_id: Option<&str>,
  ) -> Result<(), StoreError>;

  /// Record that a flow node instance finished.
  async fn persist_on_exit(
    &self,
    flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError>;

  /// Record that a flow node instance was terminated or cancelled.
  async fn persist_on_terminate(
    &self,
    flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError>;

  /// Record that a flow node instance failed.
  async fn persist_on_error(
    &self,
    flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
    error: &ActivityError,
  ) -> Result<(), StoreError>;

  /// Record that a flow node instance was suspended.
  async fn persist_on_suspend(
    &self,
    flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError>;

  /// Record that a suspended flow node instance continues.
  async fn persist_on_resume(
    &self,
    flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError>;

  /// Get a flow node instance by ID.
  async fn query_by_id(&self, flow_node_instance_id: &str) -> Result<FlowNodeInstance, StoreError>;
}
