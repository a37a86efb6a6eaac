//! In-memory persistence backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use flowline_model::{ActivityError, FlowNode, ProcessToken};
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{FlowNodeInstance, FlowNodeInstanceState, StoredToken, TokenKind};
use crate::{FlowNodePersistence, StoreError};

#[derive(Default)]
struct Inner {
  instances: HashMap<String, FlowNodeInstance>,
  /// Instance ids in enter order.
  order: Vec<String>,
}

/// Flow node persistence held in process memory.
///
/// Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
  inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// All flow node instances of a process instance, in enter order.
  pub async fn list_by_process_instance(&self, process_instance_id: &str) -> Vec<FlowNodeInstance> {
    let inner = self.inner.read().await;
    inner
      .order
      .iter()
      .filter_map(|id| inner.instances.get(id))
      .filter(|instance| instance.process_instance_id == process_instance_id)
      .cloned()
      .collect()
  }

  /// All flow node instances executed for a given flow node, in enter order.
  pub async fn list_by_flow_node(&self, flow_node_id: &str) -> Vec<FlowNodeInstance> {
    let inner = self.inner.read().await;
    inner
      .order
      .iter()
      .filter_map(|id| inner.instances.get(id))
      .filter(|instance| instance.flow_node_id == flow_node_id)
      .cloned()
      .collect()
  }

  async fn transition(
    &self,
    flow_node_instance_id: &str,
    token: &ProcessToken,
    via: TokenKind,
    to: FlowNodeInstanceState,
    error: Option<&ActivityError>,
  ) -> Result<(), StoreError> {
    let mut inner = self.inner.write().await;
    let instance = inner
      .instances
      .get_mut(flow_node_instance_id)
      .ok_or_else(|| StoreError::NotFound(flow_node_instance_id.to_string()))?;

    let allowed = match via {
      TokenKind::OnSuspend => instance.state == FlowNodeInstanceState::Running,
      TokenKind::OnResume => instance.state == FlowNodeInstanceState::Suspended,
      TokenKind::OnExit | TokenKind::OnTerminate | TokenKind::OnError => !instance.state.is_terminal(),
      TokenKind::OnEnter => false,
    };
    if !allowed {
      return Err(StoreError::InvalidTransition {
        id: flow_node_instance_id.to_string(),
        from: instance.state,
        via,
      });
    }

    debug!(
      flow_node_instance_id = %flow_node_instance_id,
      from = ?instance.state,
      to = ?to,
      "flow_node_instance_transition"
    );

    instance.state = to;
    instance.tokens.push(StoredToken {
      kind: via,
      token: token.clone(),
      recorded_at: Utc::now(),
    });
    if let Some(error) = error {
      instance.error = Some(error.clone());
    }
    Ok(())
  }
}

#[async_trait]
impl FlowNodePersistence for MemoryStore {
  async fn persist_on_enter(
    &self,
    flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
    previous_flow_node_instance_id: Option<&str>,
  ) -> Result<(), StoreError> {
    let mut inner = self.inner.write().await;
    if let Some(existing) = inner.instances.get(flow_node_instance_id) {
      return Err(StoreError::InvalidTransition {
        id: flow_node_instance_id.to_string(),
        from: existing.state,
        via: TokenKind::OnEnter,
      });
    }

    debug!(
      flow_node_instance_id = %flow_node_instance_id,
      flow_node_id = %flow_node.id,
      "flow_node_instance_entered"
    );

    let instance = FlowNodeInstance {
      id: flow_node_instance_id.to_string(),
      flow_node_id: flow_node.id.clone(),
      process_instance_id: token.process_instance_id.clone(),
      state: FlowNodeInstanceState::Running,
      tokens: vec![StoredToken {
        kind: TokenKind::OnEnter,
        token: token.clone(),
        recorded_at: Utc::now(),
      }],
      previous_flow_node_instance_id: previous_flow_node_instance_id.map(str::to_string),
      error: None,
    };
    inner.order.push(instance.id.clone());
    inner.instances.insert(instance.id.clone(), instance);
    Ok(())
  }

  async fn persist_on_exit(
    &self,
    _flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError> {
    self
      .transition(flow_node_instance_id, token, TokenKind::OnExit, FlowNodeInstanceState::Finished, None)
      .await
  }

  async fn persist_on_terminate(
    &self,
    _flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError> {
    self
      .transition(
        flow_node_instance_id,
        token,
        TokenKind::OnTerminate,
        FlowNodeInstanceState::Terminated,
        None,
      )
      .await
  }

  async fn persist_on_error(
    &self,
    _flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
    error: &ActivityError,
  ) -> Result<(), StoreError> {
    self
      .transition(
        flow_node_instance_id,
        token,
        TokenKind::OnError,
        FlowNodeInstanceState::Error,
        Some(error),
      )
      .await
  }

  async fn persist_on_suspend(
    &self,
    _flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError> {
    self
      .transition(
        flow_node_instance_id,
        token,
        TokenKind::OnSuspend,
        FlowNodeInstanceState::Suspended,
        None,
      )
      .await
  }

  async fn persist_on_resume(
    &self,
    _flow_node: &FlowNode,
    flow_node_instance_id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError> {
    self
      .transition(
        flow_node_instance_id,
        token,
        TokenKind::OnResume,
        FlowNodeInstanceState::Running,
        None,
      )
      .await
  }

  async fn query_by_id(&self, flow_node_instance_id: &str) -> Result<FlowNodeInstance, StoreError> {
    self
      .inner
      .read()
      .await
      .instances
      .get(flow_node_instance_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(flow_node_instance_id.to_string()))
  }
}
