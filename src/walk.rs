//! Dry-run walk over a process model.
//!
//! Every node is entered and exited against an in-memory store. Parallel
//! gateways go through the gateway coordinator, so every branch is taken and
//! joins merge them. Exclusive and inclusive gateways take their default flow,
//! or the first outgoing flow without one.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info};

use flowline_facade::ProcessModelFacade;
use flowline_gateway::{ArrivalOutcome, ParallelGatewayCoordinator};
use flowline_model::{FlowNode, GatewayDirection, GatewayType, Identity, NodeKind, ProcessToken};
use flowline_store::{FlowNodePersistence, MemoryStore};

#[derive(Debug, Serialize)]
pub struct WalkReport {
  pub process_instance_id: String,
  /// Node ids in visit order.
  pub visited: Vec<String>,
  /// Joins completed, in completion order.
  pub joins: Vec<String>,
  /// End events reached.
  pub ended: Vec<String>,
  pub flow_node_instances: usize,
  /// Payload of the last token to reach an end event.
  pub payload: serde_json::Value,
}

struct Step {
  node_id: String,
  from: Option<String>,
  token: ProcessToken,
  previous_flow_node_instance_id: Option<String>,
}

pub async fn walk(
  facade: Arc<ProcessModelFacade>,
  start_event_id: Option<&str>,
  payload: serde_json::Value,
  max_steps: usize,
) -> Result<WalkReport> {
  let store = MemoryStore::new();
  let coordinator = ParallelGatewayCoordinator::new(facade.clone(), Arc::new(store.clone()));

  let start = match start_event_id {
    Some(id) => facade.start_event_by_id(id)?,
    None => facade
      .start_events()
      .first()
      .copied()
      .context("process has no start event")?,
  };

  let token = ProcessToken::new(
    uuid::Uuid::new_v4().to_string(),
    facade.process_model().id.clone(),
    Identity::new("flowline-cli", ""),
    payload,
  );
  let process_instance_id = token.process_instance_id.clone();
  info!(process_instance_id = %process_instance_id, start = %start.id, "walk_started");

  let mut report = WalkReport {
    process_instance_id: process_instance_id.clone(),
    visited: Vec::new(),
    joins: Vec::new(),
    ended: Vec::new(),
    flow_node_instances: 0,
    payload: serde_json::Value::Null,
  };

  let mut queue = VecDeque::from([Step {
    node_id: start.id.clone(),
    from: None,
    token,
    previous_flow_node_instance_id: None,
  }]);

  while let Some(step) = queue.pop_front() {
    if report.visited.len() >= max_steps {
      bail!("walk exceeded {} steps; the process may loop", max_steps);
    }

    let node = facade
      .flow_node_by_id(&step.node_id)
      .with_context(|| format!("node '{}' not found", step.node_id))?;
    report.visited.push(node.id.clone());
    debug!(node_id = %node.id, "walk_step");

    let parallel = node
      .as_gateway()
      .filter(|gateway| gateway.gateway_type == GatewayType::Parallel)
      .map(|gateway| gateway.direction);

    match parallel {
      Some(GatewayDirection::Diverging) => {
        let outcome = coordinator
          .split(node, &step.token, step.previous_flow_node_instance_id.as_deref())
          .await?;
        for continuation in outcome.continuations {
          queue.push_back(Step {
            node_id: continuation.flow_node_id,
            from: Some(node.id.clone()),
            token: continuation.token,
            previous_flow_node_instance_id: Some(continuation.previous_flow_node_instance_id),
          });
        }
      }
      Some(GatewayDirection::Converging) => {
        let from = step
          .from
          .as_deref()
          .with_context(|| format!("join '{}' reached without a predecessor", node.id))?;
        if let ArrivalOutcome::Completed(outcome) = coordinator.arrive(node, from, &step.token).await? {
          report.joins.push(node.id.clone());
          for next in outcome.next_nodes {
            queue.push_back(Step {
              node_id: next,
              from: Some(node.id.clone()),
              token: outcome.token.clone(),
              previous_flow_node_instance_id: Some(outcome.join_instance_id.clone()),
            });
          }
        }
      }
      None => {
        let instance_id = pass_through(&store, node, &step).await?;
        if matches!(node.kind, NodeKind::EndEvent) {
          report.ended.push(node.id.clone());
          report.payload = step.token.payload.clone();
        }
        for next in successors(&facade, node)? {
          queue.push_back(Step {
            node_id: next,
            from: Some(node.id.clone()),
            token: step.token.clone(),
            previous_flow_node_instance_id: Some(instance_id.clone()),
          });
        }
      }
    }
  }

  report.flow_node_instances = store.list_by_process_instance(&process_instance_id).await.len();
  coordinator.evict_instance(&process_instance_id).await;

  info!(
    process_instance_id = %process_instance_id,
    visited = report.visited.len(),
    "walk_completed"
  );
  Ok(report)
}

/// Enter and immediately exit a node.
async fn pass_through(store: &MemoryStore, node: &FlowNode, step: &Step) -> Result<String> {
  let instance_id = uuid::Uuid::new_v4().to_string();
  store
    .persist_on_enter(
      node,
      &instance_id,
      &step.token,
      step.previous_flow_node_instance_id.as_deref(),
    )
    .await?;
  store.persist_on_exit(node, &instance_id, &step.token).await?;
  Ok(instance_id)
}

fn successors(facade: &ProcessModelFacade, node: &FlowNode) -> Result<Vec<String>> {
  let Some(gateway) = node.as_gateway() else {
    return Ok(
      facade
        .next_nodes(node)?
        .into_iter()
        .map(|next| next.id.clone())
        .collect(),
    );
  };

  let flows = facade.outgoing_flows(&node.id);
  let chosen = gateway
    .default
    .as_deref()
    .and_then(|default| flows.iter().find(|flow| flow.id == default))
    .or(flows.first());
  Ok(chosen.map(|flow| flow.target_ref.clone()).into_iter().collect())
}
