//! Split/join coordination for parallel gateways.

use std::sync::Arc;

use flowline_facade::{FacadeError, ProcessModelFacade};
use flowline_model::{ActivityError, FlowNode, GatewayDirection, GatewayType, ProcessToken};
use flowline_store::FlowNodePersistence;
use serde_json::json;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, instrument};

use crate::error::GatewayError;
use crate::registry::{Arrival, Barrier, JoinRegistry, key};

/// One branch to run after a split.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
  pub flow_node_id: String,
  pub token: ProcessToken,
  /// Instance id of the split, the predecessor of the branch's first node.
  pub previous_flow_node_instance_id: String,
}

/// A completed join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
  pub join_id: String,
  pub join_instance_id: String,
  /// Token carrying the merged branch payloads, keyed by source node.
  pub token: ProcessToken,
  pub next_nodes: Vec<String>,
}

/// Resolves when every branch of a split has arrived at its join.
#[derive(Debug)]
pub struct JoinWaiter {
  join_id: String,
  rx: oneshot::Receiver<JoinOutcome>,
}

impl JoinWaiter {
  pub fn join_id(&self) -> &str {
    &self.join_id
  }

  pub async fn wait(self) -> Result<JoinOutcome, GatewayError> {
    self
      .rx
      .await
      .map_err(|_| GatewayError::JoinAbandoned { join_id: self.join_id })
  }
}

#[derive(Debug)]
pub struct SplitOutcome {
  pub split_instance_id: String,
  pub join_id: String,
  pub continuations: Vec<Continuation>,
  pub waiter: JoinWaiter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrivalOutcome {
  /// More branches are still on their way.
  Waiting { arrived: usize, expected: usize },
  Completed(JoinOutcome),
}

/// Runs parallel splits and joins for the instances of one process model.
pub struct ParallelGatewayCoordinator {
  facade: Arc<ProcessModelFacade>,
  store: Arc<dyn FlowNodePersistence>,
  registry: Mutex<JoinRegistry>,
}

impl ParallelGatewayCoordinator {
  pub fn new(facade: Arc<ProcessModelFacade>, store: Arc<dyn FlowNodePersistence>) -> Self {
    Self {
      facade,
      store,
      registry: Mutex::new(JoinRegistry::new()),
    }
  }

  pub fn facade(&self) -> &ProcessModelFacade {
    &self.facade
  }

  /// Execute a diverging parallel gateway.
  ///
  /// Registers the join barrier before any continuation is handed out, so a
  /// branch cannot reach the join ahead of it.
  #[instrument(
    name = "gateway_split",
    skip(self, gateway, token, previous_flow_node_instance_id),
    fields(
      gateway_id = %gateway.id,
      process_instance_id = %token.process_instance_id,
    )
  )]
  pub async fn split(
    &self,
    gateway: &FlowNode,
    token: &ProcessToken,
    previous_flow_node_instance_id: Option<&str>,
  ) -> Result<SplitOutcome, GatewayError> {
    let is_parallel_split = gateway.as_gateway().is_some_and(|g| {
      g.gateway_type == GatewayType::Parallel && g.direction == GatewayDirection::Diverging
    });
    if !is_parallel_split {
      return Err(GatewayError::NotAParallelSplit(gateway.id.clone()));
    }

    let split_instance_id = uuid::Uuid::new_v4().to_string();
    self
      .store
      .persist_on_enter(gateway, &split_instance_id, token, previous_flow_node_instance_id)
      .await?;

    let join = match self.facade.find_join(gateway, None) {
      Ok(Some(join)) => join,
      Ok(None) => {
        let err = GatewayError::MissingJoin {
          split_gateway: gateway.id.clone(),
        };
        self.fail_split(gateway, &split_instance_id, token, &err).await?;
        return Err(err);
      }
      Err(e) => {
        let err = GatewayError::Facade(e);
        self.fail_split(gateway, &split_instance_id, token, &err).await?;
        return Err(err);
      }
    };
    let join_id = join.id.clone();

    let next_nodes = self.facade.next_nodes(gateway)?;
    let expected = self
      .facade
      .incoming_flows(&join_id)
      .into_iter()
      .map(|flow| flow.id.clone())
      .collect();

    let (tx, rx) = oneshot::channel();
    let barrier_key = key(&token.process_instance_id, &join_id);
    {
      let mut registry = self.registry.lock().await;
      if registry.contains(&barrier_key) {
        drop(registry);
        let err = GatewayError::JoinAlreadyRegistered {
          process_instance_id: token.process_instance_id.clone(),
          join_id,
        };
        self.fail_split(gateway, &split_instance_id, token, &err).await?;
        return Err(err);
      }
      registry.insert(
        barrier_key.clone(),
        Barrier {
          join_instance_id: uuid::Uuid::new_v4().to_string(),
          expected,
          arrived: Vec::new(),
          waiter: Some(tx),
        },
      );
    }

    // Withdrawn so the split can be retried.
    if let Err(e) = self
      .store
      .persist_on_exit(gateway, &split_instance_id, &token.with_payload(json!({})))
      .await
    {
      self.registry.lock().await.remove(&barrier_key);
      return Err(e.into());
    }

    let continuations: Vec<Continuation> = next_nodes
      .into_iter()
      .map(|node| Continuation {
        flow_node_id: node.id.clone(),
        token: token.clone(),
        previous_flow_node_instance_id: split_instance_id.clone(),
      })
      .collect();

    info!(
      split_instance_id = %split_instance_id,
      join_id = %join_id,
      branches = continuations.len(),
      "split_started"
    );

    Ok(SplitOutcome {
      split_instance_id,
      join_id: join_id.clone(),
      continuations,
      waiter: JoinWaiter { join_id, rx },
    })
  }

  /// Record a branch arriving at `join` from `from_node_id`.
  ///
  /// Branches may arrive in any order. The first arrival enters the join;
  /// the last one exits it with the merged payload and resolves the waiter.
  #[instrument(
    name = "gateway_arrive",
    skip(self, join, token),
    fields(
      join_id = %join.id,
      process_instance_id = %token.process_instance_id,
    )
  )]
  pub async fn arrive(
    &self,
    join: &FlowNode,
    from_node_id: &str,
    token: &ProcessToken,
  ) -> Result<ArrivalOutcome, GatewayError> {
    let from = self
      .facade
      .flow_node_by_id(from_node_id)
      .ok_or_else(|| FacadeError::NotFound(from_node_id.to_string()))?;

    let mut registry = self.registry.lock().await;
    let barrier_key = key(&token.process_instance_id, &join.id);
    let barrier = registry
      .get_mut(&barrier_key)
      .ok_or_else(|| GatewayError::JoinNotRegistered {
        process_instance_id: token.process_instance_id.clone(),
        join_id: join.id.clone(),
      })?;

    let flow_id = self
      .facade
      .sequence_flow_between(from, join)
      .map(|flow| flow.id.clone())
      .filter(|flow_id| barrier.expected.contains(flow_id))
      .ok_or_else(|| GatewayError::UnknownBranch {
        join_id: join.id.clone(),
        from_node_id: from_node_id.to_string(),
      })?;
    if barrier.has_arrived(&flow_id) {
      return Err(GatewayError::DuplicateArrival {
        join_id: join.id.clone(),
        flow_id,
      });
    }

    if barrier.arrived.is_empty() {
      self
        .store
        .persist_on_enter(join, &barrier.join_instance_id, token, None)
        .await?;
    }

    barrier.arrived.push(Arrival {
      flow_id,
      from_node_id: from_node_id.to_string(),
      payload: token.payload.clone(),
    });

    if !barrier.is_complete() {
      debug!(
        arrived = barrier.arrived.len(),
        expected = barrier.expected.len(),
        "join_arrival"
      );
      return Ok(ArrivalOutcome::Waiting {
        arrived: barrier.arrived.len(),
        expected: barrier.expected.len(),
      });
    }

    let merged = token.with_payload(barrier.merged_payload());
    if let Err(e) = self
      .store
      .persist_on_exit(join, &barrier.join_instance_id, &merged)
      .await
    {
      barrier.arrived.pop();
      return Err(e.into());
    }

    let next_nodes = self
      .facade
      .next_nodes(join)?
      .into_iter()
      .map(|node| node.id.clone())
      .collect();

    let Some(mut barrier) = registry.remove(&barrier_key) else {
      return Err(GatewayError::JoinNotRegistered {
        process_instance_id: token.process_instance_id.clone(),
        join_id: join.id.clone(),
      });
    };

    let outcome = JoinOutcome {
      join_id: join.id.clone(),
      join_instance_id: barrier.join_instance_id.clone(),
      token: merged,
      next_nodes,
    };

    if let Some(waiter) = barrier.waiter.take() {
      // The split's caller may have stopped waiting; the arriving branch
      // still gets the outcome.
      let _ = waiter.send(outcome.clone());
    }

    info!(
      join_instance_id = %outcome.join_instance_id,
      branches = barrier.arrived.len(),
      "join_completed"
    );
    Ok(ArrivalOutcome::Completed(outcome))
  }

  /// Drop all pending barriers of a finished process instance.
  pub async fn evict_instance(&self, process_instance_id: &str) -> usize {
    let evicted = self.registry.lock().await.evict_instance(process_instance_id);
    if evicted > 0 {
      debug!(process_instance_id = %process_instance_id, evicted, "join_barriers_evicted");
    }
    evicted
  }

  pub async fn pending_joins(&self) -> usize {
    self.registry.lock().await.len()
  }

  async fn fail_split(
    &self,
    gateway: &FlowNode,
    split_instance_id: &str,
    token: &ProcessToken,
    err: &GatewayError,
  ) -> Result<(), GatewayError> {
    error!(gateway_id = %gateway.id, error = %err, "split_failed");
    let failure = ActivityError::new(err.to_string()).with_name("GatewayError");
    self
      .store
      .persist_on_error(gateway, split_instance_id, token, &failure)
      .await?;
    Ok(())
  }
}
