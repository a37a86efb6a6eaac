use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use flowline_facade::ProcessModelFacade;
use flowline_gateway::{ArrivalOutcome, GatewayError, ParallelGatewayCoordinator};
use flowline_model::{
  ActivityError, FlowNode, Gateway, GatewayDirection, GatewayType, Identity, NodeKind, ProcessModel, ProcessToken, SequenceFlow,
};
use flowline_store::{
  FlowNodeInstance, FlowNodeInstanceState, FlowNodePersistence, MemoryStore, StoreError, TokenKind,
};
use serde_json::json;

fn gateway(id: &str, gateway_type: GatewayType, direction: GatewayDirection) -> FlowNode {
  FlowNode::new(
    id,
    NodeKind::Gateway(Gateway {
      gateway_type,
      direction,
      default: None,
    }),
  )
}

/// start -> split -> {pick, charge, pack} -> join -> end, plus a split whose
/// branches never meet and an exclusive gateway.
fn facade() -> Arc<ProcessModelFacade> {
  let mut model = ProcessModel::new("fulfilment");
  model.flow_nodes = vec![
    FlowNode::new("start", NodeKind::StartEvent),
    gateway("split", GatewayType::Parallel, GatewayDirection::Diverging),
    FlowNode::new("pick", NodeKind::UserTask),
    FlowNode::new("charge", NodeKind::ServiceTask),
    FlowNode::new("pack", NodeKind::Task),
    gateway("join", GatewayType::Parallel, GatewayDirection::Converging),
    FlowNode::new("end", NodeKind::EndEvent),
    gateway("open_split", GatewayType::Parallel, GatewayDirection::Diverging),
    FlowNode::new("left_end", NodeKind::EndEvent),
    FlowNode::new("right_end", NodeKind::EndEvent),
    gateway("choice", GatewayType::Exclusive, GatewayDirection::Diverging),
    FlowNode::new("stray", NodeKind::Task),
  ];
  model.sequence_flows = vec![
    SequenceFlow::new("f_start", "start", "split"),
    SequenceFlow::new("f_pick", "split", "pick"),
    SequenceFlow::new("f_charge", "split", "charge"),
    SequenceFlow::new("f_pack", "split", "pack"),
    SequenceFlow::new("j_pick", "pick", "join"),
    SequenceFlow::new("j_charge", "charge", "join"),
    SequenceFlow::new("j_pack", "pack", "join"),
    SequenceFlow::new("f_end", "join", "end"),
    SequenceFlow::new("o_left", "open_split", "left_end"),
    SequenceFlow::new("o_right", "open_split", "right_end"),
    SequenceFlow::new("c_left", "choice", "left_end"),
  ];
  Arc::new(ProcessModelFacade::new(Arc::new(model)).unwrap())
}

fn setup() -> (ParallelGatewayCoordinator, MemoryStore, Arc<ProcessModelFacade>) {
  let facade = facade();
  let store = MemoryStore::new();
  let coordinator = ParallelGatewayCoordinator::new(facade.clone(), Arc::new(store.clone()));
  (coordinator, store, facade)
}

fn token() -> ProcessToken {
  ProcessToken::new("corr-1", "fulfilment", Identity::new("alice", "t"), json!({"order": 7}))
}

fn node<'a>(facade: &'a ProcessModelFacade, id: &str) -> &'a FlowNode {
  facade.flow_node_by_id(id).unwrap()
}

/// Memory store whose next exit write fails once.
#[derive(Default)]
struct FlakyExitStore {
  inner: MemoryStore,
  fail_next_exit: AtomicBool,
}

#[async_trait]
impl FlowNodePersistence for FlakyExitStore {
  async fn persist_on_enter(
    &self,
    flow_node: &FlowNode,
    id: &str,
    token: &ProcessToken,
    previous: Option<&str>,
  ) -> Result<(), StoreError> {
    self.inner.persist_on_enter(flow_node, id, token, previous).await
  }

  async fn persist_on_exit(&self, flow_node: &FlowNode, id: &str, token: &ProcessToken) -> Result<(), StoreError> {
    if self.fail_next_exit.swap(false, Ordering::SeqCst) {
      return Err(StoreError::Backend("connection reset".to_string()));
    }
    self.inner.persist_on_exit(flow_node, id, token).await
  }

  async fn persist_on_terminate(
    &self,
    flow_node: &FlowNode,
    id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError> {
    self.inner.persist_on_terminate(flow_node, id, token).await
  }

  async fn persist_on_error(
    &self,
    flow_node: &FlowNode,
    id: &str,
    token: &ProcessToken,
    error: &ActivityError,
  ) -> Result<(), StoreError> {
    self.inner.persist_on_error(flow_node, id, token, error).await
  }

  async fn persist_on_suspend(
    &self,
    flow_node: &FlowNode,
    id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError> {
    self.inner.persist_on_suspend(flow_node, id, token).await
  }

  async fn persist_on_resume(
    &self,
    flow_node: &FlowNode,
    id: &str,
    token: &ProcessToken,
  ) -> Result<(), StoreError> {
    self.inner.persist_on_resume(flow_node, id, token).await
  }

  async fn query_by_id(&self, id: &str) -> Result<FlowNodeInstance, StoreError> {
    self.inner.query_by_id(id).await
  }
}

#[tokio::test]
async fn test_split_fans_out_and_registers_join() {
  let (coordinator, store, facade) = setup();
  let token = token();

  let outcome = coordinator
    .split(node(&facade, "split"), &token, Some("fni-start"))
    .await
    .unwrap();

  assert_eq!(outcome.join_id, "join");
  assert_eq!(outcome.waiter.join_id(), "join");
  let branches: Vec<&str> = outcome.continuations.iter().map(|c| c.flow_node_id.as_str()).collect();
  assert_eq!(branches, vec!["pick", "charge", "pack"]);
  for continuation in &outcome.continuations {
    assert_eq!(continuation.previous_flow_node_instance_id, outcome.split_instance_id);
    assert_eq!(continuation.token, token);
  }
  assert_eq!(coordinator.pending_joins().await, 1);

  let split = store.query_by_id(&outcome.split_instance_id).await.unwrap();
  assert_eq!(split.state, FlowNodeInstanceState::Finished);
  assert_eq!(split.previous_flow_node_instance_id.as_deref(), Some("fni-start"));
  assert_eq!(split.latest_token().unwrap().token.payload, json!({}));
}

#[tokio::test]
async fn test_join_completes_in_any_order() {
  let (coordinator, store, facade) = setup();
  let token = token();
  let join = node(&facade, "join");

  let outcome = coordinator.split(node(&facade, "split"), &token, None).await.unwrap();
  let waiter = tokio::spawn(outcome.waiter.wait());

  let first = coordinator
    .arrive(join, "pack", &token.with_payload(json!({"boxes": 2})))
    .await
    .unwrap();
  assert_eq!(first, ArrivalOutcome::Waiting { arrived: 1, expected: 3 });

  let second = coordinator
    .arrive(join, "pick", &token.with_payload(json!({"items": 5})))
    .await
    .unwrap();
  assert_eq!(second, ArrivalOutcome::Waiting { arrived: 2, expected: 3 });

  let last = coordinator
    .arrive(join, "charge", &token.with_payload(json!({"charged": 99})))
    .await
    .unwrap();
  let ArrivalOutcome::Completed(completed) = last else {
    panic!("expected the join to complete");
  };

  let merged = json!({"pack": {"boxes": 2}, "pick": {"items": 5}, "charge": {"charged": 99}});
  assert_eq!(completed.token.payload, merged);
  assert_eq!(completed.next_nodes, vec!["end".to_string()]);

  let resolved = waiter.await.unwrap().unwrap();
  assert_eq!(resolved, completed);

  let join_instance = store.query_by_id(&completed.join_instance_id).await.unwrap();
  let kinds: Vec<TokenKind> = join_instance.tokens.iter().map(|t| t.kind).collect();
  assert_eq!(kinds, vec![TokenKind::OnEnter, TokenKind::OnExit]);
  assert_eq!(join_instance.tokens[0].token.payload, json!({"boxes": 2}));
  assert_eq!(join_instance.latest_token().unwrap().token.payload, merged);

  assert_eq!(coordinator.pending_joins().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_branches_complete_join_once() {
  let (coordinator, store, facade) = setup();
  let coordinator = Arc::new(coordinator);
  let token = token();

  let outcome = coordinator.split(node(&facade, "split"), &token, None).await.unwrap();

  let handles: Vec<_> = outcome
    .continuations
    .into_iter()
    .map(|continuation| {
      let coordinator = coordinator.clone();
      let facade = facade.clone();
      tokio::spawn(async move {
        let join = facade.flow_node_by_id("join").unwrap();
        let branch_token = continuation
          .token
          .with_payload(json!({ "branch": continuation.flow_node_id }));
        coordinator
          .arrive(join, &continuation.flow_node_id, &branch_token)
          .await
      })
    })
    .collect();

  let completed = futures::future::join_all(handles)
    .await
    .into_iter()
    .map(|joined| joined.unwrap().unwrap())
    .filter(|arrival| matches!(arrival, ArrivalOutcome::Completed(_)))
    .count();
  assert_eq!(completed, 1);

  let resolved = outcome.waiter.wait().await.unwrap();
  assert_eq!(
    resolved.token.payload,
    json!({
      "pick": {"branch": "pick"},
      "charge": {"branch": "charge"},
      "pack": {"branch": "pack"}
    })
  );
  assert_eq!(store.list_by_flow_node("join").await.len(), 1);
  assert_eq!(coordinator.pending_joins().await, 0);
}

#[tokio::test]
async fn test_split_retry_after_failed_exit_write() {
  let facade = facade();
  let store = Arc::new(FlakyExitStore::default());
  let coordinator = ParallelGatewayCoordinator::new(facade.clone(), store.clone());
  let token = token();
  let split = node(&facade, "split");

  store.fail_next_exit.store(true, Ordering::SeqCst);
  let err = coordinator.split(split, &token, None).await.unwrap_err();
  assert!(matches!(err, GatewayError::Store(StoreError::Backend(_))));
  assert_eq!(coordinator.pending_joins().await, 0);

  let retried = coordinator.split(split, &token, None).await.unwrap();
  assert_eq!(retried.join_id, "join");
  assert_eq!(retried.continuations.len(), 3);
  assert_eq!(coordinator.pending_joins().await, 1);

  let instance = store.query_by_id(&retried.split_instance_id).await.unwrap();
  assert_eq!(instance.state, FlowNodeInstanceState::Finished);
}

#[tokio::test]
async fn test_duplicate_arrival_is_rejected() {
  let (coordinator, _store, facade) = setup();
  let token = token();
  let join = node(&facade, "join");

  coordinator.split(node(&facade, "split"), &token, None).await.unwrap();
  coordinator.arrive(join, "pick", &token).await.unwrap();

  let err = coordinator.arrive(join, "pick", &token).await.unwrap_err();
  assert!(matches!(err, GatewayError::DuplicateArrival { ref flow_id, .. } if flow_id == "j_pick"));
}

#[tokio::test]
async fn test_arrival_from_unconnected_node() {
  let (coordinator, _store, facade) = setup();
  let token = token();

  coordinator.split(node(&facade, "split"), &token, None).await.unwrap();

  let err = coordinator
    .arrive(node(&facade, "join"), "stray", &token)
    .await
    .unwrap_err();
  assert!(matches!(err, GatewayError::UnknownBranch { .. }));
}

#[tokio::test]
async fn test_arrival_at_unregistered_join() {
  let (coordinator, _store, facade) = setup();

  let err = coordinator
    .arrive(node(&facade, "join"), "pick", &token())
    .await
    .unwrap_err();
  assert!(matches!(err, GatewayError::JoinNotRegistered { .. }));
}

#[tokio::test]
async fn test_barriers_are_per_process_instance() {
  let (coordinator, _store, facade) = setup();
  let first = token();
  let second = token();

  coordinator.split(node(&facade, "split"), &first, None).await.unwrap();
  coordinator.split(node(&facade, "split"), &second, None).await.unwrap();
  assert_eq!(coordinator.pending_joins().await, 2);

  // A second split of the same instance while its join is pending is refused.
  let err = coordinator.split(node(&facade, "split"), &first, None).await.unwrap_err();
  assert!(matches!(err, GatewayError::JoinAlreadyRegistered { .. }));
}

#[tokio::test]
async fn test_split_without_join_is_fatal() {
  let (coordinator, store, facade) = setup();
  let token = token();

  let err = coordinator
    .split(node(&facade, "open_split"), &token, None)
    .await
    .unwrap_err();
  assert!(matches!(err, GatewayError::MissingJoin { ref split_gateway } if split_gateway == "open_split"));
  assert!(err.is_fatal());

  let instances = store.list_by_process_instance(&token.process_instance_id).await;
  assert_eq!(instances.len(), 1);
  assert_eq!(instances[0].state, FlowNodeInstanceState::Error);
  assert_eq!(coordinator.pending_joins().await, 0);
}

#[tokio::test]
async fn test_only_parallel_splits() {
  let (coordinator, store, facade) = setup();
  let token = token();

  for id in ["choice", "join"] {
    let err = coordinator.split(node(&facade, id), &token, None).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotAParallelSplit(ref gateway) if gateway == id));
  }
  assert!(store.list_by_process_instance(&token.process_instance_id).await.is_empty());
}

#[tokio::test]
async fn test_evict_abandons_waiter() {
  let (coordinator, _store, facade) = setup();
  let token = token();

  let outcome = coordinator.split(node(&facade, "split"), &token, None).await.unwrap();
  coordinator.arrive(node(&facade, "join"), "pick", &token).await.unwrap();

  assert_eq!(coordinator.evict_instance(&token.process_instance_id).await, 1);
  assert_eq!(coordinator.evict_instance(&token.process_instance_id).await, 0);

  let err = outcome.waiter.wait().await.unwrap_err();
  assert!(matches!(err, GatewayError::JoinAbandoned { .. }));
}
