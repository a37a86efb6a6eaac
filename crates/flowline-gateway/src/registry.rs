//! Join barriers.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::oneshot;

use crate::coordinator::JoinOutcome;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub(crate) struct BarrierKey {
  pub process_instance_id: String,
  pub join_id: String,
}

pub(crate) struct Arrival {
  pub flow_id: String,
  pub from_node_id: String,
  pub payload: serde_json::Value,
}

/// One pending join: the incoming flows still expected and the branches that
/// have already arrived.
pub(crate) struct Barrier {
  pub join_instance_id: String,
  pub expected: BTreeSet<String>,
  pub arrived: Vec<Arrival>,
  pub waiter: Option<oneshot::Sender<JoinOutcome>>,
}

impl Barrier {
  pub fn has_arrived(&self, flow_id: &str) -> bool {
    self.arrived.iter().any(|a| a.flow_id == flow_id)
  }

  pub fn is_complete(&self) -> bool {
    self.arrived.len() == self.expected.len()
  }

  /// Branch payloads keyed by the node each branch arrived from.
  pub fn merged_payload(&self) -> serde_json::Value {
    let merged = self
      .arrived
      .iter()
      .map(|a| (a.from_node_id.clone(), a.payload.clone()))
      .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(merged)
  }
}

/// Pending join barriers, keyed by process instance and join gateway.
#[derive(Default)]
pub(crate) struct JoinRegistry {
  barriers: HashMap<BarrierKey, Barrier>,
}

impl JoinRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.barriers.len()
  }

  pub(crate) fn contains(&self, key: &BarrierKey) -> bool {
    self.barriers.contains_key(key)
  }

  pub(crate) fn insert(&mut self, key: BarrierKey, barrier: Barrier) {
    self.barriers.insert(key, barrier);
  }

  pub(crate) fn get_mut(&mut self, key: &BarrierKey) -> Option<&mut Barrier> {
    self.barriers.get_mut(key)
  }

  pub(crate) fn remove(&mut self, key: &BarrierKey) -> Option<Barrier> {
    self.barriers.remove(key)
  }

  /// Drop every barrier of a process instance. Pending waiters resolve as
  /// abandoned.
  pub fn evict_instance(&mut self, process_instance_id: &str) -> usize {
    let before = self.barriers.len();
    self
      .barriers
      .retain(|key, _| key.process_instance_id != process_instance_id);
    before - self.barriers.len()
  }
}

pub(crate) fn key(process_instance_id: &str, join_id: &str) -> BarrierKey {
  BarrierKey {
    process_instance_id: process_instance_id.to_string(),
    join_id: join_id.to_string(),
  }
}
