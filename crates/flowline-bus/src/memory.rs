//! In-process event bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::bus::{BusMessage, Callback, EventBus, Subscription};

struct Subscriber {
  id: u64,
  once: bool,
  callback: Callback,
}

/// Event bus delivering messages synchronously inside `publish`.
///
/// Callbacks run outside the internal lock, so a callback may publish or
/// unsubscribe on the same bus.
#[derive(Default)]
pub struct InMemoryEventBus {
  next_id: AtomicU64,
  topics: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl InMemoryEventBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of live subscriptions on a topic.
  pub fn subscriber_count(&self, topic: &str) -> usize {
    let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
    topics.get(topic).map_or(0, Vec::len)
  }

  fn add(&self, topic: &str, callback: Callback, once: bool) -> Subscription {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
    topics
      .entry(topic.to_string())
      .or_default()
      .push(Subscriber { id, once, callback });

    Subscription {
      id,
      topic: topic.to_string(),
    }
  }
}

impl EventBus for InMemoryEventBus {
  fn publish(&self, topic: &str, payload: serde_json::Value) {
    let callbacks: Vec<Callback> = {
      let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
      let Some(subscribers) = topics.get_mut(topic) else {
        trace!(topic = %topic, "publish_without_subscribers");
        return;
      };

      let callbacks = subscribers.iter().map(|s| s.callback.clone()).collect();
      // Once-subscriptions leave before delivery, so a re-entrant publish from
      // inside a callback cannot hit them twice.
      subscribers.retain(|s| !s.once);
      if subscribers.is_empty() {
        topics.remove(topic);
      }
      callbacks
    };

    trace!(topic = %topic, subscribers = callbacks.len(), "publish");

    for callback in callbacks {
      callback(BusMessage {
        topic: topic.to_string(),
        payload: payload.clone(),
      });
    }
  }

  fn subscribe(&self, topic: &str, callback: Callback) -> Subscription {
    self.add(topic, callback, false)
  }

  fn subscribe_once(&self, topic: &str, callback: Callback) -> Subscription {
    self.add(topic, callback, true)
  }

  fn unsubscribe(&self, subscription: &Subscription) -> bool {
    let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(subscribers) = topics.get_mut(&subscription.topic) else {
      return false;
    };

    let before = subscribers.len();
    subscribers.retain(|s| s.id != subscription.id);
    let removed = subscribers.len() != before;
    if subscribers.is_empty() {
      topics.remove(&subscription.topic);
    }
    removed
  }
}
