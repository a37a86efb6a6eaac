use std::fmt;
use std::sync::Arc;

/// A message delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
  pub topic: String,
  pub payload: serde_json::Value,
}

/// Subscriber callback. Invoked once per delivered message.
pub type Callback = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
  pub(crate) id: u64,
  pub(crate) topic: String,
}

impl Subscription {
  pub fn new(id: u64, topic: impl Into<String>) -> Self {
    Self { id, topic: topic.into() }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn topic(&self) -> &str {
    &self.topic
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Subscription({}#{})", self.topic, self.id)
  }
}

/// Publish/subscribe capability.
///
/// Messages on one topic reach subscribers in publish order. There is no
/// ordering guarantee across topics.
pub trait EventBus: Send + Sync {
  fn publish(&self, topic: &str, payload: serde_json::Value);

  /// Deliver every message on `topic` until unsubscribed.
  fn subscribe(&self, topic: &str, callback: Callback) -> Subscription;

  /// Deliver only the next message on `topic`, then drop the subscription.
  fn subscribe_once(&self, topic: &str, callback: Callback) -> Subscription;

  /// Remove a subscription. Returns false if it was already gone.
  fn unsubscribe(&self, subscription: &Subscription) -> bool;
}
