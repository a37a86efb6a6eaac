//! Flowline Bus
//!
//! Publish/subscribe capability used by boundary events to wait for messages
//! and signals, and to announce that a boundary event was triggered.
//!
//! - [`EventBus`]: the capability trait consumed by the execution core
//! - [`InMemoryEventBus`]: synchronous, in-process delivery in publish order
//! - [`TopicTemplates`]: configurable topic naming, rendered with minijinja

mod bus;
mod event;
mod memory;
mod topic;

pub use bus::{BusMessage, Callback, EventBus, Subscription};
pub use event::BoundaryTriggered;
pub use memory::InMemoryEventBus;
pub use topic::{TopicError, TopicTemplates};
