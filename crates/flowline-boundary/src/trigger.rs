//! The boundary trigger state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flowline_bus::{BoundaryTriggered, BusMessage, Callback, EventBus, Subscription, TopicTemplates};
use flowline_facade::{FacadeError, ProcessModelFacade};
use flowline_model::{ActivityError, BoundaryEvent, FlowNode, ProcessToken};
use flowline_store::FlowNodePersistence;
use flowline_timer::{TimerCallback, TimerHandle, TimerService};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::error::BoundaryError;
use crate::kind::{BoundaryKind, matches_error};
use crate::state::BoundaryState;

/// Invoked once per fire with the outcome.
pub type OnTriggered = Arc<dyn Fn(BoundaryTriggerResult) + Send + Sync>;

/// Capabilities a boundary trigger runs against.
#[derive(Clone)]
pub struct BoundaryServices {
  pub store: Arc<dyn FlowNodePersistence>,
  pub bus: Arc<dyn EventBus>,
  pub timers: Arc<dyn TimerService>,
  pub topics: TopicTemplates,
}

/// Outcome of a boundary event firing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryTriggerResult {
  pub boundary_instance_id: String,
  pub boundary_id: String,
  /// Flow node execution continues with. `None` when the boundary event has
  /// no outgoing flow.
  pub next_node: Option<String>,
  /// Whether the attached activity must be cancelled.
  pub interrupts: bool,
  pub payload: serde_json::Value,
}

enum Source {
  Subscription(Subscription),
  Timer(TimerHandle),
}

struct Runtime {
  state: BoundaryState,
  token: Option<ProcessToken>,
  on_triggered: Option<OnTriggered>,
  source: Option<Source>,
}

struct Inner {
  facade: Arc<ProcessModelFacade>,
  node: FlowNode,
  event: BoundaryEvent,
  kind: BoundaryKind,
  instance_id: String,
  services: BoundaryServices,
  runtime: Mutex<Runtime>,
  /// Set once `can_handle` has published the notification for an error.
  error_announced: AtomicBool,
}

/// One boundary event attached to one activity execution.
///
/// Clones share state. Triggers from the bus or the timer service are queued
/// and processed one at a time, in arrival order, by a listener task.
#[derive(Clone)]
pub struct BoundaryTrigger {
  inner: Arc<Inner>,
}

impl BoundaryTrigger {
  /// Create a trigger for a new boundary instance.
  pub fn new(
    facade: Arc<ProcessModelFacade>,
    boundary_event_id: &str,
    services: BoundaryServices,
  ) -> Result<Self, BoundaryError> {
    Self::restore(facade, boundary_event_id, uuid::Uuid::new_v4().to_string(), services)
  }

  /// Create a trigger for an already persisted boundary instance. Use
  /// [`BoundaryTrigger::resume`] to start it.
  pub fn restore(
    facade: Arc<ProcessModelFacade>,
    boundary_event_id: &str,
    flow_node_instance_id: impl Into<String>,
    services: BoundaryServices,
  ) -> Result<Self, BoundaryError> {
    let node = facade
      .flow_node_by_id(boundary_event_id)
      .cloned()
      .ok_or_else(|| FacadeError::NotFound(boundary_event_id.to_string()))?;
    let event = node
      .as_boundary_event()
      .cloned()
      .ok_or_else(|| BoundaryError::NotABoundaryEvent(node.id.clone()))?;
    let kind = BoundaryKind::from_definition(&event.definition);

    Ok(Self {
      inner: Arc::new(Inner {
        facade,
        node,
        event,
        kind,
        instance_id: flow_node_instance_id.into(),
        services,
        runtime: Mutex::new(Runtime {
          state: BoundaryState::NotStarted,
          token: None,
          on_triggered: None,
          source: None,
        }),
        error_announced: AtomicBool::new(false),
      }),
    })
  }

  pub fn instance_id(&self) -> &str {
    &self.inner.instance_id
  }

  pub fn boundary_event(&self) -> &FlowNode {
    &self.inner.node
  }

  pub fn attached_to(&self) -> &str {
    &self.inner.event.attached_to_ref
  }

  pub fn kind(&self) -> &BoundaryKind {
    &self.inner.kind
  }

  /// Error boundaries always interrupt; other kinds follow `cancel_activity`.
  pub fn interrupts(&self) -> bool {
    matches!(self.inner.kind, BoundaryKind::Error(_)) || self.inner.event.cancel_activity
  }

  pub async fn state(&self) -> BoundaryState {
    self.inner.runtime.lock().await.state
  }

  /// Start waiting: write the enter checkpoint, move a message or signal
  /// token into the lane of the attached activity, then arm the source.
  #[instrument(
    name = "boundary_wait",
    skip(self, token, on_triggered),
    fields(
      boundary_id = %self.inner.node.id,
      boundary_instance_id = %self.inner.instance_id,
      kind = self.inner.kind.as_str(),
    )
  )]
  pub async fn wait_for_trigger(
    &self,
    token: &mut ProcessToken,
    on_triggered: OnTriggered,
  ) -> Result<(), BoundaryError> {
    let mut runtime = self.inner.runtime.lock().await;
    self.expect_state(&runtime, BoundaryState::NotStarted)?;

    // Rendered before any write so a bad template leaves nothing behind.
    let topic = self.topic(token)?;

    self
      .inner
      .services
      .store
      .persist_on_enter(&self.inner.node, &self.inner.instance_id, token, None)
      .await?;

    self.assign_lane(token);
    self.arm(&mut runtime, token, topic, on_triggered).await?;

    info!(
      process_instance_id = %token.process_instance_id,
      attached_to = %self.inner.event.attached_to_ref,
      "boundary_waiting"
    );
    Ok(())
  }

  /// Re-arm a boundary instance that was persisted as waiting, keeping its
  /// instance id. No enter checkpoint is written.
  #[instrument(
    name = "boundary_resume",
    skip(self, token, on_triggered),
    fields(
      boundary_id = %self.inner.node.id,
      boundary_instance_id = %self.inner.instance_id,
      kind = self.inner.kind.as_str(),
    )
  )]
  pub async fn resume(&self, token: &mut ProcessToken, on_triggered: OnTriggered) -> Result<(), BoundaryError> {
    let mut runtime = self.inner.runtime.lock().await;
    self.expect_state(&runtime, BoundaryState::NotStarted)?;

    let persisted = self.inner.services.store.query_by_id(&self.inner.instance_id).await?;
    if persisted.state.is_terminal() {
      return Err(BoundaryError::NotResumable {
        boundary_instance_id: self.inner.instance_id.clone(),
        state: persisted.state,
      });
    }

    let topic = self.topic(token)?;
    self.assign_lane(token);
    self.arm(&mut runtime, token, topic, on_triggered).await?;

    info!(process_instance_id = %token.process_instance_id, "boundary_resumed");
    Ok(())
  }

  /// Stop waiting because the attached activity completed. Writes the exit
  /// checkpoint after the source is torn down. No-op once terminal.
  #[instrument(
    name = "boundary_cancel",
    skip(self, token),
    fields(boundary_id = %self.inner.node.id, boundary_instance_id = %self.inner.instance_id)
  )]
  pub async fn cancel(&self, token: &ProcessToken) -> Result<(), BoundaryError> {
    self.stop(token, BoundaryState::Cancelled).await
  }

  /// Stop waiting because the process instance is terminated. Writes a
  /// terminate checkpoint after the source is torn down. No-op once terminal.
  #[instrument(
    name = "boundary_terminate",
    skip(self, token),
    fields(boundary_id = %self.inner.node.id, boundary_instance_id = %self.inner.instance_id)
  )]
  pub async fn terminate(&self, token: &ProcessToken) -> Result<(), BoundaryError> {
    self.stop(token, BoundaryState::Terminated).await
  }

  /// Whether this error boundary catches `error`. A match publishes the
  /// boundary-triggered notification before returning.
  pub fn can_handle(&self, error: &ActivityError, token: &ProcessToken) -> bool {
    let BoundaryKind::Error(definition) = &self.inner.kind else {
      return false;
    };
    if !matches_error(definition.as_ref(), error) {
      return false;
    }

    match serde_json::to_value(error)
      .map_err(BoundaryError::from)
      .and_then(|payload| self.notification(token, payload))
    {
      Ok((topic, notification)) => {
        self.inner.services.bus.publish(&topic, notification);
        self.inner.error_announced.store(true, Ordering::SeqCst);
      }
      Err(e) => warn!(
        boundary_id = %self.inner.node.id,
        error = %e,
        "boundary_notification_failed"
      ),
    }
    true
  }

  /// Fire this error boundary for a failed activity.
  ///
  /// Returns `None` if the error does not match. `token` is the token at the
  /// time of the failure and becomes the exit checkpoint. The notification is
  /// only published if `can_handle` has not already published it.
  #[instrument(
    name = "boundary_handle_error",
    skip(self, error, token),
    fields(boundary_id = %self.inner.node.id, boundary_instance_id = %self.inner.instance_id)
  )]
  pub async fn handle_error(
    &self,
    error: &ActivityError,
    token: &ProcessToken,
  ) -> Result<Option<BoundaryTriggerResult>, BoundaryError> {
    let BoundaryKind::Error(definition) = &self.inner.kind else {
      return Ok(None);
    };
    if !matches_error(definition.as_ref(), error) {
      debug!(code = ?error.code, "boundary_error_not_matched");
      return Ok(None);
    }

    {
      let runtime = self.inner.runtime.lock().await;
      self.expect_state(&runtime, BoundaryState::Waiting)?;
    }

    let announced = self.inner.error_announced.swap(false, Ordering::SeqCst);
    self.fire(serde_json::to_value(error)?, Some(token), !announced).await
  }

  fn expect_state(&self, runtime: &Runtime, expected: BoundaryState) -> Result<(), BoundaryError> {
    if runtime.state == expected {
      return Ok(());
    }
    Err(BoundaryError::InvalidState {
      boundary_instance_id: self.inner.instance_id.clone(),
      expected,
      actual: runtime.state,
    })
  }

  fn topic(&self, token: &ProcessToken) -> Result<Option<String>, BoundaryError> {
    let topics = &self.inner.services.topics;
    let topic = match &self.inner.kind {
      BoundaryKind::Message(message) => Some(topics.message_topic(&message.name, token)?),
      BoundaryKind::Signal(signal) => Some(topics.signal_topic(&signal.name, token)?),
      BoundaryKind::Error(_) | BoundaryKind::Timer(_) => None,
    };
    Ok(topic)
  }

  /// Message and signal triggers move the token into the lane of the
  /// attached activity.
  fn assign_lane(&self, token: &mut ProcessToken) {
    if !matches!(self.inner.kind, BoundaryKind::Message(_) | BoundaryKind::Signal(_)) {
      return;
    }
    if let Some(lane) = self.inner.facade.lane_for(&self.inner.event.attached_to_ref) {
      token.current_lane = Some(lane.name.clone());
    }
  }

  /// Arm the trigger source and commit `Waiting`. The caller holds the
  /// runtime lock, so a trigger arriving during arming is queued until then.
  async fn arm(
    &self,
    runtime: &mut Runtime,
    token: &ProcessToken,
    topic: Option<String>,
    on_triggered: OnTriggered,
  ) -> Result<(), BoundaryError> {
    let (tx, rx) = mpsc::unbounded_channel::<serde_json::Value>();

    let source = match (&self.inner.kind, topic) {
      (BoundaryKind::Message(_) | BoundaryKind::Signal(_), Some(topic)) => {
        let callback: Callback = Arc::new(move |message: BusMessage| {
          let _ = tx.send(message.payload);
        });
        let bus = &self.inner.services.bus;
        let subscription = if self.interrupts() {
          bus.subscribe_once(&topic, callback)
        } else {
          bus.subscribe(&topic, callback)
        };
        Some(Source::Subscription(subscription))
      }
      (BoundaryKind::Timer(definition), _) => {
        let callback: TimerCallback = Arc::new(move || {
          let _ = tx.send(serde_json::Value::Null);
        });
        match self
          .inner
          .services
          .timers
          .schedule(&self.inner.node, definition, token, callback)
        {
          Ok(handle) => Some(Source::Timer(handle)),
          Err(e) => {
            let failure = ActivityError::new(e.to_string()).with_name("TimerError");
            self.fail(runtime, token, &failure).await?;
            return Err(e.into());
          }
        }
      }
      // Error boundaries are fired through `handle_error`.
      _ => None,
    };

    let listen = source.is_some();
    runtime.state = BoundaryState::Waiting;
    runtime.token = Some(token.clone());
    runtime.on_triggered = Some(on_triggered);
    runtime.source = source;

    if listen {
      tokio::spawn(self.clone().listen(rx));
    }
    Ok(())
  }

  async fn listen(self, mut rx: mpsc::UnboundedReceiver<serde_json::Value>) {
    while let Some(payload) = rx.recv().await {
      if let Err(e) = self.fire(payload, None, true).await {
        warn!(
          boundary_id = %self.inner.node.id,
          boundary_instance_id = %self.inner.instance_id,
          error = %e,
          "boundary_trigger_failed"
        );
      }
      if self.state().await.is_terminal() {
        break;
      }
    }
    debug!(boundary_instance_id = %self.inner.instance_id, "boundary_listener_stopped");
  }

  /// Process one trigger. Returns `None` if the trigger is no longer waiting.
  async fn fire(
    &self,
    payload: serde_json::Value,
    token: Option<&ProcessToken>,
    publish: bool,
  ) -> Result<Option<BoundaryTriggerResult>, BoundaryError> {
    let interrupts = self.interrupts();

    let (result, notification, on_triggered) = {
      let mut runtime = self.inner.runtime.lock().await;
      if runtime.state != BoundaryState::Waiting {
        debug!(state = ?runtime.state, "boundary_trigger_ignored");
        return Ok(None);
      }
      let Some(token) = token.cloned().or_else(|| runtime.token.clone()) else {
        return Ok(None);
      };

      let (result, notification) = match self.build_result(&token, payload, interrupts) {
        Ok(built) => built,
        Err(e) => {
          error!(
            boundary_id = %self.inner.node.id,
            boundary_instance_id = %self.inner.instance_id,
            error = %e,
            "boundary_trigger_errored"
          );
          let failure = ActivityError::new(e.to_string()).with_name("BoundaryTriggerError");
          self.fail(&mut runtime, &token, &failure).await?;
          return Err(e);
        }
      };

      if interrupts {
        let exit_token = if result.payload.is_null() {
          token.clone()
        } else {
          token.with_payload(result.payload.clone())
        };

        runtime.state = BoundaryState::Triggered;
        if let Err(e) = self
          .inner
          .services
          .store
          .persist_on_exit(&self.inner.node, &self.inner.instance_id, &exit_token)
          .await
        {
          runtime.state = BoundaryState::Waiting;
          return Err(e.into());
        }
        self.teardown(&mut runtime);
        runtime.state = BoundaryState::Finished;
        runtime.token = Some(exit_token);
      }

      (result, notification, runtime.on_triggered.clone())
    };

    if publish {
      let (topic, payload) = notification;
      self.inner.services.bus.publish(&topic, payload);
    }

    info!(
      boundary_id = %result.boundary_id,
      boundary_instance_id = %result.boundary_instance_id,
      next_node = ?result.next_node,
      interrupts,
      "boundary_triggered"
    );

    if let Some(on_triggered) = on_triggered {
      on_triggered(result.clone());
    }
    Ok(Some(result))
  }

  fn build_result(
    &self,
    token: &ProcessToken,
    payload: serde_json::Value,
    interrupts: bool,
  ) -> Result<(BoundaryTriggerResult, (String, serde_json::Value)), BoundaryError> {
    let next_node = self
      .inner
      .facade
      .next_nodes(&self.inner.node)?
      .first()
      .map(|node| node.id.clone());

    let notification = self.notification(token, payload.clone())?;

    let result = BoundaryTriggerResult {
      boundary_instance_id: self.inner.instance_id.clone(),
      boundary_id: self.inner.node.id.clone(),
      next_node,
      interrupts,
      payload,
    };
    Ok((result, notification))
  }

  fn notification(
    &self,
    token: &ProcessToken,
    payload: serde_json::Value,
  ) -> Result<(String, serde_json::Value), BoundaryError> {
    let topic = self.inner.services.topics.boundary_triggered_topic(token)?;
    let notification = BoundaryTriggered {
      process_instance_id: token.process_instance_id.clone(),
      correlation_id: token.correlation_id.clone(),
      boundary_event_id: self.inner.node.id.clone(),
      flow_node_instance_id: self.inner.instance_id.clone(),
      attached_to_ref: self.inner.event.attached_to_ref.clone(),
      interrupts: self.interrupts(),
      payload,
    };
    Ok((topic, notification.to_payload()?))
  }

  /// Write the error checkpoint and move to `Errored`.
  async fn fail(&self, runtime: &mut Runtime, token: &ProcessToken, failure: &ActivityError) -> Result<(), BoundaryError> {
    self
      .inner
      .services
      .store
      .persist_on_error(&self.inner.node, &self.inner.instance_id, token, failure)
      .await?;
    self.teardown(runtime);
    runtime.state = BoundaryState::Errored;
    Ok(())
  }

  async fn stop(&self, token: &ProcessToken, target: BoundaryState) -> Result<(), BoundaryError> {
    let mut runtime = self.inner.runtime.lock().await;
    if runtime.state.is_terminal() {
      debug!(state = ?runtime.state, "boundary_stop_ignored");
      return Ok(());
    }
    if runtime.state == BoundaryState::NotStarted {
      runtime.state = target;
      return Ok(());
    }

    self.teardown(&mut runtime);

    let store = &self.inner.services.store;
    if target == BoundaryState::Terminated {
      store
        .persist_on_terminate(&self.inner.node, &self.inner.instance_id, token)
        .await?;
    } else {
      store
        .persist_on_exit(&self.inner.node, &self.inner.instance_id, token)
        .await?;
    }
    runtime.state = target;

    info!(state = ?target, "boundary_stopped");
    Ok(())
  }

  fn teardown(&self, runtime: &mut Runtime) {
    match runtime.source.take() {
      Some(Source::Subscription(subscription)) => {
        self.inner.services.bus.unsubscribe(&subscription);
      }
      Some(Source::Timer(handle)) => {
        self.inner.services.timers.cancel(&handle);
      }
      None => {}
    }
  }
}
