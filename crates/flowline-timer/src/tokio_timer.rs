//! Timer service backed by the tokio runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use flowline_model::{FlowNode, ProcessToken, TimerEventDefinition};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TimerError;
use crate::schedule::{Schedule, TimerConfig};
use crate::service::{TimerCallback, TimerHandle, TimerService};

type Registry = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Runs each scheduled timer as its own tokio task.
///
/// Every timer's cancellation token is a child of the service's root token,
/// so [`TokioTimerService::shutdown`] stops all of them at once.
pub struct TokioTimerService {
  config: TimerConfig,
  root: CancellationToken,
  timers: Registry,
}

impl TokioTimerService {
  pub fn new(config: TimerConfig) -> Self {
    Self {
      config,
      root: CancellationToken::new(),
      timers: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Number of timers that have not yet finished or been cancelled.
  pub fn active_timers(&self) -> usize {
    self.timers.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  /// Cancel every outstanding timer.
  pub fn shutdown(&self) {
    self.root.cancel();
    self.timers.lock().unwrap_or_else(PoisonError::into_inner).clear();
  }
}

impl Default for TokioTimerService {
  fn default() -> Self {
    Self::new(TimerConfig::default())
  }
}

impl TimerService for TokioTimerService {
  fn schedule(
    &self,
    flow_node: &FlowNode,
    definition: &TimerEventDefinition,
    token: &ProcessToken,
    on_elapsed: TimerCallback,
  ) -> Result<TimerHandle, TimerError> {
    let schedule = Schedule::parse(definition, &self.config)?;
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| TimerError::NoRuntime)?;

    let handle = TimerHandle {
      id: uuid::Uuid::new_v4().to_string(),
      flow_node_id: flow_node.id.clone(),
    };
    let cancel = self.root.child_token();
    self
      .timers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(handle.id.clone(), cancel.clone());

    let first_delay = schedule.first_delay(Utc::now());
    let interval = schedule.interval().unwrap_or(first_delay);
    let repetitions = schedule.repetitions();

    info!(
      timer_id = %handle.id,
      flow_node_id = %flow_node.id,
      process_instance_id = %token.process_instance_id,
      first_delay_ms = first_delay.as_millis() as u64,
      repetitions,
      "timer_scheduled"
    );

    let timers = self.timers.clone();
    let timer_id = handle.id.clone();
    runtime.spawn(async move {
      for fired in 0..repetitions {
        let delay = if fired == 0 { first_delay } else { interval };
        tokio::select! {
          _ = tokio::time::sleep(delay) => {
            debug!(timer_id = %timer_id, fired = fired + 1, "timer_elapsed");
            on_elapsed();
          }
          _ = cancel.cancelled() => {
            debug!(timer_id = %timer_id, "timer_cancelled");
            break;
          }
        }
      }
      timers.lock().unwrap_or_else(PoisonError::into_inner).remove(&timer_id);
    });

    Ok(handle)
  }

  fn cancel(&self, handle: &TimerHandle) -> bool {
    let removed = self
      .timers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&handle.id);

    match removed {
      Some(cancel) => {
        cancel.cancel();
        true
      }
      None => false,
    }
  }
}
