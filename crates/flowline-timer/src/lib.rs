//! Flowline Timer
//!
//! Timer capability for timer boundary events.
//!
//! Timer definitions carry an ISO-8601 expression whose meaning depends on
//! the timer type:
//! - `duration`: a duration such as `PT30S` or `P1DT2H`
//! - `date`: an RFC 3339 instant such as `2026-01-01T09:00:00Z`
//! - `cycle`: a repeating interval such as `R3/PT10M` (`R/PT10M` repeats up
//!   to [`TimerConfig::max_cycle_repetitions`] times)
//!
//! [`Schedule::parse`] turns a definition into a concrete schedule, and
//! [`TokioTimerService`] runs it on the tokio runtime.

mod error;
mod schedule;
mod service;
mod tokio_timer;

pub use error::TimerError;
pub use schedule::{Schedule, TimerConfig, parse_duration};
pub use service::{TimerCallback, TimerHandle, TimerService};
pub use tokio_timer::TokioTimerService;
