//! Timer expression parsing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use flowline_model::{TimerEventDefinition, TimerType};
use serde::{Deserialize, Serialize};

use crate::error::TimerError;

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;

/// Configuration for timer scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
  /// Upper bound on cycle repetitions. `R/<interval>` repeats this many times.
  pub max_cycle_repetitions: u32,
}

impl Default for TimerConfig {
  fn default() -> Self {
    Self {
      max_cycle_repetitions: 1000,
    }
  }
}

/// A parsed timer definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
  /// Fire once after the duration.
  After(Duration),
  /// Fire once at the instant. Instants in the past fire immediately.
  At(DateTime<Utc>),
  /// Fire `repetitions` times, `interval` apart.
  Cycle { repetitions: u32, interval: Duration },
}

impl Schedule {
  pub fn parse(definition: &TimerEventDefinition, config: &TimerConfig) -> Result<Self, TimerError> {
    let expression = definition.expression.trim();
    match definition.timer_type {
      TimerType::Duration => parse_duration(expression).map(Schedule::After),
      TimerType::Date => DateTime::parse_from_rfc3339(expression)
        .map(|at| Schedule::At(at.with_timezone(&Utc)))
        .map_err(|e| TimerError::invalid(expression, e.to_string())),
      TimerType::Cycle => parse_cycle(expression, config),
    }
  }

  /// Delay before the first firing, measured from `now`.
  pub fn first_delay(&self, now: DateTime<Utc>) -> Duration {
    match self {
      Schedule::After(delay) => *delay,
      Schedule::At(at) => (*at - now).to_std().unwrap_or(Duration::ZERO),
      Schedule::Cycle { interval, .. } => *interval,
    }
  }

  /// Total number of firings.
  pub fn repetitions(&self) -> u32 {
    match self {
      Schedule::Cycle { repetitions, .. } => *repetitions,
      _ => 1,
    }
  }

  /// Delay between consecutive firings of a cycle.
  pub fn interval(&self) -> Option<Duration> {
    match self {
      Schedule::Cycle { interval, .. } => Some(*interval),
      _ => None,
    }
  }
}

/// Parse an ISO-8601 duration (`PnWnDTnHnMnS`).
///
/// Years and months are rejected as [`TimerError::Unsupported`] since their
/// length depends on the calendar.
pub fn parse_duration(expression: &str) -> Result<Duration, TimerError> {
  let rest = expression
    .strip_prefix('P')
    .ok_or_else(|| TimerError::invalid(expression, "duration must start with 'P'"))?;
  if rest.is_empty() {
    return Err(TimerError::invalid(expression, "duration has no components"));
  }

  let (date_part, time_part) = match rest.split_once('T') {
    Some((_, "")) => {
      return Err(TimerError::invalid(expression, "missing time components after 'T'"));
    }
    Some((date, time)) => (date, time),
    None => (rest, ""),
  };

  let seconds = sum_components(
    expression,
    date_part,
    &[('Y', None), ('M', None), ('W', Some(WEEK)), ('D', Some(DAY))],
  )? + sum_components(
    expression,
    time_part,
    &[('H', Some(HOUR)), ('M', Some(MINUTE)), ('S', Some(1.0))],
  )?;

  Duration::try_from_secs_f64(seconds).map_err(|e| TimerError::invalid(expression, e.to_string()))
}

/// Sum `<number><designator>` pairs. Designators must appear in `units` order.
fn sum_components(expression: &str, part: &str, units: &[(char, Option<f64>)]) -> Result<f64, TimerError> {
  let mut total = 0.0;
  let mut number = String::new();
  let mut next_unit = 0;

  for c in part.chars() {
    if c.is_ascii_digit() || c == '.' || c == ',' {
      number.push(if c == ',' { '.' } else { c });
      continue;
    }

    let offset = units[next_unit..]
      .iter()
      .position(|(designator, _)| *designator == c)
      .ok_or_else(|| TimerError::invalid(expression, format!("unexpected designator '{c}'")))?;
    let (_, unit_seconds) = units[next_unit + offset];
    next_unit += offset + 1;

    if number.is_empty() {
      return Err(TimerError::invalid(expression, format!("missing value before '{c}'")));
    }
    let value: f64 = number
      .parse()
      .map_err(|_| TimerError::invalid(expression, format!("invalid number '{number}'")))?;
    number.clear();

    let unit_seconds = unit_seconds
      .ok_or_else(|| TimerError::unsupported(expression, "years and months have no fixed length"))?;
    total += value * unit_seconds;
  }

  if !number.is_empty() {
    return Err(TimerError::invalid(expression, format!("'{number}' has no designator")));
  }
  Ok(total)
}

fn parse_cycle(expression: &str, config: &TimerConfig) -> Result<Schedule, TimerError> {
  let rest = expression
    .strip_prefix('R')
    .ok_or_else(|| TimerError::invalid(expression, "cycle must start with 'R'"))?;
  let (count, interval) = rest
    .split_once('/')
    .ok_or_else(|| TimerError::invalid(expression, "cycle must be 'R<n>/<duration>'"))?;

  if interval.contains('/') {
    return Err(TimerError::unsupported(expression, "cycles with a start or end date"));
  }

  let repetitions = if count.is_empty() {
    config.max_cycle_repetitions
  } else {
    count
      .parse::<u32>()
      .map_err(|_| TimerError::invalid(expression, format!("invalid repetition count '{count}'")))?
  };
  if repetitions == 0 {
    return Err(TimerError::invalid(expression, "repetition count must be at least 1"));
  }
  if repetitions > config.max_cycle_repetitions {
    return Err(TimerError::unsupported(
      expression,
      format!("more than {} repetitions", config.max_cycle_repetitions),
    ));
  }

  let interval = parse_duration(interval)?;
  if interval.is_zero() {
    return Err(TimerError::invalid(expression, "cycle interval must be positive"));
  }

  Ok(Schedule::Cycle { repetitions, interval })
}
