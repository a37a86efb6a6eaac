use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
  /// The expression is not valid for its timer type.
  #[error("invalid timer expression '{expression}': {reason}")]
  InvalidExpression { expression: String, reason: String },

  /// The expression is valid ISO-8601 but cannot be scheduled.
  #[error("unsupported timer expression '{expression}': {reason}")]
  Unsupported { expression: String, reason: String },

  /// Scheduling requires a running tokio runtime.
  #[error("no tokio runtime available to schedule timer")]
  NoRuntime,
}

impl TimerError {
  pub(crate) fn invalid(expression: &str, reason: impl Into<String>) -> Self {
    TimerError::InvalidExpression {
      expression: expression.to_string(),
      reason: reason.into(),
    }
  }

  pub(crate) fn unsupported(expression: &str, reason: impl Into<String>) -> Self {
    TimerError::Unsupported {
      expression: expression.to_string(),
      reason: reason.into(),
    }
  }
}
