use flowline_model::{
  ActivityError, BoundaryDefinition, ErrorEventDefinition, MessageEventDefinition, SignalEventDefinition,
  TimerEventDefinition,
};

/// What a boundary event waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryKind {
  /// Fired by the attached activity failing. `None` catches every error.
  Error(Option<ErrorEventDefinition>),
  Message(MessageEventDefinition),
  Signal(SignalEventDefinition),
  Timer(TimerEventDefinition),
}

impl BoundaryKind {
  pub fn from_definition(definition: &BoundaryDefinition) -> Self {
    match definition {
      BoundaryDefinition::Error { error } => BoundaryKind::Error(error.clone()),
      BoundaryDefinition::Message(message) => BoundaryKind::Message(message.clone()),
      BoundaryDefinition::Signal(signal) => BoundaryKind::Signal(signal.clone()),
      BoundaryDefinition::Timer(timer) => BoundaryKind::Timer(timer.clone()),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      BoundaryKind::Error(_) => "error",
      BoundaryKind::Message(_) => "message",
      BoundaryKind::Signal(_) => "signal",
      BoundaryKind::Timer(_) => "timer",
    }
  }
}

/// Whether an error boundary with `definition` catches `error`.
///
/// Every configured, non-empty field among name, code and message must equal
/// the error's field. A boundary without a definition catches everything.
pub fn matches_error(definition: Option<&ErrorEventDefinition>, error: &ActivityError) -> bool {
  let Some(definition) = definition else {
    return true;
  };

  field_matches(&definition.name, &error.name)
    && field_matches(&definition.code, &error.code)
    && field_matches(&definition.message, &error.message)
}

fn field_matches(expected: &Option<String>, actual: &Option<String>) -> bool {
  match expected.as_deref() {
    None | Some("") => true,
    Some(expected) => actual.as_deref() == Some(expected),
  }
}
