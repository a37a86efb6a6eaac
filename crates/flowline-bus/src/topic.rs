//! Topic naming.
//!
//! Topics are minijinja templates rendered against the event name and the
//! process token, so deployments can scope topics per instance:
//! ```text
//! /processengine/process/message/{{ name }}
//! /tenant/{{ correlation_id }}/signal/{{ name }}
//! ```

use flowline_model::ProcessToken;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("failed to render topic template '{template}': {source}")]
pub struct TopicError {
  pub template: String,
  #[source]
  pub source: minijinja::Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicTemplates {
  pub message: String,
  pub signal: String,
  pub boundary_triggered: String,
}

impl Default for TopicTemplates {
  fn default() -> Self {
    Self {
      message: "/processengine/process/message/{{ name }}".to_string(),
      signal: "/processengine/process/signal/{{ name }}".to_string(),
      boundary_triggered: "/processengine/boundary_event/triggered".to_string(),
    }
  }
}

impl TopicTemplates {
  pub fn message_topic(&self, name: &str, token: &ProcessToken) -> Result<String, TopicError> {
    render(&self.message, name, token)
  }

  pub fn signal_topic(&self, name: &str, token: &ProcessToken) -> Result<String, TopicError> {
    render(&self.signal, name, token)
  }

  pub fn boundary_triggered_topic(&self, token: &ProcessToken) -> Result<String, TopicError> {
    render(&self.boundary_triggered, "", token)
  }
}

fn render(template: &str, name: &str, token: &ProcessToken) -> Result<String, TopicError> {
  let env = Environment::new();
  env
    .render_str(
      template,
      context! {
        name => name,
        process_instance_id => &token.process_instance_id,
        process_model_id => &token.process_model_id,
        correlation_id => &token.correlation_id,
      },
    )
    .map_err(|source| TopicError {
      template: template.to_string(),
      source,
    })
}
