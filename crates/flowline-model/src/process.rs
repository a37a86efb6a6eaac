use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::flow::SequenceFlow;
use crate::lane::LaneSet;
use crate::node::FlowNode;

/// A single parsed process graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessModel {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default = "default_executable")]
  pub is_executable: bool,
  #[serde(default)]
  pub flow_nodes: Vec<FlowNode>,
  #[serde(default)]
  pub sequence_flows: Vec<SequenceFlow>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lane_set: Option<LaneSet>,
}

fn default_executable() -> bool {
  true
}

impl ProcessModel {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: None,
      is_executable: true,
      flow_nodes: Vec::new(),
      sequence_flows: Vec::new(),
      lane_set: None,
    }
  }
}

/// Root of a parsed model document. A document may hold several processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definitions {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub processes: Vec<ProcessModel>,
}

impl Definitions {
  pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json_str(&content)
  }

  pub fn process(&self, process_id: &str) -> Option<&ProcessModel> {
    self.processes.iter().find(|p| p.id == process_id)
  }

  /// The first executable process in the document.
  pub fn executable_process(&self) -> Option<&ProcessModel> {
    self.processes.iter().find(|p| p.is_executable)
  }
}
