use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("failed to read model file '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse model document: {0}")]
  Parse(#[from] serde_json::Error),
}
