use flowline_facade::FacadeError;
use flowline_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("flow node '{0}' is not a diverging parallel gateway")]
  NotAParallelSplit(String),

  /// The split has no converging gateway. Fatal for the process instance.
  #[error("no join gateway found for split gateway '{split_gateway}'")]
  MissingJoin { split_gateway: String },

  #[error("join '{join_id}' of process instance '{process_instance_id}' is already waiting for branches")]
  JoinAlreadyRegistered {
    process_instance_id: String,
    join_id: String,
  },

  #[error("join '{join_id}' of process instance '{process_instance_id}' is not registered")]
  JoinNotRegistered {
    process_instance_id: String,
    join_id: String,
  },

  #[error("flow node '{from_node_id}' has no incoming branch into join '{join_id}'")]
  UnknownBranch { join_id: String, from_node_id: String },

  #[error("branch '{flow_id}' already arrived at join '{join_id}'")]
  DuplicateArrival { join_id: String, flow_id: String },

  /// The barrier was evicted before every branch arrived.
  #[error("join '{join_id}' was abandoned before completion")]
  JoinAbandoned { join_id: String },

  #[error("persistence error: {0}")]
  Store(#[from] StoreError),

  #[error("process model error: {0}")]
  Facade(#[from] FacadeError),
}

impl GatewayError {
  /// Whether the error must abort the owning process instance.
  pub fn is_fatal(&self) -> bool {
    match self {
      GatewayError::MissingJoin { .. } | GatewayError::NotAParallelSplit(_) => true,
      GatewayError::Facade(e) => e.is_fatal(),
      _ => false,
    }
  }
}
