//! Flowline Gateway
//!
//! Coordinates parallel gateways. A diverging parallel gateway fans the
//! token out to every outgoing branch and registers a join barrier on the
//! converging gateway that closes it (found with
//! [`ProcessModelFacade::find_join`](flowline_facade::ProcessModelFacade::find_join)).
//! Branches report their arrival at the join; once every incoming flow of
//! the join has arrived, the barrier completes with the merged branch
//! payloads and execution continues past the join.

mod coordinator;
mod error;
mod registry;

pub use coordinator::{
  ArrivalOutcome, Continuation, JoinOutcome, JoinWaiter, ParallelGatewayCoordinator, SplitOutcome,
};
pub use error::GatewayError;
