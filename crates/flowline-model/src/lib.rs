//! Flowline Model
//!
//! This crate contains the parsed, read-only representation of a BPMN process
//! definition together with the [`ProcessToken`] that is threaded through the
//! graph while an instance executes.
//!
//! Models are loaded from JSON documents (see [`Definitions::from_file`]).
//! BPMN-XML parsing happens upstream; by the time a model reaches this crate
//! it is already a plain graph of flow nodes and sequence flows.
//!
//! Once loaded, a model is never mutated. It is shared behind an `Arc` by
//! every process instance executing it.

mod activity_error;
mod error;
mod flow;
mod lane;
mod node;
mod process;
mod token;

pub use activity_error::ActivityError;
pub use error::ModelError;
pub use flow::SequenceFlow;
pub use lane::{Lane, LaneSet};
pub use node::{
  BoundaryDefinition, BoundaryEvent, BpmnType, ErrorEventDefinition, FlowNode, Gateway,
  GatewayDirection, GatewayType, IntermediateEvent, LinkEventDefinition, MessageEventDefinition,
  NodeKind, SignalEventDefinition, TimerEventDefinition, TimerType,
};
pub use process::{Definitions, ProcessModel};
pub use token::{Identity, ProcessToken};
