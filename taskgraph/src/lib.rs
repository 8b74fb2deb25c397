//! Demand-driven scheduling of node updates.
//!
//! Nodes describe their outputs, their update routines and what those
//! routines depend on. A [`CallGraph`] turns a set of wanted outputs into a
//! [`Plan`]: the minimal set of update calls producing them, ordered so that
//! every call runs after everything it depends on.

pub mod call_graph;
pub mod dependency_graph;
pub mod error;
pub mod inputs;
pub mod logger;
pub mod node;
pub mod options;
pub mod outputs;

#[cfg(test)]
mod tests;

pub use call_graph::{Call, CallGraph, Plan, PlanState, RunStats};
pub use dependency_graph::{
    DependencyGraph, Edge, EdgeKind, GraphDescription, GraphId, SubGraph, UpdateAddress,
    VertexKind, VertexRef,
};
pub use error::{Error, Result};
pub use inputs::{Inputs, OutputRef};
pub use logger::{DotOptions, LogEntry, LogPort, Logger};
pub use node::{node_ref, Declaration, Node, NodeId, NodeRef};
pub use options::{CallGraphOptions, DisabledOutputPolicy};
pub use outputs::{OutputPolicy, Outputs};

pub mod prelude {
    pub use crate::call_graph::{CallGraph, PlanState};
    pub use crate::dependency_graph::{DependencyGraph, Edge};
    pub use crate::error::{Error, Result};
    pub use crate::inputs::Inputs;
    pub use crate::node::{node_ref, Declaration, Node, NodeId, NodeRef};
    pub use crate::options::{CallGraphOptions, DisabledOutputPolicy};
}
