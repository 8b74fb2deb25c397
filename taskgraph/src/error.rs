use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dependency_graph::VertexRef;
use crate::node::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    // configuration
    #[error("Node {node_id} is not registered")]
    UnknownNode { node_id: NodeId },
    #[error("Node {node} ({node_id}) has no output \"{output}\"")]
    UnknownOutput {
        node_id: NodeId,
        node: String,
        output: String,
    },
    #[error("Node {node} ({node_id}) has no update \"{update}\"")]
    UnknownUpdate {
        node_id: NodeId,
        node: String,
        update: String,
    },
    #[error("Output {node}.{output} is disabled")]
    OutputDisabled {
        node_id: NodeId,
        node: String,
        output: String,
    },
    #[error("Output {node}.{output} is redeclared with a different policy")]
    ConflictingOutputPolicy {
        node_id: NodeId,
        node: String,
        output: String,
    },
    #[error("Output {node}.{output} is already forwarded from another output")]
    ConflictingDirectDependency {
        node_id: NodeId,
        node: String,
        output: String,
    },
    #[error("Output {node}.{output} cannot be toggled at run time")]
    OutputNotDynamic {
        node_id: NodeId,
        node: String,
        output: String,
    },
    #[error("Node {node} ({node_id}) is still used by {dependents:?}")]
    NodeInUse {
        node_id: NodeId,
        node: String,
        dependents: Vec<NodeId>,
    },
    #[error("Node {node} has a nil id")]
    NilNodeId { node: String },
    #[error("Declaration of node {node} ({node_id}) failed: {message}")]
    Declaration {
        node_id: NodeId,
        node: String,
        message: String,
    },

    // structural
    #[error("Cycle detected: {from} depends on {to}, which already depends on {from}")]
    CycleDetected { from: VertexRef, to: VertexRef },

    // execution
    #[error("Update {node}.{update} failed: {message}")]
    UpdateFailed {
        node_id: NodeId,
        node: String,
        update: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::CycleDetected { .. })
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Error::UpdateFailed { .. })
    }

    pub fn is_configuration(&self) -> bool {
        !self.is_structural() && !self.is_execution()
    }
}
