use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// One output of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub node_id: NodeId,
    pub output: String,
}

impl OutputRef {
    pub fn new(node_id: NodeId, output: impl Into<String>) -> Self {
        Self {
            node_id,
            output: output.into(),
        }
    }
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node_id, self.output)
    }
}

/// An ordered set of source outputs, grouped by source node.
///
/// Used to declare several input dependencies at once and to request a
/// batch of outputs from a `CallGraph`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inputs {
    sources: Vec<InputSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct InputSource {
    node_id: NodeId,
    outputs: Vec<String>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `outputs` of `node_id`. Already present pairs are skipped.
    pub fn add(&mut self, node_id: NodeId, outputs: &[&str]) -> &mut Self {
        let idx = match self.sources.iter().position(|s| s.node_id == node_id) {
            Some(idx) => idx,
            None => {
                self.sources.push(InputSource {
                    node_id,
                    outputs: Vec::new(),
                });
                self.sources.len() - 1
            }
        };
        let source = &mut self.sources[idx];

        for output in outputs {
            if !source.outputs.iter().any(|o| o == output) {
                source.outputs.push(output.to_string());
            }
        }

        self
    }

    pub fn remove_node(&mut self, node_id: NodeId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.node_id != node_id);
        before != self.sources.len()
    }

    pub fn contains(&self, node_id: NodeId, output: &str) -> bool {
        self.sources
            .iter()
            .any(|s| s.node_id == node_id && s.outputs.iter().any(|o| o == output))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &str)> {
        self.sources.iter().flat_map(|source| {
            source
                .outputs
                .iter()
                .map(move |output| (source.node_id, output.as_str()))
        })
    }

    pub fn output_refs(&self) -> Vec<OutputRef> {
        self.iter()
            .map(|(node_id, output)| OutputRef::new(node_id, output))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.iter().map(|s| s.outputs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
