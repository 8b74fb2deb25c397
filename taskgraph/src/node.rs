use std::sync::Arc;

use common::{id_type, Shared};
use parking_lot::Mutex;

use crate::dependency_graph::{DependencyGraph, NodeEntry, PortAddress};
use crate::error::{Error, Result};
use crate::inputs::Inputs;
use crate::outputs::{Declared, OutputPolicy};

id_type!(NodeId);

/// A computation unit the scheduler can order and invoke.
///
/// `declare` is called once, when the node is added to a
/// [`DependencyGraph`]. It must describe every output and update the node
/// has, and every dependency between them. `update` is called by a running
/// plan with one of the declared update names.
///
/// Output values live inside the node; the scheduler never reads them.
pub trait Node: Send {
    fn id(&self) -> NodeId;

    fn name(&self) -> &str;

    fn declare(&self, decl: &mut Declaration<'_>) -> Result<()>;

    fn update(&mut self, update: &str) -> anyhow::Result<()>;
}

/// Handle the graph keeps to invoke a node's updates.
pub type NodeRef = Shared<dyn Node>;

pub fn node_ref<N: Node + 'static>(node: &Shared<N>) -> NodeRef {
    let arc: Arc<Mutex<dyn Node>> = node.arc();
    Shared::from_arc(arc)
}

/// Collects the self-description of a node being registered.
///
/// Every reference is checked as it is declared: naming an output, update
/// or node that does not exist yet fails immediately and the node is not
/// registered. Redeclaring anything identical is a no-op.
pub struct Declaration<'a> {
    graph: &'a DependencyGraph,
    entry: NodeEntry,
}

impl<'a> Declaration<'a> {
    pub(crate) fn new(graph: &'a DependencyGraph, entry: NodeEntry) -> Self {
        Self { graph, entry }
    }

    pub(crate) fn finish(self) -> NodeEntry {
        self.entry
    }

    pub fn node_id(&self) -> NodeId {
        self.entry.id
    }

    pub fn output(&mut self, name: &str) -> Result<()> {
        self.declare_output(name, OutputPolicy::Enabled)
    }

    pub fn disabled_output(&mut self, name: &str) -> Result<()> {
        self.declare_output(name, OutputPolicy::Disabled)
    }

    pub fn dynamic_output(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.declare_output(name, OutputPolicy::Dynamic { enabled })
    }

    pub fn declare_output(&mut self, name: &str, policy: OutputPolicy) -> Result<()> {
        match self.entry.outputs.declare(name, policy) {
            Declared::New(_) | Declared::Existing(_) => Ok(()),
            Declared::Conflict => Err(Error::ConflictingOutputPolicy {
                node_id: self.entry.id,
                node: self.entry.name.clone(),
                output: name.to_string(),
            }),
        }
    }

    /// Declares `name` as refreshing `refreshes`, which must be declared
    /// outputs of this node. Statically disabled outputs are skipped.
    pub fn update(&mut self, name: &str, refreshes: &[&str]) -> Result<()> {
        let mut outputs = Vec::with_capacity(refreshes.len());
        for output in refreshes {
            let output_idx = self.entry.output_idx(output)?;
            if self.entry.outputs.policy(output_idx).is_statically_disabled() {
                log::debug!(
                    "Update {}.{} skips disabled output {}",
                    self.entry.name,
                    name,
                    output
                );
                continue;
            }
            outputs.push(output_idx);
        }

        self.entry.declare_update(name, &outputs);
        Ok(())
    }

    /// `update` runs only after `prerequisite` of the same node.
    pub fn internal_dependency(&mut self, update: &str, prerequisite: &str) -> Result<()> {
        let update_idx = self.entry.update_idx(update)?;
        let prerequisite_idx = self.entry.update_idx(prerequisite)?;
        self.entry.add_internal(update_idx, prerequisite_idx);
        Ok(())
    }

    /// `update` runs only after `output` of node `source` is current.
    pub fn input_dependency(&mut self, update: &str, source: NodeId, output: &str) -> Result<()> {
        let update_idx = self.entry.update_idx(update)?;
        let port = self.source_port(source, output)?;
        self.entry.add_input(update_idx, port);
        Ok(())
    }

    pub fn input_dependencies(&mut self, update: &str, inputs: &Inputs) -> Result<()> {
        for (source, output) in inputs.iter() {
            self.input_dependency(update, source, output)?;
        }
        Ok(())
    }

    /// `output` of this node is `source_output` of node `source`, forwarded
    /// without any update call.
    pub fn direct_dependency(
        &mut self,
        output: &str,
        source: NodeId,
        source_output: &str,
    ) -> Result<()> {
        let output_idx = self.entry.output_idx(output)?;
        let port = self.source_port(source, source_output)?;
        self.entry.set_direct(output_idx, port)?;
        Ok(())
    }

    fn source_port(&self, source: NodeId, output: &str) -> Result<PortAddress> {
        if source == self.entry.id {
            self.entry.source_port(output)
        } else {
            self.graph.source_port(source, output)
        }
    }
}
