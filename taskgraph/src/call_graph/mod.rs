use std::fmt;

use common::{FileFormat, SerdeFormatResult};
use serde::{Deserialize, Serialize};

use crate::dependency_graph::{DependencyGraph, GraphId};
use crate::error::{Error, Result};
use crate::inputs::{Inputs, OutputRef};
use crate::logger::LogEntry;
use crate::node::{NodeId, NodeRef};
use crate::options::{CallGraphOptions, DisabledOutputPolicy};


/// One scheduled update invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub node_id: NodeId,
    pub node: String,
    pub update: String,
    pub update_idx: usize,
    /// Index of the group the call belongs to.
    pub depth: usize,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.update)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub executed_calls: usize,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    /// No plan, or the plan was built for another graph version.
    Dirty,
    Building,
    Valid,
}

/// Ordered, immutable list of calls producing a set of outputs.
///
/// A plan is tagged with the graph and the structural version it was built
/// from and resolves every node handle up front, so running it never looks
/// anything up in the graph.
#[derive(Serialize)]
pub struct Plan {
    graph_id: GraphId,
    version: u64,
    targets: Vec<OutputRef>,
    calls: Vec<Call>,
    group_ends: Vec<usize>,
    #[serde(skip)]
    handles: Vec<NodeRef>,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("graph_id", &self.graph_id)
            .field("version", &self.version)
            .field("targets", &self.targets)
            .field("calls", &self.calls)
            .field("group_ends", &self.group_ends)
            .finish()
    }
}

impl Plan {
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Calls split by depth. Calls of one group do not depend on each other.
    pub fn groups(&self) -> impl Iterator<Item = &[Call]> + '_ {
        let starts = std::iter::once(0).chain(self.group_ends.iter().copied());
        starts
            .zip(self.group_ends.iter().copied())
            .map(|(start, end)| &self.calls[start..end])
    }

    pub fn group_count(&self) -> usize {
        self.group_ends.len()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Outputs the plan was built for, after disabled ones were dropped.
    pub fn targets(&self) -> &[OutputRef] {
        &self.targets
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_valid_for(&self, graph: &DependencyGraph) -> bool {
        self.graph_id == graph.id() && self.version == graph.version()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.iter().map(Call::to_string).collect()
    }

    pub fn serialize(&self, format: FileFormat) -> SerdeFormatResult<String> {
        common::serialize(self, format)
    }
}

/// Requests outputs from a [`DependencyGraph`] and runs the updates they
/// need.
///
/// The plan is built lazily and cached until the requested outputs or the
/// graph's structural version change.
#[derive(Debug, Default)]
pub struct CallGraph {
    options: CallGraphOptions,
    wanted: Vec<OutputRef>,
    plan: Option<Plan>,
    building: bool,
}

impl CallGraph {
    pub fn new(options: CallGraphOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn wanted(&self) -> &[OutputRef] {
        &self.wanted
    }

    /// Requests `output` of `node_id`. Statically disabled outputs are
    /// rejected right away; dynamically disabled ones are checked at build.
    pub fn add_output(&mut self, graph: &DependencyGraph, node_id: NodeId, output: &str) -> Result<()> {
        graph.source_port(node_id, output)?;

        let output = OutputRef::new(node_id, output);
        if self.wanted.contains(&output) {
            return Ok(());
        }

        log::debug!("Requested output {}", output);
        self.wanted.push(output);
        self.plan = None;

        Ok(())
    }

    pub fn add_inputs(&mut self, graph: &DependencyGraph, inputs: &Inputs) -> Result<()> {
        for (node_id, output) in inputs.iter() {
            self.add_output(graph, node_id, output)?;
        }

        Ok(())
    }

    pub fn remove_output(&mut self, node_id: NodeId, output: &str) -> bool {
        let before = self.wanted.len();
        self.wanted
            .retain(|wanted| wanted.node_id != node_id || wanted.output != output);

        let removed = before != self.wanted.len();
        if removed {
            self.plan = None;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.wanted.clear();
        self.plan = None;
    }

    pub fn state(&self, graph: &DependencyGraph) -> PlanState {
        if self.building {
            return PlanState::Building;
        }

        match &self.plan {
            Some(plan) if plan.is_valid_for(graph) => PlanState::Valid,
            _ => PlanState::Dirty,
        }
    }

    /// Cached plan, whether or not it is still valid for its graph.
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Returns the cached plan, rebuilding it first if the graph changed.
    ///
    /// A failed build leaves no plan behind.
    pub fn build(&mut self, graph: &DependencyGraph) -> Result<&Plan> {
        let plan = match self.plan.take() {
            Some(plan) if plan.is_valid_for(graph) => plan,
            _ => {
                self.building = true;
                let result = self.assemble(graph);
                self.building = false;
                result?
            }
        };

        Ok(self.plan.insert(plan))
    }

    /// Builds if needed, then invokes every call of the plan in order.
    ///
    /// The first failing update stops the run. The plan stays valid, so the
    /// next run starts over from the first call.
    pub fn run(&mut self, graph: &DependencyGraph) -> Result<RunStats> {
        let logger = self
            .options
            .record_calls
            .then(|| graph.logger().cloned())
            .flatten();
        let plan = self.build(graph)?;

        let start = std::time::Instant::now();

        for (call, handle) in plan.calls.iter().zip(plan.handles.iter()) {
            if let Some(logger) = &logger {
                logger.record(LogEntry::Call {
                    node_id: call.node_id,
                    update: call.update.clone(),
                });
            }

            let result = handle.lock().update(&call.update);
            if let Err(err) = result {
                log::error!("Update {} failed: {:#}", call, err);
                return Err(Error::UpdateFailed {
                    node_id: call.node_id,
                    node: call.node.clone(),
                    update: call.update.clone(),
                    message: format!("{:#}", err),
                });
            }
        }

        Ok(RunStats {
            executed_calls: plan.calls.len(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    fn assemble(&self, graph: &DependencyGraph) -> Result<Plan> {
        let mut targets = Vec::with_capacity(self.wanted.len());
        for output in self.wanted.iter() {
            let enabled = graph.is_output_enabled(output.node_id, &output.output)?;
            if !enabled && self.options.disabled_outputs == DisabledOutputPolicy::Drop {
                log::warn!("Output {} is disabled and left out of the plan", output);
                continue;
            }
            targets.push(output.clone());
        }

        let groups = graph.reduce(&targets)?.grouped_order()?;

        let mut calls = Vec::new();
        let mut handles = Vec::new();
        let mut group_ends = Vec::with_capacity(groups.len());
        for (depth, group) in groups.into_iter().enumerate() {
            for address in group {
                let node_id = address.node_id;
                let unknown = || Error::UnknownNode { node_id };

                calls.push(Call {
                    node_id,
                    node: graph.node_name(node_id).ok_or_else(unknown)?.to_string(),
                    update: graph.update_name(&address).ok_or_else(unknown)?.to_string(),
                    update_idx: address.update_idx,
                    depth,
                });
                handles.push(graph.handle(node_id).ok_or_else(unknown)?.clone());
            }
            group_ends.push(calls.len());
        }

        log::info!(
            "Built plan with {} calls in {} groups for {} outputs (graph version {})",
            calls.len(),
            group_ends.len(),
            targets.len(),
            graph.version()
        );

        Ok(Plan {
            graph_id: graph.id(),
            version: graph.version(),
            targets,
            calls,
            group_ends,
            handles,
        })
    }
}
