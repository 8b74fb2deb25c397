use std::fmt;

use common::key_index_vec::{KeyIndexKey, KeyIndexVec};
use common::{id_type, is_debug, FileFormat, SerdeFormatResult};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::{Error, Result};
use crate::inputs::OutputRef;
use crate::logger::{LogEntry, LogPort, Logger};
use crate::node::{Declaration, NodeId, NodeRef};
use crate::outputs::{OutputPolicy, Outputs};


id_type!(GraphId);

// === Edges ===

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
pub enum EdgeKind {
    /// Update refreshes an output of its own node.
    Output,
    /// Output forwarded from another node's output.
    Direct,
    /// Update reads another node's output.
    Input,
    /// Update runs after another update of the same node.
    Internal,
}

/// A dependency added after the node was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edge {
    Direct {
        node_id: NodeId,
        output: String,
        source: OutputRef,
    },
    Input {
        node_id: NodeId,
        update: String,
        source: OutputRef,
    },
    Internal {
        node_id: NodeId,
        update: String,
        prerequisite: String,
    },
}

impl Edge {
    pub fn direct(node_id: NodeId, output: &str, source: NodeId, source_output: &str) -> Self {
        Edge::Direct {
            node_id,
            output: output.to_string(),
            source: OutputRef::new(source, source_output),
        }
    }

    pub fn input(node_id: NodeId, update: &str, source: NodeId, source_output: &str) -> Self {
        Edge::Input {
            node_id,
            update: update.to_string(),
            source: OutputRef::new(source, source_output),
        }
    }

    pub fn internal(node_id: NodeId, update: &str, prerequisite: &str) -> Self {
        Edge::Internal {
            node_id,
            update: update.to_string(),
            prerequisite: prerequisite.to_string(),
        }
    }

    pub fn kind(&self) -> EdgeKind {
        match self {
            Edge::Direct { .. } => EdgeKind::Direct,
            Edge::Input { .. } => EdgeKind::Input,
            Edge::Internal { .. } => EdgeKind::Internal,
        }
    }

    pub fn node_id(&self) -> NodeId {
        match self {
            Edge::Direct { node_id, .. }
            | Edge::Input { node_id, .. }
            | Edge::Internal { node_id, .. } => *node_id,
        }
    }
}

// === Addresses ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortAddress {
    pub node_id: NodeId,
    pub output_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateAddress {
    pub node_id: NodeId,
    pub update_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    Update,
    Output,
}

/// Readable name of an update or output, as reported in errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRef {
    pub node_id: NodeId,
    pub node: String,
    pub kind: VertexKind,
    pub name: String,
}

impl fmt::Display for VertexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VertexKind::Update => write!(f, "{}.{}()", self.node, self.name),
            VertexKind::Output => write!(f, "{}.{}", self.node, self.name),
        }
    }
}

// === Node tables ===

#[derive(Debug, Clone, Default)]
pub(crate) struct UpdateEntry {
    pub(crate) name: String,
    pub(crate) refreshes: Vec<usize>,
    pub(crate) internal: Vec<usize>,
    pub(crate) inputs: Vec<PortAddress>,
}

pub(crate) struct NodeEntry {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) handle: NodeRef,
    pub(crate) outputs: Outputs,
    pub(crate) updates: Vec<UpdateEntry>,
}

impl KeyIndexKey<NodeId> for NodeEntry {
    fn key(&self) -> &NodeId {
        &self.id
    }
}

impl NodeEntry {
    fn new(id: NodeId, name: String, handle: NodeRef) -> Self {
        Self {
            id,
            name,
            handle,
            outputs: Outputs::default(),
            updates: Vec::new(),
        }
    }

    pub(crate) fn output_idx(&self, output: &str) -> Result<usize> {
        self.outputs
            .index_of(output)
            .ok_or_else(|| Error::UnknownOutput {
                node_id: self.id,
                node: self.name.clone(),
                output: output.to_string(),
            })
    }

    pub(crate) fn update_idx(&self, update: &str) -> Result<usize> {
        self.updates
            .iter()
            .position(|entry| entry.name == update)
            .ok_or_else(|| Error::UnknownUpdate {
                node_id: self.id,
                node: self.name.clone(),
                update: update.to_string(),
            })
    }

    /// Address of `output` as something other vertices may depend on.
    pub(crate) fn source_port(&self, output: &str) -> Result<PortAddress> {
        let output_idx = self.output_idx(output)?;
        if self.outputs.policy(output_idx).is_statically_disabled() {
            return Err(self.output_disabled(output_idx));
        }

        Ok(PortAddress {
            node_id: self.id,
            output_idx,
        })
    }

    pub(crate) fn declare_update(&mut self, name: &str, refreshes: &[usize]) -> bool {
        let (update_idx, mut changed) = match self.updates.iter().position(|u| u.name == name) {
            Some(idx) => (idx, false),
            None => {
                self.updates.push(UpdateEntry {
                    name: name.to_string(),
                    ..Default::default()
                });
                (self.updates.len() - 1, true)
            }
        };

        for &output_idx in refreshes {
            let update = &mut self.updates[update_idx];
            if update.refreshes.contains(&output_idx) {
                continue;
            }
            update.refreshes.push(output_idx);
            self.outputs.get_mut(output_idx).updates.push(update_idx);
            changed = true;
        }

        changed
    }

    pub(crate) fn add_internal(&mut self, update_idx: usize, prerequisite_idx: usize) -> bool {
        let internal = &mut self.updates[update_idx].internal;
        if internal.contains(&prerequisite_idx) {
            return false;
        }
        internal.push(prerequisite_idx);
        true
    }

    pub(crate) fn add_input(&mut self, update_idx: usize, port: PortAddress) -> bool {
        let inputs = &mut self.updates[update_idx].inputs;
        if inputs.contains(&port) {
            return false;
        }
        inputs.push(port);
        true
    }

    pub(crate) fn set_direct(&mut self, output_idx: usize, port: PortAddress) -> Result<bool> {
        let entry = self.outputs.get_mut(output_idx);
        match entry.direct {
            Some(existing) if existing == port => Ok(false),
            Some(_) => Err(Error::ConflictingDirectDependency {
                node_id: self.id,
                node: self.name.clone(),
                output: entry.name.clone(),
            }),
            None => {
                entry.direct = Some(port);
                Ok(true)
            }
        }
    }

    fn output_disabled(&self, output_idx: usize) -> Error {
        Error::OutputDisabled {
            node_id: self.id,
            node: self.name.clone(),
            output: self.outputs.name(output_idx).to_string(),
        }
    }

    fn depends_on(&self, node_id: NodeId) -> bool {
        let by_input = self
            .updates
            .iter()
            .flat_map(|update| update.inputs.iter())
            .any(|port| port.node_id == node_id);
        let by_direct = self
            .outputs
            .iter()
            .filter_map(|output| output.direct)
            .any(|port| port.node_id == node_id);

        by_input || by_direct
    }
}

// === Traversal ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Vertex {
    Update { node_idx: usize, update_idx: usize },
    Output { node_idx: usize, output_idx: usize },
}

impl Vertex {
    // registration order, then declaration order; updates before outputs
    fn sort_key(&self) -> (usize, u8, usize) {
        match *self {
            Vertex::Update {
                node_idx,
                update_idx,
            } => (node_idx, 0, update_idx),
            Vertex::Output {
                node_idx,
                output_idx,
            } => (node_idx, 1, output_idx),
        }
    }
}

/// Traversal state of a vertex.
///
/// ```text
/// Unvisited ──► Visiting ──► Done
///                  │
///                  └──► cycle if reached again while Visiting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ProcessState {
    #[default]
    Unvisited,
    Visiting,
    Done,
}

#[derive(Debug)]
enum VisitCause {
    Enter { dependent: Option<usize> },
    Done,
}

#[derive(Debug)]
struct Visit {
    idx: usize,
    cause: VisitCause,
}

/// The part of a [`DependencyGraph`] feeding a set of outputs.
///
/// Vertices are kept in registration order, then declaration order.
pub struct SubGraph<'g> {
    graph: &'g DependencyGraph,
    vertices: Vec<Vertex>,
    preds: Vec<Vec<usize>>,
}

impl<'g> SubGraph<'g> {
    /// Number of updates in the sub-graph.
    pub fn len(&self) -> usize {
        self.updates().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn updates(&self) -> impl Iterator<Item = UpdateAddress> + '_ {
        self.vertices.iter().filter_map(|vertex| match *vertex {
            Vertex::Update {
                node_idx,
                update_idx,
            } => Some(UpdateAddress {
                node_id: self.graph.nodes[node_idx].id,
                update_idx,
            }),
            Vertex::Output { .. } => None,
        })
    }

    pub fn contains_update(&self, node_id: NodeId, update: &str) -> bool {
        self.updates().any(|address| {
            address.node_id == node_id && self.graph.update_name(&address) == Some(update)
        })
    }

    /// Topological order of the sub-graph's updates, split into depth groups.
    ///
    /// An update's depth is one more than the deepest update it transitively
    /// depends on, so members of one group never depend on each other.
    /// Inside a group updates keep registration order, then declaration
    /// order, which makes the result independent of how the sub-graph was
    /// requested.
    pub fn grouped_order(&self) -> Result<Vec<Vec<UpdateAddress>>> {
        let count = self.vertices.len();
        let mut states = vec![ProcessState::Unvisited; count];
        // depth of the deepest update at or upstream of each vertex
        let mut top: Vec<Option<usize>> = vec![None; count];
        let mut stack: Vec<Visit> = Vec::new();

        for root in 0..count {
            if states[root] != ProcessState::Unvisited {
                continue;
            }
            stack.push(Visit {
                idx: root,
                cause: VisitCause::Enter { dependent: None },
            });

            while let Some(visit) = stack.pop() {
                let dependent = match visit.cause {
                    VisitCause::Enter { dependent } => dependent,
                    VisitCause::Done => {
                        assert_eq!(states[visit.idx], ProcessState::Visiting);
                        let feeding = self.preds[visit.idx]
                            .iter()
                            .filter_map(|&pred| top[pred])
                            .max();
                        top[visit.idx] = match self.vertices[visit.idx] {
                            Vertex::Update { .. } => Some(feeding.map_or(0, |depth| depth + 1)),
                            Vertex::Output { .. } => feeding,
                        };
                        states[visit.idx] = ProcessState::Done;
                        continue;
                    }
                };

                match states[visit.idx] {
                    ProcessState::Done => continue,
                    ProcessState::Visiting => {
                        let from = dependent.unwrap_or(visit.idx);
                        return Err(Error::CycleDetected {
                            from: self.graph.vertex_ref(self.vertices[from]),
                            to: self.graph.vertex_ref(self.vertices[visit.idx]),
                        });
                    }
                    ProcessState::Unvisited => {}
                }

                states[visit.idx] = ProcessState::Visiting;
                stack.push(Visit {
                    idx: visit.idx,
                    cause: VisitCause::Done,
                });
                // reversed so the first declared dependency is visited first
                for &pred in self.preds[visit.idx].iter().rev() {
                    stack.push(Visit {
                        idx: pred,
                        cause: VisitCause::Enter {
                            dependent: Some(visit.idx),
                        },
                    });
                }
            }
        }

        let mut groups: Vec<Vec<UpdateAddress>> = Vec::new();
        for (idx, vertex) in self.vertices.iter().enumerate() {
            let Vertex::Update {
                node_idx,
                update_idx,
            } = *vertex
            else {
                continue;
            };
            let depth = top[idx].unwrap_or_default();
            if groups.len() <= depth {
                groups.resize_with(depth + 1, Vec::new);
            }
            groups[depth].push(UpdateAddress {
                node_id: self.graph.nodes[node_idx].id,
                update_idx,
            });
        }

        if is_debug() {
            assert!(groups.iter().all(|group| !group.is_empty()));
        }

        Ok(groups)
    }
}

// === Graph ===

/// Registry of nodes and the dependencies between their updates and outputs.
///
/// Every effective structural change (node added or removed, edge added,
/// dynamic output toggled) increments [`DependencyGraph::version`], which is
/// what cached plans are validated against.
pub struct DependencyGraph {
    id: GraphId,
    nodes: KeyIndexVec<NodeId, NodeEntry>,
    version: u64,
    logger: Option<Logger>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("version", &self.version)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            id: GraphId::unique(),
            nodes: KeyIndexVec::default(),
            version: 0,
            logger: None,
        }
    }

    pub fn with_logger(logger: Logger) -> Self {
        Self {
            logger: Some(logger),
            ..Self::new()
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of registered nodes.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|entry| entry.id)
    }

    pub fn node_name(&self, node_id: NodeId) -> Option<&str> {
        self.nodes.by_key(&node_id).map(|entry| entry.name.as_str())
    }

    pub fn outputs(&self, node_id: NodeId) -> Option<&Outputs> {
        self.nodes.by_key(&node_id).map(|entry| &entry.outputs)
    }

    pub fn update_name(&self, address: &UpdateAddress) -> Option<&str> {
        self.nodes
            .by_key(&address.node_id)
            .and_then(|entry| entry.updates.get(address.update_idx))
            .map(|update| update.name.as_str())
    }

    pub(crate) fn handle(&self, node_id: NodeId) -> Option<&NodeRef> {
        self.nodes.by_key(&node_id).map(|entry| &entry.handle)
    }

    /// Registers `node` and runs its declaration.
    ///
    /// Adding a node whose id is already registered does nothing. A failing
    /// declaration leaves the graph untouched.
    pub fn add_node(&mut self, node: NodeRef) -> Result<NodeId> {
        let (node_id, name) = {
            let node = node.lock();
            (node.id(), node.name().to_string())
        };
        if node_id.is_nil() {
            return Err(Error::NilNodeId { node: name });
        }

        if self.contains(node_id) {
            return Ok(node_id);
        }

        let entry = NodeEntry::new(node_id, name, node.clone());
        let mut decl = Declaration::new(self, entry);
        node.lock().declare(&mut decl)?;
        let entry = decl.finish();

        log::debug!(
            "Registered node {} ({}) with {} outputs and {} updates",
            entry.name,
            entry.id,
            entry.outputs.len(),
            entry.updates.len()
        );

        let (node_idx, inserted) = self.nodes.insert(entry);
        assert!(inserted);
        self.version += 1;
        self.mirror_node(node_idx);

        Ok(node_id)
    }

    /// Adds a dependency to an already registered node. Adding an existing
    /// edge does nothing.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        let node_id = edge.node_id();
        let node_idx = self
            .nodes
            .index_of_key(&node_id)
            .ok_or(Error::UnknownNode { node_id })?;

        let inserted = match &edge {
            Edge::Internal {
                update,
                prerequisite,
                ..
            } => {
                let entry = &mut self.nodes[node_idx];
                let update_idx = entry.update_idx(update)?;
                let prerequisite_idx = entry.update_idx(prerequisite)?;
                entry.add_internal(update_idx, prerequisite_idx)
            }
            Edge::Input { update, source, .. } => {
                let port = self.source_port(source.node_id, &source.output)?;
                let entry = &mut self.nodes[node_idx];
                let update_idx = entry.update_idx(update)?;
                entry.add_input(update_idx, port)
            }
            Edge::Direct { output, source, .. } => {
                let port = self.source_port(source.node_id, &source.output)?;
                let entry = &mut self.nodes[node_idx];
                let output_idx = entry.output_idx(output)?;
                entry.set_direct(output_idx, port)?
            }
        };

        if inserted {
            log::debug!("Added {} edge to node {}", edge.kind(), node_id);
            self.version += 1;
            self.mirror_edge(&edge);
        }

        Ok(())
    }

    /// Removes a node nothing else depends on.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<()> {
        let entry = self
            .nodes
            .by_key(&node_id)
            .ok_or(Error::UnknownNode { node_id })?;

        let dependents: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|other| other.id != node_id && other.depends_on(node_id))
            .map(|other| other.id)
            .collect();
        if !dependents.is_empty() {
            return Err(Error::NodeInUse {
                node_id,
                node: entry.name.clone(),
                dependents,
            });
        }

        if let Some(entry) = self.nodes.remove_by_key(&node_id) {
            log::debug!("Removed node {} ({})", entry.name, node_id);
        }
        self.version += 1;
        self.log(LogEntry::NodeRemoved { node_id });

        Ok(())
    }

    pub fn is_output_enabled(&self, node_id: NodeId, output: &str) -> Result<bool> {
        let entry = self
            .nodes
            .by_key(&node_id)
            .ok_or(Error::UnknownNode { node_id })?;
        let output_idx = entry.output_idx(output)?;

        Ok(entry.outputs.policy(output_idx).is_enabled())
    }

    /// Toggles a dynamic output. Only an actual change counts as a
    /// structural change.
    pub fn set_output_enabled(&mut self, node_id: NodeId, output: &str, enabled: bool) -> Result<()> {
        let entry = self
            .nodes
            .by_key_mut(&node_id)
            .ok_or(Error::UnknownNode { node_id })?;
        let output_idx = entry.output_idx(output)?;

        let changed = entry
            .outputs
            .set_enabled(output_idx, enabled)
            .ok_or_else(|| Error::OutputNotDynamic {
                node_id,
                node: entry.name.clone(),
                output: output.to_string(),
            })?;

        if changed {
            log::debug!(
                "Output {}.{} {}",
                entry.name,
                output,
                if enabled { "enabled" } else { "disabled" }
            );
            self.version += 1;
            self.log(LogEntry::OutputEnabled {
                node_id,
                name: output.to_string(),
                enabled,
            });
        }

        Ok(())
    }

    /// Checks that `output` exists and may ever be produced.
    pub(crate) fn source_port(&self, node_id: NodeId, output: &str) -> Result<PortAddress> {
        self.nodes
            .by_key(&node_id)
            .ok_or(Error::UnknownNode { node_id })?
            .source_port(output)
    }

    /// Restricts the graph to the updates and outputs that transitively feed
    /// `targets`. Reaching a disabled output is an error.
    pub fn reduce(&self, targets: &[OutputRef]) -> Result<SubGraph<'_>> {
        let mut roots = Vec::with_capacity(targets.len());
        for target in targets {
            let node_idx = self
                .nodes
                .index_of_key(&target.node_id)
                .ok_or(Error::UnknownNode {
                    node_id: target.node_id,
                })?;
            let output_idx = self.nodes[node_idx].output_idx(&target.output)?;
            roots.push(Vertex::Output {
                node_idx,
                output_idx,
            });
        }

        self.collect(roots, true)
    }

    /// Grouped order of every update in the graph, whether or not anything
    /// requests its outputs.
    pub fn grouped_order(&self) -> Result<Vec<Vec<UpdateAddress>>> {
        let mut roots = Vec::new();
        for (node_idx, entry) in self.nodes.iter().enumerate() {
            roots.extend((0..entry.updates.len()).map(|update_idx| Vertex::Update {
                node_idx,
                update_idx,
            }));
            roots.extend((0..entry.outputs.len()).map(|output_idx| Vertex::Output {
                node_idx,
                output_idx,
            }));
        }

        self.collect(roots, false)?.grouped_order()
    }

    fn collect(&self, roots: Vec<Vertex>, check_enabled: bool) -> Result<SubGraph<'_>> {
        let mut preds_by_vertex: HashMap<Vertex, Vec<Vertex>> = HashMap::new();
        let mut stack = roots;

        while let Some(vertex) = stack.pop() {
            if preds_by_vertex.contains_key(&vertex) {
                continue;
            }

            if let Vertex::Output {
                node_idx,
                output_idx,
            } = vertex
            {
                let entry = &self.nodes[node_idx];
                if check_enabled && !entry.outputs.policy(output_idx).is_enabled() {
                    return Err(entry.output_disabled(output_idx));
                }
            }

            let preds = self.preds(vertex)?;
            stack.extend(preds.iter().copied());
            preds_by_vertex.insert(vertex, preds);
        }

        let mut vertices: Vec<Vertex> = preds_by_vertex.keys().copied().collect();
        vertices.sort_by_key(Vertex::sort_key);

        let index: HashMap<Vertex, usize> = vertices
            .iter()
            .enumerate()
            .map(|(idx, vertex)| (*vertex, idx))
            .collect();
        let preds = vertices
            .iter()
            .map(|vertex| {
                preds_by_vertex[vertex]
                    .iter()
                    .map(|pred| index[pred])
                    .collect()
            })
            .collect();

        Ok(SubGraph {
            graph: self,
            vertices,
            preds,
        })
    }

    fn preds(&self, vertex: Vertex) -> Result<Vec<Vertex>> {
        match vertex {
            Vertex::Output {
                node_idx,
                output_idx,
            } => {
                let output = self.nodes[node_idx].outputs.get(output_idx);
                let mut preds: Vec<Vertex> = output
                    .updates
                    .iter()
                    .map(|&update_idx| Vertex::Update {
                        node_idx,
                        update_idx,
                    })
                    .collect();
                if let Some(port) = output.direct {
                    preds.push(self.port_vertex(port)?);
                }
                Ok(preds)
            }
            Vertex::Update {
                node_idx,
                update_idx,
            } => {
                let update = &self.nodes[node_idx].updates[update_idx];
                let mut preds: Vec<Vertex> = update
                    .internal
                    .iter()
                    .map(|&prerequisite_idx| Vertex::Update {
                        node_idx,
                        update_idx: prerequisite_idx,
                    })
                    .collect();
                for port in update.inputs.iter() {
                    preds.push(self.port_vertex(*port)?);
                }
                Ok(preds)
            }
        }
    }

    fn port_vertex(&self, port: PortAddress) -> Result<Vertex> {
        let node_idx = self
            .nodes
            .index_of_key(&port.node_id)
            .ok_or(Error::UnknownNode {
                node_id: port.node_id,
            })?;

        Ok(Vertex::Output {
            node_idx,
            output_idx: port.output_idx,
        })
    }

    fn vertex_ref(&self, vertex: Vertex) -> VertexRef {
        match vertex {
            Vertex::Update {
                node_idx,
                update_idx,
            } => {
                let entry = &self.nodes[node_idx];
                VertexRef {
                    node_id: entry.id,
                    node: entry.name.clone(),
                    kind: VertexKind::Update,
                    name: entry.updates[update_idx].name.clone(),
                }
            }
            Vertex::Output {
                node_idx,
                output_idx,
            } => {
                let entry = &self.nodes[node_idx];
                VertexRef {
                    node_id: entry.id,
                    node: entry.name.clone(),
                    kind: VertexKind::Output,
                    name: entry.outputs.name(output_idx).to_string(),
                }
            }
        }
    }

    fn output_ref(&self, port: PortAddress) -> OutputRef {
        let name = self
            .nodes
            .by_key(&port.node_id)
            .map(|entry| entry.outputs.name(port.output_idx).to_string())
            .unwrap_or_default();
        OutputRef::new(port.node_id, name)
    }

    // === Diagnostics ===

    fn log(&self, entry: LogEntry) {
        if let Some(logger) = &self.logger {
            logger.record(entry);
        }
    }

    fn mirror_node(&self, node_idx: usize) {
        let Some(logger) = &self.logger else {
            return;
        };
        let entry = &self.nodes[node_idx];
        let node_id = entry.id;

        logger.record(LogEntry::Node {
            node_id,
            name: entry.name.clone(),
        });
        for output in entry.outputs.iter() {
            logger.record(LogEntry::Output {
                node_id,
                name: output.name.clone(),
                policy: output.policy,
            });
        }
        for update in entry.updates.iter() {
            logger.record(LogEntry::Update {
                node_id,
                name: update.name.clone(),
            });
        }

        for update in entry.updates.iter() {
            let to = LogPort::update(node_id, &update.name);
            for &output_idx in update.refreshes.iter() {
                logger.record(LogEntry::Edge {
                    kind: EdgeKind::Output,
                    from: to.clone(),
                    to: LogPort::output(node_id, entry.outputs.name(output_idx)),
                });
            }
            for &prerequisite_idx in update.internal.iter() {
                logger.record(LogEntry::Edge {
                    kind: EdgeKind::Internal,
                    from: LogPort::update(node_id, &entry.updates[prerequisite_idx].name),
                    to: to.clone(),
                });
            }
            for port in update.inputs.iter() {
                let source = self.output_ref_with(entry, *port);
                logger.record(LogEntry::Edge {
                    kind: EdgeKind::Input,
                    from: LogPort::output(source.node_id, &source.output),
                    to: to.clone(),
                });
            }
        }

        for output in entry.outputs.iter() {
            if let Some(port) = output.direct {
                let source = self.output_ref_with(entry, port);
                logger.record(LogEntry::Edge {
                    kind: EdgeKind::Direct,
                    from: LogPort::output(source.node_id, &source.output),
                    to: LogPort::output(node_id, &output.name),
                });
            }
        }
    }

    // resolves ports that may point back into `entry` itself
    fn output_ref_with(&self, entry: &NodeEntry, port: PortAddress) -> OutputRef {
        if port.node_id == entry.id {
            OutputRef::new(entry.id, entry.outputs.name(port.output_idx))
        } else {
            self.output_ref(port)
        }
    }

    fn mirror_edge(&self, edge: &Edge) {
        let entry = match edge {
            Edge::Direct {
                node_id,
                output,
                source,
            } => LogEntry::Edge {
                kind: EdgeKind::Direct,
                from: LogPort::output(source.node_id, &source.output),
                to: LogPort::output(*node_id, output),
            },
            Edge::Input {
                node_id,
                update,
                source,
            } => LogEntry::Edge {
                kind: EdgeKind::Input,
                from: LogPort::output(source.node_id, &source.output),
                to: LogPort::update(*node_id, update),
            },
            Edge::Internal {
                node_id,
                update,
                prerequisite,
            } => LogEntry::Edge {
                kind: EdgeKind::Internal,
                from: LogPort::update(*node_id, prerequisite),
                to: LogPort::update(*node_id, update),
            },
        };
        self.log(entry);
    }

    /// Serializable snapshot of the node and edge tables.
    pub fn describe(&self) -> GraphDescription {
        let nodes = self
            .nodes
            .iter()
            .map(|entry| NodeDescription {
                id: entry.id,
                name: entry.name.clone(),
                outputs: entry
                    .outputs
                    .iter()
                    .map(|output| OutputDescription {
                        name: output.name.clone(),
                        policy: output.policy,
                        direct: output.direct.map(|port| self.output_ref_with(entry, port)),
                    })
                    .collect(),
                updates: entry
                    .updates
                    .iter()
                    .map(|update| UpdateDescription {
                        name: update.name.clone(),
                        refreshes: update
                            .refreshes
                            .iter()
                            .map(|&idx| entry.outputs.name(idx).to_string())
                            .collect(),
                        internal: update
                            .internal
                            .iter()
                            .map(|&idx| entry.updates[idx].name.clone())
                            .collect(),
                        inputs: update
                            .inputs
                            .iter()
                            .map(|port| self.output_ref_with(entry, *port))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        GraphDescription {
            id: self.id,
            version: self.version,
            nodes,
        }
    }
}

// === Description ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub id: GraphId,
    pub version: u64,
    pub nodes: Vec<NodeDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: NodeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<UpdateDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDescription {
    pub name: String,
    pub policy: OutputPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct: Option<OutputRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDescription {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refreshes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<OutputRef>,
}

impl GraphDescription {
    pub fn serialize(&self, format: FileFormat) -> SerdeFormatResult<String> {
        common::serialize(self, format)
    }

    pub fn deserialize(serialized: &str, format: FileFormat) -> SerdeFormatResult<Self> {
        common::deserialize(serialized, format)
    }
}
