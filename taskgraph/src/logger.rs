use std::fmt::Write as _;

use common::Shared;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::dependency_graph::{EdgeKind, VertexKind};
use crate::inputs::OutputRef;
use crate::node::NodeId;
use crate::outputs::OutputPolicy;

/// An update or output as it appears in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogPort {
    pub node_id: NodeId,
    pub name: String,
    pub kind: VertexKind,
}

impl LogPort {
    pub fn update(node_id: NodeId, name: &str) -> Self {
        Self {
            node_id,
            name: name.to_string(),
            kind: VertexKind::Update,
        }
    }

    pub fn output(node_id: NodeId, name: &str) -> Self {
        Self {
            node_id,
            name: name.to_string(),
            kind: VertexKind::Output,
        }
    }

    fn dot_id(&self) -> String {
        let prefix = match self.kind {
            VertexKind::Update => "u",
            VertexKind::Output => "o",
        };
        format!(
            "\"{}_{}_{}\"",
            prefix,
            self.node_id.as_uuid().simple(),
            escape(&self.name)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    Node {
        node_id: NodeId,
        name: String,
    },
    NodeRemoved {
        node_id: NodeId,
    },
    Output {
        node_id: NodeId,
        name: String,
        policy: OutputPolicy,
    },
    Update {
        node_id: NodeId,
        name: String,
    },
    Edge {
        kind: EdgeKind,
        from: LogPort,
        to: LogPort,
    },
    OutputEnabled {
        node_id: NodeId,
        name: String,
        enabled: bool,
    },
    Call {
        node_id: NodeId,
        update: String,
    },
}

#[derive(Debug, Default)]
struct LogState {
    disabled: bool,
    entries: Vec<LogEntry>,
}

/// Records graph declarations and executed calls for inspection.
///
/// Clones share the same record. Scheduling never reads it back.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    state: Shared<LogState>,
}

#[derive(Debug, Clone, Default)]
pub struct DotOptions {
    /// Output drawn in red together with everything upstream of it.
    pub highlight_output: Option<OutputRef>,
    /// Fill updates that were called, numbered by call order.
    pub highlight_calls: bool,
    /// Draw dashed call-order edges between consecutive calls.
    pub show_calls: bool,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        self.state.lock().disabled = false;
    }

    pub fn disable(&self) {
        self.state.lock().disabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        !self.state.lock().disabled
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().entries.clone()
    }

    pub fn calls(&self) -> Vec<(NodeId, String)> {
        self.state
            .lock()
            .entries
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Call { node_id, update } => Some((*node_id, update.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state
            .lock()
            .entries
            .retain(|entry| !matches!(entry, LogEntry::Call { .. }));
    }

    pub(crate) fn record(&self, entry: LogEntry) {
        let mut state = self.state.lock();
        if !state.disabled {
            state.entries.push(entry);
        }
    }

    /// Renders the recorded graph as Graphviz text, one cluster per node.
    pub fn to_dot(&self, options: &DotOptions) -> String {
        let state = self.state.lock();
        let graph = LoggedGraph::replay(&state.entries);

        let highlighted = options
            .highlight_output
            .as_ref()
            .map(|output| graph.upstream_of(&LogPort::output(output.node_id, &output.output)))
            .unwrap_or_default();

        let mut call_order: HashMap<&LogPort, Vec<usize>> = HashMap::new();
        for (idx, call) in graph.calls.iter().enumerate() {
            call_order.entry(call).or_default().push(idx);
        }

        let mut dot = String::from("digraph taskgraph {\n");
        dot.push_str("    rankdir=LR;\n");
        dot.push_str("    compound=true;\n");
        dot.push_str("    node [fontsize=10];\n");
        dot.push_str("    edge [fontsize=9];\n\n");

        for (cluster_idx, node) in graph.nodes.iter().enumerate() {
            let _ = writeln!(dot, "    subgraph cluster_{} {{", cluster_idx);
            let _ = writeln!(dot, "        label=\"{}\";", escape(&node.name));
            dot.push_str("        style=rounded; color=\"#333333\";\n");

            for update in node.updates.iter() {
                let port = LogPort::update(node.node_id, update);
                let mut attrs = vec![
                    "shape=box".to_string(),
                    format!("label=\"{}()\"", escape(update)),
                ];
                if options.highlight_calls {
                    if let Some(order) = call_order.get(&port) {
                        let order: Vec<String> = order.iter().map(usize::to_string).collect();
                        attrs[1] = format!("label=\"{}() #{}\"", escape(update), order.join(","));
                        attrs.push("style=filled".to_string());
                        attrs.push("fillcolor=\"#ffd27f\"".to_string());
                    }
                }
                if highlighted.contains(&port) {
                    attrs.push("color=red".to_string());
                }
                let _ = writeln!(dot, "        {} [{}];", port.dot_id(), attrs.join(", "));
            }

            for (output, policy) in node.outputs.iter() {
                let port = LogPort::output(node.node_id, output);
                let mut attrs = vec![
                    "shape=ellipse".to_string(),
                    format!("label=\"{}\"", escape(output)),
                ];
                if !policy.is_enabled() {
                    attrs.push("style=dashed".to_string());
                    attrs.push("fontcolor=gray".to_string());
                }
                if highlighted.contains(&port) {
                    attrs.push("color=red".to_string());
                }
                let _ = writeln!(dot, "        {} [{}];", port.dot_id(), attrs.join(", "));
            }

            dot.push_str("    }\n\n");
        }

        for (kind, from, to) in graph.edges.iter() {
            let mut attrs = vec![edge_style(*kind).to_string()];
            if highlighted.contains(from) && highlighted.contains(to) {
                attrs.push("color=red".to_string());
            }
            let _ = writeln!(
                dot,
                "    {} -> {} [{}];",
                from.dot_id(),
                to.dot_id(),
                attrs.join(", ")
            );
        }

        if options.show_calls {
            for pair in graph.calls.windows(2) {
                let _ = writeln!(
                    dot,
                    "    {} -> {} [style=dashed, color=\"#0055aa\", constraint=false];",
                    pair[0].dot_id(),
                    pair[1].dot_id()
                );
            }
        }

        dot.push_str("}\n");
        dot
    }
}

fn edge_style(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Output => "style=solid",
        EdgeKind::Direct => "style=bold",
        EdgeKind::Input => "style=solid, arrowhead=vee",
        EdgeKind::Internal => "style=dotted",
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug)]
struct LoggedNode {
    node_id: NodeId,
    name: String,
    updates: Vec<String>,
    outputs: Vec<(String, OutputPolicy)>,
}

/// The current graph, rebuilt from the log.
#[derive(Debug, Default)]
struct LoggedGraph {
    nodes: Vec<LoggedNode>,
    edges: Vec<(EdgeKind, LogPort, LogPort)>,
    calls: Vec<LogPort>,
}

impl LoggedGraph {
    fn replay(entries: &[LogEntry]) -> Self {
        let mut graph = LoggedGraph::default();

        for entry in entries {
            match entry {
                LogEntry::Node { node_id, name } => {
                    graph.nodes.push(LoggedNode {
                        node_id: *node_id,
                        name: name.clone(),
                        updates: Vec::new(),
                        outputs: Vec::new(),
                    });
                }
                LogEntry::NodeRemoved { node_id } => {
                    graph.nodes.retain(|node| node.node_id != *node_id);
                    graph
                        .edges
                        .retain(|(_, from, to)| from.node_id != *node_id && to.node_id != *node_id);
                }
                LogEntry::Output {
                    node_id,
                    name,
                    policy,
                } => {
                    if let Some(node) = graph.node_mut(*node_id) {
                        node.outputs.push((name.clone(), *policy));
                    }
                }
                LogEntry::Update { node_id, name } => {
                    if let Some(node) = graph.node_mut(*node_id) {
                        node.updates.push(name.clone());
                    }
                }
                LogEntry::Edge { kind, from, to } => {
                    graph.edges.push((*kind, from.clone(), to.clone()));
                }
                LogEntry::OutputEnabled {
                    node_id,
                    name,
                    enabled,
                } => {
                    let output = graph
                        .node_mut(*node_id)
                        .and_then(|node| node.outputs.iter_mut().find(|(n, _)| n == name));
                    if let Some((_, policy)) = output {
                        *policy = OutputPolicy::Dynamic { enabled: *enabled };
                    }
                }
                LogEntry::Call { node_id, update } => {
                    graph.calls.push(LogPort::update(*node_id, update));
                }
            }
        }

        graph
    }

    fn node_mut(&mut self, node_id: NodeId) -> Option<&mut LoggedNode> {
        self.nodes.iter_mut().find(|node| node.node_id == node_id)
    }

    fn upstream_of(&self, port: &LogPort) -> HashSet<LogPort> {
        let mut seen: HashSet<LogPort> = HashSet::new();
        let mut stack = vec![port.clone()];

        while let Some(port) = stack.pop() {
            if !seen.insert(port.clone()) {
                continue;
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|(_, _, to)| *to == port)
                    .map(|(_, from, _)| from.clone()),
            );
        }

        seen
    }
}
