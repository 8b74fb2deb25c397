use serde::{Deserialize, Serialize};

use crate::dependency_graph::PortAddress;

/// Whether a node produces an output, and whether that can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputPolicy {
    /// Always produced.
    Enabled,
    /// Never produced by this node type. Nothing may depend on it.
    Disabled,
    /// Toggled at run time through `DependencyGraph::set_output_enabled`.
    Dynamic { enabled: bool },
}

impl OutputPolicy {
    pub fn is_enabled(&self) -> bool {
        match self {
            OutputPolicy::Enabled => true,
            OutputPolicy::Disabled => false,
            OutputPolicy::Dynamic { enabled } => *enabled,
        }
    }

    pub fn is_statically_disabled(&self) -> bool {
        matches!(self, OutputPolicy::Disabled)
    }

    // the initial state of a dynamic output is not part of its identity
    fn same_kind(&self, other: &OutputPolicy) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OutputEntry {
    pub(crate) name: String,
    pub(crate) policy: OutputPolicy,
    /// Updates of the same node refreshing this output, in declaration order.
    pub(crate) updates: Vec<usize>,
    /// Output of another node this one is forwarded from.
    pub(crate) direct: Option<PortAddress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Declared {
    New(usize),
    Existing(usize),
    Conflict,
}

/// Per-node output table, kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    entries: Vec<OutputEntry>,
}

impl Outputs {
    pub(crate) fn declare(&mut self, name: &str, policy: OutputPolicy) -> Declared {
        if let Some(idx) = self.index_of(name) {
            return if self.entries[idx].policy.same_kind(&policy) {
                Declared::Existing(idx)
            } else {
                Declared::Conflict
            };
        }

        self.entries.push(OutputEntry {
            name: name.to_string(),
            policy,
            updates: Vec::new(),
            direct: None,
        });
        Declared::New(self.entries.len() - 1)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.entries[idx].name
    }

    pub fn policy(&self, idx: usize) -> OutputPolicy {
        self.entries[idx].policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, idx: usize) -> &OutputEntry {
        &self.entries[idx]
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> &mut OutputEntry {
        &mut self.entries[idx]
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, OutputEntry> {
        self.entries.iter()
    }

    /// Returns `Some(changed)` for dynamic outputs, `None` otherwise.
    pub(crate) fn set_enabled(&mut self, idx: usize, enabled: bool) -> Option<bool> {
        let entry = &mut self.entries[idx];
        match &mut entry.policy {
            OutputPolicy::Dynamic { enabled: current } => {
                let changed = *current != enabled;
                *current = enabled;
                Some(changed)
            }
            OutputPolicy::Enabled | OutputPolicy::Disabled => None,
        }
    }
}
