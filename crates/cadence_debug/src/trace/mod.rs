//! Causal trees of a flow.
//!
//! Every record in the action log names its causal parent. A [`FlowTrace`]
//! rebuilds that forest for one flow so it can be inspected or rendered.
//!
//! # Example
//!
//! ```text
//! <- User/register ok
//!   -> Email/send
//!     <- Email/send ok
//!   -> Profile/create
//! ```

pub mod format;

pub use format::TreeFormatter;

use std::collections::{HashMap, HashSet};

use cadence_foundation::{FlowId, RecordId, Result};
use cadence_log::{ActionLog, ActionRecord};

// =============================================================================
// Trace Node
// =============================================================================

/// A record and the records it caused.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceNode {
    /// The logged record.
    pub record: ActionRecord,
    /// Direct effects, in append order.
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    /// Number of records in this subtree, including this one.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TraceNode::size).sum::<usize>()
    }

    /// Longest root-to-leaf path, counting this node.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TraceNode::depth).max().unwrap_or(0)
    }

    fn find(&self, id: RecordId) -> Option<&TraceNode> {
        if self.record.id() == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

// =============================================================================
// Flow Trace
// =============================================================================

/// The causal forest of one flow.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowTrace {
    flow: FlowId,
    roots: Vec<TraceNode>,
}

impl FlowTrace {
    /// Builds the trace of `flow` from the log.
    ///
    /// Records without a parent become roots. A flow with no records yields
    /// an empty trace.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn build(log: &ActionLog, flow: &FlowId) -> Result<Self> {
        Ok(Self::from_records(flow.clone(), log.records(flow)?))
    }

    /// Builds a trace from records already in append order.
    #[must_use]
    pub fn from_records(flow: FlowId, records: Vec<ActionRecord>) -> Self {
        let mut children: HashMap<RecordId, Vec<ActionRecord>> = HashMap::new();
        let mut roots = Vec::new();
        let known: HashSet<RecordId> = records.iter().map(ActionRecord::id).collect();

        for record in records {
            match record.parent {
                Some(parent) if known.contains(&parent) => {
                    children.entry(parent).or_default().push(record);
                }
                _ => roots.push(record),
            }
        }

        let roots = roots
            .into_iter()
            .map(|record| Self::grow(record, &mut children))
            .collect();
        Self { flow, roots }
    }

    fn grow(
        record: ActionRecord,
        children: &mut HashMap<RecordId, Vec<ActionRecord>>,
    ) -> TraceNode {
        let kids = children.remove(&record.id()).unwrap_or_default();
        TraceNode {
            children: kids
                .into_iter()
                .map(|child| Self::grow(child, children))
                .collect(),
            record,
        }
    }

    /// The traced flow.
    #[must_use]
    pub fn flow(&self) -> &FlowId {
        &self.flow
    }

    /// Top-level records.
    #[must_use]
    pub fn roots(&self) -> &[TraceNode] {
        &self.roots
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.iter().map(TraceNode::size).sum()
    }

    /// Returns true if the flow has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Deepest causal chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.roots.iter().map(TraceNode::depth).max().unwrap_or(0)
    }

    /// Finds the node for a record.
    #[must_use]
    pub fn node(&self, id: RecordId) -> Option<&TraceNode> {
        self.roots.iter().find_map(|root| root.find(id))
    }

    /// Renders with the default formatter.
    #[must_use]
    pub fn render(&self) -> String {
        TreeFormatter::new().format(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
