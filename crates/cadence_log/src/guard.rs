//! Firing guard: at-most-once bookkeeping per (matched records, rule).
//!
//! An edge records that a rule already produced output from exactly one
//! set of trigger records. Edges are never removed.
//!
//! Evaluation happens outside the log lock, so a key is first *reserved*
//! (marked in flight), then either *committed* as an edge or *released*.
//! Two concurrent evaluations of the same key cannot both reserve it.

use std::collections::HashSet;
use std::fmt;

use cadence_foundation::RecordId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of one rule firing: the sorted matched record ids plus the rule.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GuardKey {
    records: Vec<RecordId>,
    rule: String,
}

impl GuardKey {
    /// Creates a key. Record order and duplicates do not matter.
    #[must_use]
    pub fn new(rule: impl Into<String>, records: impl IntoIterator<Item = RecordId>) -> Self {
        let mut records: Vec<_> = records.into_iter().collect();
        records.sort_unstable();
        records.dedup();
        Self {
            records,
            rule: rule.into(),
        }
    }

    /// Returns the matched record ids in sorted order.
    #[must_use]
    pub fn records(&self) -> &[RecordId] {
        &self.records
    }

    /// Returns the rule name.
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }
}

impl fmt::Debug for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuardKey({} <- [", self.rule)?;
        for (i, id) in self.records.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "])")
    }
}

/// Edge and in-flight sets. Not synchronized; the action log owns one.
#[derive(Clone, Debug, Default)]
pub struct FiringGuard {
    edges: HashSet<GuardKey>,
    in_flight: HashSet<GuardKey>,
}

impl FiringGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the rule already fired for this key.
    #[must_use]
    pub fn has_edge(&self, key: &GuardKey) -> bool {
        self.edges.contains(key)
    }

    /// Records an edge. Returns false if it already existed.
    pub fn add_edge(&mut self, key: GuardKey) -> bool {
        self.in_flight.remove(&key);
        self.edges.insert(key)
    }

    /// Claims a key for evaluation.
    ///
    /// Returns false if the key already has an edge or is being evaluated.
    pub fn reserve(&mut self, key: &GuardKey) -> bool {
        if self.edges.contains(key) || self.in_flight.contains(key) {
            return false;
        }
        self.in_flight.insert(key.clone());
        true
    }

    /// Returns true if the key is reserved and not yet committed.
    #[must_use]
    pub fn is_reserved(&self, key: &GuardKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Drops a reservation without writing an edge.
    pub fn release(&mut self, key: &GuardKey) {
        self.in_flight.remove(key);
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns all edges in sorted order.
    #[must_use]
    pub fn edges(&self) -> Vec<GuardKey> {
        let mut edges: Vec<_> = self.edges.iter().cloned().collect();
        edges.sort();
        edges
    }
}
