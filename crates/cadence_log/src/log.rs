//! The append-only action log.
//!
//! One mutex covers records, per-flow indexes, and the firing guard, so an
//! append is either fully visible or not visible at all, and a guard
//! check-then-write is atomic.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use cadence_foundation::{Error, ErrorKind, FlowId, RecordId, Result};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::guard::{FiringGuard, GuardKey};
use crate::record::{ActionRecord, Completion, Invocation, RecordKind};

/// Result of appending a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record is new.
    Appended,
    /// An identical record with the same id was already logged.
    AlreadyPresent,
}

impl AppendOutcome {
    /// Returns true if the record was newly appended.
    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, Self::Appended)
    }
}

/// Serializable copy of a log's contents.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogSnapshot {
    /// Records in append order.
    pub records: Vec<ActionRecord>,
    /// Guard edges.
    pub edges: Vec<GuardKey>,
}

#[derive(Default)]
struct LogState {
    records: HashMap<RecordId, ActionRecord>,
    flows: HashMap<FlowId, Vec<RecordId>>,
    next_sequence: u64,
    guard: FiringGuard,
}

impl LogState {
    /// Validates an append without performing it.
    ///
    /// Returns `AlreadyPresent` for a redelivery of a logged record.
    fn check(&self, kind: &RecordKind, parent: Option<RecordId>) -> Result<AppendOutcome> {
        let id = record_id(kind);

        if let Some(existing) = self.records.get(&id) {
            if existing.same_payload(kind) && existing.parent == parent {
                return Ok(AppendOutcome::AlreadyPresent);
            }
            return Err(Error::new(ErrorKind::DuplicateRecord(id)));
        }

        if let Some(parent_id) = parent {
            let parent_record = self
                .records
                .get(&parent_id)
                .ok_or_else(|| Error::record_not_found(parent_id))?;
            if parent_record.flow() != record_flow(kind) {
                return Err(Error::new(ErrorKind::CrossFlowParent {
                    record: id,
                    parent: parent_id,
                }));
            }
        }
        Ok(AppendOutcome::Appended)
    }

    fn append(&mut self, kind: RecordKind, parent: Option<RecordId>) -> Result<AppendOutcome> {
        if self.check(&kind, parent)? == AppendOutcome::AlreadyPresent {
            return Ok(AppendOutcome::AlreadyPresent);
        }
        self.insert(kind, parent);
        Ok(AppendOutcome::Appended)
    }

    /// Inserts a record that passed [`Self::check`].
    fn insert(&mut self, kind: RecordKind, parent: Option<RecordId>) {
        let id = record_id(&kind);
        let flow = record_flow(&kind).clone();

        let mut rule = match &kind {
            RecordKind::Invocation(inv) => inv.rule.clone(),
            RecordKind::Completion(_) => None,
        };
        // A completion answering a rule's invocation is produced by that rule.
        if rule.is_none() && matches!(kind, RecordKind::Completion(_)) {
            if let Some(inv) = parent
                .and_then(|p| self.records.get(&p))
                .and_then(ActionRecord::as_invocation)
            {
                rule.clone_from(&inv.rule);
            }
        }

        let record = ActionRecord {
            kind,
            parent,
            rule,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.flows.entry(flow).or_default().push(id);
        self.records.insert(id, record);
    }
}

fn record_id(kind: &RecordKind) -> RecordId {
    match kind {
        RecordKind::Invocation(inv) => inv.id,
        RecordKind::Completion(c) => c.id,
    }
}

fn record_flow(kind: &RecordKind) -> &FlowId {
    match kind {
        RecordKind::Invocation(inv) => &inv.flow,
        RecordKind::Completion(c) => &c.flow,
    }
}

/// Append-only store of every invocation and completion, plus the firing guard.
///
/// Safe to share between threads; independent flows may append concurrently.
#[derive(Default)]
pub struct ActionLog {
    state: Mutex<LogState>,
}

impl ActionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, LogState>> {
        self.state
            .lock()
            .map_err(|_| Error::internal("action log lock poisoned"))
    }

    /// Appends a completion.
    ///
    /// Re-appending an identical completion is a no-op reported as
    /// [`AppendOutcome::AlreadyPresent`].
    ///
    /// # Errors
    /// Returns an error if the parent is unknown or in another flow, or if
    /// a different record already uses this id.
    pub fn append_completion(
        &self,
        completion: Completion,
        parent: Option<RecordId>,
    ) -> Result<AppendOutcome> {
        let id = completion.id;
        let outcome = self
            .state()?
            .append(RecordKind::Completion(completion), parent)?;
        debug!(record = %id, ?outcome, "appended completion");
        Ok(outcome)
    }

    /// Appends an invocation.
    ///
    /// # Errors
    /// Returns an error if the parent is unknown or in another flow, or if
    /// a different record already uses this id.
    pub fn append_invocation(
        &self,
        invocation: Invocation,
        parent: Option<RecordId>,
    ) -> Result<AppendOutcome> {
        let id = invocation.id;
        let outcome = self
            .state()?
            .append(RecordKind::Invocation(invocation), parent)?;
        debug!(record = %id, ?outcome, "appended invocation");
        Ok(outcome)
    }

    /// Appends invocations produced by one firing and writes its guard edge,
    /// all under one lock.
    ///
    /// The batch is all-or-nothing: every invocation is checked before the
    /// first one is appended.
    ///
    /// # Errors
    /// Returns an error if any invocation cannot be appended, in which case
    /// nothing is appended and no edge is written.
    pub fn record_firing(
        &self,
        key: GuardKey,
        invocations: &[Invocation],
        parent: RecordId,
    ) -> Result<()> {
        let mut state = self.state()?;
        let mut fresh = Vec::with_capacity(invocations.len());
        let mut seen = HashSet::with_capacity(invocations.len());
        for inv in invocations {
            let kind = RecordKind::Invocation(inv.clone());
            if !seen.insert(inv.id) {
                return Err(Error::new(ErrorKind::DuplicateRecord(inv.id)));
            }
            if state.check(&kind, Some(parent))? == AppendOutcome::Appended {
                fresh.push(kind);
            }
        }
        for kind in fresh {
            state.insert(kind, Some(parent));
        }
        debug!(?key, count = invocations.len(), "rule fired");
        state.guard.add_edge(key);
        Ok(())
    }

    /// Lists the completions of a flow in append order.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn completions(&self, flow: &FlowId) -> Result<Vec<Completion>> {
        let state = self.state()?;
        Ok(state
            .flows
            .get(flow)
            .into_iter()
            .flatten()
            .filter_map(|id| state.records.get(id))
            .filter_map(|r| r.as_completion().cloned())
            .collect())
    }

    /// Lists every record of a flow in append order.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn records(&self, flow: &FlowId) -> Result<Vec<ActionRecord>> {
        let state = self.state()?;
        Ok(state
            .flows
            .get(flow)
            .into_iter()
            .flatten()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect())
    }

    /// Looks up one record.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn get(&self, id: RecordId) -> Result<Option<ActionRecord>> {
        Ok(self.state()?.records.get(&id).cloned())
    }

    /// Returns true if the record is logged.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn contains(&self, id: RecordId) -> Result<bool> {
        Ok(self.state()?.records.contains_key(&id))
    }

    /// Lists the flows present in the log, sorted.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn flows(&self) -> Result<Vec<FlowId>> {
        let mut flows: Vec<_> = self.state()?.flows.keys().cloned().collect();
        flows.sort();
        Ok(flows)
    }

    /// Returns the total number of records.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.state()?.records.len())
    }

    /// Returns true if nothing has been logged.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.state()?.records.is_empty())
    }

    // -------------------------------------------------------------------------
    // Firing guard
    // -------------------------------------------------------------------------

    /// Returns true if the rule already fired for this key.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn has_edge(&self, key: &GuardKey) -> Result<bool> {
        Ok(self.state()?.guard.has_edge(key))
    }

    /// Writes a guard edge. Returns false if it already existed.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn add_edge(&self, key: GuardKey) -> Result<bool> {
        Ok(self.state()?.guard.add_edge(key))
    }

    /// Atomically claims a key for evaluation.
    ///
    /// Returns false if the key already fired or another caller holds it.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn reserve(&self, key: &GuardKey) -> Result<bool> {
        Ok(self.state()?.guard.reserve(key))
    }

    /// Drops a reservation without firing.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn release(&self, key: &GuardKey) -> Result<()> {
        self.state()?.guard.release(key);
        Ok(())
    }

    /// Returns the number of guard edges.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn edge_count(&self) -> Result<usize> {
        Ok(self.state()?.guard.edge_count())
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Copies the log contents.
    ///
    /// In-flight reservations are not part of the snapshot.
    ///
    /// # Errors
    /// Returns an error if the log lock is poisoned.
    pub fn snapshot(&self) -> Result<LogSnapshot> {
        let state = self.state()?;
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.sequence);
        Ok(LogSnapshot {
            records,
            edges: state.guard.edges(),
        })
    }

    /// Rebuilds a log from a snapshot, replaying records in append order.
    ///
    /// # Errors
    /// Returns an error if the snapshot's records violate log invariants.
    pub fn from_snapshot(snapshot: LogSnapshot) -> Result<Self> {
        let mut state = LogState::default();
        let mut records = snapshot.records;
        records.sort_by_key(|r| r.sequence);
        for record in records {
            state.append(record.kind, record.parent)?;
        }
        for edge in snapshot.edges {
            state.guard.add_edge(edge);
        }
        Ok(Self {
            state: Mutex::new(state),
        })
    }
}
