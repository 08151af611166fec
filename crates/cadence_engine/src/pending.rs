//! The deferred-rule queue.
//!
//! A pending entry is a match of a deferred rule whose targets were not all
//! reachable. It holds the pre-clause binding; no guard edge exists for it
//! until it fires.

use std::collections::BTreeMap;
use std::fmt;

use cadence_foundation::{FlowId, RecordId, Timestamp};
use cadence_log::GuardKey;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pattern::Binding;

/// Identifier of a pending entry, unique within one queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PendingId(u64);

impl PendingId {
    /// Creates an id from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending#{}", self.0)
    }
}

/// A deferred match waiting for its targets.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PendingSyncEntry {
    /// Queue-local id.
    pub id: PendingId,
    /// Rule name.
    pub rule: String,
    /// Binding captured at match time, before clauses.
    pub binding: Binding,
    /// Flow of the triggering completion.
    pub flow: FlowId,
    /// The triggering completion; parent of the eventual invocations.
    pub origin: RecordId,
    /// When the entry was queued.
    pub enqueued_at: Timestamp,
    /// Failed evaluation attempts so far.
    pub retries: u32,
}

impl PendingSyncEntry {
    /// The guard key the entry will write when it fires.
    #[must_use]
    pub fn guard_key(&self) -> GuardKey {
        self.binding.guard_key(&self.rule)
    }
}

/// Pending entries in enqueue order.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: BTreeMap<PendingId, PendingSyncEntry>,
    next_id: u64,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a queue from entries, keeping their ids.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = PendingSyncEntry>) -> Self {
        let entries: BTreeMap<_, _> = entries.into_iter().map(|e| (e.id, e)).collect();
        let next_id = entries.keys().last().map_or(0, |id| id.0 + 1);
        Self { entries, next_id }
    }

    /// Queues a match.
    ///
    /// Returns `None` if the same (matched ids, rule) pair is already queued.
    pub fn enqueue(
        &mut self,
        rule: impl Into<String>,
        binding: Binding,
        flow: FlowId,
        origin: RecordId,
    ) -> Option<PendingId> {
        let rule = rule.into();
        if self.contains_key(&binding.guard_key(&rule)) {
            return None;
        }
        let id = PendingId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            PendingSyncEntry {
                id,
                rule,
                binding,
                flow,
                origin,
                enqueued_at: Timestamp::now(),
                retries: 0,
            },
        );
        Some(id)
    }

    /// Returns true if an entry with this guard key is queued.
    #[must_use]
    pub fn contains_key(&self, key: &GuardKey) -> bool {
        self.entries.values().any(|e| e.guard_key() == *key)
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, id: PendingId) -> Option<&PendingSyncEntry> {
        self.entries.get(&id)
    }

    /// Looks up an entry mutably.
    pub fn get_mut(&mut self, id: PendingId) -> Option<&mut PendingSyncEntry> {
        self.entries.get_mut(&id)
    }

    /// Removes an entry.
    pub fn remove(&mut self, id: PendingId) -> Option<PendingSyncEntry> {
        self.entries.remove(&id)
    }

    /// Entries in enqueue order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingSyncEntry> {
        self.entries.values()
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
