//! The annotation-aware engine.
//!
//! Wraps a [`SyncEngine`] and schedules each match by its rule's
//! annotations:
//!
//! - **immediate**: fire now; unreachable targets fail the rule and are
//!   reported
//! - **deferred**: fire now if every target is reachable, otherwise queue
//!   the pre-clause binding until an availability change makes them so
//! - **local-only**: fire now without looking at reachability
//!
//! It also owns the pending-conflicts buffer and the hierarchy plumbing
//! (forwarders, upstream link, outbox).

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use cadence_foundation::{Error, ErrorKind, FlowId, RecordId, Result};
use cadence_log::{ActionLog, AppendOutcome, Completion, Invocation, LogSnapshot};
use cadence_storage::ConflictInfo;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::escalation::conflict_completion;
use crate::hierarchy::{CompletionForwarder, Outbox, UpstreamLink};
use crate::pending::{PendingId, PendingQueue, PendingSyncEntry};
use crate::pattern::Binding;
use crate::rule::{CompiledRule, Rule};
use crate::sync::{Candidate, FireResult, RuleFailure, SyncEngine};
use crate::transport::{AvailabilityChange, ConceptRegistry, ConceptTransport};

// =============================================================================
// Reports
// =============================================================================

/// Result of processing one completion.
#[derive(Clone, Debug)]
pub struct AnnotatedOutcome {
    /// Whether the completion was new to the log.
    pub appended: AppendOutcome,
    /// Invocations built by rules that fired.
    pub invocations: Vec<Invocation>,
    /// Pending entries queued for deferred rules.
    pub deferred: Vec<PendingId>,
    /// Per-rule failures, including unreachable immediate targets.
    pub failures: Vec<RuleFailure>,
}

impl AnnotatedOutcome {
    fn new(appended: AppendOutcome) -> Self {
        Self {
            appended,
            invocations: Vec::new(),
            deferred: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Returns true if no rule failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of scanning the pending queue.
#[derive(Clone, Debug, Default)]
pub struct DrainReport {
    /// Entries that fired and left the queue.
    pub fired: Vec<PendingId>,
    /// Invocations they built.
    pub invocations: Vec<Invocation>,
    /// Entries that failed and stay queued with a bumped retry count.
    pub failures: Vec<RuleFailure>,
}

impl DrainReport {
    /// Appends another report.
    pub fn merge(&mut self, other: Self) {
        self.fired.extend(other.fired);
        self.invocations.extend(other.invocations);
        self.failures.extend(other.failures);
    }

    /// Returns true if nothing fired or failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty() && self.failures.is_empty()
    }
}

/// Serializable engine state.
///
/// Rules and transports are not part of it; register them again after
/// restoring.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineSnapshot {
    /// Records and guard edges.
    pub log: LogSnapshot,
    /// Deferred matches.
    pub pending: Vec<PendingSyncEntry>,
    /// Undrained conflict completions.
    pub conflicts: Vec<Completion>,
    /// Completions waiting for the upstream.
    pub outbox: Vec<Completion>,
}

// =============================================================================
// Annotated Engine
// =============================================================================

struct Upstream {
    link: Option<Arc<dyn UpstreamLink>>,
    outbox: Outbox,
}

/// A [`SyncEngine`] with annotation-aware scheduling.
pub struct AnnotatedEngine {
    engine: SyncEngine,
    pending: Mutex<PendingQueue>,
    conflicts: Mutex<Vec<Completion>>,
    forwarders: RwLock<Vec<Arc<dyn CompletionForwarder>>>,
    upstream: Mutex<Upstream>,
}

impl AnnotatedEngine {
    /// Creates an engine with default configuration.
    #[must_use]
    pub fn new(registry: Arc<ConceptRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn with_config(registry: Arc<ConceptRegistry>, config: EngineConfig) -> Self {
        Self::assemble(SyncEngine::new(registry).with_config(config), PendingQueue::new())
    }

    fn assemble(engine: SyncEngine, pending: PendingQueue) -> Self {
        let outbox = Outbox::new(engine.config().outbox_limit);
        Self {
            engine,
            pending: Mutex::new(pending),
            conflicts: Mutex::new(Vec::new()),
            forwarders: RwLock::new(Vec::new()),
            upstream: Mutex::new(Upstream { link: None, outbox }),
        }
    }

    fn pending_queue(&self) -> Result<MutexGuard<'_, PendingQueue>> {
        self.pending
            .lock()
            .map_err(|_| Error::internal("pending queue lock poisoned"))
    }

    fn conflict_buffer(&self) -> Result<MutexGuard<'_, Vec<Completion>>> {
        self.conflicts
            .lock()
            .map_err(|_| Error::internal("pending conflicts lock poisoned"))
    }

    fn upstream(&self) -> Result<MutexGuard<'_, Upstream>> {
        self.upstream
            .lock()
            .map_err(|_| Error::internal("upstream lock poisoned"))
    }

    // -------------------------------------------------------------------------
    // Delegation
    // -------------------------------------------------------------------------

    /// The wrapped engine.
    #[must_use]
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// The action log.
    #[must_use]
    pub fn log(&self) -> &ActionLog {
        self.engine.log()
    }

    /// The concept registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConceptRegistry> {
        self.engine.registry()
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Validates and registers a rule.
    ///
    /// # Errors
    /// Returns `InvalidRule`, `UnknownVariable`, or `DuplicateRule`.
    pub fn register(&self, rule: Rule) -> Result<Arc<CompiledRule>> {
        self.engine.register(rule)
    }

    /// Removes a rule. Its pending entries stay queued.
    ///
    /// # Errors
    /// Returns `RuleNotFound` if no rule has this name.
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.engine.unregister(name)
    }

    // -------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------

    /// Processes one completion, scheduling each match by annotation.
    ///
    /// # Errors
    /// Returns an error only if the completion cannot be appended or the
    /// engine's own state is unusable.
    pub fn on_completion(
        &self,
        completion: Completion,
        parent: Option<RecordId>,
    ) -> Result<AnnotatedOutcome> {
        let appended = self.engine.append(&completion, parent)?;
        if appended.is_new() {
            self.forward(&completion)?;
        }

        let mut outcome = AnnotatedOutcome::new(appended);
        for Candidate { rule, binding } in self.engine.matches(&completion)? {
            if rule.rule().is_local_only() {
                self.fire_into(&rule, binding, &completion, &mut outcome);
                continue;
            }

            let unreachable = self.engine.registry().unreachable(rule.target_concepts())?;
            if rule.rule().is_deferred() {
                if unreachable.is_empty() {
                    self.fire_into(&rule, binding, &completion, &mut outcome);
                } else {
                    self.defer(&rule, binding, &completion, &mut outcome)?;
                }
            } else if self.engine.config().check_immediate_reachability && !unreachable.is_empty()
            {
                let error = Error::unreachable(unreachable);
                warn!(rule = rule.name(), %error, "immediate rule blocked");
                outcome.failures.push(RuleFailure {
                    rule: rule.name().to_string(),
                    error,
                });
            } else {
                self.fire_into(&rule, binding, &completion, &mut outcome);
            }
        }

        Ok(outcome)
    }

    fn fire_into(
        &self,
        rule: &CompiledRule,
        binding: Binding,
        trigger: &Completion,
        outcome: &mut AnnotatedOutcome,
    ) {
        match self.engine.fire(rule, binding, trigger.id, &trigger.flow) {
            Ok(FireResult::Fired(invocations)) => outcome.invocations.extend(invocations),
            Ok(FireResult::AlreadyFired | FireResult::InFlight) => {}
            Err(error) => {
                warn!(rule = rule.name(), %error, "rule failed");
                outcome.failures.push(RuleFailure {
                    rule: rule.name().to_string(),
                    error,
                });
            }
        }
    }

    /// Queues a deferred match.
    ///
    /// Reachability is re-checked under the queue lock: a concept that came
    /// up after the first check would otherwise have already been scanned.
    fn defer(
        &self,
        rule: &CompiledRule,
        binding: Binding,
        trigger: &Completion,
        outcome: &mut AnnotatedOutcome,
    ) -> Result<()> {
        let mut pending = self.pending_queue()?;
        if self
            .engine
            .registry()
            .unreachable(rule.target_concepts())?
            .is_empty()
        {
            drop(pending);
            self.fire_into(rule, binding, trigger, outcome);
            return Ok(());
        }

        if let Some(id) = pending.enqueue(rule.name(), binding, trigger.flow.clone(), trigger.id) {
            info!(rule = rule.name(), %id, flow = %trigger.flow, "rule deferred");
            outcome.deferred.push(id);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Availability
    // -------------------------------------------------------------------------

    /// Reacts to a concept becoming reachable or unreachable.
    ///
    /// When it becomes reachable, every pending entry whose rule references
    /// it is retried if all of that rule's targets are now reachable.
    ///
    /// # Errors
    /// Returns an error if the engine's own state is unusable.
    pub fn on_availability_change(&self, concept: &str, available: bool) -> Result<DrainReport> {
        if !available {
            debug!(concept, "concept unavailable");
            return Ok(DrainReport::default());
        }
        self.scan(Some(concept))
    }

    /// Retries every pending entry whose targets are all reachable.
    ///
    /// # Errors
    /// Returns an error if the engine's own state is unusable.
    pub fn drain_pending(&self) -> Result<DrainReport> {
        self.scan(None)
    }

    fn scan(&self, concept: Option<&str>) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        // Held for the whole scan so each entry is handled once per event.
        let mut pending = self.pending_queue()?;
        let ids: Vec<PendingId> = pending.iter().map(|e| e.id).collect();

        for id in ids {
            let Some(entry) = pending.get(id).cloned() else {
                continue;
            };
            let Some(rule) = self.engine.rule(&entry.rule)? else {
                report.failures.push(RuleFailure {
                    rule: entry.rule.clone(),
                    error: Error::new(ErrorKind::RuleNotFound(entry.rule)),
                });
                continue;
            };
            if concept.is_some_and(|c| !rule.references(c)) {
                continue;
            }
            if !self
                .engine
                .registry()
                .unreachable(rule.target_concepts())?
                .is_empty()
            {
                continue;
            }

            match self
                .engine
                .fire(&rule, entry.binding, entry.origin, &entry.flow)
            {
                Ok(FireResult::Fired(invocations)) => {
                    pending.remove(id);
                    info!(rule = rule.name(), %id, "deferred rule fired");
                    report.fired.push(id);
                    report.invocations.extend(invocations);
                }
                Ok(FireResult::AlreadyFired) => {
                    pending.remove(id);
                }
                Ok(FireResult::InFlight) => {}
                Err(error) => {
                    if let Some(entry) = pending.get_mut(id) {
                        entry.retries += 1;
                    }
                    warn!(rule = rule.name(), %id, %error, "deferred rule failed, kept queued");
                    report.failures.push(RuleFailure {
                        rule: rule.name().to_string(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    fn react(&self, change: AvailabilityChange) -> Result<DrainReport> {
        self.on_availability_change(&change.concept, change.available)
    }

    /// Registers a concept and reacts to its reachability.
    ///
    /// # Errors
    /// Returns an error if the engine's own state is unusable.
    pub fn register_concept(
        &self,
        concept: impl Into<String>,
        transport: Arc<dyn ConceptTransport>,
    ) -> Result<DrainReport> {
        let change = self.engine.registry().register(concept, transport)?;
        self.react(change)
    }

    /// Hot-swaps a concept's transport and reacts to its reachability.
    ///
    /// # Errors
    /// Returns `ConceptNotFound` if the concept is not registered.
    pub fn replace_concept(
        &self,
        concept: &str,
        transport: Arc<dyn ConceptTransport>,
    ) -> Result<DrainReport> {
        let change = self.engine.registry().replace(concept, transport)?;
        self.react(change)
    }

    /// Deregisters a concept. Returns false if it was not registered.
    ///
    /// # Errors
    /// Returns an error if the registry lock is poisoned.
    pub fn deregister_concept(&self, concept: &str) -> Result<bool> {
        match self.engine.registry().deregister(concept)? {
            Some(change) => {
                self.react(change)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Polls concept health and reacts to every transition.
    ///
    /// # Errors
    /// Returns an error if the engine's own state is unusable.
    pub fn refresh_concepts(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        for change in self.engine.registry().refresh()? {
            report.merge(self.react(change)?);
        }
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Pending queue
    // -------------------------------------------------------------------------

    /// Queued entries in enqueue order.
    ///
    /// # Errors
    /// Returns an error if the queue lock is poisoned.
    pub fn pending(&self) -> Result<Vec<PendingSyncEntry>> {
        Ok(self.pending_queue()?.iter().cloned().collect())
    }

    /// Number of queued entries.
    ///
    /// # Errors
    /// Returns an error if the queue lock is poisoned.
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.pending_queue()?.len())
    }

    /// Drops a queued entry without firing it.
    ///
    /// # Errors
    /// Returns an error if the queue lock is poisoned.
    pub fn discard_pending(&self, id: PendingId) -> Result<Option<PendingSyncEntry>> {
        let removed = self.pending_queue()?.remove(id);
        if let Some(entry) = &removed {
            info!(rule = %entry.rule, %id, "pending entry discarded");
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Conflicts
    // -------------------------------------------------------------------------

    /// Turns an escalated write conflict into a `conflict` completion.
    ///
    /// The completion is buffered until drained and returned so the caller
    /// can feed it to [`Self::on_completion`].
    ///
    /// # Errors
    /// Returns an error if the buffer lock is poisoned.
    pub fn produce_conflict_completion(
        &self,
        concept: &str,
        info: &ConflictInfo,
        flow: FlowId,
    ) -> Result<Completion> {
        let completion = conflict_completion(concept, info, flow);
        self.conflict_buffer()?.push(completion.clone());
        info!(concept, relation = %info.relation, key = %info.key, "conflict escalated");
        Ok(completion)
    }

    /// Conflict completions not yet drained.
    ///
    /// # Errors
    /// Returns an error if the buffer lock is poisoned.
    pub fn pending_conflicts(&self) -> Result<Vec<Completion>> {
        Ok(self.conflict_buffer()?.clone())
    }

    /// Takes every buffered conflict completion.
    ///
    /// # Errors
    /// Returns an error if the buffer lock is poisoned.
    pub fn drain_conflicts(&self) -> Result<Vec<Completion>> {
        Ok(std::mem::take(&mut *self.conflict_buffer()?))
    }

    // -------------------------------------------------------------------------
    // Hierarchy
    // -------------------------------------------------------------------------

    /// Adds a forwarder called with every new completion.
    ///
    /// # Errors
    /// Returns an error if the forwarder lock is poisoned.
    pub fn add_forwarder(&self, forwarder: Arc<dyn CompletionForwarder>) -> Result<()> {
        self.forwarders
            .write()
            .map_err(|_| Error::internal("forwarder lock poisoned"))?
            .push(forwarder);
        Ok(())
    }

    /// Sets the upstream link and replays the outbox if it is connected.
    ///
    /// # Errors
    /// Returns an error if the upstream lock is poisoned.
    pub fn set_upstream(&self, link: Arc<dyn UpstreamLink>) -> Result<usize> {
        let mut upstream = self.upstream()?;
        upstream.link = Some(link);
        Ok(Self::flush_locked(&mut upstream))
    }

    /// Removes the upstream link. Queued completions are kept.
    ///
    /// # Errors
    /// Returns an error if the upstream lock is poisoned.
    pub fn clear_upstream(&self) -> Result<()> {
        self.upstream()?.link = None;
        Ok(())
    }

    /// Replays queued completions if the upstream is connected.
    ///
    /// Returns how many were delivered.
    ///
    /// # Errors
    /// Returns an error if the upstream lock is poisoned.
    pub fn flush_outbox(&self) -> Result<usize> {
        Ok(Self::flush_locked(&mut *self.upstream()?))
    }

    /// Completions waiting for the upstream.
    ///
    /// # Errors
    /// Returns an error if the upstream lock is poisoned.
    pub fn outbox_len(&self) -> Result<usize> {
        Ok(self.upstream()?.outbox.len())
    }

    /// Completions dropped because the outbox was full.
    ///
    /// # Errors
    /// Returns an error if the upstream lock is poisoned.
    pub fn outbox_dropped(&self) -> Result<u64> {
        Ok(self.upstream()?.outbox.dropped())
    }

    fn flush_locked(upstream: &mut Upstream) -> usize {
        let Upstream { link, outbox } = upstream;
        match link {
            Some(link) if link.is_connected() && !outbox.is_empty() => {
                let sent = outbox.flush(link.as_ref());
                info!(sent, remaining = outbox.len(), "outbox replayed");
                sent
            }
            _ => 0,
        }
    }

    fn forward(&self, completion: &Completion) -> Result<()> {
        let forwarders = self
            .forwarders
            .read()
            .map_err(|_| Error::internal("forwarder lock poisoned"))?
            .clone();
        for forwarder in forwarders {
            if let Err(error) = forwarder.forward(completion) {
                warn!(record = %completion.id, %error, "forwarder failed");
            }
        }

        let mut upstream = self.upstream()?;
        let Upstream { link, outbox } = &mut *upstream;
        match link {
            Some(link) if link.is_connected() => {
                outbox.flush(link.as_ref());
                if !outbox.is_empty() {
                    outbox.push(completion.clone());
                } else if let Err(error) = link.forward(completion) {
                    warn!(record = %completion.id, %error, "upstream forward failed, queued");
                    outbox.push(completion.clone());
                }
            }
            Some(_) => outbox.push(completion.clone()),
            None => {}
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Copies the engine state.
    ///
    /// # Errors
    /// Returns an error if any lock is poisoned.
    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        Ok(EngineSnapshot {
            log: self.log().snapshot()?,
            pending: self.pending()?,
            conflicts: self.pending_conflicts()?,
            outbox: self.upstream()?.outbox.iter().cloned().collect(),
        })
    }

    /// Restores an engine from a snapshot. Rules must be registered again.
    ///
    /// # Errors
    /// Returns an error if the snapshot's log is inconsistent.
    pub fn from_snapshot(
        registry: Arc<ConceptRegistry>,
        config: EngineConfig,
        snapshot: EngineSnapshot,
    ) -> Result<Self> {
        let log = ActionLog::from_snapshot(snapshot.log)?;
        let engine = SyncEngine::with_log(registry, log).with_config(config);
        let restored = Self::assemble(engine, PendingQueue::from_entries(snapshot.pending));
        *restored.conflict_buffer()? = snapshot.conflicts;
        {
            let mut upstream = restored.upstream()?;
            for completion in snapshot.outbox {
                upstream.outbox.push(completion);
            }
        }
        Ok(restored)
    }
}
