//! The sync engine.
//!
//! `on_completion` appends a completion, finds candidate rules through the
//! index, matches them against the flow's history, and fires every match
//! that has no guard edge yet. Firing is: reserve the guard key, evaluate
//! clauses, build invocations, then log the invocations and the guard edge
//! together. Dispatching the invocations is the caller's job.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cadence_foundation::{Error, ErrorContext, FlowId, RecordId, Result};
use cadence_log::{ActionLog, AppendOutcome, Completion, Invocation};
use tracing::{debug, info, trace, warn};

use crate::clause::ClauseEvaluator;
use crate::config::EngineConfig;
use crate::index::RuleIndex;
use crate::invocation::InvocationBuilder;
use crate::pattern::{Binding, PatternMatcher};
use crate::rule::{CompiledRule, Rule};
use crate::transport::ConceptRegistry;

// =============================================================================
// Outcomes
// =============================================================================

/// A rule that failed for one completion.
#[derive(Clone, Debug)]
pub struct RuleFailure {
    /// Rule name.
    pub rule: String,
    /// What went wrong.
    pub error: Error,
}

/// Result of processing one completion.
#[derive(Clone, Debug)]
pub struct SyncOutcome {
    /// Whether the completion was new to the log.
    pub appended: AppendOutcome,
    /// Invocations built, in firing order.
    pub invocations: Vec<Invocation>,
    /// Per-rule failures; siblings still fired.
    pub failures: Vec<RuleFailure>,
}

impl SyncOutcome {
    /// Returns true if no rule failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A rule match that has not fired.
#[derive(Clone, Debug)]
pub(crate) struct Candidate {
    pub(crate) rule: Arc<CompiledRule>,
    pub(crate) binding: Binding,
}

/// What happened when a match was fired.
#[derive(Debug)]
pub(crate) enum FireResult {
    Fired(Vec<Invocation>),
    /// The guard edge already existed.
    AlreadyFired,
    /// Another caller holds the reservation.
    InFlight,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Log, rule index, and concept registry of one engine instance.
pub struct SyncEngine {
    log: ActionLog,
    index: RwLock<RuleIndex>,
    registry: Arc<ConceptRegistry>,
    config: EngineConfig,
}

impl SyncEngine {
    /// Creates an engine with an empty log and no rules.
    #[must_use]
    pub fn new(registry: Arc<ConceptRegistry>) -> Self {
        Self::with_log(registry, ActionLog::new())
    }

    /// Creates an engine over an existing log.
    #[must_use]
    pub fn with_log(registry: Arc<ConceptRegistry>, log: ActionLog) -> Self {
        Self {
            log,
            index: RwLock::new(RuleIndex::new()),
            registry,
            config: EngineConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn index(&self) -> Result<RwLockReadGuard<'_, RuleIndex>> {
        self.index
            .read()
            .map_err(|_| Error::internal("rule index lock poisoned"))
    }

    fn index_mut(&self) -> Result<RwLockWriteGuard<'_, RuleIndex>> {
        self.index
            .write()
            .map_err(|_| Error::internal("rule index lock poisoned"))
    }

    // -------------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------------

    /// Validates and registers a rule.
    ///
    /// # Errors
    /// Returns `InvalidRule`, `UnknownVariable`, or `DuplicateRule`.
    pub fn register(&self, rule: Rule) -> Result<Arc<CompiledRule>> {
        let compiled = self.index_mut()?.register(rule)?;
        info!(
            rule = compiled.name(),
            annotations = ?compiled.rule().annotations,
            "rule registered"
        );
        Ok(compiled)
    }

    /// Removes a rule. Its guard edges stay in the log.
    ///
    /// # Errors
    /// Returns `RuleNotFound` if no rule has this name.
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.index_mut()?.unregister(name)?;
        info!(rule = name, "rule unregistered");
        Ok(())
    }

    /// Registered rule names in registration order.
    ///
    /// # Errors
    /// Returns an error if the index lock is poisoned.
    pub fn rules(&self) -> Result<Vec<String>> {
        Ok(self.index()?.names())
    }

    /// Looks up a registered rule.
    ///
    /// # Errors
    /// Returns an error if the index lock is poisoned.
    pub fn rule(&self, name: &str) -> Result<Option<Arc<CompiledRule>>> {
        Ok(self.index()?.get(name))
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// The action log.
    #[must_use]
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// The concept registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConceptRegistry> {
        &self.registry
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Processing
    // -------------------------------------------------------------------------

    /// Processes one completion.
    ///
    /// Failures of one rule or match are collected and never stop sibling
    /// matches. Re-delivering a logged completion re-runs matching, but the
    /// guard keeps every match from firing twice.
    ///
    /// # Errors
    /// Returns an error only if the completion cannot be appended or the
    /// engine's own state is unusable.
    pub fn on_completion(
        &self,
        completion: Completion,
        parent: Option<RecordId>,
    ) -> Result<SyncOutcome> {
        let appended = self.append(&completion, parent)?;
        let mut outcome = SyncOutcome {
            appended,
            invocations: Vec::new(),
            failures: Vec::new(),
        };

        for Candidate { rule, binding } in self.matches(&completion)? {
            match self.fire(&rule, binding, completion.id, &completion.flow) {
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

        Ok(outcome)
    }

    pub(crate) fn append(
        &self,
        completion: &Completion,
        parent: Option<RecordId>,
    ) -> Result<AppendOutcome> {
        self.log.append_completion(completion.clone(), parent)
    }

    /// Matches of candidate rules that have not fired yet.
    pub(crate) fn matches(&self, completion: &Completion) -> Result<Vec<Candidate>> {
        let candidates = self
            .index()?
            .candidates(&completion.concept, &completion.action);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let history = self.log.completions(&completion.flow)?;
        let mut out = Vec::new();
        for rule in candidates {
            for binding in PatternMatcher::match_rule(rule.patterns(), completion, &history) {
                if self.log.has_edge(&binding.guard_key(rule.name()))? {
                    trace!(rule = rule.name(), "match already fired");
                    continue;
                }
                debug!(rule = rule.name(), matched = binding.matched().len(), "rule matched");
                out.push(Candidate {
                    rule: Arc::clone(&rule),
                    binding,
                });
            }
        }
        Ok(out)
    }

    /// Fires one match under the guard.
    ///
    /// The reservation is released if evaluation or building fails, so the
    /// match can be retried.
    pub(crate) fn fire(
        &self,
        rule: &CompiledRule,
        binding: Binding,
        origin: RecordId,
        flow: &FlowId,
    ) -> Result<FireResult> {
        let key = binding.guard_key(rule.name());
        if !self.log.reserve(&key)? {
            return Ok(if self.log.has_edge(&key)? {
                FireResult::AlreadyFired
            } else {
                FireResult::InFlight
            });
        }

        let built = self.evaluate(rule, binding, flow).and_then(|invocations| {
            self.log.record_firing(key.clone(), &invocations, origin)?;
            Ok(invocations)
        });

        match built {
            Ok(invocations) => {
                debug!(rule = rule.name(), invocations = invocations.len(), "rule fired");
                Ok(FireResult::Fired(invocations))
            }
            Err(error) => {
                self.log.release(&key)?;
                Err(error.with_context(
                    ErrorContext::new()
                        .with_rule(rule.name())
                        .with_flow(flow.as_str()),
                ))
            }
        }
    }

    fn evaluate(
        &self,
        rule: &CompiledRule,
        binding: Binding,
        flow: &FlowId,
    ) -> Result<Vec<Invocation>> {
        let bindings = ClauseEvaluator::new(self.registry.as_ref(), self.config.max_fan_out)
            .evaluate(rule.name(), &rule.rule().clauses, binding)?;
        InvocationBuilder::build_all(rule.rule(), &bindings, flow)
    }
}
