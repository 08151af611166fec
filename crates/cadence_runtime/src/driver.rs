//! The flow driver.
//!
//! Runs one flow to quiescence: feed a completion to the engine, dispatch
//! every invocation it returns, feed the resulting completions back, and
//! repeat. The loop is an explicit work queue with a hard iteration cap so
//! a runaway rule cascade ends with an error instead of looping forever.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use cadence_engine::{AnnotatedEngine, PendingId, RuleFailure};
use cadence_foundation::{Error, FlowId, RecordId, Result, SemanticLimit};
use cadence_log::{Completion, Invocation};
use tracing::{debug, info, warn};

/// Default ceiling on work items processed per flow.
pub const DEFAULT_MAX_ITERATIONS: usize = 1_000;

/// Default extra dispatch attempts for retry-safe rules.
pub const DEFAULT_DISPATCH_RETRIES: u32 = 2;

/// Tunables for [`FlowDriver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Work items (completions plus dispatches) allowed per run.
    pub max_iterations: usize,
    /// Extra attempts for invocations of retry-safe rules.
    pub dispatch_retries: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            dispatch_retries: DEFAULT_DISPATCH_RETRIES,
        }
    }
}

impl DriverConfig {
    /// Sets the iteration ceiling.
    #[must_use]
    pub fn with_max_iterations(mut self, limit: usize) -> Self {
        self.max_iterations = limit;
        self
    }

    /// Sets the retry count for retry-safe dispatch.
    #[must_use]
    pub fn with_dispatch_retries(mut self, retries: u32) -> Self {
        self.dispatch_retries = retries;
        self
    }
}

/// An invocation that could not be delivered.
#[derive(Clone, Debug)]
pub struct DispatchFailure {
    /// The invocation.
    pub invocation: Invocation,
    /// The last error seen.
    pub error: Error,
    /// Attempts made.
    pub attempts: u32,
}

/// What happened during one run.
#[derive(Clone, Debug)]
pub struct FlowReport {
    /// The flow.
    pub flow: FlowId,
    /// Completions fed to the engine, in order.
    pub completions: Vec<Completion>,
    /// Invocations dispatched, in order.
    pub invocations: Vec<Invocation>,
    /// Rule failures.
    pub failures: Vec<RuleFailure>,
    /// Dispatch failures.
    pub dispatch_failures: Vec<DispatchFailure>,
    /// Entries queued for deferred rules.
    pub deferred: Vec<PendingId>,
    /// Work items processed.
    pub iterations: usize,
}

impl FlowReport {
    fn new(flow: FlowId) -> Self {
        Self {
            flow,
            completions: Vec::new(),
            invocations: Vec::new(),
            failures: Vec::new(),
            dispatch_failures: Vec::new(),
            deferred: Vec::new(),
            iterations: 0,
        }
    }

    /// Returns true if no rule or dispatch failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dispatch_failures.is_empty()
    }
}

enum Work {
    Complete(Completion, Option<RecordId>),
    Dispatch(Invocation),
}

/// Drives flows through an [`AnnotatedEngine`].
pub struct FlowDriver {
    engine: Arc<AnnotatedEngine>,
    config: DriverConfig,
}

impl FlowDriver {
    /// Creates a driver with default limits.
    #[must_use]
    pub fn new(engine: Arc<AnnotatedEngine>) -> Self {
        Self {
            engine,
            config: DriverConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<AnnotatedEngine> {
        &self.engine
    }

    /// Runs a flow from its first completion.
    ///
    /// # Errors
    /// Returns `LimitExceeded` if the flow hits the iteration ceiling, or an
    /// error if the engine's state is unusable.
    pub fn run(&self, initial: Completion) -> Result<FlowReport> {
        let flow = initial.flow.clone();
        info!(flow = %flow, "flow started");
        self.drive(flow, VecDeque::from([Work::Complete(initial, None)]))
    }

    /// Runs a flow from an external invocation, which is logged first.
    ///
    /// # Errors
    /// As [`Self::run`].
    pub fn run_invocation(&self, invocation: Invocation) -> Result<FlowReport> {
        let flow = invocation.flow.clone();
        self.engine.log().append_invocation(invocation.clone(), None)?;
        info!(flow = %flow, "flow started");
        self.drive(flow, VecDeque::from([Work::Dispatch(invocation)]))
    }

    /// Continues the flows of invocations built outside a run, such as by a
    /// pending-queue drain. One report per flow, ordered by flow id.
    ///
    /// # Errors
    /// As [`Self::run`].
    pub fn resume(&self, invocations: Vec<Invocation>) -> Result<Vec<FlowReport>> {
        let mut by_flow: BTreeMap<FlowId, VecDeque<Work>> = BTreeMap::new();
        for invocation in invocations {
            by_flow
                .entry(invocation.flow.clone())
                .or_default()
                .push_back(Work::Dispatch(invocation));
        }
        by_flow
            .into_iter()
            .map(|(flow, queue)| self.drive(flow, queue))
            .collect()
    }

    fn drive(&self, flow: FlowId, mut queue: VecDeque<Work>) -> Result<FlowReport> {
        let mut report = FlowReport::new(flow);

        while let Some(work) = queue.pop_front() {
            if report.iterations >= self.config.max_iterations {
                warn!(
                    flow = %report.flow,
                    limit = self.config.max_iterations,
                    "flow iteration ceiling hit"
                );
                return Err(Error::limit_exceeded(SemanticLimit::MaxFlowIterations {
                    limit: self.config.max_iterations,
                    flow: Some(report.flow.to_string()),
                }));
            }
            report.iterations += 1;

            match work {
                Work::Complete(completion, parent) => {
                    let outcome = self.engine.on_completion(completion.clone(), parent)?;
                    report.completions.push(completion);
                    report.failures.extend(outcome.failures);
                    report.deferred.extend(outcome.deferred);
                    queue.extend(outcome.invocations.into_iter().map(Work::Dispatch));
                }
                Work::Dispatch(invocation) => {
                    match self.dispatch(&invocation)? {
                        Ok(completion) => {
                            queue.push_back(Work::Complete(completion, Some(invocation.id)));
                        }
                        Err(failure) => report.dispatch_failures.push(failure),
                    }
                    for completion in self.escalations(&invocation)? {
                        queue.push_back(Work::Complete(completion, Some(invocation.id)));
                    }
                    report.invocations.push(invocation);
                }
            }
        }

        debug!(
            flow = %report.flow,
            iterations = report.iterations,
            completions = report.completions.len(),
            "flow quiescent"
        );
        Ok(report)
    }

    /// Delivers an invocation, retrying if its rule is retry-safe.
    ///
    /// The outer error is the engine's; the inner one is the delivery's.
    fn dispatch(
        &self,
        invocation: &Invocation,
    ) -> Result<std::result::Result<Completion, DispatchFailure>> {
        let retry_safe = match invocation.rule.as_deref() {
            Some(name) => self
                .engine
                .engine()
                .rule(name)?
                .is_some_and(|r| r.rule().is_retry_safe()),
            None => false,
        };
        let attempts = if retry_safe {
            1 + self.config.dispatch_retries
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.engine.registry().invoke(invocation) {
                Ok(completion) => return Ok(Ok(completion)),
                Err(error) if attempt < attempts => {
                    debug!(record = %invocation.id, attempt, %error, "dispatch failed, retrying");
                }
                Err(error) => {
                    warn!(
                        concept = %invocation.concept,
                        action = %invocation.action,
                        attempts = attempt,
                        %error,
                        "dispatch failed"
                    );
                    return Ok(Err(DispatchFailure {
                        invocation: invocation.clone(),
                        error,
                        attempts: attempt,
                    }));
                }
            }
        }
    }

    /// Conflict completions for writes the target concept escalated.
    fn escalations(&self, invocation: &Invocation) -> Result<Vec<Completion>> {
        let Ok(transport) = self.engine.registry().transport(&invocation.concept) else {
            return Ok(Vec::new());
        };
        transport
            .take_conflicts()
            .iter()
            .map(|info| {
                self.engine.produce_conflict_completion(
                    &invocation.concept,
                    info,
                    invocation.flow.clone(),
                )
            })
            .collect()
    }
}
