//! In-process concepts.
//!
//! A [`LocalConcept`] is a transport whose actions are Rust closures over a
//! [`ConceptStorage`]. Queries read storage relations directly. Writes that
//! the storage escalates are collected and handed to the driver through
//! [`ConceptTransport::take_conflicts`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cadence_engine::{ConceptTransport, Health};
use cadence_foundation::{Error, Fields, Result, Value, fields};
use cadence_log::{Completion, Invocation, OK_VARIANT};
use cadence_storage::{ConceptStorage, ConflictInfo, WriteOutcome};
use tracing::{debug, warn};

/// Variant of the completion produced when an action handler fails.
pub const ERROR_VARIANT: &str = "error";

/// What an action handler returns.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionResult {
    /// Completion variant.
    pub variant: String,
    /// Completion output.
    pub output: Fields,
}

impl ActionResult {
    /// An `ok` result.
    #[must_use]
    pub fn ok(output: Fields) -> Self {
        Self {
            variant: OK_VARIANT.to_string(),
            output,
        }
    }

    /// A result with a named variant.
    #[must_use]
    pub fn variant(variant: impl Into<String>, output: Fields) -> Self {
        Self {
            variant: variant.into(),
            output,
        }
    }
}

/// What a handler can see and touch while running one invocation.
pub struct ActionContext<'a> {
    invocation: &'a Invocation,
    storage: &'a dyn ConceptStorage,
    conflicts: &'a Mutex<Vec<ConflictInfo>>,
}

impl ActionContext<'_> {
    /// The invocation being run.
    #[must_use]
    pub fn invocation(&self) -> &Invocation {
        self.invocation
    }

    /// The invocation input.
    #[must_use]
    pub fn input(&self) -> &Fields {
        &self.invocation.input
    }

    /// The concept's storage.
    #[must_use]
    pub fn storage(&self) -> &dyn ConceptStorage {
        self.storage
    }

    /// Writes a record, recording an escalated conflict for the driver.
    ///
    /// # Errors
    /// Returns an error if the storage fails.
    pub fn put(&self, relation: &str, key: &str, fields: Fields) -> Result<WriteOutcome> {
        let outcome = self.storage.put(relation, key, fields)?;
        if let Some(info) = outcome.escalation() {
            self.conflicts
                .lock()
                .map_err(|_| Error::internal("conflict buffer lock poisoned"))?
                .push(info.clone());
        }
        Ok(outcome)
    }
}

/// An action implementation.
pub type ActionHandler = Box<dyn Fn(&ActionContext<'_>) -> Result<ActionResult> + Send + Sync>;

/// A concept living in this process.
pub struct LocalConcept {
    name: String,
    storage: Arc<dyn ConceptStorage>,
    actions: HashMap<String, ActionHandler>,
    available: AtomicBool,
    conflicts: Mutex<Vec<ConflictInfo>>,
}

impl LocalConcept {
    /// Creates a reachable concept with no actions.
    #[must_use]
    pub fn new(name: impl Into<String>, storage: Arc<dyn ConceptStorage>) -> Self {
        Self {
            name: name.into(),
            storage,
            actions: HashMap::new(),
            available: AtomicBool::new(true),
            conflicts: Mutex::new(Vec::new()),
        }
    }

    /// Adds an action.
    #[must_use]
    pub fn with_action(
        mut self,
        action: impl Into<String>,
        handler: impl Fn(&ActionContext<'_>) -> Result<ActionResult> + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(action.into(), Box::new(handler));
        self
    }

    /// The concept name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backing storage.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ConceptStorage> {
        &self.storage
    }

    /// Simulates the concept going up or down.
    ///
    /// Takes effect on the registry's next health refresh.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if the concept reports itself healthy.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

impl ConceptTransport for LocalConcept {
    fn invoke(&self, invocation: &Invocation) -> Result<Completion> {
        if !self.is_available() {
            return Err(Error::transport(&self.name, "concept is unavailable"));
        }
        let handler = self.actions.get(&invocation.action).ok_or_else(|| {
            Error::transport(&self.name, format!("no action named {}", invocation.action))
        })?;

        let context = ActionContext {
            invocation,
            storage: self.storage.as_ref(),
            conflicts: &self.conflicts,
        };
        match handler(&context) {
            Ok(result) => {
                debug!(
                    concept = %self.name,
                    action = %invocation.action,
                    variant = %result.variant,
                    "action completed"
                );
                Ok(invocation.complete(result.variant, result.output))
            }
            Err(error) => {
                warn!(concept = %self.name, action = %invocation.action, %error, "action failed");
                Ok(invocation.complete(
                    ERROR_VARIANT,
                    fields([("message", Value::from(error.to_string()))]),
                ))
            }
        }
    }

    fn query(&self, relation: &str, filter: Option<&Fields>) -> Result<Vec<Fields>> {
        if !self.is_available() {
            return Err(Error::transport(&self.name, "concept is unavailable"));
        }
        self.storage.find(relation, filter)
    }

    fn health(&self) -> Health {
        if self.is_available() {
            Health::up()
        } else {
            Health::down()
        }
    }

    fn take_conflicts(&self) -> Vec<ConflictInfo> {
        self.conflicts
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default()
    }
}
