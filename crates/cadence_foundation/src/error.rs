//! Error types for the Cadence system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::id::RecordId;

/// The main error type for Cadence operations.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an invalid rule error.
    #[must_use]
    pub fn invalid_rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRule {
            rule: rule.into(),
            message: message.into(),
        })
    }

    /// Creates an unknown variable error (rule references a variable nothing binds).
    #[must_use]
    pub fn unknown_variable(rule: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownVariable {
            rule: rule.into(),
            variable: variable.into(),
        })
    }

    /// Creates an unbound variable error (expression evaluated without the variable).
    #[must_use]
    pub fn unbound_variable(variable: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnboundVariable(variable.into()))
    }

    /// Creates an unresolved template variable error.
    #[must_use]
    pub fn unresolved_variable(rule: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnresolvedVariable {
            rule: rule.into(),
            variable: variable.into(),
        })
    }

    /// Creates an evaluation error.
    #[must_use]
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation(message.into()))
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Creates an unreachable-concepts error.
    #[must_use]
    pub fn unreachable(concepts: Vec<String>) -> Self {
        Self::new(ErrorKind::Unreachable(concepts))
    }

    /// Creates a concept-not-registered error.
    #[must_use]
    pub fn concept_not_found(concept: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConceptNotFound(concept.into()))
    }

    /// Creates a query failure error.
    #[must_use]
    pub fn query_failed(
        concept: impl Into<String>,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::QueryFailed {
            concept: concept.into(),
            relation: relation.into(),
            message: message.into(),
        })
    }

    /// Creates a transport failure error.
    #[must_use]
    pub fn transport(concept: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport {
            concept: concept.into(),
            message: message.into(),
        })
    }

    /// Creates a record-not-found error.
    #[must_use]
    pub fn record_not_found(id: RecordId) -> Self {
        Self::new(ErrorKind::RecordNotFound(id))
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Returns true if this error means a concept could not be reached.
    #[must_use]
    pub fn is_availability(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Unreachable(_) | ErrorKind::ConceptNotFound(_)
        )
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// Rule IR is structurally malformed.
    #[error("invalid rule {rule}: {message}")]
    InvalidRule {
        /// The rule name.
        rule: String,
        /// What is wrong with it.
        message: String,
    },

    /// Rule references a variable that no pattern or earlier clause binds.
    #[error("rule {rule} references unknown variable ?{variable}")]
    UnknownVariable {
        /// The rule name.
        rule: String,
        /// The variable name.
        variable: String,
    },

    /// A rule with this name is already registered.
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    /// No rule with this name is registered.
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// Expression referenced a variable absent from the binding.
    #[error("unbound variable: ?{0}")]
    UnboundVariable(String),

    /// Invocation template referenced a variable the binding never resolved.
    #[error("rule {rule} cannot build invocation: ?{variable} is unresolved")]
    UnresolvedVariable {
        /// The rule name.
        rule: String,
        /// The variable name.
        variable: String,
    },

    /// Expression or clause evaluation failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// Type mismatch during expression evaluation.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// The actual type encountered.
        actual: String,
    },

    /// One or more concepts are not currently reachable.
    #[error("unreachable concepts: {}", .0.join(", "))]
    Unreachable(Vec<String>),

    /// No transport is registered for the concept.
    #[error("concept not registered: {0}")]
    ConceptNotFound(String),

    /// A clause query against a concept failed.
    #[error("query {concept}/{relation} failed: {message}")]
    QueryFailed {
        /// The queried concept.
        concept: String,
        /// The queried relation.
        relation: String,
        /// Failure description.
        message: String,
    },

    /// A transport failed to carry out an invocation.
    #[error("transport for {concept} failed: {message}")]
    Transport {
        /// The target concept.
        concept: String,
        /// Failure description.
        message: String,
    },

    /// A record was not found in the log.
    #[error("record not found: {0:?}")]
    RecordNotFound(RecordId),

    /// A record's causal parent belongs to another flow.
    #[error("record {record:?} cannot have parent {parent:?} from another flow")]
    CrossFlowParent {
        /// The record being appended.
        record: RecordId,
        /// The offending parent.
        parent: RecordId,
    },

    /// A different record was already logged under this id.
    #[error("record id {0:?} already used by a different record")]
    DuplicateRecord(RecordId),

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File I/O failed.
    #[error("io error: {0}")]
    Io(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// A flow kept producing invocations past the iteration ceiling.
    MaxFlowIterations {
        /// The configured limit.
        limit: usize,
        /// The flow that exceeded it.
        flow: Option<String>,
    },
    /// Clause evaluation fanned a single match out into too many bindings.
    MaxFanOut {
        /// The configured limit.
        limit: usize,
        /// The rule that exceeded it.
        rule: Option<String>,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxFlowIterations { limit, flow } => {
                write!(f, "max flow iterations ({limit}) exceeded")?;
                if let Some(flow) = flow {
                    write!(f, " in {flow}")?;
                }
                Ok(())
            }
            Self::MaxFanOut { limit, rule } => {
                write!(f, "max fan-out ({limit}) exceeded")?;
                if let Some(rule) = rule {
                    write!(f, " in rule {rule}")?;
                }
                Ok(())
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Rule being processed, if any.
    pub rule: Option<String>,
    /// Flow being processed, if any.
    pub flow: Option<String>,
    /// Processing stages, outermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Sets the flow.
    #[must_use]
    pub fn with_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Adds a stage frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "in rule {rule}")?;
        }
        if let Some(flow) = &self.flow {
            write!(f, " (flow {flow})")?;
        }
        for frame in &self.stack {
            write!(f, "\n  in {frame}")?;
        }
        Ok(())
    }
}

/// Result type alias using Cadence's Error.
pub type Result<T> = std::result::Result<T, Error>;
