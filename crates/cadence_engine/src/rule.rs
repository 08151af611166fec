//! Sync rule IR.
//!
//! A rule says: *when* completions shaped like these trigger patterns exist
//! in a flow, run these clauses (*where*), *then* invoke these actions.
//! Rules are plain data; [`RuleCompiler`] validates them before they reach
//! the engine.

pub mod compiler;

pub use compiler::{CompiledRule, RuleCompiler};

use std::collections::BTreeSet;
use std::fmt;

use cadence_foundation::Value;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::expr::Expr;

// =============================================================================
// Annotations
// =============================================================================

/// Scheduling discipline of a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Annotation {
    /// Fire now; unreachable targets fail the firing. The default.
    Immediate,
    /// Fire now if every target is reachable, otherwise queue until it is.
    Deferred,
    /// Always fire now, without reachability checks.
    LocalOnly,
    /// Dispatching the produced invocations may be retried blindly.
    RetrySafe,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Deferred => write!(f, "deferred"),
            Self::LocalOnly => write!(f, "local-only"),
            Self::RetrySafe => write!(f, "retry-safe"),
        }
    }
}

// =============================================================================
// Trigger Patterns
// =============================================================================

/// How one field of a completion is matched.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldMatch {
    /// The field must equal this value.
    Literal(Value),
    /// Bind the field to a variable; a repeated variable must agree.
    Var(String),
    /// Accept anything, bind nothing.
    Wildcard,
}

impl FieldMatch {
    /// A literal match.
    #[must_use]
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A variable capture.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }
}

/// One `when` pattern: a completion of `concept/action` with these shapes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriggerPattern {
    /// Concept name.
    pub concept: String,
    /// Action name.
    pub action: String,
    /// Required variant; any variant when absent.
    pub variant: Option<String>,
    /// Specs on input fields.
    pub input: Vec<(String, FieldMatch)>,
    /// Specs on output fields.
    pub output: Vec<(String, FieldMatch)>,
}

impl TriggerPattern {
    /// A pattern matching any completion of `concept/action`.
    #[must_use]
    pub fn new(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            action: action.into(),
            variant: None,
            input: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Requires a variant.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Adds an input field spec.
    #[must_use]
    pub fn input(mut self, field: impl Into<String>, spec: FieldMatch) -> Self {
        self.input.push((field.into(), spec));
        self
    }

    /// Adds an output field spec.
    #[must_use]
    pub fn output(mut self, field: impl Into<String>, spec: FieldMatch) -> Self {
        self.output.push((field.into(), spec));
        self
    }

    /// Variables captured by this pattern.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.input
            .iter()
            .chain(&self.output)
            .filter_map(|(_, spec)| match spec {
                FieldMatch::Var(v) => Some(v.as_str()),
                _ => None,
            })
    }
}

// =============================================================================
// Clauses
// =============================================================================

/// A value that is either fixed or read from the binding.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueRef {
    /// A fixed value.
    Literal(Value),
    /// A binding variable.
    Var(String),
}

impl ValueRef {
    /// A literal.
    #[must_use]
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A variable reference.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// The variable read, if any.
    #[must_use]
    pub fn variable(&self) -> Option<&str> {
        match self {
            Self::Var(v) => Some(v),
            Self::Literal(_) => None,
        }
    }
}

/// A lookup against a concept's queryable state.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Query {
    /// Concept to query.
    pub concept: String,
    /// Relation within the concept.
    pub relation: String,
    /// Filter fields passed to the concept.
    pub args: Vec<(String, ValueRef)>,
    /// Row field to variable mappings.
    pub bindings: Vec<(String, String)>,
}

impl Query {
    /// A query of `concept/relation` with no arguments or mappings.
    #[must_use]
    pub fn new(concept: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            relation: relation.into(),
            args: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Adds a filter argument.
    #[must_use]
    pub fn arg(mut self, field: impl Into<String>, value: ValueRef) -> Self {
        self.args.push((field.into(), value));
        self
    }

    /// Maps a row field onto a variable.
    #[must_use]
    pub fn bind(mut self, field: impl Into<String>, var: impl Into<String>) -> Self {
        self.bindings.push((field.into(), var.into()));
        self
    }
}

/// One `where` clause.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Clause {
    /// Adds a computed variable to every binding.
    Bind {
        /// The new variable.
        var: String,
        /// Its value.
        expr: Expr,
    },
    /// Fans each binding out over the rows of a query.
    Query(Query),
    /// Drops bindings for which the expression is falsy.
    Filter(Expr),
}

// =============================================================================
// Targets
// =============================================================================

/// One `then` action.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TargetAction {
    /// Concept to invoke.
    pub concept: String,
    /// Action to invoke.
    pub action: String,
    /// Input fields of the invocation.
    pub fields: Vec<(String, ValueRef)>,
}

impl TargetAction {
    /// A target with no fields.
    #[must_use]
    pub fn new(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            action: action.into(),
            fields: Vec::new(),
        }
    }

    /// Adds an input field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: ValueRef) -> Self {
        self.fields.push((name.into(), value));
        self
    }
}

// =============================================================================
// Rule
// =============================================================================

/// A sync rule.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rule {
    /// Unique name.
    pub name: String,
    /// Scheduling annotations. Empty means immediate.
    pub annotations: BTreeSet<Annotation>,
    /// Trigger patterns, all of which must be satisfied.
    pub patterns: Vec<TriggerPattern>,
    /// Clauses, run in order.
    pub clauses: Vec<Clause>,
    /// Actions invoked per evaluated binding.
    pub targets: Vec<TargetAction>,
}

impl Rule {
    /// An empty rule.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: BTreeSet::new(),
            patterns: Vec::new(),
            clauses: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Adds an annotation.
    #[must_use]
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.insert(annotation);
        self
    }

    /// Adds a trigger pattern.
    #[must_use]
    pub fn when(mut self, pattern: TriggerPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Adds a bind clause.
    #[must_use]
    pub fn bind(mut self, var: impl Into<String>, expr: Expr) -> Self {
        self.clauses.push(Clause::Bind {
            var: var.into(),
            expr,
        });
        self
    }

    /// Adds a query clause.
    #[must_use]
    pub fn query(mut self, query: Query) -> Self {
        self.clauses.push(Clause::Query(query));
        self
    }

    /// Adds a filter clause.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.clauses.push(Clause::Filter(expr));
        self
    }

    /// Adds a target action.
    #[must_use]
    pub fn then(mut self, target: TargetAction) -> Self {
        self.targets.push(target);
        self
    }

    /// Returns true if the rule waits for unreachable targets.
    ///
    /// Local-only overrides deferred.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.annotations.contains(&Annotation::Deferred) && !self.is_local_only()
    }

    /// Returns true if the rule skips reachability checks.
    #[must_use]
    pub fn is_local_only(&self) -> bool {
        self.annotations.contains(&Annotation::LocalOnly)
    }

    /// Returns true if dispatch of its invocations may be retried.
    #[must_use]
    pub fn is_retry_safe(&self) -> bool {
        self.annotations.contains(&Annotation::RetrySafe)
    }
}
