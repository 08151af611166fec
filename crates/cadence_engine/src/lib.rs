//! Sync rules and the engines that fire them, for Cadence.
//!
//! This crate provides:
//! - [`Rule`] and [`RuleCompiler`] - Rule IR and registration-time validation
//! - [`PatternMatcher`] - Trigger matching over a flow's history
//! - [`ClauseEvaluator`] - Query, bind, and filter clauses
//! - [`InvocationBuilder`] - Bindings to invocations
//! - [`ConceptRegistry`] - Concept transports and reachability
//! - [`SyncEngine`] - Match, guard, evaluate, build, log
//! - [`AnnotatedEngine`] - Immediate, deferred, and local-only scheduling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod annotated;
pub mod clause;
pub mod config;
pub mod escalation;
pub mod expr;
pub mod hierarchy;
pub mod index;
pub mod invocation;
pub mod pattern;
pub mod pending;
pub mod rule;
pub mod sync;
pub mod transport;

pub use annotated::{AnnotatedEngine, AnnotatedOutcome, DrainReport, EngineSnapshot};
pub use clause::{ClauseEvaluator, QuerySource};
pub use config::EngineConfig;
pub use escalation::{CONFLICT_ACTION, conflict_completion};
pub use expr::{BinaryOp, Expr};
pub use hierarchy::{CompletionForwarder, Outbox, UpstreamLink};
pub use index::RuleIndex;
pub use invocation::InvocationBuilder;
pub use pattern::{Binding, PatternMatcher, match_pattern};
pub use pending::{PendingId, PendingQueue, PendingSyncEntry};
pub use rule::{
    Annotation, Clause, CompiledRule, FieldMatch, Query, Rule, RuleCompiler, TargetAction,
    TriggerPattern, ValueRef,
};
pub use sync::{RuleFailure, SyncEngine, SyncOutcome};
pub use transport::{AvailabilityChange, ConceptRegistry, ConceptTransport, Health};
