//! Append-only action log for Cadence.
//!
//! This crate provides:
//! - [`Invocation`] and [`Completion`] - The records flowing through syncs
//! - [`ActionLog`] - Per-flow causal log of every record
//! - [`GuardKey`] and [`FiringGuard`] - At-most-once firing bookkeeping

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod guard;
pub mod log;
pub mod record;

pub use guard::{FiringGuard, GuardKey};
pub use log::{ActionLog, AppendOutcome, LogSnapshot};
pub use record::{
    ActionRecord, CONFLICT_VARIANT, Completion, Invocation, OK_VARIANT, RecordKind,
};
