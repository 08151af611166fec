//! Core values, identifiers, and error types for Cadence.
//!
//! This crate provides:
//! - [`Value`] - The dynamic value type carried through syncs
//! - [`Fields`] - Field name to value maps
//! - [`RecordId`], [`FlowId`], [`Timestamp`] - Identity and time
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod error;
pub mod id;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use error::{Error, ErrorContext, ErrorKind, Result, SemanticLimit};
pub use id::{FlowId, RecordId, Timestamp};
pub use value::{Fields, Value, fields};
