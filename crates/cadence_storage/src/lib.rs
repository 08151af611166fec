//! Relation storage and write-conflict resolution for Cadence.
//!
//! This crate provides:
//! - [`ConceptStorage`] - The key-value-per-relation interface
//! - [`MemoryStorage`] - In-memory storage with an optional conflict handler
//! - [`ConflictInfo`] and [`ConflictResolution`] - Conflict descriptions

#![recursion_limit = "256"]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod conflict;
pub mod memory;
pub mod traits;

pub use conflict::{
    ConflictHandler, ConflictInfo, ConflictResolution, WriteOutcome, merge_prefer_incoming,
};
pub use memory::MemoryStorage;
pub use traits::{ConceptStorage, matches_filter};
