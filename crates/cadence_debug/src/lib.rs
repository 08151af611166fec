//! Flow tracing for Cadence.
//!
//! This crate provides:
//! - [`FlowTrace`] - The causal tree of one flow, rebuilt from the action log
//! - [`TreeFormatter`] - Indented text rendering of a trace

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod trace;

pub use trace::{FlowTrace, TraceNode, TreeFormatter};
