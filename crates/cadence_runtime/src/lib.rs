//! Flow driver, in-process concepts, and snapshots for Cadence.
//!
//! This crate provides:
//! - [`FlowDriver`] - Dispatches invocations and feeds completions back until a flow settles
//! - [`LocalConcept`] - A concept transport backed by closures and a storage instance
//! - [`EngineLink`] - An upstream link into another engine in the same process
//! - [`serialize`] - `MessagePack` snapshots of engine state

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod driver;
pub mod link;
pub mod local;
pub mod serialize;

pub use driver::{
    DEFAULT_DISPATCH_RETRIES, DEFAULT_MAX_ITERATIONS, DispatchFailure, DriverConfig, FlowDriver,
    FlowReport,
};
pub use link::EngineLink;
pub use local::{ActionContext, ActionHandler, ActionResult, ERROR_VARIANT, LocalConcept};
pub use serialize::{from_bytes, load_engine, load_from_file, save_engine, save_to_file, to_bytes};
