//! Cadence - Reactive synchronization of independent concepts
//!
//! This crate re-exports all layers of the Cadence system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 4: cadence_debug      - Flow traces and tree rendering
//! Layer 3: cadence_runtime    - Flow driver, local concepts, snapshots
//! Layer 2: cadence_engine     - Rules, matching, clauses, sync and annotated engines
//! Layer 1: cadence_log        - Action log and firing guard
//!          cadence_storage    - Concept storage and write conflicts
//! Layer 0: cadence_foundation - Core types (Value, RecordId, FlowId, Error)
//! ```

pub use cadence_debug as debug;
pub use cadence_engine as engine;
pub use cadence_foundation as foundation;
pub use cadence_log as log;
pub use cadence_runtime as runtime;
pub use cadence_storage as storage;
