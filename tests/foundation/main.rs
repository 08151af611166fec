#![recursion_limit = "256"]
//! Integration tests for Layer 0: Foundation
//!
//! Tests values, field maps, identifiers, and errors.

mod errors;
