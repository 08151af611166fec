#![recursion_limit = "256"]
//! Integration tests for Layer 1: Storage
//!
//! Tests relations, filters, and conflict resolution.

mod relations;
