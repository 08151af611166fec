#![recursion_limit = "256"]
//! Integration tests for Layer 1: Action Log
//!
//! Tests appending, causal links, flow partitioning, and the firing guard.

mod action_log;
