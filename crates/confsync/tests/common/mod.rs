//! Shared test utilities for confsync integration tests.
//!
//! This module provides:
//! - `Item`, a small typed config item with a schema and identity function
//! - `TestHarness` for driving a `ConfigSync` from a channel source
//! - helpers for receiving broadcast messages with a timeout

#![allow(dead_code)]

pub mod harness;

pub use harness::*;
