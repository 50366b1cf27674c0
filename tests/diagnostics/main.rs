//! Integration tests for leak detection.
//!
//! Registry behavior through the public API, and session leaks reported by a
//! real Database.

#[path = "../common/mod.rs"]
mod common;

mod leak_registry;
mod session_leaks;
