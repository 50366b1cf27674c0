//! Testing utilities for the log writer
//!
//! - **Recording target**: an in-memory [`DurabilityTarget`] that counts
//!   flushes and checkpoints and can be told to fail
//! - **Denying spawner**: a [`TaskSpawner`] that refuses every task, as a
//!   sandbox would
//!
//! # Example
//!
//! ```ignore
//! use vigil_durability::testing::{FailureMode, RecordingTarget};
//!
//! let target = RecordingTarget::new("orders");
//! target.set_failure(Some(FailureMode::Io));
//! ```
//!
//! [`DurabilityTarget`]: crate::target::DurabilityTarget
//! [`TaskSpawner`]: crate::spawner::TaskSpawner

mod recording_target;

pub use recording_target::{DenyingSpawner, FailureMode, RecordingCounters, RecordingTarget};
