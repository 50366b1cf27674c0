//! Durability scheduling for Vigil
//!
//! This crate owns the background log writer of an open database:
//!
//! - Target: traits a database implements so the writer can drive it
//!   (`DurabilityTarget`, `LogHandle`, `DiagnosticSink`)
//! - Spawner: how the writer's thread is started, and how refusal is expressed
//! - Writer: the periodic flush/checkpoint loop (`DurabilityScheduler`)
//! - Testing: a recording target and a denying spawner

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod spawner;
pub mod target;
pub mod testing;
pub mod writer;

pub use spawner::{Task, TaskSpawner, ThreadSpawner};
pub use target::{DiagnosticSink, DurabilityTarget, LogHandle, TraceModule};
pub use writer::{
    effective_wait, DurabilityScheduler, SchedulerConfig, MIN_SLEEP_FLOOR, WRITER_THREAD_PREFIX,
};
