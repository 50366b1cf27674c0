//! Core types for Vigil
//!
//! This crate defines the foundational types shared by the other crates:
//! - Error: durability and engine error types
//! - Config: `vigil.toml` configuration and write-delay constants

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;

pub use config::{
    FileLockMode, VigilConfig, CONFIG_FILE_NAME, DEFAULT_CHECKPOINT_LOG_BYTES,
    DEFAULT_WRITE_DELAY_MS, MIN_WRITE_DELAY_MS,
};
pub use error::{DurabilityError, DurabilityResult, VigilError, VigilResult};
