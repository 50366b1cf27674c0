//! Database configuration via `vigil.toml`
//!
//! On first open, a default `vigil.toml` is created in the database directory.
//! To change settings, edit the file and reopen the database.

use crate::error::{VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name placed in the database directory.
pub const CONFIG_FILE_NAME: &str = "vigil.toml";

/// Lower bound on any background write delay, in milliseconds.
///
/// A configured delay below this value switches the database to
/// flush-on-commit, and the writer never sleeps for less than this.
pub const MIN_WRITE_DELAY_MS: u64 = 5;

/// Default interval between background log flushes, in milliseconds.
pub const DEFAULT_WRITE_DELAY_MS: u64 = 500;

/// Default log size (bytes) at which a checkpoint becomes due.
pub const DEFAULT_CHECKPOINT_LOG_BYTES: u64 = 1024 * 1024;

/// How the database file is locked against other processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileLockMode {
    /// Exclusive lock held for the lifetime of the database
    #[default]
    Fs,
    /// Lock shared between processes; every writer must checkpoint often
    Serialized,
}

/// Database configuration loaded from `vigil.toml`.
///
/// # Example
///
/// ```toml
/// # Interval between background log flushes (ms).
/// # Values below min_write_delay_ms force a flush on every commit.
/// write_delay_ms = 500
/// file_lock = "fs"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Interval between background log flushes, in milliseconds.
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,
    /// Lower bound on the write delay, in milliseconds.
    #[serde(default = "default_min_write_delay_ms")]
    pub min_write_delay_ms: u64,
    /// File locking mode.
    #[serde(default)]
    pub file_lock: FileLockMode,
    /// Log size in bytes that makes a checkpoint due.
    #[serde(default = "default_checkpoint_log_bytes")]
    pub checkpoint_log_bytes: u64,
    /// Register sessions with the leak registry.
    #[serde(default = "default_true")]
    pub track_open_resources: bool,
    /// Capture a backtrace when a tracked resource is opened (slow).
    #[serde(default)]
    pub capture_open_traces: bool,
}

fn default_write_delay_ms() -> u64 {
    DEFAULT_WRITE_DELAY_MS
}

fn default_min_write_delay_ms() -> u64 {
    MIN_WRITE_DELAY_MS
}

fn default_checkpoint_log_bytes() -> u64 {
    DEFAULT_CHECKPOINT_LOG_BYTES
}

fn default_true() -> bool {
    true
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            write_delay_ms: default_write_delay_ms(),
            min_write_delay_ms: default_min_write_delay_ms(),
            file_lock: FileLockMode::default(),
            checkpoint_log_bytes: default_checkpoint_log_bytes(),
            track_open_resources: true,
            capture_open_traces: false,
        }
    }
}

impl VigilConfig {
    /// Minimum write delay as a `Duration`.
    pub fn min_write_delay(&self) -> Duration {
        Duration::from_millis(self.min_write_delay_ms)
    }

    /// Check values that cannot be expressed in the type.
    ///
    /// # Errors
    ///
    /// Returns an error if `min_write_delay_ms` is zero (a zero sleep would
    /// turn the writer into a busy loop) or `checkpoint_log_bytes` is zero.
    pub fn validate(&self) -> VigilResult<()> {
        if self.min_write_delay_ms == 0 {
            return Err(VigilError::config(
                "min_write_delay_ms must be at least 1",
            ));
        }
        if self.checkpoint_log_bytes == 0 {
            return Err(VigilError::config(
                "checkpoint_log_bytes must be at least 1",
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Vigil database configuration
#
# Interval between background log flushes, in milliseconds.
# Values below min_write_delay_ms make every commit flush the log itself.
write_delay_ms = 500

# Lower bound on any write delay, in milliseconds.
min_write_delay_ms = 5

# File locking: "fs" (exclusive) or "serialized" (shared between processes).
# In serialized mode the background writer checkpoints instead of flushing.
file_lock = "fs"

# Log size in bytes after which a checkpoint is due.
checkpoint_log_bytes = 1048576

# Track sessions so unclosed ones can be reported.
track_open_resources = true

# Record where each tracked session was opened (slow).
capture_open_traces = false
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VigilError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: VigilConfig = toml::from_str(&content).map_err(|e| {
            VigilError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> VigilResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                VigilError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> VigilResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VigilError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            VigilError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
