//! Collaborator traits driven by the background log writer
//!
//! The writer never owns its target. It holds a `Weak` reference and
//! re-resolves it on every tick, so a database that is dropped without an
//! explicit close still gets reclaimed.

use std::fmt;
use std::sync::Arc;
use vigil_core::{DurabilityError, DurabilityResult};

/// Trace module an error is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceModule {
    /// Transaction log flushing
    Log,
    /// Checkpointing
    Checkpoint,
    /// Resource tracking
    Leak,
}

impl TraceModule {
    /// Lowercase name used in log output
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceModule::Log => "log",
            TraceModule::Checkpoint => "checkpoint",
            TraceModule::Leak => "leak",
        }
    }
}

impl fmt::Display for TraceModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transaction log of a database.
pub trait LogHandle: Send + Sync {
    /// Force everything written so far to durable storage.
    fn flush(&self) -> DurabilityResult<()>;
}

/// Where a database records its own diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Record a failure raised while running `context` (e.g. `"flush"`).
    fn log_error(&self, module: TraceModule, context: &str, error: &DurabilityError);
}

/// A database as seen by the background log writer.
///
/// Implementations must tolerate `flush` and `checkpoint_if_required` being
/// called from the writer thread while transactions run on other threads.
pub trait DurabilityTarget: Send + Sync {
    /// Short name used to label the writer thread.
    fn short_name(&self) -> String;

    /// Whether the file lock is shared between processes.
    fn is_serialized_file_lock_mode(&self) -> bool;

    /// Write a checkpoint if enough log has accumulated.
    fn checkpoint_if_required(&self) -> DurabilityResult<()>;

    /// The transaction log, or `None` once the log has been closed.
    fn log(&self) -> Option<Arc<dyn LogHandle>>;

    /// The diagnostic sink, if the target has one.
    fn diagnostic_sink(&self) -> Option<Arc<dyn DiagnosticSink>>;

    /// Switch synchronous flush-on-commit on or off.
    fn set_flush_on_each_commit(&self, enabled: bool);
}
