//! Per-database diagnostic sink
//!
//! Errors reported by the background writer land here. They are logged
//! through `tracing` under the `vigil::db` target and counted per module.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::error;
use vigil_core::DurabilityError;
use vigil_durability::{DiagnosticSink, TraceModule};

/// Diagnostic sink of one database.
#[derive(Debug)]
pub struct TraceSystem {
    db: String,
    counts: Mutex<HashMap<TraceModule, u64>>,
    last_error: Mutex<Option<String>>,
}

impl TraceSystem {
    /// Sink labelled with the database short name
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            counts: Mutex::new(HashMap::new()),
            last_error: Mutex::new(None),
        }
    }

    /// Errors recorded for `module`
    pub fn error_count(&self, module: TraceModule) -> u64 {
        self.counts.lock().get(&module).copied().unwrap_or(0)
    }

    /// Errors recorded across all modules
    pub fn total_errors(&self) -> u64 {
        self.counts.lock().values().sum()
    }

    /// Message of the most recent error
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub(crate) fn record(&self, module: TraceModule, message: String) {
        *self.counts.lock().entry(module).or_insert(0) += 1;
        *self.last_error.lock() = Some(message);
    }
}

impl DiagnosticSink for TraceSystem {
    fn log_error(&self, module: TraceModule, context: &str, err: &DurabilityError) {
        error!(
            target: "vigil::db",
            db = %self.db,
            module = %module,
            error = %err,
            "{} failed",
            context
        );
        self.record(module, format!("{}: {}", context, err));
    }
}
