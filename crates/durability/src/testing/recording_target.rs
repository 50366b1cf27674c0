//! In-memory durability target that records every call

use crate::spawner::{Task, TaskSpawner};
use crate::target::{DiagnosticSink, DurabilityTarget, LogHandle, TraceModule};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use vigil_core::{DurabilityError, DurabilityResult};

/// Failure injected into flush and checkpoint calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Return an I/O error
    Io,
    /// Panic inside the call
    Panic,
    /// Return a corruption error
    Corruption,
}

/// Call counters shared between a target and its log.
///
/// Tests hold on to these after dropping the target itself.
#[derive(Debug, Default)]
pub struct RecordingCounters {
    flushes: AtomicU64,
    checkpoints: AtomicU64,
    failure: Mutex<Option<FailureMode>>,
    last_thread_name: Mutex<Option<String>>,
}

impl RecordingCounters {
    /// Number of flush calls, failed ones included
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of checkpoint calls, failed ones included
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints.load(Ordering::SeqCst)
    }

    fn record_call(&self, counter: &AtomicU64, what: &str) -> DurabilityResult<()> {
        *self.last_thread_name.lock() = std::thread::current().name().map(str::to_string);
        counter.fetch_add(1, Ordering::SeqCst);
        let failure = *self.failure.lock();
        match failure {
            None => Ok(()),
            Some(FailureMode::Io) => Err(DurabilityError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected {} failure", what),
            ))),
            Some(FailureMode::Corruption) => Err(DurabilityError::corruption(format!(
                "injected {} corruption",
                what
            ))),
            Some(FailureMode::Panic) => panic!("injected {} panic", what),
        }
    }
}

struct RecordingLog {
    counters: Arc<RecordingCounters>,
}

impl LogHandle for RecordingLog {
    fn flush(&self) -> DurabilityResult<()> {
        self.counters.record_call(&self.counters.flushes, "flush")
    }
}

#[derive(Default)]
struct RecordingSink {
    errors: Mutex<Vec<(TraceModule, String, String)>>,
}

impl DiagnosticSink for RecordingSink {
    fn log_error(&self, module: TraceModule, context: &str, error: &DurabilityError) {
        self.errors
            .lock()
            .push((module, context.to_string(), error.to_string()));
    }
}

/// Durability target that records calls instead of touching disk.
pub struct RecordingTarget {
    name: String,
    serialized: AtomicBool,
    flush_on_each_commit: AtomicBool,
    log_open: AtomicBool,
    counters: Arc<RecordingCounters>,
    log: Arc<RecordingLog>,
    sink: Arc<RecordingSink>,
}

impl RecordingTarget {
    /// New target with an open log and no injected failure
    pub fn new(name: &str) -> Arc<Self> {
        let counters = Arc::new(RecordingCounters::default());
        Arc::new(Self {
            name: name.to_string(),
            serialized: AtomicBool::new(false),
            flush_on_each_commit: AtomicBool::new(false),
            log_open: AtomicBool::new(true),
            log: Arc::new(RecordingLog {
                counters: Arc::clone(&counters),
            }),
            counters,
            sink: Arc::new(RecordingSink::default()),
        })
    }

    /// Counters that outlive the target
    pub fn counters(&self) -> Arc<RecordingCounters> {
        Arc::clone(&self.counters)
    }

    /// Switch serialized file locking on or off
    pub fn set_serialized(&self, serialized: bool) {
        self.serialized.store(serialized, Ordering::SeqCst);
    }

    /// Make `log()` return `None` when `open` is false
    pub fn set_log_open(&self, open: bool) {
        self.log_open.store(open, Ordering::SeqCst);
    }

    /// Inject a failure into every following call, or clear it
    pub fn set_failure(&self, failure: Option<FailureMode>) {
        *self.counters.failure.lock() = failure;
    }

    /// Number of flush calls
    pub fn flush_count(&self) -> u64 {
        self.counters.flushes()
    }

    /// Number of checkpoint calls
    pub fn checkpoint_count(&self) -> u64 {
        self.counters.checkpoints()
    }

    /// Current flush-on-commit setting
    pub fn flush_on_each_commit(&self) -> bool {
        self.flush_on_each_commit.load(Ordering::SeqCst)
    }

    /// Name of the thread that made the latest call
    pub fn last_thread_name(&self) -> Option<String> {
        self.counters.last_thread_name.lock().clone()
    }

    /// Errors received by the diagnostic sink: (module, context, message)
    pub fn reported_errors(&self) -> Vec<(TraceModule, String, String)> {
        self.sink.errors.lock().clone()
    }
}

impl DurabilityTarget for RecordingTarget {
    fn short_name(&self) -> String {
        self.name.clone()
    }

    fn is_serialized_file_lock_mode(&self) -> bool {
        self.serialized.load(Ordering::SeqCst)
    }

    fn checkpoint_if_required(&self) -> DurabilityResult<()> {
        self.counters
            .record_call(&self.counters.checkpoints, "checkpoint")
    }

    fn log(&self) -> Option<Arc<dyn LogHandle>> {
        if self.log_open.load(Ordering::SeqCst) {
            Some(Arc::clone(&self.log) as Arc<dyn LogHandle>)
        } else {
            None
        }
    }

    fn diagnostic_sink(&self) -> Option<Arc<dyn DiagnosticSink>> {
        Some(Arc::clone(&self.sink) as Arc<dyn DiagnosticSink>)
    }

    fn set_flush_on_each_commit(&self, enabled: bool) {
        self.flush_on_each_commit.store(enabled, Ordering::SeqCst);
    }
}

/// Spawner that refuses every task, like a sandbox that forbids threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyingSpawner;

impl TaskSpawner for DenyingSpawner {
    fn spawn(&self, name: String, _task: Task) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("thread creation denied for '{}'", name),
        ))
    }
}
