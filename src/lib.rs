//! Vigil - background log flushing and leak detection for embedded databases
//!
//! Vigil provides the two pieces of housekeeping every embedded engine needs
//! once it has a transaction log and client-held resources:
//!
//! - A background log writer per open database that flushes the log (or
//!   checkpoints, under serialized file locking) every write delay, without
//!   keeping the database alive
//! - A leak registry that reports sessions, cursors, and locks dropped
//!   without being closed
//!
//! # Quick Start
//!
//! ```ignore
//! use vigil::Database;
//!
//! let db = Database::open("/data/orders")?;
//! let session = db.open_session()?;
//! session.commit(b"insert ...")?;
//! session.close();
//!
//! for leak in db.report_leaks() {
//!     eprintln!("unclosed: {}", leak.label);
//! }
//! db.close()?;
//! ```

pub use vigil_core::{
    DurabilityError, DurabilityResult, FileLockMode, VigilConfig, VigilError, VigilResult,
    MIN_WRITE_DELAY_MS,
};
pub use vigil_diagnostics::{CloseAction, LeakRegistry, TrackedResource, TrackedResourceHandle};
pub use vigil_durability::{
    DiagnosticSink, DurabilityScheduler, DurabilityTarget, LogHandle, SchedulerConfig,
    TaskSpawner, ThreadSpawner, TraceModule,
};
pub use vigil_engine::{Database, DatabaseBuilder, LeakReport, Session};
