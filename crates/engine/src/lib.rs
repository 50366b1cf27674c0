//! Reference database engine for Vigil
//!
//! A small log-only database that exercises the durability and diagnostics
//! crates the way a full engine would:
//!
//! - `Database`: open/close lifecycle, commits to an append-only log,
//!   checkpoints, and a background log writer per open database
//! - `Session`: a client resource that must be closed, tracked for leaks
//! - `TraceSystem`: the database's diagnostic sink
//! - `FileLog`: the checksummed transaction log file

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod leak;
pub mod log;
pub mod session;
pub mod trace;

pub use database::{Database, DatabaseBuilder, OPEN_DATABASES};
pub use leak::{drain_leaks, LeakReport};
pub use log::{FileLog, LOG_FILE_NAME};
pub use session::Session;
pub use trace::TraceSystem;
