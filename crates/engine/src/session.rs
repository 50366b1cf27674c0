//! Sessions: the resource a client holds while talking to a database
//!
//! A session must be closed with [`Session::close`]. Dropping the last
//! reference without closing it is a leak: the database's leak registry
//! reports it on the next [`Database::report_leaks`] and releases it then.
//!
//! [`Database::report_leaks`]: crate::Database::report_leaks

use crate::database::Database;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use vigil_core::{VigilError, VigilResult};
use vigil_diagnostics::{LeakRegistry, TrackedResourceHandle};

/// An open session on a database.
pub struct Session {
    id: u64,
    label: String,
    db: Weak<Database>,
    closed: AtomicBool,
    registry: &'static LeakRegistry,
    tracking: Mutex<Option<TrackedResourceHandle>>,
}

impl Session {
    pub(crate) fn new(id: u64, label: String, db: Weak<Database>, registry: &'static LeakRegistry) -> Self {
        Self {
            id,
            label,
            db,
            closed: AtomicBool::new(false),
            registry,
            tracking: Mutex::new(None),
        }
    }

    pub(crate) fn set_tracking(&self, handle: TrackedResourceHandle) {
        *self.tracking.lock() = Some(handle);
    }

    /// Session id, unique within its database
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Description used in leak reports
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Commit `payload` through this session.
    pub fn commit(&self, payload: &[u8]) -> VigilResult<u64> {
        if self.is_closed() {
            return Err(VigilError::invalid_operation(format!(
                "{} is closed",
                self.label
            )));
        }
        let db = self
            .db
            .upgrade()
            .ok_or_else(|| VigilError::Closed(self.label.clone()))?;
        db.commit(payload)
    }

    /// Close the session. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.tracking.lock().take() {
            self.registry.unregister(&handle);
        }
        if let Some(db) = self.db.upgrade() {
            db.release_session(self.id);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}
