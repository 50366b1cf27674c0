//! Per-resource tracking record

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Releases a resource that was never closed.
pub type CloseAction = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle returned by [`LeakRegistry::register`].
///
/// [`LeakRegistry::register`]: crate::LeakRegistry::register
pub type TrackedResourceHandle = Arc<TrackedResource>;

/// Tracking record of one resource.
///
/// The record never holds the resource itself. The creation trace is
/// rendered to text when the resource is registered.
pub struct TrackedResource {
    id: u64,
    label: String,
    creation_trace: Option<String>,
    registered_at: Instant,
    // Guarded together with `closed`: poll_leaked holds this lock while it
    // decides, so an unregister cannot slip in between.
    pub(crate) close_action: Mutex<Option<CloseAction>>,
    pub(crate) closed: AtomicBool,
    pub(crate) enqueued: AtomicBool,
}

impl TrackedResource {
    pub(crate) fn new(
        id: u64,
        label: String,
        close_action: CloseAction,
        creation_trace: Option<String>,
    ) -> Self {
        Self {
            id,
            label,
            creation_trace,
            registered_at: Instant::now(),
            close_action: Mutex::new(Some(close_action)),
            closed: AtomicBool::new(false),
            enqueued: AtomicBool::new(false),
        }
    }

    /// Process-unique id, assigned in registration order
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable description given at registration
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Backtrace captured at registration, if requested
    pub fn creation_trace(&self) -> Option<&str> {
        self.creation_trace.as_deref()
    }

    /// Time since registration
    pub fn age(&self) -> Duration {
        self.registered_at.elapsed()
    }

    /// Whether the resource was closed explicitly
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Take the close action so a reporter can release a leaked resource.
    ///
    /// Returns `None` after unregistration or if already taken.
    pub fn take_close_action(&self) -> Option<CloseAction> {
        self.close_action.lock().take()
    }
}

impl fmt::Debug for TrackedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedResource")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .field("has_trace", &self.creation_trace.is_some())
            .finish()
    }
}
