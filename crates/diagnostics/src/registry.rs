//! Registry of resources that must be closed explicitly
//!
//! Lifecycle of a tracked resource:
//!
//! 1. `register` records a `Weak` to the resource and adds its handle to the
//!    live set.
//! 2. `unregister` (on explicit close) clears the close action and removes
//!    the handle from the live set. It is never reported after that.
//! 3. `collect` finds live handles whose resource has no strong owner left
//!    and queues each of them once, in registration order.
//! 4. `poll_leaked` drains the queue, skipping handles that were closed in
//!    the meantime, and returns the rest as leaks.
//!
//! Unregistration always wins a race with collection.
//!
//! Lock order: a handle's close-action lock may be held while touching the
//! live set, never the other way around.

use crate::handle::{TrackedResource, TrackedResourceHandle};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

static GLOBAL_REGISTRY: Lazy<LeakRegistry> = Lazy::new(LeakRegistry::new);

struct LiveEntry {
    handle: TrackedResourceHandle,
    referent: Weak<dyn Any + Send + Sync>,
}

/// Live set plus queue of resources that became unreachable while open.
pub struct LeakRegistry {
    live: DashMap<u64, LiveEntry>,
    pending: Mutex<VecDeque<TrackedResourceHandle>>,
    next_id: AtomicU64,
}

impl Default for LeakRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LeakRegistry {
    /// Empty, independent registry
    pub fn new() -> Self {
        Self {
            live: DashMap::new(),
            pending: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static LeakRegistry {
        &GLOBAL_REGISTRY
    }

    /// Start tracking `resource`.
    ///
    /// `close` is how a reporter releases the resource if it leaks. With
    /// `capture_trace`, the current backtrace is rendered to text and kept on
    /// the handle (slow). Keep the returned handle and pass it to
    /// [`unregister`](Self::unregister) when the resource is closed.
    pub fn register<R>(
        &self,
        resource: &Arc<R>,
        label: impl Into<String>,
        close: impl FnOnce() + Send + 'static,
        capture_trace: bool,
    ) -> TrackedResourceHandle
    where
        R: Send + Sync + 'static,
    {
        let creation_trace = capture_trace.then(|| Backtrace::force_capture().to_string());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(TrackedResource::new(
            id,
            label.into(),
            Box::new(close),
            creation_trace,
        ));
        let referent: Weak<dyn Any + Send + Sync> = Arc::downgrade(resource) as Weak<dyn Any + Send + Sync>;
        self.live.insert(
            id,
            LiveEntry {
                handle: Arc::clone(&handle),
                referent,
            },
        );
        handle
    }

    /// Stop tracking a resource that was closed properly.
    ///
    /// Idempotent, and a no-op for handles already returned by
    /// [`poll_leaked`](Self::poll_leaked).
    pub fn unregister(&self, handle: &TrackedResource) {
        let action = {
            let mut action = handle.close_action.lock();
            handle.closed.store(true, Ordering::Release);
            action.take()
        };
        drop(action);
        self.live.remove(&handle.id());
    }

    /// Queue every live handle whose resource is gone.
    ///
    /// This is the collection pass: handles are queued once each, in
    /// registration order. Returns how many were queued.
    pub fn collect(&self) -> usize {
        let mut unreachable: Vec<TrackedResourceHandle> = self
            .live
            .iter()
            .filter(|entry| entry.referent.strong_count() == 0 && !entry.handle.is_closed())
            .filter(|entry| !entry.handle.enqueued.swap(true, Ordering::AcqRel))
            .map(|entry| Arc::clone(&entry.handle))
            .collect();
        if unreachable.is_empty() {
            return 0;
        }
        unreachable.sort_by_key(|handle| handle.id());

        let count = unreachable.len();
        self.pending.lock().extend(unreachable);
        debug!(target: "vigil::leak", count, "Queued unreachable resources");
        count
    }

    /// Next resource that became unreachable without being closed.
    ///
    /// Never blocks. Returns `None` when the queue is empty.
    pub fn poll_leaked(&self) -> Option<TrackedResourceHandle> {
        loop {
            let handle = self.pending.lock().pop_front()?;

            let action = handle.close_action.lock();
            if handle.is_closed() {
                continue;
            }
            if self.live.remove(&handle.id()).is_none() {
                continue;
            }
            drop(action);

            debug!(
                target: "vigil::leak",
                id = handle.id(),
                label = handle.label(),
                "Reporting unclosed resource"
            );
            return Some(handle);
        }
    }

    /// Number of tracked resources not yet closed or reported
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Number of handles waiting in the queue
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Forget every tracked resource and queued handle.
    pub fn reset(&self) {
        self.pending.lock().clear();
        self.live.clear();
    }
}

impl std::fmt::Debug for LeakRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeakRegistry")
            .field("live", &self.live_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}
