//! Leak detection for Vigil
//!
//! Resources that must be closed explicitly (sessions, cursors, locks) are
//! registered with a [`LeakRegistry`]. The registry keeps only a `Weak`
//! reference to each resource. A collection pass finds resources whose last
//! owner went away without closing them and queues their handles; diagnostics
//! drain that queue with [`LeakRegistry::poll_leaked`].
//!
//! # Example
//!
//! ```ignore
//! let registry = LeakRegistry::global();
//! let session = Arc::new(Session::new());
//! let handle = registry.register(&session, "session#1", || {}, false);
//!
//! // ... on close:
//! registry.unregister(&handle);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handle;
pub mod registry;

pub use handle::{CloseAction, TrackedResource, TrackedResourceHandle};
pub use registry::LeakRegistry;
