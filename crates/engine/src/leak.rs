//! Draining the leak registry into reports

use std::time::Duration;
use tracing::warn;
use vigil_diagnostics::LeakRegistry;

/// A resource that was dropped without being closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakReport {
    /// Registry id of the resource
    pub id: u64,
    /// Description given at registration
    pub label: String,
    /// Where the resource was opened, if traces were captured
    pub creation_trace: Option<String>,
    /// How long the resource was tracked
    pub age: Duration,
}

/// Run a collection pass and drain every leak from `registry`.
///
/// Each leak is logged and released through its close action.
pub fn drain_leaks(registry: &LeakRegistry) -> Vec<LeakReport> {
    registry.collect();

    let mut reports = Vec::new();
    while let Some(handle) = registry.poll_leaked() {
        match handle.creation_trace() {
            Some(trace) => warn!(
                target: "vigil::leak",
                id = handle.id(),
                label = handle.label(),
                "Unclosed resource opened at:\n{}",
                trace
            ),
            None => warn!(
                target: "vigil::leak",
                id = handle.id(),
                label = handle.label(),
                "Unclosed resource (enable capture_open_traces to see where it was opened)"
            ),
        }
        if let Some(close) = handle.take_close_action() {
            close();
        }
        reports.push(LeakReport {
            id: handle.id(),
            label: handle.label().to_string(),
            creation_trace: handle.creation_trace().map(str::to_string),
            age: handle.age(),
        });
    }
    reports
}
