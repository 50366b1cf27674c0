//! Leak Registry Tests
//!
//! Closed resources are never reported, unreachable ones are reported once
//! each in registration order, and unregistration wins against collection.

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

struct Resource;

#[test]
fn closed_resource_is_never_reported() {
    let registry = private_registry();
    let resource = Arc::new(Resource);
    let handle = registry.register(&resource, "closed", || {}, false);

    registry.unregister(&handle);
    drop(resource);
    registry.collect();

    assert!(registry.poll_leaked().is_none());
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn live_resource_is_not_reported() {
    let registry = private_registry();
    let resource = Arc::new(Resource);
    let _handle = registry.register(&resource, "live", || {}, false);

    assert_eq!(registry.collect(), 0);
    assert!(registry.poll_leaked().is_none());
    assert_eq!(registry.live_count(), 1);
}

#[test]
fn unreachable_resource_is_reported_with_trace() {
    let registry = private_registry();
    let resource = Arc::new(Resource);
    registry.register(&resource, "traced", || {}, true);
    drop(resource);

    registry.collect();
    let leaked = registry.poll_leaked().expect("leak should be reported");
    assert_eq!(leaked.label(), "traced");
    let trace = leaked.creation_trace().expect("trace was requested");
    assert!(!trace.is_empty());
    assert!(registry.poll_leaked().is_none());
}

#[test]
fn trace_absent_unless_requested() {
    let registry = private_registry();
    let resource = Arc::new(Resource);
    registry.register(&resource, "untraced", || {}, false);
    drop(resource);

    registry.collect();
    let leaked = registry.poll_leaked().unwrap();
    assert!(leaked.creation_trace().is_none());
}

#[test]
fn leaks_are_reported_once_in_registration_order() {
    let registry = private_registry();
    let resources: Vec<_> = (0..5).map(|_| Arc::new(Resource)).collect();
    for (i, resource) in resources.iter().enumerate() {
        registry.register(resource, format!("r{}", i), || {}, false);
    }
    drop(resources);

    assert_eq!(registry.collect(), 5);
    assert_eq!(registry.collect(), 0);

    let labels: Vec<String> = std::iter::from_fn(|| registry.poll_leaked())
        .map(|handle| handle.label().to_string())
        .collect();
    assert_eq!(labels, vec!["r0", "r1", "r2", "r3", "r4"]);
}

#[test]
fn close_after_enqueue_suppresses_report() {
    let registry = private_registry();
    let resource = Arc::new(Resource);
    let handle = registry.register(&resource, "late close", || {}, false);
    drop(resource);

    assert_eq!(registry.collect(), 1);
    registry.unregister(&handle);

    assert!(registry.poll_leaked().is_none());
    assert_eq!(registry.pending_count(), 0);
}

#[test]
fn reported_handle_carries_close_action() {
    let registry = private_registry();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let resource = Arc::new(Resource);
    registry.register(&resource, "with action", move || {
        c.fetch_add(1, Ordering::SeqCst);
    }, false);
    drop(resource);

    registry.collect();
    let leaked = registry.poll_leaked().unwrap();
    leaked.take_close_action().expect("action present")();
    assert!(leaked.take_close_action().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_register_close_and_poll() {
    let registry = private_registry();
    let threads = 8;
    let per_thread = 200;

    let workers: Vec<_> = (0..threads)
        .map(|t| {
            thread::spawn(move || {
                for i in 0..per_thread {
                    let resource = Arc::new(Resource);
                    let handle = registry.register(&resource, format!("t{}-{}", t, i), || {}, false);
                    // Close the even ones; odd ones leak
                    if i % 2 == 0 {
                        registry.unregister(&handle);
                    }
                }
            })
        })
        .collect();

    let poller = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..200 {
            registry.collect();
            while let Some(handle) = registry.poll_leaked() {
                seen.push(handle.label().to_string());
            }
            thread::yield_now();
        }
        seen
    });

    for worker in workers {
        worker.join().unwrap();
    }
    let mut seen = poller.join().unwrap();
    registry.collect();
    while let Some(handle) = registry.poll_leaked() {
        seen.push(handle.label().to_string());
    }

    assert_eq!(seen.len(), threads * per_thread / 2);
    assert!(seen.iter().all(|label| {
        let i: usize = label.rsplit('-').next().unwrap().parse().unwrap();
        i % 2 == 1
    }));
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), threads * per_thread / 2);
}

#[test]
fn global_registry_reset_forgets_everything() {
    // The only test in this suite touching the global registry
    let registry = LeakRegistry::global();
    let live = Arc::new(Resource);
    let leaked = Arc::new(Resource);
    registry.register(&live, "global live", || {}, false);
    registry.register(&leaked, "global leaked", || {}, false);
    drop(leaked);
    registry.collect();

    registry.reset();
    assert_eq!(registry.live_count(), 0);
    assert_eq!(registry.pending_count(), 0);
    assert!(registry.poll_leaked().is_none());

    // Dropping after reset reports nothing
    drop(live);
    assert_eq!(registry.collect(), 0);
}
