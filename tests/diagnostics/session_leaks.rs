//! Session Leak Tests
//!
//! Sessions dropped without close() are reported by the database that
//! opened them and released on report.

use crate::common::*;
use std::sync::Arc;
use std::thread;

#[test]
fn closed_sessions_are_not_reported() {
    let test_db = TestDb::new();
    let session = test_db.db.open_session().unwrap();
    session.commit(b"work").unwrap();
    session.close();
    drop(session);

    assert!(test_db.db.report_leaks().is_empty());
    assert_eq!(test_db.db.open_session_count(), 0);
}

#[test]
fn dropped_session_is_reported_and_released() {
    let test_db = TestDb::new();
    let session = test_db.db.open_session().unwrap();
    let label = session.label().to_string();
    drop(session);
    assert_eq!(test_db.db.open_session_count(), 1);

    let reports = test_db.db.report_leaks();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].label, label);
    assert_eq!(test_db.db.open_session_count(), 0);
    assert_eq!(test_db.db.trace().error_count(vigil::TraceModule::Leak), 1);

    assert!(test_db.db.report_leaks().is_empty());
}

#[test]
fn open_traces_are_captured_when_configured() {
    let test_db = TestDb::with_config(VigilConfig {
        capture_open_traces: true,
        ..VigilConfig::default()
    });
    drop(test_db.db.open_session().unwrap());

    let reports = test_db.db.report_leaks();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].creation_trace.is_some());
}

#[test]
fn untracked_sessions_are_never_reported() {
    let test_db = TestDb::with_config(VigilConfig {
        track_open_resources: false,
        ..VigilConfig::default()
    });
    drop(test_db.db.open_session().unwrap());

    assert!(test_db.db.report_leaks().is_empty());
    assert_eq!(test_db.registry.live_count(), 0);
}

#[test]
fn leaks_from_many_threads_are_each_reported_once() {
    let test_db = TestDb::new();
    let db = Arc::clone(&test_db.db);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..25 {
                    let session = db.open_session().unwrap();
                    session.commit(b"x").unwrap();
                    if i % 5 != 0 {
                        session.close();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // open_session drains as it goes, so leaks are spread over many reports
    db.report_leaks();
    assert_eq!(db.trace().error_count(vigil::TraceModule::Leak), 4 * 5);
    assert_eq!(test_db.registry.live_count(), 0);
    assert_eq!(db.open_session_count(), 0);
}

#[test]
fn dropped_sessions_do_not_accumulate() {
    let test_db = TestDb::new();
    for _ in 0..1000 {
        drop(test_db.db.open_session().unwrap());
    }
    assert!(test_db.registry.live_count() <= 1);
    assert!(test_db.db.open_session_count() <= 1);

    test_db.db.close().unwrap();
    assert_eq!(test_db.registry.live_count(), 0);
    assert_eq!(test_db.db.open_session_count(), 0);
    assert_eq!(test_db.db.trace().error_count(vigil::TraceModule::Leak), 1000);
}

#[test]
fn session_outliving_database_fails_cleanly() {
    let test_db = TestDb::new();
    let session = test_db.db.open_session().unwrap();
    test_db.db.close().unwrap();

    assert!(test_db.db.open_session().is_err());
    assert!(session.commit(b"late").is_err());
    session.close();
    assert!(session.is_closed());
}
