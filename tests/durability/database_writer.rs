//! Database Writer Tests
//!
//! The log writer as wired into a real Database: background syncs,
//! flush-on-commit switching, serialized-lock checkpoints, and reclamation
//! of databases that were never closed.

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;
use vigil::{DurabilityTarget, FileLockMode, LogHandle, MIN_WRITE_DELAY_MS};

#[test]
fn commits_are_synced_by_background_writer() {
    let test_db = TestDb::with_write_delay(10);
    let db = &test_db.db;
    assert!(!db.flush_on_each_commit());

    for i in 0..10u8 {
        db.commit(&[i; 32]).unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || db.log_sync_count() >= 1));
    assert!(db.writer_running());
}

#[test]
fn writer_thread_is_named_after_database() {
    let test_db = TestDb::new();
    assert_eq!(
        test_db.db.writer_thread_name().as_deref(),
        Some("vigil-log-writer-testdb")
    );
}

#[test]
fn write_delay_below_min_syncs_every_commit() {
    let test_db = TestDb::with_write_delay(500);
    let db = &test_db.db;

    db.set_write_delay(MIN_WRITE_DELAY_MS - 1);
    assert!(db.flush_on_each_commit());

    let before = db.log_sync_count();
    db.commit(b"one").unwrap();
    db.commit(b"two").unwrap();
    assert_eq!(db.log_sync_count(), before + 2);

    db.set_write_delay(MIN_WRITE_DELAY_MS);
    assert!(!db.flush_on_each_commit());
}

#[test]
fn serialized_lock_checkpoints_instead_of_flushing() {
    let test_db = TestDb::with_config(VigilConfig {
        file_lock: FileLockMode::Serialized,
        write_delay_ms: 60_000,
        checkpoint_log_bytes: 64,
        ..VigilConfig::default()
    });
    let db = &test_db.db;
    assert!(db.is_serialized_file_lock_mode());

    db.commit(&[1u8; 100]).unwrap();
    // The 60s write delay is ignored in serialized mode
    assert!(wait_until(Duration::from_secs(2), || db.checkpoint_count() >= 1));
    assert_eq!(db.log_size(), 0);
}

#[test]
fn corrupt_log_stops_background_checkpoints() {
    let test_db = TestDb::with_config(VigilConfig {
        file_lock: FileLockMode::Serialized,
        checkpoint_log_bytes: 1_000_000,
        ..VigilConfig::default()
    });
    let db = &test_db.db;
    db.commit(b"record").unwrap();
    db.flush().unwrap();

    // Flip the last payload byte behind the database's back
    let log_path = test_db.db_path().join(vigil_engine::LOG_FILE_NAME);
    let mut bytes = std::fs::read(&log_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&log_path, &bytes).unwrap();

    assert!(db.checkpoint().is_err());
    assert_eq!(db.checkpoint_count(), 0);

    // Let the writer hit the corruption on its own
    db.commit(&[0u8; 1_000_000]).unwrap();
    assert!(wait_until(Duration::from_secs(2), || !db.writer_running()));
    assert!(db.trace().total_errors() >= 1);

    // The database keeps working without the writer
    db.set_write_delay(500);
    assert!(db.flush_on_each_commit());
}

#[test]
fn closing_stops_writer_and_flushes() {
    let test_db = TestDb::with_write_delay(60_000);
    let db = Arc::clone(&test_db.db);
    db.commit(b"pending").unwrap();

    db.close().unwrap();
    assert!(!db.writer_running());
    assert!(db.log().is_none());

    // Everything committed before close is readable after reopen
    let reopened = Database::builder()
        .path(test_db.db_path())
        .leak_registry(test_db.registry)
        .open()
        .unwrap();
    assert_eq!(reopened.recovered_records(), 1);
    reopened.close().unwrap();
}

#[test]
fn unclosed_database_is_reclaimed() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let db = Database::builder()
        .path(dir.path().join("forgotten"))
        .config(VigilConfig {
            write_delay_ms: 10,
            ..VigilConfig::default()
        })
        .leak_registry(private_registry())
        .open()
        .unwrap();
    let log = db.log().unwrap();
    let weak = Arc::downgrade(&db);
    db.commit(b"x").unwrap();

    drop(db);
    assert!(wait_until(Duration::from_secs(2), || weak.upgrade().is_none()));

    // Drop flushed the log on the way out
    log.flush().unwrap();
    assert!(std::fs::metadata(dir.path().join("forgotten").join(vigil_engine::LOG_FILE_NAME))
        .unwrap()
        .len()
        > 0);
}
