//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tempfile::TempDir;
pub use vigil::{Database, LeakRegistry, VigilConfig};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (shown on failure only).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Poll `condition` every 2ms until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A registry owned by one test, so parallel tests never see each other's
/// leaks.
pub fn private_registry() -> &'static LeakRegistry {
    Box::leak(Box::new(LeakRegistry::new()))
}

// ============================================================================
// TestDb
// ============================================================================

/// A database in a temporary directory with its own leak registry.
pub struct TestDb {
    pub db: Arc<Database>,
    pub registry: &'static LeakRegistry,
    pub dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        Self::with_config(VigilConfig::default())
    }

    pub fn with_write_delay(write_delay_ms: u64) -> Self {
        Self::with_config(VigilConfig {
            write_delay_ms,
            ..VigilConfig::default()
        })
    }

    pub fn with_config(config: VigilConfig) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let registry = private_registry();
        let db = Database::builder()
            .path(dir.path().join("testdb"))
            .config(config)
            .leak_registry(registry)
            .open()
            .unwrap();
        Self { db, registry, dir }
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("testdb")
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = self.db.close();
    }
}
