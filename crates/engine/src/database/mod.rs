//! Database struct and open/close logic
//!
//! A `Database` owns one directory containing `vigil.toml` and the
//! transaction log `vigil.log`. Opening it:
//!
//! 1. Loads (or writes) the config
//! 2. Opens the log and verifies existing records
//! 3. Starts the background log writer, which holds only a weak reference
//! 4. Registers the instance in the global registry of open databases
//!
//! Closing stops the writer, flushes the log, and deregisters. A database
//! dropped without `close()` does the same on a best-effort basis.
//!
//! If the writer thread cannot be started, the database falls back to
//! flushing the log on every commit.

mod builder;
mod registry;

pub use builder::DatabaseBuilder;
pub use registry::OPEN_DATABASES;

use crate::leak::{drain_leaks, LeakReport};
use crate::log::{FileLog, LOG_FILE_NAME};
use crate::session::Session;
use crate::trace::TraceSystem;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{info, warn};
use vigil_core::{
    DurabilityResult, FileLockMode, VigilConfig, VigilError, VigilResult, CONFIG_FILE_NAME,
};
use vigil_diagnostics::LeakRegistry;
use vigil_durability::{
    DiagnosticSink, DurabilityScheduler, DurabilityTarget, LogHandle, SchedulerConfig,
    TaskSpawner, ThreadSpawner, TraceModule,
};

/// An open database with a background log writer.
///
/// Create one with [`Database::open`] or [`Database::builder`].
pub struct Database {
    name: String,
    data_dir: PathBuf,
    config: VigilConfig,
    log: RwLock<Option<Arc<FileLog>>>,
    trace: Arc<TraceSystem>,
    writer: Mutex<Option<DurabilityScheduler>>,
    flush_on_each_commit: AtomicBool,
    open: AtomicBool,
    /// Commits take this shared; a checkpoint takes it exclusively so no
    /// record is appended between verification and truncation.
    commit_gate: RwLock<()>,
    commits: AtomicU64,
    checkpoints: AtomicU64,
    recovered_records: usize,
    leak_registry: &'static LeakRegistry,
    sessions: DashMap<u64, String>,
    next_session: AtomicU64,
}

impl Database {
    /// Open (or create) the database in `path` with its `vigil.toml`.
    ///
    /// Opening a directory that is already open returns the same instance.
    pub fn open<P: AsRef<Path>>(path: P) -> VigilResult<Arc<Self>> {
        Self::open_internal(
            path.as_ref().to_path_buf(),
            None,
            LeakRegistry::global(),
            None,
        )
    }

    /// Builder for non-default setups
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub(crate) fn open_internal(
        path: PathBuf,
        config: Option<VigilConfig>,
        leak_registry: &'static LeakRegistry,
        spawner: Option<&dyn TaskSpawner>,
    ) -> VigilResult<Arc<Self>> {
        std::fs::create_dir_all(&path)?;
        let data_dir = path.canonicalize()?;

        let mut registry = OPEN_DATABASES.lock();
        if let Some(existing) = registry.get(&data_dir).and_then(Weak::upgrade) {
            if existing.is_open() {
                let config_ignored = config.as_ref().map_or(false, |c| *c != existing.config);
                let registry_ignored = !std::ptr::eq(leak_registry, existing.leak_registry);
                if config_ignored || registry_ignored || spawner.is_some() {
                    warn!(
                        target: "vigil::db",
                        db = %existing.name,
                        config_ignored,
                        registry_ignored,
                        spawner_ignored = spawner.is_some(),
                        "Database already open; returning existing instance with its own settings"
                    );
                }
                return Ok(existing);
            }
        }

        let config = match config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => {
                let config_path = data_dir.join(CONFIG_FILE_NAME);
                VigilConfig::write_default_if_missing(&config_path)?;
                VigilConfig::from_file(&config_path)?
            }
        };

        let name = data_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "db".to_string());

        let log = FileLog::open(&data_dir.join(LOG_FILE_NAME))?;
        let recovered_records = match log.read_records() {
            Ok(records) => records.len(),
            Err(e) => {
                warn!(
                    target: "vigil::db",
                    db = %name,
                    error = %e,
                    "Log verification failed; next checkpoint will report it"
                );
                0
            }
        };

        let db = Arc::new(Self {
            trace: Arc::new(TraceSystem::new(name.clone())),
            name,
            data_dir: data_dir.clone(),
            log: RwLock::new(Some(Arc::new(log))),
            writer: Mutex::new(None),
            flush_on_each_commit: AtomicBool::new(false),
            open: AtomicBool::new(true),
            commit_gate: RwLock::new(()),
            commits: AtomicU64::new(recovered_records as u64),
            checkpoints: AtomicU64::new(0),
            recovered_records,
            leak_registry,
            sessions: DashMap::new(),
            next_session: AtomicU64::new(0),
            config,
        });

        registry.insert(data_dir, Arc::downgrade(&db));
        drop(registry);

        let target: Weak<dyn DurabilityTarget> = Arc::downgrade(&db) as Weak<dyn DurabilityTarget>;
        let scheduler_config = SchedulerConfig {
            min_write_delay: db.config.min_write_delay(),
        };
        let default_spawner = ThreadSpawner::new();
        let spawner = spawner.unwrap_or(&default_spawner);
        match DurabilityScheduler::create_with(target, db.config.write_delay_ms, scheduler_config, spawner) {
            Some(writer) => {
                writer.set_write_delay(db.config.write_delay_ms);
                *db.writer.lock() = Some(writer);
            }
            None => db.set_flush_on_each_commit(true),
        }

        info!(
            target: "vigil::db",
            db = %db.name,
            recovered_records,
            write_delay_ms = db.config.write_delay_ms,
            flush_on_each_commit = db.flush_on_each_commit(),
            "Database opened"
        );
        Ok(db)
    }

    /// Short name (last path component)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical database directory
    pub fn path(&self) -> &Path {
        &self.data_dir
    }

    /// Effective configuration
    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Diagnostic sink of this database
    pub fn trace(&self) -> &TraceSystem {
        &self.trace
    }

    /// Whether `close()` has not been called yet
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Whether every commit syncs the log itself
    pub fn flush_on_each_commit(&self) -> bool {
        self.flush_on_each_commit.load(Ordering::Acquire)
    }

    /// Whether the background log writer is still running
    pub fn writer_running(&self) -> bool {
        self.writer
            .lock()
            .as_ref()
            .map_or(false, |writer| !writer.is_finished())
    }

    /// Name of the writer thread, if one was started
    pub fn writer_thread_name(&self) -> Option<String> {
        self.writer
            .lock()
            .as_ref()
            .map(|writer| writer.thread_name().to_string())
    }

    /// Records found in the log when the database was opened
    pub fn recovered_records(&self) -> usize {
        self.recovered_records
    }

    /// Commits since creation of the log, recovered ones included
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    /// Checkpoints completed since open
    pub fn checkpoint_count(&self) -> u64 {
        self.checkpoints.load(Ordering::Acquire)
    }

    /// Current log size in bytes, or 0 once closed
    pub fn log_size(&self) -> u64 {
        self.log.read().as_ref().map_or(0, |log| log.size())
    }

    /// Log syncs performed since open, or 0 once closed
    pub fn log_sync_count(&self) -> u64 {
        self.log.read().as_ref().map_or(0, |log| log.sync_count())
    }

    fn current_log(&self) -> VigilResult<Arc<FileLog>> {
        self.log
            .read()
            .clone()
            .ok_or_else(|| VigilError::Closed(self.name.clone()))
    }

    /// Append `payload` to the log.
    ///
    /// Returns the commit sequence number. In flush-on-commit mode the log is
    /// synced before returning; otherwise the background writer syncs it.
    pub fn commit(&self, payload: &[u8]) -> VigilResult<u64> {
        let log = self.current_log()?;
        let _gate = self.commit_gate.read();
        log.append(payload)?;
        if self.flush_on_each_commit() {
            log.sync()?;
        }
        Ok(self.commits.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Sync the log now.
    pub fn flush(&self) -> VigilResult<()> {
        self.current_log()?.flush()?;
        Ok(())
    }

    /// Verify, sync, and truncate the log.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if a log record fails verification; the log is
    /// left untouched in that case.
    pub fn checkpoint(&self) -> DurabilityResult<()> {
        let _gate = self.commit_gate.write();
        let Some(log) = self.log.read().clone() else {
            return Ok(());
        };
        let records = log.read_records()?;
        log.sync()?;
        log.truncate()?;
        let checkpoints = self.checkpoints.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            target: "vigil::db",
            db = %self.name,
            records = records.len(),
            checkpoints,
            "Checkpoint complete"
        );
        Ok(())
    }

    /// Change the background write delay at runtime.
    ///
    /// Delays below `min_write_delay_ms` switch to flush-on-commit. Without a
    /// running writer, flush-on-commit stays on whatever the delay.
    pub fn set_write_delay(&self, write_delay_ms: u64) {
        let writer = self.writer.lock();
        match writer.as_ref() {
            Some(writer) if !writer.is_finished() => writer.set_write_delay(write_delay_ms),
            _ => self.set_flush_on_each_commit(true),
        }
    }

    /// Open a session tracked by the leak registry.
    ///
    /// Sessions leaked since the last drain are reported and released first,
    /// so the registry does not grow with sessions nobody closed.
    pub fn open_session(self: &Arc<Self>) -> VigilResult<Arc<Session>> {
        if !self.is_open() {
            return Err(VigilError::Closed(self.name.clone()));
        }
        if self.config.track_open_resources {
            self.report_leaks();
        }
        let id = self.next_session.fetch_add(1, Ordering::AcqRel) + 1;
        let label = format!("session#{} on {}", id, self.name);
        let session = Arc::new(Session::new(
            id,
            label.clone(),
            Arc::downgrade(self),
            self.leak_registry,
        ));
        self.sessions.insert(id, label.clone());

        if self.config.track_open_resources {
            let db = Arc::downgrade(self);
            let handle = self.leak_registry.register(
                &session,
                label,
                move || {
                    if let Some(db) = db.upgrade() {
                        db.release_session(id);
                    }
                },
                self.config.capture_open_traces,
            );
            session.set_tracking(handle);
        }
        Ok(session)
    }

    pub(crate) fn release_session(&self, id: u64) {
        self.sessions.remove(&id);
    }

    /// Sessions opened and not yet closed or reclaimed
    pub fn open_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Report and release sessions that were dropped without `close()`.
    ///
    /// Drains the leak registry this database tracks sessions in, so leaks of
    /// other databases sharing that registry are reported here too.
    pub fn report_leaks(&self) -> Vec<LeakReport> {
        let reports = drain_leaks(self.leak_registry);
        for report in &reports {
            self.trace
                .record(TraceModule::Leak, format!("unclosed: {}", report.label));
        }
        reports
    }

    /// Stop the writer, flush the log, report leaked sessions, and
    /// deregister. Idempotent.
    pub fn close(&self) -> VigilResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(writer) = self.writer.lock().take() {
            writer.stop();
        }

        let result = match self.log.write().take() {
            Some(log) => log.flush().map_err(VigilError::from),
            None => Ok(()),
        };

        self.report_leaks();
        let open_sessions = self.open_session_count();
        if open_sessions > 0 {
            warn!(
                target: "vigil::db",
                db = %self.name,
                open_sessions,
                "Database closed with open sessions"
            );
        }

        self.deregister();
        info!(target: "vigil::db", db = %self.name, "Database closed");
        result
    }

    fn deregister(&self) {
        let mut registry = OPEN_DATABASES.lock();
        let is_self = registry
            .get(&self.data_dir)
            .map_or(false, |weak| std::ptr::eq(weak.as_ptr(), self));
        if is_self {
            registry.remove(&self.data_dir);
        }
    }
}

impl DurabilityTarget for Database {
    fn short_name(&self) -> String {
        self.name.clone()
    }

    fn is_serialized_file_lock_mode(&self) -> bool {
        self.config.file_lock == FileLockMode::Serialized
    }

    fn checkpoint_if_required(&self) -> DurabilityResult<()> {
        if self.log_size() >= self.config.checkpoint_log_bytes {
            self.checkpoint()?;
        }
        Ok(())
    }

    fn log(&self) -> Option<Arc<dyn LogHandle>> {
        self.log
            .read()
            .clone()
            .map(|log| log as Arc<dyn LogHandle>)
    }

    fn diagnostic_sink(&self) -> Option<Arc<dyn DiagnosticSink>> {
        Some(Arc::clone(&self.trace) as Arc<dyn DiagnosticSink>)
    }

    fn set_flush_on_each_commit(&self, enabled: bool) {
        self.flush_on_each_commit.store(enabled, Ordering::Release);
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(writer) = self.writer.get_mut().take() {
            writer.stop();
        }

        // Drop can't return errors; close() is the way to observe them.
        if let Some(log) = self.log.get_mut().take() {
            let _ = log.flush();
        }

        self.deregister();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("path", &self.data_dir)
            .field("open", &self.is_open())
            .field("flush_on_each_commit", &self.flush_on_each_commit())
            .finish()
    }
}
