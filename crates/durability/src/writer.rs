//! Background log writer
//!
//! One writer runs per open database. Every `write_delay` it either flushes
//! the transaction log or, when the database file lock is serialized, asks
//! the database to checkpoint if one is due.
//!
//! # Thread Lifecycle
//!
//! - The thread holds only a `Weak` reference to the database. Each tick
//!   upgrades it, does its work, and drops the strong reference before
//!   sleeping, so the writer never keeps a database alive.
//! - `stop()` sets a monotonic flag and wakes the sleeping thread. It does
//!   not join: the thread is detached and never holds up process exit.
//! - The thread exits when stopped, when the database is gone, when the log
//!   has been closed, or after an unrecoverable failure.
//!
//! # Failure Handling
//!
//! Flush and checkpoint failures are reported to the database's diagnostic
//! sink and retried on the next tick. Panics raised by the database are caught
//! and treated the same way. Corruption is the exception: it is reported and
//! the writer exits instead of retrying forever.

use crate::spawner::{TaskSpawner, ThreadSpawner};
use crate::target::{DurabilityTarget, TraceModule};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};
use vigil_core::{DurabilityError, MIN_WRITE_DELAY_MS};

/// Prefix of every writer thread name.
pub const WRITER_THREAD_PREFIX: &str = "vigil-log-writer";

/// Smallest sleep the writer accepts between ticks.
pub const MIN_SLEEP_FLOOR: Duration = Duration::from_millis(1);

/// Writer settings that are not changed at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Lower bound on the sleep between ticks. Write delays below it switch
    /// the database to flush-on-commit.
    pub min_write_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_write_delay: Duration::from_millis(MIN_WRITE_DELAY_MS),
        }
    }
}

/// How long the writer sleeps after a tick.
///
/// Serialized file locking always uses the minimum. The result is never
/// below `min_write_delay`, so a zero delay cannot mean "sleep forever".
pub fn effective_wait(write_delay: Duration, serialized: bool, min_write_delay: Duration) -> Duration {
    let wait = if serialized { min_write_delay } else { write_delay };
    wait.max(min_write_delay)
}

/// Outcome of a single flush or checkpoint attempt.
enum Tick {
    Done,
    LogClosed,
    Failed(TickFailure),
}

struct TickFailure {
    module: TraceModule,
    context: &'static str,
    error: DurabilityError,
}

struct WriterShared {
    target: Mutex<Option<Weak<dyn DurabilityTarget>>>,
    write_delay_ms: AtomicU64,
    min_write_delay: Duration,
    stopped: AtomicBool,
    finished: AtomicBool,
    ticks: AtomicU64,
    last_wait_ms: AtomicU64,
    sleep_lock: Mutex<()>,
    wake: Condvar,
    exit_lock: Mutex<()>,
    exited: Condvar,
}

impl WriterShared {
    fn resolve_target(&self) -> Option<Arc<dyn DurabilityTarget>> {
        self.target.lock().as_ref().and_then(Weak::upgrade)
    }

    fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms.load(Ordering::Acquire))
    }

    fn sleep(&self, wait: Duration) {
        let mut guard = self.sleep_lock.lock();
        // stop() takes the same lock before notifying, so checking here
        // cannot miss its wake-up.
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let _ = self.wake.wait_for(&mut guard, wait);
    }
}

/// Marks the writer finished and drops the target reference, even if the
/// loop unwinds.
struct ExitGuard<'a> {
    shared: &'a WriterShared,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.shared.target.lock().take();
        let _guard = self.shared.exit_lock.lock();
        self.shared.finished.store(true, Ordering::Release);
        self.shared.exited.notify_all();
    }
}

/// Handle to the background log writer of one database.
///
/// Dropping the handle stops the writer without waiting for it.
pub struct DurabilityScheduler {
    shared: Arc<WriterShared>,
    thread_name: String,
}

impl DurabilityScheduler {
    /// Start a writer for `target` on a dedicated thread.
    ///
    /// Returns `None` if the thread cannot be started. The database then runs
    /// without background flushing.
    pub fn create<T>(target: &Arc<T>, write_delay_ms: u64) -> Option<Self>
    where
        T: DurabilityTarget + 'static,
    {
        let weak = Arc::downgrade(target) as Weak<dyn DurabilityTarget>;
        Self::create_with(weak, write_delay_ms, SchedulerConfig::default(), &ThreadSpawner::new())
    }

    /// Start a writer with explicit settings and spawner.
    ///
    /// Returns `None` if the target is already gone or the spawner refuses
    /// the task. A `min_write_delay` below [`MIN_SLEEP_FLOOR`] is raised to
    /// it.
    pub fn create_with(
        target: Weak<dyn DurabilityTarget>,
        write_delay_ms: u64,
        config: SchedulerConfig,
        spawner: &dyn TaskSpawner,
    ) -> Option<Self> {
        let short_name = target.upgrade()?.short_name();
        let thread_name = format!("{}-{}", WRITER_THREAD_PREFIX, short_name);

        let mut min_write_delay = config.min_write_delay;
        if min_write_delay < MIN_SLEEP_FLOOR {
            warn!(
                target: "vigil::writer",
                db = %short_name,
                requested_ms = min_write_delay.as_millis() as u64,
                "Minimum write delay too small; using {}ms",
                MIN_SLEEP_FLOOR.as_millis()
            );
            min_write_delay = MIN_SLEEP_FLOOR;
        }

        let shared = Arc::new(WriterShared {
            target: Mutex::new(Some(target)),
            write_delay_ms: AtomicU64::new(write_delay_ms),
            min_write_delay,
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            last_wait_ms: AtomicU64::new(0),
            sleep_lock: Mutex::new(()),
            wake: Condvar::new(),
            exit_lock: Mutex::new(()),
            exited: Condvar::new(),
        });

        let task_shared = Arc::clone(&shared);
        match spawner.spawn(thread_name.clone(), Box::new(move || run(&task_shared))) {
            Ok(()) => {
                debug!(target: "vigil::writer", thread = %thread_name, write_delay_ms, "Log writer started");
                Some(Self {
                    shared,
                    thread_name,
                })
            }
            Err(e) => {
                warn!(
                    target: "vigil::writer",
                    db = %short_name,
                    error = %e,
                    "Cannot start log writer thread; running without background flush"
                );
                None
            }
        }
    }

    /// Change the delay used for the next sleep.
    ///
    /// A delay below the minimum switches the database to flush-on-commit;
    /// any other delay switches it back to background flushing.
    pub fn set_write_delay(&self, write_delay_ms: u64) {
        self.shared.write_delay_ms.store(write_delay_ms, Ordering::Release);
        let below_min = Duration::from_millis(write_delay_ms) < self.shared.min_write_delay;
        if let Some(target) = self.shared.resolve_target() {
            target.set_flush_on_each_commit(below_min);
        }
    }

    /// Currently configured write delay
    pub fn write_delay(&self) -> Duration {
        self.shared.write_delay()
    }

    /// Ask the writer to exit. Returns immediately.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        let _guard = self.shared.sleep_lock.lock();
        self.shared.wake.notify_all();
    }

    /// Whether `stop()` has been called
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Whether the writer thread has exited
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Block until the writer thread exits or `timeout` elapses.
    ///
    /// Returns `true` if the thread exited.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let mut guard = self.shared.exit_lock.lock();
        if self.is_finished() {
            return true;
        }
        let _ = self
            .shared
            .exited
            .wait_while_for(&mut guard, |_| !self.shared.finished.load(Ordering::Acquire), timeout);
        self.is_finished()
    }

    /// Name of the writer thread
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Number of ticks that completed and went to sleep
    pub fn tick_count(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// The sleep chosen after the most recent tick, or `None` before the
    /// first tick completes.
    pub fn last_wait(&self) -> Option<Duration> {
        match self.shared.last_wait_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Drop for DurabilityScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DurabilityScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurabilityScheduler")
            .field("thread_name", &self.thread_name)
            .field("write_delay", &self.write_delay())
            .field("stopped", &self.is_stopped())
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn run(shared: &WriterShared) {
    let _exit = ExitGuard { shared };

    while !shared.stopped.load(Ordering::Acquire) {
        let Some(target) = shared.resolve_target() else {
            debug!(target: "vigil::writer", "Database dropped; log writer exiting");
            break;
        };

        let write_delay = shared.write_delay();
        let min = shared.min_write_delay;
        let (wait, outcome) = match catch_unwind(AssertUnwindSafe(|| tick(target.as_ref(), write_delay, min))) {
            Ok(result) => result,
            Err(payload) => (
                write_delay,
                Tick::Failed(TickFailure {
                    module: TraceModule::Log,
                    context: "flush",
                    error: DurabilityError::internal(format!(
                        "panic in durability target: {}",
                        panic_message(payload.as_ref())
                    )),
                }),
            ),
        };

        match outcome {
            Tick::Done => {}
            Tick::LogClosed => {
                debug!(target: "vigil::writer", "Log closed; log writer exiting");
                break;
            }
            Tick::Failed(failure) => {
                report(target.as_ref(), &failure);
                if !failure.error.is_recoverable() {
                    error!(
                        target: "vigil::writer",
                        error = %failure.error,
                        "Unrecoverable durability failure; log writer exiting"
                    );
                    break;
                }
            }
        }
        drop(target);

        let wait = wait.max(min);
        shared.last_wait_ms.store(wait.as_millis() as u64, Ordering::Release);
        shared.ticks.fetch_add(1, Ordering::AcqRel);
        shared.sleep(wait);
    }
}

fn tick(target: &dyn DurabilityTarget, write_delay: Duration, min: Duration) -> (Duration, Tick) {
    if target.is_serialized_file_lock_mode() {
        let wait = effective_wait(write_delay, true, min);
        let outcome = match target.checkpoint_if_required() {
            Ok(()) => Tick::Done,
            Err(error) => Tick::Failed(TickFailure {
                module: TraceModule::Checkpoint,
                context: "checkpoint",
                error,
            }),
        };
        return (wait, outcome);
    }

    let Some(log) = target.log() else {
        return (write_delay, Tick::LogClosed);
    };
    let outcome = match log.flush() {
        Ok(()) => Tick::Done,
        Err(error) => Tick::Failed(TickFailure {
            module: TraceModule::Log,
            context: "flush",
            error,
        }),
    };
    (write_delay, outcome)
}

fn report(target: &dyn DurabilityTarget, failure: &TickFailure) {
    warn!(
        target: "vigil::writer",
        module = %failure.module,
        error = %failure.error,
        "Background {} failed",
        failure.context
    );
    // A sink that panics must not take the writer down with it.
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if let Some(sink) = target.diagnostic_sink() {
            sink.log_error(failure.module, failure.context, &failure.error);
        }
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("(non-string panic)")
}
