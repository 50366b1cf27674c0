//! Background task spawning
//!
//! Spawning goes through [`TaskSpawner`] so that environments which refuse
//! new threads (sandboxes, tests) can be expressed without special cases in
//! the writer.

use std::io;

/// A unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Starts long-running background tasks.
pub trait TaskSpawner: Send + Sync {
    /// Start `task` under `name`.
    ///
    /// The task must not keep the process alive: nobody joins it.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment refuses to start the task.
    fn spawn(&self, name: String, task: Task) -> io::Result<()>;
}

/// Spawns each task on its own detached OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    /// Spawner with the platform default stack size
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawner with an explicit stack size in bytes
    pub fn with_stack_size(stack_size: usize) -> Self {
        Self {
            stack_size: Some(stack_size),
        }
    }
}

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, name: String, task: Task) -> io::Result<()> {
        let mut builder = std::thread::Builder::new().name(name);
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        // Dropping the JoinHandle detaches the thread.
        builder.spawn(task).map(|_| ())
    }
}
