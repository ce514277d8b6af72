//! # Designated Executor
//!
//! A single named thread that runs posted jobs one at a time, in posting order.
//!
//! Some worker runtimes only accept the "start executing" command from one specific
//! thread (the equivalent of a UI or main thread). Startup continuations are posted
//! here so that command is always issued from the same place.

use std::thread::ThreadId;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

/// A unit of work for the executor thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub enum Error {
    /// The executor thread could not be spawned.
    Spawn(std::io::Error),
    /// The executor thread has exited and no longer accepts jobs.
    Stopped,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn executor thread: {}", e),
            Self::Stopped => write!(f, "executor has stopped"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Handle to the designated executor thread.
///
/// Cloning is cheap. The thread exits once every handle is dropped and the queue
/// has drained.
#[derive(Clone)]
pub struct MainExecutor {
    name: String,
    tx: mpsc::UnboundedSender<Job>,
    thread: ThreadId,
}

impl MainExecutor {
    /// Spawns the executor thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(executor = %thread_name, "executor started");
                while let Some(job) = rx.blocking_recv() {
                    // A panicking job must not take the designated thread down with it.
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                        warn!(executor = %thread_name, "job panicked");
                    }
                }
                debug!(executor = %thread_name, "executor stopped");
            })
            .map_err(Error::Spawn)?;

        Ok(Self {
            name,
            tx,
            thread: handle.thread().id(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a job. Never runs it inline, even when called from the executor thread.
    pub fn post(&self, job: Job) -> Result<()> {
        self.tx.send(job).map_err(|_| Error::Stopped)
    }

    /// Returns true when called from the executor thread.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread
    }
}
