//! # Loader
//!
//! Process-wide, one-time bootstrap of whatever a worker needs before it can be
//! started. `start` is idempotent while a bootstrap is running or has succeeded; after
//! a failure the next `start` tries again. `wait_ready` schedules a job on the
//! designated executor that runs once the bootstrap has settled.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::executor::MainExecutor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The bootstrap collaborator failed.
    Bootstrap(String),
    /// The loader was dropped before the bootstrap finished.
    Dropped,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrap(msg) => write!(f, "bootstrap failed: {}", msg),
            Self::Dropped => write!(f, "loader dropped before becoming ready"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// The platform-specific work that must finish before any worker can start.
#[async_trait::async_trait]
pub trait Bootstrap: Send + Sync + 'static {
    async fn load(&self) -> anyhow::Result<()>;
}

/// A bootstrap with nothing to do.
pub struct NoBootstrap;

#[async_trait::async_trait]
impl Bootstrap for NoBootstrap {
    async fn load(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadState {
    NotStarted,
    Pending,
    Ready,
    Failed(String),
}

/// Continuation scheduled by [`Loader::wait_ready`].
pub type ReadyJob = Box<dyn FnOnce(Result<()>) + Send + 'static>;

pub struct Loader {
    bootstrap: Arc<dyn Bootstrap>,
    state: watch::Sender<LoadState>,
    rt: Handle,
}

impl Loader {
    pub fn new(bootstrap: Arc<dyn Bootstrap>, rt: Handle) -> Self {
        let (state, _) = watch::channel(LoadState::NotStarted);
        Self {
            bootstrap,
            state,
            rt,
        }
    }

    pub fn is_started(&self) -> bool {
        *self.state.borrow() != LoadState::NotStarted
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == LoadState::Ready
    }

    /// Begins the bootstrap. Calls while it runs, or after it succeeded, do nothing.
    pub fn start(&self) {
        let begin = self.state.send_if_modified(|s| match s {
            LoadState::NotStarted | LoadState::Failed(_) => {
                *s = LoadState::Pending;
                true
            }
            LoadState::Pending | LoadState::Ready => false,
        });
        if !begin {
            return;
        }

        info!("loader starting");
        let bootstrap = self.bootstrap.clone();
        let state = self.state.clone();
        self.rt.spawn(async move {
            let next = match bootstrap.load().await {
                Ok(()) => {
                    info!("loader ready");
                    LoadState::Ready
                }
                Err(e) => {
                    warn!(error = %e, "loader failed");
                    LoadState::Failed(e.to_string())
                }
            };
            state.send_replace(next);
        });
    }

    /// Posts `job` to `executor` once the bootstrap has settled.
    ///
    /// The job receives `Ok(())` on success, or the bootstrap error. If the
    /// executor has stopped, the job is dropped without running.
    pub fn wait_ready(&self, executor: &MainExecutor, job: ReadyJob) {
        let mut rx = self.state.subscribe();
        let executor = executor.clone();
        self.rt.spawn(async move {
            let outcome = match rx.wait_for(|s| matches!(s, LoadState::Ready | LoadState::Failed(_))).await {
                Ok(state) => match &*state {
                    LoadState::Failed(msg) => Err(Error::Bootstrap(msg.clone())),
                    _ => Ok(()),
                },
                Err(_) => Err(Error::Dropped),
            };

            debug!(executor = executor.name(), ok = outcome.is_ok(), "loader settled, posting continuation");
            if executor.post(Box::new(move || job(outcome))).is_err() {
                warn!(executor = executor.name(), "executor stopped; startup continuation dropped");
            }
        });
    }
}
