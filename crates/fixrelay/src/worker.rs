//! Collaborator interfaces for the worker runtime and its persisted settings.
//!
//! These are implemented by the embedding application:
//!
//! - **WorkerHost**: creates, reuses and destroys the worker runtime handle.
//! - **WorkerHandle**: one worker execution context and the pipe into it.
//! - **Settings**: persisted startup parameters and feature flags.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::transport::Transport;

/// Opaque, persisted reference to the code a worker starts executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Entry-point descriptor understood by the worker runtime.
    pub descriptor: String,
    /// Location of the code bundle that contains the entry point.
    pub bundle: PathBuf,
}

/// A worker execution context.
pub trait WorkerHandle: Send + Sync + 'static {
    /// True once the worker is running code, including code started by an earlier
    /// host session.
    fn is_executing(&self) -> bool;

    /// Begins executing `entry`. Only valid from the designated executor, and only
    /// while `is_executing()` is false.
    fn execute(&self, entry: &EntryPoint) -> Result<()>;

    /// The byte pipe into this worker, shared by every channel opened on it.
    fn messenger(&self) -> Arc<dyn Transport>;
}

/// Owner of the process-wide worker handle.
pub trait WorkerHost: Send + Sync + 'static {
    /// Returns the live handle, constructing it on first use.
    fn worker_handle(&self) -> Result<Arc<dyn WorkerHandle>>;

    /// Tears the handle down so the next `worker_handle` builds a fresh one.
    fn destroy_worker_handle(&self);
}

/// Persisted configuration the coordinator reads at startup and dispatch time.
pub trait Settings: Send + Sync + 'static {
    /// The stored entry point for the worker.
    fn entry_point(&self) -> Result<EntryPoint>;

    /// Current diagnostic-logging flag, forwarded with every fix.
    fn logging_enabled(&self) -> bool;
}
