//! # Readiness Coordinator
//!
//! Delivers location fixes to a worker that is started lazily on first use.
//!
//! ```text
//!          submit (not ready)            worker calls `initialized`
//!   Idle ───────────────────▶ Initializing ─────────────────────────▶ Ready
//!     ▲                            │  └── handle already executing ──────▲
//!     └──── execute failed ────────┘
//!   cleanup() returns to Idle from any phase.
//! ```
//!
//! ## Invariants
//!
//! - `phase`, `channel`, `pending` and `attempt` live under one mutex and every
//!   read-modify-write holds it. `submit` never waits on startup.
//! - At most one fix is buffered; a newer fix overwrites it. It is only held while
//!   the phase is not `Ready`.
//! - At most one startup attempt is in flight. `phase = Initializing` is set before
//!   anything is scheduled, so concurrent callers return immediately.
//! - A channel is only stored with the ready handler registered on it.
//! - A running handle is never told to execute again.
//! - No startup begins while `force_cleanup` is destroying the worker handle. A fix
//!   submitted in that window stays buffered for the next, cold, startup.
//!
//! Every attempt gets a number. Ready signals and startup continuations that belong
//! to an attempt superseded by `cleanup` are logged and otherwise ignored.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use fixrpc::FailureReason;
use fixrpc::Value;
use tokio::runtime::Handle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::channel;
use crate::channel::CallHandler;
use crate::channel::MethodChannel;
use crate::channel::Responder;
use crate::config::RelayConfig;
use crate::executor::MainExecutor;
use crate::fix::LocationFix;
use crate::loader;
use crate::loader::Loader;
use crate::payload::encode_fix;
use crate::worker::Settings;
use crate::worker::WorkerHandle;
use crate::worker::WorkerHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Initializing,
    Ready,
}

/// Point-in-time view of the coordinator, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub phase: Phase,
    pub has_channel: bool,
    pub pending: Option<LocationFix>,
}

/// The external pieces a coordinator drives.
pub struct Collaborators {
    pub host: Arc<dyn WorkerHost>,
    pub settings: Arc<dyn Settings>,
    pub loader: Arc<Loader>,
    pub executor: MainExecutor,
}

struct State {
    phase: Phase,
    channel: Option<MethodChannel>,
    pending: Option<LocationFix>,
    attempt: u64,
    /// Number of `force_cleanup` calls currently inside `destroy_worker_handle`.
    destroying: usize,
}

struct Inner {
    config: RelayConfig,
    host: Arc<dyn WorkerHost>,
    settings: Arc<dyn Settings>,
    loader: Arc<Loader>,
    executor: MainExecutor,
    rt: Handle,
    state: Mutex<State>,
}

/// Cheaply cloneable handle to one coordinator.
///
/// Construct one per process and pass clones to every fix source.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Creates an idle coordinator. Background tasks are spawned on `rt`, so the
    /// methods may be called from any thread.
    pub fn new(config: RelayConfig, parts: Collaborators, rt: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                host: parts.host,
                settings: parts.settings,
                loader: parts.loader,
                executor: parts.executor,
                rt,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    channel: None,
                    pending: None,
                    attempt: 0,
                    destroying: 0,
                }),
            }),
        }
    }

    pub fn status(&self) -> Status {
        let state = self.inner.lock();
        Status {
            phase: state.phase,
            has_channel: state.channel.is_some(),
            pending: state.pending,
        }
    }

    /// Delivers `fix` now if the worker is ready, otherwise buffers it and makes
    /// sure a startup is under way.
    pub fn submit(&self, fix: LocationFix) {
        let mut state = self.inner.lock();

        if state.phase == Phase::Ready {
            state.pending = None;
            self.inner.dispatch(&state, &fix);
            return;
        }

        if state.pending.replace(fix).is_some() {
            debug!("unflushed fix replaced");
        }
        self.inner.ensure_startup(&mut state);
    }

    /// Starts the worker unless a startup is already in flight or done.
    pub fn ensure_startup(&self) {
        let mut state = self.inner.lock();
        self.inner.ensure_startup(&mut state);
    }

    /// Soft reset: back to `Idle`, channel and buffered fix dropped. The worker
    /// handle stays alive, so the next startup can reuse a running worker.
    pub fn cleanup(&self) {
        let mut state = self.inner.lock();
        self.inner.reset(&mut state);
        info!(attempt = state.attempt, "coordinator reset");
    }

    /// Hard reset: `cleanup`, then destroy the worker handle so the next startup
    /// is a cold start.
    pub fn force_cleanup(&self) {
        let _destroying = {
            let mut state = self.inner.lock();
            self.inner.reset(&mut state);
            state.destroying += 1;
            info!(attempt = state.attempt, "coordinator reset, destroying worker handle");
            DestroyGuard { inner: &self.inner }
        };
        self.inner.host.destroy_worker_handle();
        info!("worker handle destroyed");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self, state: &mut State) {
        state.phase = Phase::Idle;
        state.pending = None;
        state.attempt += 1;
        if let Some(channel) = state.channel.take() {
            channel.set_handler(None);
        }
    }

    fn ensure_startup(self: &Arc<Self>, state: &mut State) {
        if state.channel.is_some() || state.phase == Phase::Initializing {
            debug!(phase = ?state.phase, "startup already in progress");
            return;
        }
        if state.destroying > 0 {
            debug!("worker handle is being destroyed, startup deferred");
            return;
        }

        state.phase = Phase::Initializing;
        state.attempt += 1;
        let attempt = state.attempt;

        let handle = match self.host.worker_handle() {
            Ok(handle) => handle,
            Err(e) => {
                error!(attempt, error = %e, "could not obtain worker handle");
                state.phase = Phase::Idle;
                return;
            }
        };

        let channel = MethodChannel::open(
            self.config.channel_name.clone(),
            handle.messenger(),
            self.config.call_timeout(),
            &self.rt,
        );
        channel.set_handler(Some(Arc::new(ReadyHandler {
            coordinator: Arc::downgrade(self),
            ready_method: self.config.ready_method.clone(),
            attempt,
        })));
        state.channel = Some(channel);

        if handle.is_executing() {
            // Executing an already running handle is invalid; treat it as ready.
            info!(attempt, "worker already executing, reusing it");
            state.phase = Phase::Ready;
            if let Some(fix) = state.pending.take() {
                self.dispatch(state, &fix);
            }
            return;
        }

        info!(attempt, "cold starting worker");
        self.loader.start();
        let inner = self.clone();
        self.loader.wait_ready(
            &self.executor,
            Box::new(move |loaded| inner.finish_cold_start(attempt, handle, loaded)),
        );
    }

    /// Runs on the designated executor once the loader has settled.
    fn finish_cold_start(&self, attempt: u64, handle: Arc<dyn WorkerHandle>, loaded: loader::Result<()>) {
        {
            let state = self.lock();
            if state.attempt != attempt {
                debug!(attempt, current = state.attempt, "startup attempt superseded, not executing");
                return;
            }
        }

        if let Err(e) = loaded {
            self.abandon(attempt, &e.to_string());
            return;
        }

        if handle.is_executing() {
            // Started by a superseded attempt whose ready signal may already be spent.
            self.adopt_running(attempt);
            return;
        }

        let started = self.settings.entry_point().and_then(|entry| {
            debug!(attempt, descriptor = %entry.descriptor, bundle = %entry.bundle.display(), "executing entry point");
            handle.execute(&entry)
        });
        if let Err(e) = started {
            self.abandon(attempt, &format!("{:#}", e));
        }
    }

    fn adopt_running(&self, attempt: u64) {
        let mut state = self.lock();
        if state.attempt != attempt || state.phase != Phase::Initializing {
            return;
        }

        info!(attempt, "worker began executing meanwhile, reusing it");
        state.phase = Phase::Ready;
        if let Some(fix) = state.pending.take() {
            self.dispatch(&state, &fix);
        }
    }

    /// Drops a failed attempt so the next `submit` starts over.
    fn abandon(&self, attempt: u64, reason: &str) {
        let mut state = self.lock();
        if state.attempt != attempt || state.phase != Phase::Initializing {
            warn!(attempt, reason, "stale startup attempt failed");
            return;
        }

        error!(attempt, reason, "worker startup failed");
        state.phase = Phase::Idle;
        if let Some(channel) = state.channel.take() {
            channel.set_handler(None);
        }
    }

    fn mark_ready(&self, attempt: u64, reply: Responder) {
        let mut state = self.lock();
        if state.attempt != attempt || state.channel.is_none() {
            debug!(attempt, current = state.attempt, "ready signal from a superseded attempt");
            reply.success(Value::Bool(true));
            return;
        }

        state.phase = Phase::Ready;
        info!(attempt, "worker ready");
        reply.success(Value::Bool(true));

        if let Some(fix) = state.pending.take() {
            debug!("flushing buffered fix");
            self.dispatch(&state, &fix);
        }
    }

    /// Sends one fix. The reply is only logged.
    fn dispatch(&self, state: &State, fix: &LocationFix) {
        let Some(channel) = state.channel.as_ref() else {
            return;
        };

        let payload = encode_fix(fix, &self.config.platform, self.settings.logging_enabled());
        let pending = match channel.invoke(&self.config.update_method, &payload) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "dispatch failed");
                return;
            }
        };

        let seq = pending.seq();
        self.rt.spawn(async move {
            match pending.wait().await {
                Ok(_) => debug!(seq, "fix delivered"),
                Err(channel::Error::Remote(FailureReason::NotImplemented)) => {
                    warn!(seq, "worker has no handler for fixes")
                }
                Err(e) => warn!(seq, error = %e, "fix delivery failed"),
            }
        });
    }
}

/// Reopens startup once `destroy_worker_handle` has returned, or unwound.
struct DestroyGuard<'a> {
    inner: &'a Inner,
}

impl Drop for DestroyGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().destroying -= 1;
    }
}

/// Handles calls from the worker. Only the ready signal is understood.
struct ReadyHandler {
    coordinator: Weak<Inner>,
    ready_method: String,
    attempt: u64,
}

impl CallHandler for ReadyHandler {
    fn on_call(&self, method: &str, _args: Value, reply: Responder) {
        if method != self.ready_method {
            reply.not_implemented();
            return;
        }
        match self.coordinator.upgrade() {
            Some(inner) => inner.mark_ready(self.attempt, reply),
            None => reply.error("coordinator dropped"),
        }
    }
}
