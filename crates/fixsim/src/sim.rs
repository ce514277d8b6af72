//! An in-process worker runtime that behaves like a real one: it must be executed
//! before it answers, signals readiness after a short boot, and logs every fix.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use fixrelay::Bootstrap;
use fixrelay::EntryPoint;
use fixrelay::MethodChannel;
use fixrelay::RelayConfig;
use fixrelay::Settings;
use fixrelay::WorkerHandle;
use fixrelay::WorkerHost;
use fixrelay::channel::CallHandler;
use fixrelay::channel::Responder;
use fixrelay::local::LocalTransport;
use fixrelay::payload;
use fixrelay::transport::Transport;
use fixrpc::Value;
use tokio::runtime::Handle;
use tracing::info;
use tracing::warn;

const BOOT_DELAY: Duration = Duration::from_millis(200);

/// Prints what the worker receives.
struct FixLogger {
    update_method: String,
}

impl CallHandler for FixLogger {
    fn on_call(&self, method: &str, args: Value, reply: Responder) {
        if method != self.update_method {
            reply.not_implemented();
            return;
        }

        let field = |key: &str| args.get(key).and_then(Value::as_f64).unwrap_or(f64::NAN);
        info!(
            target: "worker",
            lat = field(payload::LAT),
            lon = field(payload::LON),
            alt = field(payload::ALT),
            speed = field(payload::SPEED),
            course = field(payload::COURSE),
            logging = ?args.get(payload::LOGGING_ENABLED),
            "fix received"
        );
        reply.success(Value::Unit);
    }
}

pub struct SimHandle {
    executing: AtomicBool,
    host_end: Arc<dyn Transport>,
    worker: Arc<MethodChannel>,
    ready_method: String,
    rt: Handle,
}

impl SimHandle {
    fn boot(config: &RelayConfig, rt: Handle) -> Self {
        let (host_end, worker_end) = LocalTransport::pair();
        let worker = MethodChannel::open(
            config.channel_name.clone(),
            Arc::new(worker_end),
            config.call_timeout(),
            &rt,
        );
        worker.set_handler(Some(Arc::new(FixLogger {
            update_method: config.update_method.clone(),
        })));

        Self {
            executing: AtomicBool::new(false),
            host_end: Arc::new(host_end),
            worker: Arc::new(worker),
            ready_method: config.ready_method.clone(),
            rt,
        }
    }
}

impl WorkerHandle for SimHandle {
    fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    fn execute(&self, entry: &EntryPoint) -> anyhow::Result<()> {
        if self.executing.swap(true, Ordering::SeqCst) {
            anyhow::bail!("worker is already executing");
        }
        info!(target: "worker", descriptor = %entry.descriptor, "worker booting");

        let worker = self.worker.clone();
        let method = self.ready_method.clone();
        self.rt.spawn(async move {
            tokio::time::sleep(BOOT_DELAY).await;
            if let Err(e) = worker.call(&method, &Value::Unit).await {
                warn!(target: "worker", error = %e, "ready signal not acknowledged");
            }
        });
        Ok(())
    }

    fn messenger(&self) -> Arc<dyn Transport> {
        self.host_end.clone()
    }
}

pub struct SimHost {
    config: RelayConfig,
    rt: Handle,
    current: Mutex<Option<Arc<SimHandle>>>,
}

impl SimHost {
    pub fn new(config: RelayConfig, rt: Handle) -> Self {
        Self {
            config,
            rt,
            current: Mutex::new(None),
        }
    }
}

impl WorkerHost for SimHost {
    fn worker_handle(&self) -> anyhow::Result<Arc<dyn WorkerHandle>> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = current
            .get_or_insert_with(|| Arc::new(SimHandle::boot(&self.config, self.rt.clone())))
            .clone();
        Ok(handle)
    }

    fn destroy_worker_handle(&self) {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

pub struct SimSettings {
    pub logging_enabled: AtomicBool,
}

impl Settings for SimSettings {
    fn entry_point(&self) -> anyhow::Result<EntryPoint> {
        Ok(EntryPoint {
            descriptor: "fixsim::worker_main".to_string(),
            bundle: PathBuf::from("fixsim-worker.bundle"),
        })
    }

    fn logging_enabled(&self) -> bool {
        self.logging_enabled.load(Ordering::Relaxed)
    }
}

/// Stands in for loading the worker runtime's assets.
pub struct SimBootstrap;

#[async_trait::async_trait]
impl Bootstrap for SimBootstrap {
    async fn load(&self) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}
