//! Fake worker runtime shared by the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use fixrelay::Bootstrap;
use fixrelay::Collaborators;
use fixrelay::Coordinator;
use fixrelay::EntryPoint;
use fixrelay::Loader;
use fixrelay::MainExecutor;
use fixrelay::MethodChannel;
use fixrelay::Phase;
use fixrelay::RelayConfig;
use fixrelay::Settings;
use fixrelay::WorkerHandle;
use fixrelay::WorkerHost;
use fixrelay::channel;
use fixrelay::channel::CallHandler;
use fixrelay::channel::Responder;
use fixrelay::local::LocalTransport;
use fixrelay::transport::Transport;
use fixrpc::Value;

pub const WORKER_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs once, from inside a collaborator call.
pub type Hook = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy)]
pub struct Options {
    /// The worker calls `initialized` as soon as it is executed.
    pub auto_ready: bool,
    /// The first handle is already executing, as if left over from an earlier session.
    pub already_executing: bool,
    /// Bootstrap blocks until [`Harness::release_loader`].
    pub gate_loader: bool,
    pub fail_loader: bool,
    pub fail_execute: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            auto_ready: true,
            already_executing: false,
            gate_loader: false,
            fail_loader: false,
            fail_execute: false,
        }
    }
}

/// Worker side of the channel: records every fix it is sent.
struct FixSink {
    update_method: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl CallHandler for FixSink {
    fn on_call(&self, method: &str, args: Value, reply: Responder) {
        if method == self.update_method {
            self.received.lock().unwrap().push(args);
            reply.success(Value::Unit);
        } else {
            reply.not_implemented();
        }
    }
}

pub struct FakeHandle {
    executing: AtomicBool,
    fail_execute: AtomicBool,
    auto_ready: bool,
    host_end: Arc<dyn Transport>,
    worker: Arc<MethodChannel>,
    ready_method: String,
    received: Arc<Mutex<Vec<Value>>>,
    executor: MainExecutor,
    rt: Handle,
    before_execute: Mutex<Option<Hook>>,
    pub execute_calls: AtomicUsize,
    pub double_executes: AtomicUsize,
    pub off_executor_calls: AtomicUsize,
    pub messenger_calls: AtomicUsize,
}

impl FakeHandle {
    fn new(config: &RelayConfig, options: &Options, executing: bool, executor: MainExecutor, rt: Handle) -> Self {
        let (host_end, worker_end) = LocalTransport::pair();
        let received = Arc::new(Mutex::new(Vec::new()));
        let worker = MethodChannel::open(config.channel_name.clone(), Arc::new(worker_end), WORKER_TIMEOUT, &rt);
        worker.set_handler(Some(Arc::new(FixSink {
            update_method: config.update_method.clone(),
            received: received.clone(),
        })));

        Self {
            executing: AtomicBool::new(executing),
            fail_execute: AtomicBool::new(options.fail_execute),
            auto_ready: options.auto_ready,
            host_end: Arc::new(host_end),
            worker: Arc::new(worker),
            ready_method: config.ready_method.clone(),
            received,
            executor,
            rt,
            before_execute: Mutex::new(None),
            execute_calls: AtomicUsize::new(0),
            double_executes: AtomicUsize::new(0),
            off_executor_calls: AtomicUsize::new(0),
            messenger_calls: AtomicUsize::new(0),
        }
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_latitudes(&self) -> Vec<f64> {
        self.received()
            .iter()
            .map(|v| v.get(fixrelay::payload::LAT).and_then(Value::as_f64).unwrap())
            .collect()
    }

    pub fn set_fail_execute(&self, fail: bool) {
        self.fail_execute.store(fail, Ordering::SeqCst);
    }

    /// Marks the worker as running without going through `execute`.
    pub fn start_externally(&self) {
        self.executing.store(true, Ordering::SeqCst);
    }

    /// Runs `hook` at the start of the next `execute`, after its outcome is decided.
    pub fn on_next_execute(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_execute.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn executes(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    /// Sends the ready signal from the worker, as a started worker would.
    pub async fn signal_ready(&self) -> channel::Result<Value> {
        self.worker.call(&self.ready_method, &Value::Unit).await
    }

    pub async fn call(&self, method: &str) -> channel::Result<Value> {
        self.worker.call(method, &Value::Unit).await
    }
}

impl WorkerHandle for FakeHandle {
    fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    fn execute(&self, entry: &EntryPoint) -> anyhow::Result<()> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if !self.executor.is_current() {
            self.off_executor_calls.fetch_add(1, Ordering::SeqCst);
        }
        let fail = self.fail_execute.load(Ordering::SeqCst);
        let hook = self.before_execute.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        if fail {
            anyhow::bail!("could not load {}", entry.bundle.display());
        }
        if self.executing.swap(true, Ordering::SeqCst) {
            self.double_executes.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("handle is already executing");
        }

        if self.auto_ready {
            let worker = self.worker.clone();
            let method = self.ready_method.clone();
            self.rt.spawn(async move {
                let _ = worker.call(&method, &Value::Unit).await;
            });
        }
        Ok(())
    }

    fn messenger(&self) -> Arc<dyn Transport> {
        self.messenger_calls.fetch_add(1, Ordering::SeqCst);
        self.host_end.clone()
    }
}

pub struct FakeHost {
    config: RelayConfig,
    options: Options,
    executor: MainExecutor,
    rt: Handle,
    current: Mutex<Option<Arc<FakeHandle>>>,
    history: Mutex<Vec<Arc<FakeHandle>>>,
    preexisting: AtomicBool,
    fail_handle: AtomicBool,
    on_destroy: Mutex<Option<Hook>>,
    pub handle_requests: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl FakeHost {
    /// Every handle created so far, oldest first.
    pub fn handles(&self) -> Vec<Arc<FakeHandle>> {
        self.history.lock().unwrap().clone()
    }

    pub fn handle(&self, index: usize) -> Arc<FakeHandle> {
        self.handles()[index].clone()
    }

    pub fn handles_created(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    /// Runs `hook` inside the next `destroy_worker_handle`, before the handle goes away.
    pub fn on_next_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_destroy.lock().unwrap() = Some(Box::new(hook));
    }

    /// True while `handle` is still the live handle.
    pub fn is_live(&self, handle: &Arc<FakeHandle>) -> bool {
        self.current.lock().unwrap().as_ref().is_some_and(|h| Arc::ptr_eq(h, handle))
    }

    pub fn set_fail_handle(&self, fail: bool) {
        self.fail_handle.store(fail, Ordering::SeqCst);
    }

    pub fn total_double_executes(&self) -> usize {
        self.handles().iter().map(|h| h.double_executes.load(Ordering::SeqCst)).sum()
    }

    pub fn total_off_executor_calls(&self) -> usize {
        self.handles().iter().map(|h| h.off_executor_calls.load(Ordering::SeqCst)).sum()
    }
}

impl WorkerHost for FakeHost {
    fn worker_handle(&self) -> anyhow::Result<Arc<dyn WorkerHandle>> {
        self.handle_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_handle.load(Ordering::SeqCst) {
            anyhow::bail!("worker runtime unavailable");
        }

        let mut current = self.current.lock().unwrap();
        let handle = match current.as_ref() {
            Some(handle) => handle.clone(),
            None => {
                let executing = self.preexisting.swap(false, Ordering::SeqCst);
                let handle = Arc::new(FakeHandle::new(
                    &self.config,
                    &self.options,
                    executing,
                    self.executor.clone(),
                    self.rt.clone(),
                ));
                self.history.lock().unwrap().push(handle.clone());
                *current = Some(handle.clone());
                handle
            }
        };
        Ok(handle)
    }

    fn destroy_worker_handle(&self) {
        let hook = self.on_destroy.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.current.lock().unwrap().take();
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeSettings {
    pub logging: AtomicBool,
}

impl Settings for FakeSettings {
    fn entry_point(&self) -> anyhow::Result<EntryPoint> {
        Ok(EntryPoint {
            descriptor: "main".to_string(),
            bundle: PathBuf::from("/opt/app/worker.bundle"),
        })
    }

    fn logging_enabled(&self) -> bool {
        self.logging.load(Ordering::SeqCst)
    }
}

pub struct GatedBootstrap {
    gate: Option<Semaphore>,
    fail: AtomicBool,
    pub runs: AtomicUsize,
}

#[async_trait::async_trait]
impl Bootstrap for GatedBootstrap {
    async fn load(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("runtime assets missing");
        }
        Ok(())
    }
}

impl GatedBootstrap {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub coordinator: Coordinator,
    pub host: Arc<FakeHost>,
    pub settings: Arc<FakeSettings>,
    pub bootstrap: Arc<GatedBootstrap>,
    pub loader: Arc<Loader>,
    pub executor: MainExecutor,
}

impl Harness {
    pub fn new(options: Options) -> Self {
        let rt = Handle::current();
        let config = RelayConfig::default();
        let executor = MainExecutor::spawn(config.executor_name.clone()).unwrap();

        let host = Arc::new(FakeHost {
            config: config.clone(),
            options,
            executor: executor.clone(),
            rt: rt.clone(),
            current: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            preexisting: AtomicBool::new(options.already_executing),
            fail_handle: AtomicBool::new(false),
            on_destroy: Mutex::new(None),
            handle_requests: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        });
        let settings = Arc::new(FakeSettings { logging: AtomicBool::new(false) });
        let bootstrap = Arc::new(GatedBootstrap {
            gate: options.gate_loader.then(|| Semaphore::new(0)),
            fail: AtomicBool::new(options.fail_loader),
            runs: AtomicUsize::new(0),
        });
        let loader = Arc::new(Loader::new(bootstrap.clone(), rt.clone()));

        let coordinator = Coordinator::new(
            config,
            Collaborators {
                host: host.clone(),
                settings: settings.clone(),
                loader: loader.clone(),
                executor: executor.clone(),
            },
            rt,
        );

        Self { coordinator, host, settings, bootstrap, loader, executor }
    }

    pub fn release_loader(&self) {
        if let Some(gate) = &self.bootstrap.gate {
            gate.add_permits(1);
        }
    }

    pub fn phase(&self) -> Phase {
        self.coordinator.status().phase
    }
}

/// Polls `cond` until it holds, failing the test after a few seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Gives background tasks time to do something they should not.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
