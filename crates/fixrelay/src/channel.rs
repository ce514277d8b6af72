//! # Method Channel
//!
//! A named, bidirectional call channel over a [`Transport`].
//!
//! Outbound calls are encoded immediately and handed to a writer task, so frames
//! leave in the order `invoke` was called. A pump task reads inbound frames: replies
//! are matched to pending calls by sequence number, and calls are routed to the
//! registered [`CallHandler`]. Calls addressed to another channel name, or arriving
//! while no handler is registered, are answered with `NotImplemented`.
//!
//! Dropping the channel stops both tasks and fails every outstanding call with
//! [`Error::Closed`]. The transport itself is left open, so a new channel can be
//! opened over it later.

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use fixrpc::CallDecoder;
use fixrpc::CallEncoder;
use fixrpc::FailureReason;
use fixrpc::ReplyDecoder;
use fixrpc::ReplyEncoder;
use fixrpc::RpcFrame;
use fixrpc::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::transport::Transport;
use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Transport(TransportError),
    Rpc(fixrpc::Error),
    /// The other side answered with a failure.
    Remote(FailureReason),
    /// No reply arrived within the channel timeout.
    Timeout,
    /// The channel was dropped or the transport closed before a reply arrived.
    Closed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Rpc(e) => write!(f, "rpc error: {}", e),
            Self::Remote(reason) => write!(f, "remote failure: {}", reason),
            Self::Timeout => write!(f, "call timed out"),
            Self::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<fixrpc::Error> for Error {
    fn from(e: fixrpc::Error) -> Self {
        Self::Rpc(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Receives calls initiated by the other side of a channel.
///
/// Runs on the channel's pump task, so it must not block for long. Every call must
/// be answered through the [`Responder`]; dropping it unanswered replies
/// `Abandoned`.
pub trait CallHandler: Send + Sync + 'static {
    fn on_call(&self, method: &str, args: Value, reply: Responder);
}

/// Answers exactly one inbound call.
pub struct Responder {
    seq: u64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    answered: bool,
}

impl Responder {
    pub(crate) fn new(seq: u64, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { seq, outbound, answered: false }
    }

    pub fn success(mut self, result: Value) {
        self.send(ReplyEncoder::ok(self.seq, &result));
    }

    pub fn error(mut self, message: impl Into<String>) {
        let reason = FailureReason::Failed(message.into());
        self.send(ReplyEncoder::err(self.seq, &reason));
    }

    pub fn not_implemented(mut self) {
        self.send(ReplyEncoder::err(self.seq, &FailureReason::NotImplemented));
    }

    fn reject(mut self, reason: FailureReason) {
        self.send(ReplyEncoder::err(self.seq, &reason));
    }

    fn send(&mut self, reply: ReplyEncoder<'_>) {
        self.answered = true;
        match reply.to_bytes() {
            // A closed writer means the channel is gone; nobody is left to tell.
            Ok(bytes) => { let _ = self.outbound.send(bytes); }
            Err(e) => warn!(seq = self.seq, error = %e, "failed to encode reply"),
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if !self.answered {
            self.send(ReplyEncoder::err(self.seq, &FailureReason::Abandoned));
        }
    }
}

struct Shared {
    name: String,
    timeout: Duration,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: DashMap<u64, oneshot::Sender<Result<Value>>>,
    handler: RwLock<Option<Arc<dyn CallHandler>>>,
    seq_gen: AtomicU64,
}

impl Shared {
    fn handle_message(&self, msg: &[u8]) {
        match RpcFrame::decode(msg) {
            Ok(RpcFrame::Reply(reply)) => self.complete(reply),
            Ok(RpcFrame::Call(call)) => self.route(call),
            Err(e) => {
                warn!(channel = %self.name, error = %e, "dropping undecodable frame");
                if let Ok(seq) = fixrpc::decode_call_seq(msg) {
                    Responder::new(seq, self.outbound.clone())
                        .reject(FailureReason::ProtocolViolation(e.to_string()));
                }
            }
        }
    }

    fn complete(&self, reply: ReplyDecoder) {
        let Some((_, tx)) = self.pending.remove(&reply.seq) else {
            // Late reply for a call that already timed out.
            debug!(channel = %self.name, seq = reply.seq, "reply without a pending call");
            return;
        };
        let _ = tx.send(reply.status.map_err(Error::Remote));
    }

    fn route(&self, call: CallDecoder<'_>) {
        let responder = Responder::new(call.seq, self.outbound.clone());

        if call.target != self.name {
            debug!(channel = %self.name, target = call.target, "call for another channel");
            responder.not_implemented();
            return;
        }

        let handler = self.handler.read().unwrap_or_else(PoisonError::into_inner).clone();
        match handler {
            Some(handler) => handler.on_call(call.method, call.args, responder),
            None => {
                debug!(channel = %self.name, method = call.method, "no handler registered");
                responder.not_implemented();
            }
        }
    }

    fn fail_all_pending(&self, error: Error) {
        let seqs: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for seq in seqs {
            if let Some((_, tx)) = self.pending.remove(&seq) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }
}

/// A call that has been queued for sending and is waiting for its reply.
pub struct PendingCall {
    seq: u64,
    rx: oneshot::Receiver<Result<Value>>,
    timeout: Duration,
    shared: Weak<Shared>,
}

impl PendingCall {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Waits for the reply, up to the channel timeout.
    pub async fn wait(self) -> Result<Value> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                if let Some(shared) = self.shared.upgrade() {
                    shared.pending.remove(&self.seq);
                }
                Err(Error::Timeout)
            }
        }
    }
}

/// A named call channel bound to one transport.
pub struct MethodChannel {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl MethodChannel {
    /// Opens a channel and spawns its pump and writer tasks on `rt`.
    pub fn open(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
        rt: &Handle,
    ) -> Self {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let shared = Arc::new(Shared {
            name: name.into(),
            timeout,
            outbound,
            pending: DashMap::new(),
            handler: RwLock::new(None),
            seq_gen: AtomicU64::new(1),
        });

        let writer_transport = transport.clone();
        let writer_name = shared.name.clone();
        let writer = rt.spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = writer_transport.send(&frame).await {
                    warn!(channel = %writer_name, error = %e, "writer stopped");
                    break;
                }
            }
        });

        let pump_shared = shared.clone();
        let pump = rt.spawn(async move {
            let error = loop {
                match transport.recv().await {
                    Ok(Some(msg)) => pump_shared.handle_message(&msg),
                    Ok(None) => {
                        debug!(channel = %pump_shared.name, "transport closed");
                        break Error::Closed;
                    }
                    Err(e) => {
                        warn!(channel = %pump_shared.name, error = %e, "pump stopped");
                        break Error::Transport(e);
                    }
                }
            };
            pump_shared.fail_all_pending(error);
        });

        debug!(channel = %shared.name, "channel opened");
        Self { shared, pump, writer }
    }

    /// Registers, replaces, or with `None` removes the inbound call handler.
    pub fn set_handler(&self, handler: Option<Arc<dyn CallHandler>>) {
        *self.shared.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    pub fn has_handler(&self) -> bool {
        self.shared.handler.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Queues a call to `method` and returns a handle to its reply.
    ///
    /// Never waits: the frame is encoded and queued before this returns.
    pub fn invoke(&self, method: &str, args: &Value) -> Result<PendingCall> {
        let seq = self.shared.seq_gen.fetch_add(1, Ordering::Relaxed);
        let frame = CallEncoder::new(seq, &self.shared.name, method, args).to_bytes()?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(seq, tx);

        if self.shared.outbound.send(frame).is_err() {
            self.shared.pending.remove(&seq);
            return Err(Error::Closed);
        }

        Ok(PendingCall {
            seq,
            rx,
            timeout: self.shared.timeout,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Calls `method` and waits for the reply.
    pub async fn call(&self, method: &str, args: &Value) -> Result<Value> {
        self.invoke(method, args)?.wait().await
    }
}

impl Drop for MethodChannel {
    fn drop(&mut self) {
        self.pump.abort();
        self.writer.abort();
        self.shared.fail_all_pending(Error::Closed);
        debug!(channel = %self.shared.name, "channel closed");
    }
}
