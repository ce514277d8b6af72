//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between the host and a worker.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about frames or values. It moves
//!   opaque buffers.
//! - **Full Duplex**: Either side may send at any time. Correlating replies with calls
//!   is the channel's job, not the transport's.

use std::fmt;

/// Errors at the byte-moving layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The other side is gone or the link was dropped.
    ConnectionLost(String),
    /// Generic I/O failure inside the transport.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A duplex byte pipe to a worker.
///
/// Object-safe, so channels hold it as `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one complete frame.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next complete frame.
    ///
    /// Returns `Ok(None)` once the other side has closed the pipe. Only one task
    /// should be receiving at a time.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}
