//! # Error Definitions
//!
//! Local failures of the envelope layer, and the reasons a remote side may give
//! for refusing a call.

use fixpack::Error as PackError;

/// Failures while building or reading a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The underlying fixpack encoding failed.
    Serialization(PackError),
    /// The frame was structurally valid fixpack but not a valid envelope.
    ProtocolViolation(String),
    /// An unknown frame kind or failure reason was encountered.
    UnknownVariant(String),
    /// The value nests deeper than `MAX_DEPTH`.
    RecursionLimitExceeded,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "serialization error: {}", e),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Self::UnknownVariant(name) => write!(f, "unknown variant: {}", name),
            Self::RecursionLimitExceeded => write!(f, "value nesting exceeds the limit"),
        }
    }
}

impl std::error::Error for Error {}

impl From<PackError> for Error {
    fn from(e: PackError) -> Self {
        Self::Serialization(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why the remote side did not answer a call with a value.
///
/// These travel inside a Reply frame. They describe the *remote* handler, while
/// `Error` describes local encoding problems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No handler exists for the method on this channel.
    NotImplemented,
    /// The handler ran and reported an error.
    Failed(String),
    /// The handler dropped the call without answering.
    Abandoned,
    /// The inbound call frame could not be understood.
    ProtocolViolation(String),
}

impl FailureReason {
    pub(crate) fn as_tag(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::Failed(_) => "Failed",
            Self::Abandoned => "Abandoned",
            Self::ProtocolViolation(_) => "ProtocolViolation",
        }
    }

    pub(crate) fn detail(&self) -> Option<&str> {
        match self {
            Self::Failed(msg) | Self::ProtocolViolation(msg) => Some(msg),
            Self::NotImplemented | Self::Abandoned => None,
        }
    }

    pub(crate) fn from_parts(tag: &str, detail: Option<&str>) -> Result<Self> {
        let detail = || detail.unwrap_or_default().to_string();
        match tag {
            "NotImplemented" => Ok(Self::NotImplemented),
            "Failed" => Ok(Self::Failed(detail())),
            "Abandoned" => Ok(Self::Abandoned),
            "ProtocolViolation" => Ok(Self::ProtocolViolation(detail())),
            other => Err(Error::UnknownVariant(format!("failure reason: {}", other))),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotImplemented => write!(f, "not implemented"),
            Self::Failed(msg) => write!(f, "failed: {}", msg),
            Self::Abandoned => write!(f, "abandoned without a reply"),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}
