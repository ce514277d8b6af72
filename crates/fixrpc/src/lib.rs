//! # FixRPC
//!
//! A strict request/reply envelope over `fixpack`.
//!
//! Every message on a relay channel is either a `Call` (sequence number, target
//! channel, method name, one argument value) or a `Reply` (the same sequence
//! number plus a result value or a `FailureReason`). Correlation is the caller's
//! job; this crate only builds and reads frames.

pub mod error;
pub mod frame;
pub mod value;


pub use error::Error;
pub use error::FailureReason;
pub use error::Result;
pub use frame::CallDecoder;
pub use frame::CallEncoder;
pub use frame::ReplyDecoder;
pub use frame::ReplyEncoder;
pub use frame::RpcFrame;
pub use frame::decode_call_seq;
pub use value::Value;
