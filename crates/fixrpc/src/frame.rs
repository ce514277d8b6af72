//! # Protocol Frames
//!
//! The envelope around every message on a relay channel.
//!
//! ```text
//! Call  := Variant("Call",  Map { seq, target, method, args })
//! Reply := Variant("Reply", Ok(Map { seq, result }) | Err(Map { seq, reason }))
//! ```
//!
//! ## Invariants
//! - **Panic Safety**: Decoding returns `Result` on any malformed input.
//! - **Forward Compatibility**: Unknown header keys are skipped.

use fixpack::Decoder;
use fixpack::Encoder;
use fixpack::Tag;

use crate::error::Error;
use crate::error::FailureReason;
use crate::error::Result;
use crate::value::Value;

/// Encodes an outbound Call frame.
pub struct CallEncoder<'a> {
    pub seq: u64,
    pub target: &'a str,
    pub method: &'a str,
    pub args: &'a Value,
}

impl<'a> CallEncoder<'a> {
    pub fn new(seq: u64, target: &'a str, method: &'a str, args: &'a Value) -> Self {
        Self { seq, target, method, args }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Call")?;
        enc.map_begin()?;

        enc.entry_u64("seq", self.seq)?;
        enc.entry_str("target", self.target)?;
        enc.entry_str("method", self.method)?;
        enc.variant_begin("args")?;
        self.args.encode(enc)?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.variant_end()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }
}

/// A decoded inbound Call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDecoder<'a> {
    pub seq: u64,
    pub target: &'a str,
    pub method: &'a str,
    pub args: Value,
}

impl<'a> CallDecoder<'a> {
    pub fn decode(mut dec: Decoder<'a>) -> Result<Self> {
        let mut map = dec.map()?;
        let mut seq = None;
        let mut target = None;
        let mut method = None;
        let mut args = None;

        while let Some((key, mut val)) = map.next()? {
            match key {
                "seq" => seq = Some(val.u64()?),
                "target" => target = Some(val.str()?),
                "method" => method = Some(val.str()?),
                "args" => args = Some(Value::decode(&mut val)?),
                _ => val.skip()?,
            }
        }

        Ok(Self {
            seq: seq.ok_or_else(|| missing("seq"))?,
            target: target.ok_or_else(|| missing("target"))?,
            method: method.ok_or_else(|| missing("method"))?,
            args: args.ok_or_else(|| missing("args"))?,
        })
    }
}

/// Encodes an outbound Reply frame, either side.
pub struct ReplyEncoder<'a> {
    pub seq: u64,
    pub status: std::result::Result<&'a Value, &'a FailureReason>,
}

impl<'a> ReplyEncoder<'a> {
    pub fn ok(seq: u64, result: &'a Value) -> Self {
        Self { seq, status: Ok(result) }
    }

    pub fn err(seq: u64, reason: &'a FailureReason) -> Self {
        Self { seq, status: Err(reason) }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Reply")?;
        match self.status {
            Ok(result) => {
                enc.result_ok_begin()?;
                enc.map_begin()?;
                enc.entry_u64("seq", self.seq)?;
                enc.variant_begin("result")?;
                result.encode(enc)?;
                enc.variant_end()?;
            }
            Err(reason) => {
                enc.result_err_begin()?;
                enc.map_begin()?;
                enc.entry_u64("seq", self.seq)?;
                enc.variant_begin("reason")?;
                enc.variant_begin(reason.as_tag())?;
                match reason.detail() {
                    Some(detail) => enc.str(detail)?,
                    None => enc.unit()?,
                }
                enc.variant_end()?;
                enc.variant_end()?;
            }
        }
        enc.map_end()?;
        enc.result_end()?;
        enc.variant_end()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }
}

/// A decoded inbound Reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyDecoder {
    pub seq: u64,
    pub status: std::result::Result<Value, FailureReason>,
}

impl ReplyDecoder {
    pub fn decode(mut dec: Decoder<'_>) -> Result<Self> {
        match dec.result()? {
            Ok(body) => Self::decode_ok(body),
            Err(body) => Self::decode_err(body),
        }
    }

    fn decode_ok(mut body: Decoder<'_>) -> Result<Self> {
        let mut map = body.map()?;
        let mut seq = None;
        let mut result = None;

        while let Some((key, mut val)) = map.next()? {
            match key {
                "seq" => seq = Some(val.u64()?),
                "result" => result = Some(Value::decode(&mut val)?),
                _ => val.skip()?,
            }
        }

        Ok(Self {
            seq: seq.ok_or_else(|| missing("seq"))?,
            status: Ok(result.ok_or_else(|| missing("result"))?),
        })
    }

    fn decode_err(mut body: Decoder<'_>) -> Result<Self> {
        let mut map = body.map()?;
        let mut seq = None;
        let mut reason = None;

        while let Some((key, mut val)) = map.next()? {
            match key {
                "seq" => seq = Some(val.u64()?),
                "reason" => {
                    let (tag, mut inner) = val.variant()?;
                    let detail = match inner.peek_tag()? {
                        Tag::Unit => { inner.unit()?; None }
                        _ => Some(inner.str()?),
                    };
                    reason = Some(FailureReason::from_parts(tag, detail)?);
                }
                _ => val.skip()?,
            }
        }

        Ok(Self {
            seq: seq.ok_or_else(|| missing("seq"))?,
            status: Err(reason.ok_or_else(|| missing("reason"))?),
        })
    }
}

/// Top-level frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcFrame<'a> {
    Call(CallDecoder<'a>),
    Reply(ReplyDecoder),
}

impl<'a> RpcFrame<'a> {
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let (kind, body) = dec.variant()?;
        match kind {
            "Call" => Ok(RpcFrame::Call(CallDecoder::decode(body)?)),
            "Reply" => Ok(RpcFrame::Reply(ReplyDecoder::decode(body)?)),
            other => Err(Error::UnknownVariant(format!("top-level frame: {}", other))),
        }
    }
}

/// Reads only the sequence number of a Call frame.
///
/// Used to answer a call whose arguments failed to decode.
pub fn decode_call_seq(bytes: &[u8]) -> Result<u64> {
    let mut dec = Decoder::new(bytes);
    let (kind, mut body) = dec.variant()?;
    if kind != "Call" {
        return Err(Error::ProtocolViolation(format!("expected Call, found {}", kind)));
    }

    let mut map = body.map()?;
    while let Some((key, mut val)) = map.next()? {
        if key == "seq" {
            return Ok(val.u64()?);
        }
        val.skip()?;
    }
    Err(missing("seq"))
}

fn missing(field: &str) -> Error {
    Error::ProtocolViolation(format!("missing {}", field))
}
