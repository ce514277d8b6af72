//! # Values
//!
//! The dynamic data model carried in call arguments and reply results.
//!
//! ## Invariants
//! - **Ordered Maps**: `Value::Map` keeps entries in insertion order on the wire.
//! - **Bounded Depth**: Encoding and decoding refuse nesting beyond `MAX_DEPTH`.

use fixpack::Decoder;
use fixpack::Encoder;
use fixpack::Tag;

use crate::error::Error;
use crate::error::Result;

/// The maximum nesting depth of maps inside maps.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    U64(u64),
    F64(f64),
    Str(String),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Builds a map value from `(key, value)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up a key when this is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        self.encode_at(enc, 0)
    }

    fn encode_at(&self, enc: &mut Encoder, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimitExceeded);
        }

        match self {
            Value::Unit => enc.unit()?,
            Value::Bool(v) => enc.bool(*v)?,
            Value::U64(v) => enc.u64(*v)?,
            Value::F64(v) => enc.f64(*v)?,
            Value::Str(v) => enc.str(v)?,
            Value::Map(entries) => {
                enc.map_begin()?;
                for (key, value) in entries {
                    enc.variant_begin(key)?;
                    value.encode_at(enc, depth + 1)?;
                    enc.variant_end()?;
                }
                enc.map_end()?;
            }
        }
        Ok(())
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Self::decode_at(dec, 0)
    }

    fn decode_at(dec: &mut Decoder<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(Error::RecursionLimitExceeded);
        }

        let value = match dec.peek_tag()? {
            Tag::Unit => { dec.unit()?; Value::Unit }
            Tag::BoolTrue | Tag::BoolFalse => Value::Bool(dec.bool()?),
            Tag::U64 => Value::U64(dec.u64()?),
            Tag::F64 => Value::F64(dec.f64()?),
            Tag::String => Value::Str(dec.str()?.to_string()),
            Tag::Map => {
                let mut map = dec.map()?;
                let mut entries = Vec::new();
                while let Some((key, mut val)) = map.next()? {
                    entries.push((key.to_string(), Self::decode_at(&mut val, depth + 1)?));
                }
                Value::Map(entries)
            }
            other => {
                return Err(Error::ProtocolViolation(format!("{:?} is not a value", other)));
            }
        };
        Ok(value)
    }
}
