//! # Fixpack
//!
//! A small, bounded TLV codec used for every frame that crosses a relay channel.
//!
//! ## Philosophy
//!
//! - **Explicit State**: The encoder keeps a stack of open scopes and refuses writes
//!   that would produce a malformed frame.
//! - **Skippable**: Every item is `[Tag][Length?][Value]`, so readers can step over
//!   keys they do not understand.
//! - **Zero-Copy Reads**: Decoders are bounds-checked views into the input buffer.
//!
//! ## Format
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Strings**: `[Tag: 1b][Len: 4b][Utf8: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//!
//! All integers and floats are Little-Endian.

#[cfg(test)]
mod tests;

/// Fixpack encoding and decoding errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Byte is not a known `Tag`.
    InvalidTag(u8),
    /// Read a valid tag, but not the one the caller asked for.
    UnexpectedTag { expected: Tag, found: Tag },
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// String or container body exceeds `u32::MAX` bytes.
    TooLarge(usize),
    /// Closed a scope that is not the innermost open scope.
    ScopeMismatch { expected: Scope, actual: Scope },
    /// Tried to close the root scope.
    ScopeUnderflow,
    /// Tried to finalize while a scope is still open.
    ScopeStillOpen,
    /// Wrote a second item into a scope that holds exactly one.
    TooManyItems(Scope),
    /// Closed a scope that holds exactly one item without writing it.
    MissingItem(Scope),
    /// Wrote something other than a keyed entry directly into a map.
    InvalidMapEntry,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTag(b) => write!(f, "invalid tag byte: {:#04x}", b),
            Self::UnexpectedTag { expected, found } => {
                write!(f, "unexpected tag: expected {:?}, found {:?}", expected, found)
            }
            Self::InvalidUtf8 => write!(f, "string is not valid utf-8"),
            Self::UnexpectedEnd => write!(f, "unexpected end of buffer"),
            Self::TooLarge(len) => write!(f, "item of {} bytes does not fit a u32 length", len),
            Self::ScopeMismatch { expected, actual } => {
                write!(f, "scope mismatch: expected {:?}, found {:?}", expected, actual)
            }
            Self::ScopeUnderflow => write!(f, "cannot close the root scope"),
            Self::ScopeStillOpen => write!(f, "cannot finalize with open scopes"),
            Self::TooManyItems(scope) => write!(f, "scope {:?} holds exactly one item", scope),
            Self::MissingItem(scope) => write!(f, "scope {:?} closed without its item", scope),
            Self::InvalidMapEntry => write!(f, "maps only hold keyed entries"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies the kind of the next encoded item.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    BoolTrue = 0x01,
    BoolFalse = 0x02,
    U64 = 0x06,
    F64 = 0x0C,
    Unit = 0x0E,
    String = 0x10,
    Map = 0x21,
    ResultOk = 0x31,
    ResultErr = 0x32,
    Variant = 0x33,
}

impl Tag {
    pub fn from_u8(b: u8) -> Option<Self> {
        let tag = match b {
            0x01 => Tag::BoolTrue,
            0x02 => Tag::BoolFalse,
            0x06 => Tag::U64,
            0x0C => Tag::F64,
            0x0E => Tag::Unit,
            0x10 => Tag::String,
            0x21 => Tag::Map,
            0x31 => Tag::ResultOk,
            0x32 => Tag::ResultErr,
            0x33 => Tag::Variant,
            _ => return None,
        };
        Some(tag)
    }

    /// Width of the fixed payload following the tag, or `None` for length-prefixed items.
    fn fixed_width(self) -> Option<usize> {
        match self {
            Tag::BoolTrue | Tag::BoolFalse | Tag::Unit => Some(0),
            Tag::U64 | Tag::F64 => Some(8),
            Tag::String | Tag::Map | Tag::ResultOk | Tag::ResultErr | Tag::Variant => None,
        }
    }
}

/// Kinds of open containers on the encoder stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Accepts any number of items.
    Root,
    /// Accepts only variants, which act as key/value entries.
    Map,
    /// Accepts exactly one item.
    Result,
    /// Accepts exactly one item after the name.
    Variant,
}

impl Scope {
    fn holds_one(self) -> bool {
        matches!(self, Scope::Result | Scope::Variant)
    }
}

struct OpenScope {
    scope: Scope,
    /// Offset of the first body byte; the length header sits right before it.
    body_start: usize,
    items: usize,
}

/// Stack-checked encoder that back-patches container lengths on close.
pub struct Encoder {
    buf: Vec<u8>,
    stack: Vec<OpenScope>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
            stack: vec![OpenScope { scope: Scope::Root, body_start: 0, items: 0 }],
        }
    }

    /// Finalizes the encoder. Fails if any container is still open.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if self.stack.len() > 1 {
            return Err(Error::ScopeStillOpen);
        }
        Ok(self.buf)
    }

    fn top(&mut self) -> &mut OpenScope {
        // The root scope is never popped, so the stack is never empty.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn admit(&mut self, tag: Tag) -> Result<()> {
        let top = self.top();
        if top.scope == Scope::Map && tag != Tag::Variant {
            return Err(Error::InvalidMapEntry);
        }
        if top.scope.holds_one() && top.items >= 1 {
            return Err(Error::TooManyItems(top.scope));
        }
        Ok(())
    }

    fn scalar(&mut self, tag: Tag, data: &[u8]) -> Result<()> {
        self.admit(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(data);
        self.top().items += 1;
        Ok(())
    }

    fn open(&mut self, tag: Tag, scope: Scope) -> Result<()> {
        self.admit(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&[0; 4]);
        let body_start = self.buf.len();
        self.stack.push(OpenScope { scope, body_start, items: 0 });
        Ok(())
    }

    fn close(&mut self, expected: Scope) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(Error::ScopeUnderflow);
        }

        let top = self.top();
        if top.scope != expected {
            return Err(Error::ScopeMismatch { expected, actual: top.scope });
        }
        if top.scope.holds_one() && top.items == 0 {
            return Err(Error::MissingItem(top.scope));
        }

        let body_start = top.body_start;
        self.stack.pop();

        let body_len = self.buf.len() - body_start;
        let len = u32::try_from(body_len).map_err(|_| Error::TooLarge(body_len))?;
        self.buf[body_start - 4..body_start].copy_from_slice(&len.to_le_bytes());

        self.top().items += 1;
        Ok(())
    }

    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.scalar(if v { Tag::BoolTrue } else { Tag::BoolFalse }, &[])
    }

    pub fn u64(&mut self, v: u64) -> Result<()> {
        self.scalar(Tag::U64, &v.to_le_bytes())
    }

    pub fn f64(&mut self, v: f64) -> Result<()> {
        self.scalar(Tag::F64, &v.to_le_bytes())
    }

    pub fn unit(&mut self) -> Result<()> {
        self.scalar(Tag::Unit, &[])
    }

    pub fn str(&mut self, v: &str) -> Result<()> {
        let len = u32::try_from(v.len()).map_err(|_| Error::TooLarge(v.len()))?;
        self.admit(Tag::String)?;
        self.buf.push(Tag::String as u8);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(v.as_bytes());
        self.top().items += 1;
        Ok(())
    }

    /// Opens a map. Only `variant_begin` may be called directly inside it.
    pub fn map_begin(&mut self) -> Result<()> { self.open(Tag::Map, Scope::Map) }
    pub fn map_end(&mut self) -> Result<()> { self.close(Scope::Map) }

    /// Opens the success side of a result. Exactly one item must follow.
    pub fn result_ok_begin(&mut self) -> Result<()> { self.open(Tag::ResultOk, Scope::Result) }
    /// Opens the failure side of a result. Exactly one item must follow.
    pub fn result_err_begin(&mut self) -> Result<()> { self.open(Tag::ResultErr, Scope::Result) }
    pub fn result_end(&mut self) -> Result<()> { self.close(Scope::Result) }

    /// Opens a named variant. Exactly one payload item must follow.
    ///
    /// Inside a map, the name is the entry key.
    pub fn variant_begin(&mut self, name: &str) -> Result<()> {
        self.open(Tag::Variant, Scope::Variant)?;
        self.str(name)?;
        // The name is a header, not the payload.
        self.top().items = 0;
        Ok(())
    }
    pub fn variant_end(&mut self) -> Result<()> { self.close(Scope::Variant) }

    /// Writes `key => u64` inside a map.
    pub fn entry_u64(&mut self, key: &str, v: u64) -> Result<()> {
        self.variant_begin(key)?;
        self.u64(v)?;
        self.variant_end()
    }

    /// Writes `key => str` inside a map.
    pub fn entry_str(&mut self, key: &str, v: &str) -> Result<()> {
        self.variant_begin(key)?;
        self.str(v)?;
        self.variant_end()
    }
}

/// A bounds-checked cursor over encoded bytes.
///
/// Container reads hand back a new `Decoder` restricted to the container body.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn peek_tag(&self) -> Result<Tag> {
        let b = *self.buf.first().ok_or(Error::UnexpectedEnd)?;
        Tag::from_u8(b).ok_or(Error::InvalidTag(b))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.take_array::<4>()?) as usize)
    }

    fn expect(&mut self, expected: Tag) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(Error::UnexpectedTag { expected, found });
        }
        self.take(1)?;
        Ok(())
    }

    fn enter(&mut self, expected: Tag) -> Result<Decoder<'a>> {
        self.expect(expected)?;
        let len = self.take_len()?;
        Ok(Decoder::new(self.take(len)?))
    }

    /// Steps over the next item, including any nested body.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.take(1)?;
        match tag.fixed_width() {
            Some(width) => self.take(width)?,
            None => {
                let len = self.take_len()?;
                self.take(len)?
            }
        };
        Ok(())
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.peek_tag()? {
            Tag::BoolTrue => { self.take(1)?; Ok(true) }
            Tag::BoolFalse => { self.take(1)?; Ok(false) }
            found => Err(Error::UnexpectedTag { expected: Tag::BoolTrue, found }),
        }
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.expect(Tag::U64)?;
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.expect(Tag::F64)?;
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    pub fn unit(&mut self) -> Result<()> {
        self.expect(Tag::Unit)
    }

    pub fn str(&mut self) -> Result<&'a str> {
        self.expect(Tag::String)?;
        let len = self.take_len()?;
        std::str::from_utf8(self.take(len)?).map_err(|_| Error::InvalidUtf8)
    }

    pub fn map(&mut self) -> Result<MapIter<'a>> {
        Ok(MapIter { dec: self.enter(Tag::Map)? })
    }

    /// Returns the body of either side of a result.
    pub fn result(&mut self) -> Result<std::result::Result<Decoder<'a>, Decoder<'a>>> {
        match self.peek_tag()? {
            Tag::ResultOk => Ok(Ok(self.enter(Tag::ResultOk)?)),
            Tag::ResultErr => Ok(Err(self.enter(Tag::ResultErr)?)),
            found => Err(Error::UnexpectedTag { expected: Tag::ResultOk, found }),
        }
    }

    /// Returns `(name, payload decoder)`.
    pub fn variant(&mut self) -> Result<(&'a str, Decoder<'a>)> {
        let mut body = self.enter(Tag::Variant)?;
        let name = body.str()?;
        Ok((name, body))
    }
}

/// Iterates the `(key, value)` entries of a map.
#[derive(Debug)]
pub struct MapIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> MapIter<'a> {
    pub fn next(&mut self) -> Result<Option<(&'a str, Decoder<'a>)>> {
        if self.dec.is_empty() {
            return Ok(None);
        }
        self.dec.variant().map(Some)
    }
}
