//! RESP2 framing for the Redis wire protocol.

use crate::error::{Error, Result};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum bulk string size (512MB, the server-side limit).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting accepted from the server.
const MAX_DEPTH: usize = 16;

const CRLF: &[u8] = b"\r\n";

/// A value read from the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`
    Simple(String),
    /// `-ERR ...`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$5\r\nhello`, or the null bulk string.
    Bulk(Option<Bytes>),
    /// `*2\r\n...`, or the null array.
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Returns the raw bytes of a bulk or simple string.
    #[must_use]
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Self::Bulk(Some(bytes)) => Some(bytes),
            Self::Simple(string) => Some(Bytes::from(string)),
            _ => None,
        }
    }

    /// Whether this is the `+OK` status reply.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Simple(status) if status == "OK")
    }
}

/// A command sent to the server as an array of bulk strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a command with no arguments.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg<A>(mut self, arg: A) -> Self
    where
        A: Into<Bytes>,
    {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument from `args`.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Codec for encoding commands and decoding replies.
#[derive(Debug)]
pub struct RespCodec {
    max_bulk_size: usize,
}

impl RespCodec {
    /// Create a new RESP codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
        }
    }

    /// Create a codec with a custom max bulk size.
    #[must_use]
    pub const fn with_max_bulk_size(mut self, size: usize) -> Self {
        self.max_bulk_size = size;
        self
    }
}

impl Default for RespCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RespValue>> {
        match parse(buf, self.max_bulk_size, 0)? {
            Some((value, consumed)) => {
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for RespCodec {
    type Error = Error;

    fn encode(&mut self, command: Command, buf: &mut BytesMut) -> Result<()> {
        write_header(buf, b'*', command.args.len() + 1);
        write_bulk(buf, command.name.as_bytes());
        for arg in &command.args {
            write_bulk(buf, arg);
        }

        Ok(())
    }
}

fn write_header(buf: &mut BytesMut, tag: u8, len: usize) {
    buf.put_u8(tag);
    buf.put_slice(len.to_string().as_bytes());
    buf.put_slice(CRLF);
}

fn write_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.reserve(data.len() + 16);
    write_header(buf, b'$', data.len());
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

/// Parses one value from the front of `buf`, returning it with the number of
/// bytes it occupied, or `None` when more data is needed.
fn parse(buf: &[u8], max_bulk_size: usize, depth: usize) -> Result<Option<(RespValue, usize)>> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };
    let Some(line_len) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let line = &buf[1..=line_len];
    let mut pos = line_len + 3;

    let value = match tag {
        b'+' => RespValue::Simple(String::from_utf8_lossy(line).into_owned()),
        b'-' => RespValue::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => RespValue::Integer(parse_integer(line)?),
        b'$' => {
            let Ok(len) = usize::try_from(parse_integer(line)?) else {
                return Ok(Some((RespValue::Bulk(None), pos)));
            };
            if len > max_bulk_size {
                return Err(Error::Protocol(format!(
                    "bulk string of {len} bytes exceeds maximum {max_bulk_size}"
                )));
            }
            if buf.len() < pos + len + CRLF.len() {
                return Ok(None);
            }
            if &buf[pos + len..pos + len + CRLF.len()] != CRLF {
                return Err(Error::Protocol("bulk string not terminated by CRLF".into()));
            }
            let data = Bytes::copy_from_slice(&buf[pos..pos + len]);
            pos += len + CRLF.len();
            RespValue::Bulk(Some(data))
        }
        b'*' => {
            let Ok(count) = usize::try_from(parse_integer(line)?) else {
                return Ok(Some((RespValue::Array(None), pos)));
            };
            if depth >= MAX_DEPTH {
                return Err(Error::Protocol("arrays nested too deeply".into()));
            }
            let mut items = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                match parse(&buf[pos..], max_bulk_size, depth + 1)? {
                    Some((item, consumed)) => {
                        items.push(item);
                        pos += consumed;
                    }
                    None => return Ok(None),
                }
            }
            RespValue::Array(Some(items))
        }
        other => {
            return Err(Error::Protocol(format!("unexpected type byte {other:#x}")));
        }
    };

    Ok(Some((value, pos)))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

fn parse_integer(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| {
            Error::Protocol(format!(
                "invalid integer {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}
