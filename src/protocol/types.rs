//! Reply Types and Encoding
//!
//! Every request frame produces exactly one [`Reply`]. Replies are encoded
//! with the usual RESP type prefixes:
//!
//! - `+` Status (`+OK\r\n`, `+PONG\r\n`)
//! - `-` Error (`-ERR: SET expect 2 or 3 arguments, 1 given\r\n`)
//! - `$` Bulk value, `$-1\r\n` for the nil marker
//! - `*` Array
//!
//! All lines are terminated with CRLF.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator
pub const CRLF: &[u8] = b"\r\n";

/// Wire type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One decoded client command: the command name followed by its arguments.
///
/// A frame produced by [`RequestParser`](super::RequestParser) always has at
/// least one element.
pub type Frame = Vec<Bytes>;

/// A reply written back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Short fixed acknowledgement. Must not contain CR or LF.
    Status(&'static str),

    /// Single-line error text, already formatted (`ERR: <COMMAND> <message>`).
    Error(String),

    /// Binary-safe value.
    Bulk(Bytes),

    /// The nil marker, returned for a key absent from the key space.
    Nil,

    /// Ordered sequence of replies.
    Array(Vec<Reply>),
}

impl Reply {
    /// `+OK`
    pub fn ok() -> Self {
        Reply::Status("OK")
    }

    /// `+PONG`
    pub fn pong() -> Self {
        Reply::Status("PONG")
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Maps a lookup result to a bulk value or the nil marker.
    pub fn from_lookup(value: Option<Bytes>) -> Self {
        value.map_or(Reply::Nil, Reply::Bulk)
    }

    /// Encodes the reply into a fresh buffer.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Appends the wire form of this reply to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                buf.put_u8(prefix::STATUS);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.put_u8(prefix::ERROR);
                // Error replies are single-line by contract
                for b in s.bytes() {
                    buf.put_u8(if b == b'\r' || b == b'\n' { b' ' } else { b });
                }
                buf.put_slice(CRLF);
            }
            Reply::Bulk(data) => {
                buf.put_u8(prefix::BULK);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Reply::Nil => {
                buf.put_u8(prefix::BULK);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
            Reply::Array(items) => {
                buf.put_u8(prefix::ARRAY);
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for item in items {
                    item.encode_into(buf);
                }
            }
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}
