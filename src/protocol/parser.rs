//! Incremental Request Parser
//!
//! The parser owns its input buffer and exposes a feed/pull interface:
//!
//! 1. `feed()` appends whatever bytes arrived from the socket
//! 2. `next_frame()` pulls one complete [`Frame`] at a time
//! 3. `Ok(None)` means the buffered bytes do not yet hold a whole frame
//!
//! Two request encodings are accepted: RESP arrays of bulk strings
//! (`*2\r\n$3\r\nGET\r\n$1\r\nk\r\n`) and inline commands (`GET k\r\n`).
//! Empty arrays and blank inline lines are consumed silently, so a pulled
//! frame always carries a command name.

use crate::protocol::types::{prefix, Frame, CRLF};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur while decoding requests.
///
/// These are not recoverable: the buffered bytes can no longer be framed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid length line: {0}")]
    InvalidLength(String),

    #[error("invalid UTF-8 in inline command")]
    InvalidUtf8,

    #[error("expected bulk string, got {0:#04x}")]
    UnexpectedType(u8),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Largest accepted bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Largest accepted number of elements in a request array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Where a connection stands with respect to frame boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Nothing buffered.
    Idle,
    /// Partial bytes buffered, no complete frame yet.
    Accumulating,
    /// At least one frame can be pulled.
    FrameReady,
}

/// Feed/pull request parser. One instance per connection.
///
/// # Example
///
/// ```
/// use pulsekv::protocol::RequestParser;
///
/// let mut parser = RequestParser::new();
/// parser.feed(b"*1\r\n$4\r\nPI");
/// assert!(parser.next_frame().unwrap().is_none());
///
/// parser.feed(b"NG\r\n");
/// let frame = parser.next_frame().unwrap().unwrap();
/// assert_eq!(&frame[0][..], b"PING");
/// ```
#[derive(Debug, Default)]
pub struct RequestParser {
    buffer: BytesMut,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Appends raw bytes received from the client.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes held that have not been turned into frames yet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pulls the next complete frame, consuming its bytes.
    pub fn next_frame(&mut self) -> ParseResult<Option<Frame>> {
        loop {
            match decode(&self.buffer)? {
                Some((frame, consumed)) => {
                    self.buffer.advance(consumed);
                    if !frame.is_empty() {
                        return Ok(Some(frame));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    /// Bytes of the incomplete frame that belong to bulk payloads whose
    /// length headers were already accepted.
    ///
    /// Those bytes are bounded by [`MAX_BULK_SIZE`]; callers limiting how
    /// much a client may buffer subtract them so a large value can stream in.
    pub fn pending_payload(&self) -> usize {
        declared_payload(&self.buffer)
    }

    /// Reports the current framing state without consuming anything.
    pub fn state(&self) -> ParserState {
        let mut rest = &self.buffer[..];
        loop {
            if rest.is_empty() {
                return ParserState::Idle;
            }
            match decode(rest) {
                Ok(Some((frame, consumed))) if frame.is_empty() => rest = &rest[consumed..],
                // A malformed buffer surfaces its error on the next pull
                Ok(Some(_)) | Err(_) => return ParserState::FrameReady,
                Ok(None) => return ParserState::Accumulating,
            }
        }
    }
}

/// Decodes one request from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied. An empty frame
/// stands for a skippable empty request.
fn decode(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    match buf.first() {
        None => Ok(None),
        Some(&prefix::ARRAY) => decode_array(buf),
        Some(_) => decode_inline(buf),
    }
}

/// `*<count>\r\n` followed by `count` bulk strings.
fn decode_array(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    let (count, mut consumed) = match read_length(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    // Null and empty arrays carry no command
    if count <= 0 {
        if count < -1 {
            return Err(ParseError::InvalidLength(count.to_string()));
        }
        return Ok(Some((Vec::new(), consumed)));
    }

    let count = count as usize;
    if count > MAX_ARRAY_LEN {
        return Err(ParseError::MessageTooLarge {
            size: count,
            max: MAX_ARRAY_LEN,
        });
    }

    let mut frame = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        match decode_bulk(&buf[consumed..])? {
            Some((element, used)) => {
                frame.push(element);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((frame, consumed)))
}

/// `$<len>\r\n<data>\r\n`
fn decode_bulk(buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
    match buf.first() {
        None => return Ok(None),
        Some(&prefix::BULK) => {}
        Some(&other) => return Err(ParseError::UnexpectedType(other)),
    }

    let (len, header) = match read_length(buf)? {
        Some(h) => h,
        None => return Ok(None),
    };
    if len < 0 {
        return Err(ParseError::ProtocolError(
            "null bulk string in request".to_string(),
        ));
    }

    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let total = header + len + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header + len..total] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    Ok(Some((Bytes::copy_from_slice(&buf[header..header + len]), total)))
}

/// Sums the payload bytes present for bulk strings of a partial array.
fn declared_payload(buf: &[u8]) -> usize {
    if buf.first() != Some(&prefix::ARRAY) {
        return 0;
    }
    let (count, mut offset) = match read_length(buf) {
        Ok(Some((count, header))) if count > 0 => (count as usize, header),
        _ => return 0,
    };

    let mut payload = 0;
    for _ in 0..count.min(MAX_ARRAY_LEN) {
        let rest = &buf[offset..];
        if rest.first() != Some(&prefix::BULK) {
            break;
        }
        let (len, header) = match read_length(rest) {
            Ok(Some((len, header))) if len >= 0 && len as usize <= MAX_BULK_SIZE => {
                (len as usize, header)
            }
            _ => break,
        };
        let body = len + CRLF.len();
        let available = rest.len() - header;
        payload += body.min(available);
        if available < body {
            break;
        }
        offset += header + body;
    }
    payload
}

/// Whitespace-separated command terminated by CRLF.
fn decode_inline(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    let end = match find_crlf(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let line = std::str::from_utf8(&buf[..end]).map_err(|_| ParseError::InvalidUtf8)?;
    let frame = line
        .split_whitespace()
        .map(|word| Bytes::copy_from_slice(word.as_bytes()))
        .collect();

    Ok(Some((frame, end + CRLF.len())))
}

/// Reads the signed length that follows a one-byte type prefix.
///
/// Returns the length and the number of bytes consumed including CRLF.
fn read_length(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[1..]) {
        Some(pos) => pos + 1,
        None => return Ok(None),
    };

    let digits = &buf[1..end];
    let len = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned()))?;

    Ok(Some((len, end + CRLF.len())))
}

#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
