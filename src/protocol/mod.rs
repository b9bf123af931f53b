//! Wire Protocol
//!
//! Requests arrive as RESP arrays of bulk strings (or inline commands) and
//! are decoded into [`Frame`]s by the [`RequestParser`]. Every frame is
//! answered with exactly one [`Reply`].
//!
//! ## Example
//!
//! ```
//! use pulsekv::protocol::{Reply, RequestParser};
//!
//! let mut parser = RequestParser::new();
//! parser.feed(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//! let frame = parser.next_frame().unwrap().unwrap();
//! assert_eq!(frame.len(), 2);
//!
//! let reply = Reply::Array(vec![Reply::Nil]);
//! assert_eq!(&reply.encode()[..], b"*1\r\n$-1\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{ParseError, ParseResult, ParserState, RequestParser};
pub use types::{Frame, Reply};
