//! Per-Connection Request Pipeline
//!
//! A [`Session`] owns the connection's parser and a handle on the shared
//! command handler. Each inbound chunk is processed to completion:
//!
//! ```text
//! chunk ──> feed ──> next_frame ──> dispatch ──> encode into out
//!                        ▲                            │
//!                        └────────── repeat ──────────┘
//!                            until no frame is ready
//! ```
//!
//! Nothing here awaits, so one chunk's frames run back to back and their
//! replies land in `out` in request order.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, ParserState, RequestParser};
use bytes::BytesMut;
use tracing::trace;

/// Decode/dispatch/encode state for one client.
#[derive(Debug)]
pub struct Session {
    parser: RequestParser,
    handler: CommandHandler,
}

impl Session {
    pub fn new(handler: CommandHandler) -> Self {
        Self {
            parser: RequestParser::new(),
            handler,
        }
    }

    /// Feeds `data` and answers every frame that became complete.
    ///
    /// Replies are appended to `out` in frame order. Returns the number of
    /// frames handled. On a parse error, replies for the frames decoded
    /// before the bad bytes are already in `out`.
    pub fn on_data(&mut self, data: &[u8], out: &mut BytesMut) -> Result<usize, ParseError> {
        self.parser.feed(data);

        let mut handled = 0;
        while let Some(frame) = self.parser.next_frame()? {
            self.handler.dispatch(&frame, out);
            handled += 1;
        }

        trace!(
            frames = handled,
            buffered = self.parser.buffered(),
            "Chunk processed"
        );
        Ok(handled)
    }

    pub fn state(&self) -> ParserState {
        self.parser.state()
    }

    /// Bytes held for a frame that is still incomplete.
    pub fn buffered(&self) -> usize {
        self.parser.buffered()
    }

    /// Buffered bytes outside any declared bulk payload: length headers and
    /// inline text. This is what a per-connection buffer limit applies to.
    pub fn unframed_overhead(&self) -> usize {
        self.parser.buffered() - self.parser.pending_payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandTable;
    use crate::server::ServerMetadata;
    use crate::storage::StorageEngine;
    use std::sync::Arc;

    fn create_session() -> (Session, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::new(Arc::new(ServerMetadata::default())));
        let handler = CommandHandler::new(
            Arc::clone(&storage),
            Arc::new(CommandTable::builtin().unwrap()),
        );
        (Session::new(handler), storage)
    }

    #[tokio::test]
    async fn test_single_frame() {
        let (mut session, _) = create_session();
        let mut out = BytesMut::new();

        assert_eq!(session.on_data(b"*1\r\n$4\r\nPING\r\n", &mut out).unwrap(), 1);
        assert_eq!(&out[..], b"+PONG\r\n");
        assert_eq!(session.state(), ParserState::Idle);
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks() {
        let (mut session, _) = create_session();
        let mut out = BytesMut::new();

        assert_eq!(session.on_data(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r", &mut out).unwrap(), 0);
        assert!(out.is_empty());
        assert_eq!(session.state(), ParserState::Accumulating);

        assert_eq!(session.on_data(b"\n$1\r\nv\r\n", &mut out).unwrap(), 1);
        assert_eq!(&out[..], b"+OK\r\n");
    }

    #[tokio::test]
    async fn test_pipelined_replies_keep_order() {
        let (mut session, _) = create_session();
        let mut out = BytesMut::new();

        let handled = session
            .on_data(b"SET a 1\r\nGET a b\r\nFOO\r\nPING\r\n", &mut out)
            .unwrap();
        assert_eq!(handled, 4);
        assert_eq!(
            &out[..],
            &b"+OK\r\n*2\r\n$1\r\n1\r\n$-1\r\n-ERR: FOO unknown command\r\n+PONG\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_the_pipeline() {
        let (mut session, storage) = create_session();
        let mut out = BytesMut::new();

        session
            .on_data(b"SET k\r\nSET k v x\r\nSET k v\r\n", &mut out)
            .unwrap();
        assert_eq!(
            &out[..],
            &b"-ERR: SET expect 2 or 3 arguments, 1 given\r\n\
               -ERR: SET timeout must be a non-negative number of seconds, got 'x'\r\n\
               +OK\r\n"[..]
        );
        assert_eq!(storage.get(b"k").as_deref(), Some(&b"v"[..]));
    }

    #[tokio::test]
    async fn test_parse_error_after_good_frames() {
        let (mut session, _) = create_session();
        let mut out = BytesMut::new();

        let result = session.on_data(b"PING\r\n*1\r\n:5\r\n", &mut out);
        assert_eq!(result, Err(ParseError::UnexpectedType(b':')));
        assert_eq!(&out[..], b"+PONG\r\n");
    }
}
