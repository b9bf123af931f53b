//! Connection Handler Module
//!
//! Drives one client socket. Each client gets its own task that loops:
//!
//! ```text
//! 1. Client connects
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  read chunk from socket      │
//!    │            │                 │
//!    │            ▼                 │
//!    │  Session::on_data            │
//!    │  (decode, dispatch, encode)  │
//!    │            │                 │
//!    │            ▼                 │
//!    │  write replies, flush        │
//!    │            │                 │
//!    │       [loop back]            │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF / protocol error / I/O error
//!        │
//!        ▼
//! 5. Parser dropped, storage untouched
//! ```
//!
//! A protocol error is answered with a single `-ERR: PROTOCOL ...` reply and
//! closes this connection only.

use crate::commands::CommandHandler;
use crate::connection::session::Session;
use crate::protocol::{ParseError, Reply};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Default limit for header and inline bytes buffered towards one
/// incomplete frame (64 KB). Bulk payloads are bounded by the parser instead.
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 4096;

/// Server-wide connection counters
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_commands(&self, count: usize) {
        self.commands_processed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection over any byte stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    session: Session,

    /// Reply bytes for the chunk being processed
    out: BytesMut,

    max_buffer: usize,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            session: Session::new(command_handler),
            out: BytesMut::with_capacity(READ_CHUNK_SIZE),
            max_buffer: DEFAULT_MAX_BUFFER,
            stats,
        }
    }

    /// Overrides the limit on header bytes buffered for one incomplete frame.
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Runs the connection until the client goes away or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let mut chunk = BytesMut::with_capacity(READ_CHUNK_SIZE);

        loop {
            chunk.clear();
            let n = self.stream.read_buf(&mut chunk).await?;
            if n == 0 {
                return if self.session.buffered() == 0 {
                    Ok(())
                } else {
                    Err(ConnectionError::UnexpectedEof)
                };
            }
            self.stats.bytes_read(n);
            trace!(client = %self.addr, bytes = n, "Read data");

            self.out.clear();
            let processed = self.session.on_data(&chunk, &mut self.out);

            match processed {
                Ok(frames) => {
                    self.stats.record_commands(frames);
                    if self.session.unframed_overhead() > self.max_buffer {
                        warn!(
                            client = %self.addr,
                            size = self.session.unframed_overhead(),
                            "Buffer size limit exceeded"
                        );
                        Reply::error("ERR: PROTOCOL request too large").encode_into(&mut self.out);
                        self.send_replies().await?;
                        return Err(ConnectionError::BufferFull);
                    }
                    self.send_replies().await?;
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Parse error");
                    Reply::error(format!("ERR: PROTOCOL {}", e)).encode_into(&mut self.out);
                    self.send_replies().await?;
                    return Err(ConnectionError::ParseError(e));
                }
            }
        }
    }

    /// Writes everything in the reply buffer and flushes.
    async fn send_replies(&mut self) -> Result<(), ConnectionError> {
        if self.out.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(self.out.len());
        trace!(client = %self.addr, bytes = self.out.len(), "Sent replies");
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Stream ended in the middle of a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Creates a [`ConnectionHandler`] and runs it to completion.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_buffer: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler =
        ConnectionHandler::new(stream, addr, command_handler, stats).with_max_buffer(max_buffer);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
