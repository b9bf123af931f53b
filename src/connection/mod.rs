//! Connection Module
//!
//! One [`ConnectionHandler`] task per accepted client. The handler reads
//! chunks from the socket and hands them to its [`Session`], which decodes,
//! dispatches and encodes synchronously; the handler then writes the
//! replies back in order.
//!
//! ## Example
//!
//! ```ignore
//! use pulsekv::commands::{CommandHandler, CommandTable};
//! use pulsekv::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_BUFFER};
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(storage, Arc::new(CommandTable::builtin()?));
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler.clone(), stats, DEFAULT_MAX_BUFFER));
//! ```

pub mod handler;
pub mod session;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, DEFAULT_MAX_BUFFER,
};
pub use session::Session;
