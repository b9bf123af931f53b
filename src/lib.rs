//! # pulsekv - A Minimal In-Memory Key-Value Store
//!
//! pulsekv stores opaque byte strings under byte-string keys, optionally with
//! a per-key timeout, and serves them over a Redis-like line protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                             pulsekv                             │
//! │                                                                 │
//! │  ┌─────────────┐    ┌──────────────┐    ┌────────────────┐      │
//! │  │ TCP Server  │───>│ Connection   │───>│ CommandHandler │      │
//! │  │ (Listener)  │    │ (Session)    │    │ (CommandTable) │      │
//! │  └─────────────┘    └──────┬───────┘    └───────┬────────┘      │
//! │                            │                    │               │
//! │                     ┌──────▼───────┐            ▼               │
//! │                     │ RequestParser│   ┌──────────────────┐     │
//! │                     └──────────────┘   │  StorageEngine   │     │
//! │                                        │  key space +     │     │
//! │                                        │  expiry index    │     │
//! │                                        └────────┬─────────┘     │
//! │                                                 │ one-shot      │
//! │                                        ┌────────▼─────────┐     │
//! │                                        │   TokioTimers    │     │
//! │                                        └──────────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Commands
//!
//! - `PING`
//! - `SET key value [timeout]` (timeout in seconds, fractions allowed)
//! - `GET key [key ...]`
//! - `INFO`
//!
//! Rejected requests get a single-line error reply,
//! `ERR: <COMMAND> <message>`, and the connection stays open.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pulsekv::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(&Config::default()).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: request parser and reply encoder
//! - [`storage`]: key space, expiry index and timers
//! - [`commands`]: command table, dispatch and error replies
//! - [`connection`]: per-client request pipeline
//! - [`server`]: listener and INFO metadata
//! - [`config`]: command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{CommandError, CommandHandler, CommandTable, ErrorKind};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats, Session};
pub use protocol::{Frame, ParseError, Reply, RequestParser};
pub use server::{Server, ServerMetadata};
pub use storage::{ServerInfo, StorageEngine, TimerService, TokioTimers};

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of pulsekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
