//! Command Module
//!
//! Maps decoded frames to storage operations and turns every failure into a
//! protocol error reply.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ RequestParser   │  (protocol module)
//! └────────┬────────┘
//!          │ Frame
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │  - lookup       │
//! │  - arity check  │
//! │  - execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod error;
pub mod handler;

pub use error::{CommandError, CommandResult, ErrorKind};
pub use handler::{Arity, CommandHandler, CommandSpec, CommandTable, TableError, COMMANDS};
