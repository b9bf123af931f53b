//! Command Errors
//!
//! Every way a well-framed request can be rejected. None of these are fatal:
//! the dispatcher turns each one into a single error reply and the
//! connection keeps going.

use thiserror::Error;

/// Which contract a request violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong number of arguments.
    Arity,
    /// An argument does not parse as the required type.
    Type,
    /// The command name is not in the command table.
    UnknownCommand,
}

/// A rejected request, rendered as `ERR: <COMMAND> <message>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ERR: {command} {message}")]
pub struct CommandError {
    pub kind: ErrorKind,
    /// Upper-cased command name
    pub command: String,
    pub message: String,
}

impl CommandError {
    fn new(kind: ErrorKind, command: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.to_ascii_uppercase(),
            message: message.into(),
        }
    }

    pub fn arity(command: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arity, command, message)
    }

    pub fn type_error(command: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, command, message)
    }

    pub fn unknown_command(command: &str) -> Self {
        Self::new(ErrorKind::UnknownCommand, command, "unknown command")
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
