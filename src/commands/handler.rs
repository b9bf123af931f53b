//! Command Dispatch
//!
//! Commands are resolved through a [`CommandTable`] built once at startup
//! from the static [`COMMANDS`] list. Each entry names the command, declares
//! its arity and points at its handler, so name lookup and argument-count
//! checks are identical for every command.
//!
//! ```text
//! Frame ["set", "k", "v", "0.5"]
//!        │
//!        ▼
//! ┌──────────────┐  unknown name  ┌────────────────────────┐
//! │ CommandTable │ ─────────────> │ ERR: SET unknown ...   │
//! └──────┬───────┘                └────────────────────────┘
//!        │ arity check                       ▲
//!        ▼                                   │ CommandError
//! ┌──────────────┐                           │
//! │   handler    │ ──────────────────────────┘
//! └──────┬───────┘
//!        ▼
//!   StorageEngine
//! ```
//!
//! ## Supported Commands
//!
//! - `PING` - no arguments, replies `+PONG`
//! - `SET key value [timeout]` - timeout in (fractional) seconds
//! - `GET key [key ...]` - array reply, nil for missing keys
//! - `INFO` - flat array of field/value pairs

use crate::commands::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::StorageEngine;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Handler signature. Receives the arguments after the command name, already
/// checked against the declared arity.
pub type CommandFn = fn(&StorageEngine, &[Bytes]) -> CommandResult<Reply>;

/// Accepted argument counts, not counting the command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// Inclusive bounds
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, given: usize) -> bool {
        match *self {
            Arity::Exact(n) => given == n,
            Arity::Range(min, max) => (min..=max).contains(&given),
            Arity::AtLeast(min) => given >= min,
        }
    }

    /// Human-readable contract for an arity error.
    pub fn describe(&self, given: usize) -> String {
        match *self {
            Arity::Exact(0) => "expect no arguments".to_string(),
            Arity::Exact(1) => format!("expect 1 argument, {} given", given),
            Arity::Exact(n) => format!("expect {} arguments, {} given", n, given),
            Arity::Range(min, max) if max == min + 1 => {
                format!("expect {} or {} arguments, {} given", min, max, given)
            }
            Arity::Range(min, max) => {
                format!("expect {} to {} arguments, {} given", min, max, given)
            }
            Arity::AtLeast(min) => format!("expect {} or more arguments, {} given", min, given),
        }
    }
}

/// One command table entry.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Lower-case command name
    pub name: &'static str,
    pub arity: Arity,
    pub handler: CommandFn,
}

/// Every command the server understands.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "ping",
        arity: Arity::Exact(0),
        handler: cmd_ping,
    },
    CommandSpec {
        name: "set",
        arity: Arity::Range(2, 3),
        handler: cmd_set,
    },
    CommandSpec {
        name: "get",
        arity: Arity::AtLeast(1),
        handler: cmd_get,
    },
    CommandSpec {
        name: "info",
        arity: Arity::Exact(0),
        handler: cmd_info,
    },
];

/// Problems found while building a command table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("command name '{0}' must be non-empty lower-case ASCII")]
    InvalidName(&'static str),

    #[error("command '{0}' is registered twice")]
    Duplicate(&'static str),

    #[error("command '{0}' declares an empty arity range")]
    InvalidArity(&'static str),
}

/// Validated name -> command lookup.
#[derive(Debug, Clone)]
pub struct CommandTable {
    commands: HashMap<&'static str, CommandSpec>,
}

impl CommandTable {
    /// Builds and validates a table from `specs`.
    pub fn from_specs(specs: &[CommandSpec]) -> Result<Self, TableError> {
        let mut commands = HashMap::with_capacity(specs.len());

        for spec in specs {
            let valid_name = !spec.name.is_empty()
                && spec
                    .name
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
            if !valid_name {
                return Err(TableError::InvalidName(spec.name));
            }
            if let Arity::Range(min, max) = spec.arity {
                if min > max {
                    return Err(TableError::InvalidArity(spec.name));
                }
            }
            if commands.insert(spec.name, *spec).is_some() {
                return Err(TableError::Duplicate(spec.name));
            }
        }

        Ok(Self { commands })
    }

    /// The table of built-in commands.
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_specs(COMMANDS)
    }

    /// Looks up a lower-case command name.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Turns frames into replies against a shared storage engine.
///
/// Cheap to clone; each connection holds its own copy.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    table: Arc<CommandTable>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>, table: Arc<CommandTable>) -> Self {
        Self { storage, table }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes one frame. Always yields exactly one reply; command errors
    /// become error replies.
    pub fn execute(&self, frame: &[Bytes]) -> Reply {
        match self.try_execute(frame) {
            Ok(reply) => reply,
            Err(err) => {
                debug!(command = %err.command, kind = ?err.kind, "Command rejected");
                Reply::Error(err.to_string())
            }
        }
    }

    /// Executes one frame and appends the encoded reply to `out`.
    pub fn dispatch(&self, frame: &[Bytes], out: &mut BytesMut) {
        self.execute(frame).encode_into(out);
    }

    fn try_execute(&self, frame: &[Bytes]) -> CommandResult<Reply> {
        let Some((name, args)) = frame.split_first() else {
            return Err(CommandError::unknown_command(""));
        };

        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        let spec = self
            .table
            .get(&name)
            .ok_or_else(|| CommandError::unknown_command(&name))?;

        if !spec.arity.accepts(args.len()) {
            return Err(CommandError::arity(&name, spec.arity.describe(args.len())));
        }

        trace!(command = %name, args = args.len(), "Dispatching command");
        (spec.handler)(&self.storage, args)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// PING
fn cmd_ping(_storage: &StorageEngine, _args: &[Bytes]) -> CommandResult<Reply> {
    Ok(Reply::pong())
}

/// SET key value [timeout]
fn cmd_set(storage: &StorageEngine, args: &[Bytes]) -> CommandResult<Reply> {
    let ttl = args.get(2).map(parse_timeout).transpose()?;
    storage.set(args[0].clone(), args[1].clone(), ttl);
    Ok(Reply::ok())
}

/// GET key [key ...]
fn cmd_get(storage: &StorageEngine, args: &[Bytes]) -> CommandResult<Reply> {
    let values = storage
        .get_many(args)
        .into_iter()
        .map(Reply::from_lookup)
        .collect();
    Ok(Reply::Array(values))
}

/// INFO
fn cmd_info(storage: &StorageEngine, _args: &[Bytes]) -> CommandResult<Reply> {
    let fields = storage
        .info()
        .into_iter()
        .flat_map(|(field, value)| [Reply::bulk(field), Reply::bulk(value)])
        .collect();
    Ok(Reply::Array(fields))
}

/// Parses a timeout given in seconds, fractions allowed.
fn parse_timeout(raw: &Bytes) -> CommandResult<Duration> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        // Past what Duration can hold the key simply never expires in practice
        .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
        .ok_or_else(|| {
            CommandError::type_error(
                "set",
                format!(
                    "timeout must be a non-negative number of seconds, got '{}'",
                    String::from_utf8_lossy(raw)
                ),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerMetadata;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new(Arc::new(ServerMetadata::default())));
        CommandHandler::new(storage, Arc::new(CommandTable::builtin().unwrap()))
    }

    fn make_command(args: &[&str]) -> Vec<Bytes> {
        args.iter()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .collect()
    }

    fn info_field(reply: &Reply, field: &str) -> Option<String> {
        let items = reply.as_array()?;
        items.chunks(2).find_map(|pair| match pair {
            [Reply::Bulk(k), Reply::Bulk(v)] if &k[..] == field.as_bytes() => {
                Some(String::from_utf8_lossy(v).into_owned())
            }
            _ => None,
        })
    }

    #[test]
    fn test_builtin_table_is_valid() {
        let table = CommandTable::builtin().unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.get("ping").is_some());
        assert!(table.get("PING").is_none());
    }

    #[test]
    fn test_table_rejects_duplicates() {
        let specs = [COMMANDS[0], COMMANDS[0]];
        assert_eq!(
            CommandTable::from_specs(&specs).unwrap_err(),
            TableError::Duplicate("ping")
        );
    }

    #[test]
    fn test_table_rejects_bad_names_and_arity() {
        let mut spec = COMMANDS[0];
        spec.name = "Ping";
        assert_eq!(
            CommandTable::from_specs(&[spec]).unwrap_err(),
            TableError::InvalidName("Ping")
        );

        let mut spec = COMMANDS[1];
        spec.arity = Arity::Range(3, 2);
        assert_eq!(
            CommandTable::from_specs(&[spec]).unwrap_err(),
            TableError::InvalidArity("set")
        );
    }

    #[test]
    fn test_arity_descriptions() {
        assert_eq!(Arity::Exact(0).describe(1), "expect no arguments");
        assert_eq!(Arity::Range(2, 3).describe(1), "expect 2 or 3 arguments, 1 given");
        assert_eq!(Arity::AtLeast(1).describe(0), "expect 1 or more arguments, 0 given");
        assert_eq!(Arity::Range(1, 4).describe(0), "expect 1 to 4 arguments, 0 given");
    }

    #[tokio::test]
    async fn test_ping() {
        let handler = create_handler();
        assert_eq!(handler.execute(&make_command(&["PING"])), Reply::pong());
        assert_eq!(handler.execute(&make_command(&["ping"])), Reply::pong());
    }

    #[tokio::test]
    async fn test_ping_with_argument() {
        let handler = create_handler();
        assert_eq!(
            handler.execute(&make_command(&["PING", "hello"])),
            Reply::error("ERR: PING expect no arguments")
        );
    }

    #[tokio::test]
    async fn test_set_get() {
        let handler = create_handler();
        assert_eq!(handler.execute(&make_command(&["SET", "name", "Ariz"])), Reply::ok());
        assert_eq!(
            handler.execute(&make_command(&["GET", "name"])),
            Reply::Array(vec![Reply::bulk("Ariz")])
        );
    }

    #[tokio::test]
    async fn test_get_missing_and_multiple() {
        let handler = create_handler();
        handler.execute(&make_command(&["SET", "a", "1"]));

        assert_eq!(
            handler.execute(&make_command(&["get", "a", "missing", "a"])),
            Reply::Array(vec![Reply::bulk("1"), Reply::Nil, Reply::bulk("1")])
        );
    }

    #[tokio::test]
    async fn test_get_without_keys() {
        let handler = create_handler();
        assert_eq!(
            handler.execute(&make_command(&["GET"])),
            Reply::error("ERR: GET expect 1 or more arguments, 0 given")
        );
    }

    #[tokio::test]
    async fn test_set_arity() {
        let handler = create_handler();
        assert_eq!(
            handler.execute(&make_command(&["SET", "k"])),
            Reply::error("ERR: SET expect 2 or 3 arguments, 1 given")
        );
        assert_eq!(
            handler.execute(&make_command(&["SET", "k", "v", "1", "extra"])),
            Reply::error("ERR: SET expect 2 or 3 arguments, 4 given")
        );
        assert!(handler.storage().is_empty());
    }

    #[tokio::test]
    async fn test_set_bad_timeout() {
        let handler = create_handler();
        for bad in ["abc", "-1", "NaN", "inf", ""] {
            let reply = handler.execute(&make_command(&["SET", "k", "v", bad]));
            assert_eq!(
                reply,
                Reply::error(format!(
                    "ERR: SET timeout must be a non-negative number of seconds, got '{}'",
                    bad
                ))
            );
        }
        assert!(handler.storage().is_empty());
    }

    #[tokio::test]
    async fn test_set_valid_timeouts() {
        let handler = create_handler();
        for good in ["0", "1.5", "1e19", "1e30", "1.7e308"] {
            assert_eq!(
                handler.execute(&make_command(&["SET", "k", "v", good])),
                Reply::ok(),
                "timeout {}",
                good
            );
            assert!(handler.storage().has_expiry(b"k"));
        }
    }

    #[test]
    fn test_parse_timeout_saturates() {
        assert_eq!(
            parse_timeout(&Bytes::from_static(b"1e30")).unwrap(),
            Duration::MAX
        );
        assert_eq!(
            parse_timeout(&Bytes::from_static(b"2.5")).unwrap(),
            Duration::from_millis(2500)
        );
    }

    #[tokio::test]
    async fn test_set_with_timeout_registers_expiry() {
        let handler = create_handler();
        assert_eq!(
            handler.execute(&make_command(&["SET", "k", "v", "10"])),
            Reply::ok()
        );
        assert!(handler.storage().has_expiry(b"k"));

        handler.execute(&make_command(&["SET", "k", "v2"]));
        assert!(!handler.storage().has_expiry(b"k"));
    }

    #[tokio::test]
    async fn test_info() {
        let handler = create_handler();
        handler.execute(&make_command(&["SET", "a", "1"]));
        handler.execute(&make_command(&["SET", "b", "2", "100"]));

        let reply = handler.execute(&make_command(&["INFO"]));
        assert_eq!(info_field(&reply, "keys").as_deref(), Some("2"));
        assert_eq!(info_field(&reply, "timeouts").as_deref(), Some("1"));
        assert_eq!(
            info_field(&reply, "version").as_deref(),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }

    #[tokio::test]
    async fn test_info_with_arguments() {
        let handler = create_handler();
        assert_eq!(
            handler.execute(&make_command(&["INFO", "server"])),
            Reply::error("ERR: INFO expect no arguments")
        );
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let handler = create_handler();
        handler.execute(&make_command(&["SET", "a", "1"]));

        assert_eq!(
            handler.execute(&make_command(&["foo", "a"])),
            Reply::error("ERR: FOO unknown command")
        );
        assert_eq!(handler.storage().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_writes_encoded_reply() {
        let handler = create_handler();
        let mut out = BytesMut::new();
        handler.dispatch(&make_command(&["PING"]), &mut out);
        handler.dispatch(&make_command(&["GET", "nope"]), &mut out);
        assert_eq!(&out[..], b"+PONG\r\n*1\r\n$-1\r\n");
    }
}
