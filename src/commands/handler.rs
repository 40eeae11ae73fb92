//! Command Handler Module
//!
//! This module implements the commands LineKV supports. It receives parsed
//! [`Command`]s, executes them against the storage engine, and returns the
//! [`Response`] to write back.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `SET key value [EX seconds]` - Set a key, optionally with a TTL
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key
//! - `EXISTS key` - Check if a key exists
//! - `EXPIRE key seconds` - Set a key's TTL (`0` deletes it)
//! - `TTL key` - Get remaining TTL
//! - `KEYS pattern` - Find keys by glob pattern
//! - `FLUSHALL` - Clear the database
//! - `HELP` - List commands
//!
//! ## Error Handling
//!
//! A request that fails to parse never reaches the storage engine: its
//! [`ParseError`](crate::protocol::ParseError) becomes an `ERR` line straight
//! away. A [`StorageError`] from the engine is turned into an `ERR` line the
//! same way. Either way only that one request fails.

use crate::protocol::{Command, ParseResult, Response};
use crate::storage::{StorageEngine, StorageError, StorageResult};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Response to `HELP`
pub const HELP_TEXT: &str =
    "Available commands: GET, SET, DEL, EXISTS, EXPIRE, TTL, KEYS, FLUSHALL, PING, HELP";

/// Executes commands against the shared storage engine.
///
/// Cloning is cheap: every clone points at the same engine.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Parses and executes one request line.
    pub fn execute_line(&self, line: &str) -> Response {
        self.execute_parsed(Command::parse(line))
    }

    /// Executes the outcome of parsing a request.
    ///
    /// A parse error is answered directly, without touching storage.
    pub fn execute_parsed(&self, parsed: ParseResult<Command>) -> Response {
        match parsed {
            Ok(command) => self.execute(command),
            Err(e) => {
                debug!(error = ?e, "Rejected request");
                Response::error(e)
            }
        }
    }

    /// Executes a command and returns the response.
    pub fn execute(&self, command: Command) -> Response {
        let name = command.name();
        match self.dispatch(command) {
            Ok(response) => response,
            Err(e) => self.storage_failure(name, e),
        }
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, command: Command) -> StorageResult<Response> {
        match command {
            Command::Ping => Ok(Response::pong()),
            Command::Set { key, value, ttl } => self.cmd_set(key, value, ttl),
            Command::Get { key } => self.cmd_get(&key),
            Command::Del { key } => self.cmd_del(&key),
            Command::Exists { key } => self.cmd_exists(&key),
            Command::Expire { key, ttl } => self.cmd_expire(&key, ttl),
            Command::Ttl { key } => self.cmd_ttl(&key),
            Command::Keys { pattern } => self.cmd_keys(&pattern),
            Command::FlushAll => self.cmd_flushall(),
            Command::Help => Ok(Response::status(HELP_TEXT)),
        }
    }

    fn storage_failure(&self, command: &'static str, error: StorageError) -> Response {
        warn!(command = command, error = %error, "Storage error");
        Response::error(error)
    }

    /// SET key value [EX seconds]
    fn cmd_set(&self, key: String, value: Bytes, ttl: Option<Duration>) -> StorageResult<Response> {
        self.storage.set(key, value, ttl)?;
        Ok(Response::ok())
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> StorageResult<Response> {
        Ok(match self.storage.get(key)? {
            Some(value) => Response::value(value),
            None => Response::nil(),
        })
    }

    /// DEL key
    fn cmd_del(&self, key: &str) -> StorageResult<Response> {
        Ok(Response::boolean(self.storage.delete(key)?))
    }

    /// EXISTS key
    fn cmd_exists(&self, key: &str) -> StorageResult<Response> {
        Ok(Response::boolean(self.storage.exists(key)?))
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, key: &str, ttl: Duration) -> StorageResult<Response> {
        Ok(Response::boolean(self.storage.expire(key, ttl)?))
    }

    /// TTL key
    fn cmd_ttl(&self, key: &str) -> StorageResult<Response> {
        Ok(Response::integer(self.storage.ttl(key)?.as_i64()))
    }

    /// KEYS pattern
    fn cmd_keys(&self, pattern: &str) -> StorageResult<Response> {
        Ok(Response::Lines(self.storage.keys(pattern)?))
    }

    /// FLUSHALL
    fn cmd_flushall(&self) -> StorageResult<Response> {
        self.storage.flush()?;
        Ok(Response::ok())
    }
}
