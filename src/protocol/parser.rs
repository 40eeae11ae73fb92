//! Request Framing and Command Parsing
//!
//! Requests are single lines of UTF-8 text: a verb followed by
//! whitespace-separated arguments, terminated by `\n` (a `\r` before it is
//! ignored). Parsing happens in two steps:
//!
//! 1. [`LineReader`] pulls complete lines out of the connection buffer.
//! 2. [`Command::parse`] turns one line into a typed [`Command`].
//!
//! Both steps report problems as a [`ParseError`]. A parse error only fails
//! the request that caused it; the connection keeps going.

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;

/// Longest request line accepted (64 KB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Longest TTL accepted, in seconds (100 years)
pub const MAX_EXPIRE_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Errors that can occur while reading or parsing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line held no tokens
    #[error("empty command")]
    EmptyCommand,

    /// The verb is not one we know
    #[error("unknown command")]
    UnknownCommand(String),

    /// The verb got the wrong number of arguments
    #[error("wrong number of arguments for '{command}' command")]
    WrongArity { command: &'static str },

    /// A numeric argument did not parse
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// A TTL was negative, zero where not allowed, or too large
    #[error("invalid expire time in '{command}' command")]
    InvalidExpireTime { command: &'static str },

    /// An option was not recognized
    #[error("syntax error")]
    Syntax,

    /// The line was not valid UTF-8
    #[error("invalid UTF-8 in request")]
    InvalidUtf8,

    /// The line exceeded the maximum length
    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PING`
    Ping,
    /// `SET key value [EX seconds]`
    Set {
        key: String,
        value: Bytes,
        ttl: Option<Duration>,
    },
    /// `GET key`
    Get { key: String },
    /// `DEL key`
    Del { key: String },
    /// `EXISTS key`
    Exists { key: String },
    /// `EXPIRE key seconds`
    Expire { key: String, ttl: Duration },
    /// `TTL key`
    Ttl { key: String },
    /// `KEYS pattern`
    Keys { pattern: String },
    /// `FLUSHALL`
    FlushAll,
    /// `HELP`
    Help,
}

impl Command {
    /// Parses one request line.
    ///
    /// Verbs and the `EX` option are case-insensitive; keys and values are
    /// taken as-is.
    ///
    /// # Example
    ///
    /// ```
    /// use linekv::protocol::{Command, ParseError};
    ///
    /// let cmd = Command::parse("get user:1").unwrap();
    /// assert_eq!(cmd, Command::Get { key: "user:1".to_string() });
    ///
    /// let err = Command::parse("GET").unwrap_err();
    /// assert_eq!(err, ParseError::WrongArity { command: "get" });
    /// ```
    pub fn parse(line: &str) -> ParseResult<Command> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().ok_or(ParseError::EmptyCommand)?;
        let args: Vec<&str> = tokens.collect();

        match verb.to_ascii_uppercase().as_str() {
            "PING" => {
                arity("ping", &args, 0)?;
                Ok(Command::Ping)
            }
            "SET" => parse_set(&args),
            "GET" => {
                arity("get", &args, 1)?;
                Ok(Command::Get {
                    key: args[0].to_string(),
                })
            }
            "DEL" => {
                arity("del", &args, 1)?;
                Ok(Command::Del {
                    key: args[0].to_string(),
                })
            }
            "EXISTS" => {
                arity("exists", &args, 1)?;
                Ok(Command::Exists {
                    key: args[0].to_string(),
                })
            }
            "EXPIRE" => {
                arity("expire", &args, 2)?;
                let seconds = parse_seconds("expire", args[1], true)?;
                Ok(Command::Expire {
                    key: args[0].to_string(),
                    ttl: Duration::from_secs(seconds),
                })
            }
            "TTL" => {
                arity("ttl", &args, 1)?;
                Ok(Command::Ttl {
                    key: args[0].to_string(),
                })
            }
            "KEYS" => {
                arity("keys", &args, 1)?;
                Ok(Command::Keys {
                    pattern: args[0].to_string(),
                })
            }
            "FLUSHALL" => {
                arity("flushall", &args, 0)?;
                Ok(Command::FlushAll)
            }
            "HELP" => {
                arity("help", &args, 0)?;
                Ok(Command::Help)
            }
            _ => Err(ParseError::UnknownCommand(verb.to_string())),
        }
    }

    /// The verb, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl { .. } => "TTL",
            Command::Keys { .. } => "KEYS",
            Command::FlushAll => "FLUSHALL",
            Command::Help => "HELP",
        }
    }
}

/// SET key value [EX seconds]
fn parse_set(args: &[&str]) -> ParseResult<Command> {
    let ttl = match args.len() {
        2 => None,
        4 => {
            if !args[2].eq_ignore_ascii_case("EX") {
                return Err(ParseError::Syntax);
            }
            let seconds = parse_seconds("set", args[3], false)?;
            Some(Duration::from_secs(seconds))
        }
        _ => return Err(ParseError::WrongArity { command: "set" }),
    };

    Ok(Command::Set {
        key: args[0].to_string(),
        value: Bytes::from(args[1].to_string()),
        ttl,
    })
}

fn arity(command: &'static str, args: &[&str], expected: usize) -> ParseResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ParseError::WrongArity { command })
    }
}

/// Parses a TTL in seconds. `EXPIRE` accepts zero, `SET ... EX` does not.
fn parse_seconds(command: &'static str, arg: &str, allow_zero: bool) -> ParseResult<u64> {
    let seconds: i64 = arg.parse().map_err(|_| ParseError::NotAnInteger)?;

    match u64::try_from(seconds) {
        Ok(0) if !allow_zero => Err(ParseError::InvalidExpireTime { command }),
        Ok(s) if s <= MAX_EXPIRE_SECONDS => Ok(s),
        _ => Err(ParseError::InvalidExpireTime { command }),
    }
}

/// Splits a connection's byte stream into request lines.
///
/// A line longer than the limit is dropped up to its terminating newline and
/// reported once as [`ParseError::LineTooLong`], after which reading resumes
/// with the next line.
#[derive(Debug)]
pub struct LineReader {
    /// Longest line accepted, excluding the newline
    max_line: usize,
    /// True while skipping the rest of an oversized line
    discarding: bool,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    /// Creates a reader with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_LENGTH)
    }

    /// Creates a reader with a custom line limit.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            max_line,
            discarding: false,
        }
    }

    /// Takes the next complete line out of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(line))` - A full line, without its terminator
    /// - `Ok(None)` - No full line yet, read more data
    /// - `Err(e)` - The line was unusable; it has been consumed
    pub fn next_line(&mut self, buf: &mut BytesMut) -> ParseResult<Option<String>> {
        let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
            // A trailing '\r' may be the first half of a CRLF still in flight
            let pending_cr = usize::from(buf.last() == Some(&b'\r'));
            if buf.len() > self.max_line + pending_cr {
                // No newline in sight: drop what we have and keep skipping
                self.discarding = true;
                buf.clear();
            }
            return Ok(None);
        };

        let frame = buf.split_to(pos + 1);

        if self.discarding {
            self.discarding = false;
            return Err(ParseError::LineTooLong { max: self.max_line });
        }

        let mut line = &frame[..pos];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }

        if line.len() > self.max_line {
            return Err(ParseError::LineTooLong { max: self.max_line });
        }

        std::str::from_utf8(line)
            .map(|s| Some(s.to_string()))
            .map_err(|_| ParseError::InvalidUtf8)
    }

    /// Returns true if part of an oversized line is still being skipped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }
}
