//! Wire Responses
//!
//! Every response is plain UTF-8 text, one item per line, each line ending in
//! `\n`. There is no type prefix and no length header: the client knows what
//! to expect from the command it sent.
//!
//! ## Examples
//!
//! Status: `OK\n`, `PONG\n`
//! Value: `John\n`
//! Nil: `(nil)\n`
//! Integer: `1\n`, `-2\n`
//! Lines: `user:1\nuser:1234\n` (no lines at all when empty)
//! Error: `ERR unknown command\n`

use bytes::Bytes;
use std::fmt;

/// The line terminator used in responses
pub const LINE_END: &[u8] = b"\n";

/// What `GET` sends for a missing key
pub const NIL: &str = "(nil)";

/// A response to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A fixed status line such as `OK` or `PONG`
    Status(String),

    /// A stored value
    Value(Bytes),

    /// An absent value, sent as `(nil)`
    Nil,

    /// An integer result
    Integer(i64),

    /// Zero or more lines, one per item
    Lines(Vec<String>),

    /// An error line, including its `ERR` prefix
    Error(String),
}

impl Response {
    /// Creates a status response.
    pub fn status(s: impl Into<String>) -> Self {
        Response::Status(s.into())
    }

    /// Creates an error response, prefixing the message with `ERR`.
    ///
    /// # Example
    /// ```
    /// use linekv::protocol::Response;
    /// let err = Response::error("unknown command");
    /// assert_eq!(err.serialize(), b"ERR unknown command\n");
    /// ```
    pub fn error(message: impl fmt::Display) -> Self {
        Response::Error(format!("ERR {}", message))
    }

    /// Creates an integer response.
    pub fn integer(n: i64) -> Self {
        Response::Integer(n)
    }

    /// Creates a `0`/`1` response.
    pub fn boolean(b: bool) -> Self {
        Response::Integer(i64::from(b))
    }

    /// Creates a value response.
    pub fn value(data: impl Into<Bytes>) -> Self {
        Response::Value(data.into())
    }

    /// Creates a nil response.
    pub fn nil() -> Self {
        Response::Nil
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        Response::Status("OK".to_string())
    }

    /// Common response for PING
    pub fn pong() -> Self {
        Response::Status("PONG".to_string())
    }

    /// Serializes the response to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the response into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Response::Status(s) | Response::Error(s) => {
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(LINE_END);
            }
            Response::Value(data) => {
                buf.extend_from_slice(data);
                buf.extend_from_slice(LINE_END);
            }
            Response::Nil => {
                buf.extend_from_slice(NIL.as_bytes());
                buf.extend_from_slice(LINE_END);
            }
            Response::Integer(n) => {
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(LINE_END);
            }
            Response::Lines(lines) => {
                for line in lines {
                    buf.extend_from_slice(line.as_bytes());
                    buf.extend_from_slice(LINE_END);
                }
            }
        }
    }

    /// Returns true if this response is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Status(s) => write!(f, "{}", s),
            Response::Error(s) => write!(f, "(error) {}", s),
            Response::Integer(n) => write!(f, "(integer) {}", n),
            Response::Value(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Response::Nil => write!(f, "{}", NIL),
            Response::Lines(lines) if lines.is_empty() => write!(f, "(empty list)"),
            Response::Lines(lines) => write!(f, "({} lines)", lines.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialize() {
        assert_eq!(Response::ok().serialize(), b"OK\n");
        assert_eq!(Response::pong().serialize(), b"PONG\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Response::error("unknown command");
        assert_eq!(value.serialize(), b"ERR unknown command\n");
        assert!(value.is_error());
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Response::integer(1).serialize(), b"1\n");
        assert_eq!(Response::integer(-2).serialize(), b"-2\n");
        assert_eq!(Response::boolean(false).serialize(), b"0\n");
    }

    #[test]
    fn test_value_serialize() {
        let value = Response::value(Bytes::from("John"));
        assert_eq!(value.serialize(), b"John\n");
    }

    #[test]
    fn test_nil_serialize() {
        assert_eq!(Response::nil().serialize(), b"(nil)\n");
    }

    #[test]
    fn test_lines_serialize() {
        let value = Response::Lines(vec!["user:1".to_string(), "user:1234".to_string()]);
        assert_eq!(value.serialize(), b"user:1\nuser:1234\n");

        // An empty list is no lines at all
        assert!(Response::Lines(vec![]).serialize().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Response::integer(3).to_string(), "(integer) 3");
        assert_eq!(Response::nil().to_string(), "(nil)");
        assert_eq!(Response::Lines(vec![]).to_string(), "(empty list)");
    }
}
