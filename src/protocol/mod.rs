//! Line Protocol Implementation
//!
//! LineKV speaks a plain-text protocol: one request per line, answered by
//! zero or more response lines.
//!
//! ## Modules
//!
//! - `parser`: Splits the byte stream into lines and parses each into a [`Command`]
//! - `types`: Defines the [`Response`] enum and its wire format
//!
//! ## Example
//!
//! ```
//! use linekv::protocol::{Command, LineReader, Response};
//! use bytes::BytesMut;
//!
//! // Framing and parsing incoming data
//! let mut buffer = BytesMut::from(&b"GET user:1\n"[..]);
//! let line = LineReader::new().next_line(&mut buffer).unwrap().unwrap();
//! let command = Command::parse(&line).unwrap();
//! assert_eq!(command.name(), "GET");
//!
//! // Creating responses
//! let response = Response::value("John");
//! assert_eq!(response.serialize(), b"John\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{Command, LineReader, ParseError, ParseResult, MAX_LINE_LENGTH};
pub use types::Response;
