//! # LineKV - An In-Memory Key-Value Store With Expiring Keys
//!
//! LineKV is an in-memory key-value store served over a line-oriented TCP
//! protocol. Keys can carry a time-to-live; an expired key is never visible
//! to clients, whether or not it has been physically removed yet.
//!
//! ## Features
//!
//! - **Plain-Text Protocol**: One request per line, usable from `nc` or telnet
//! - **Sharded Storage**: 64 independent RwLocks for concurrent access
//! - **TTL Support**: Lazy expiry on every read, plus a background sweeper
//! - **Glob Patterns**: `KEYS` with `*` and `?` wildcards
//! - **Async I/O**: Built on Tokio for handling thousands of concurrent connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              LineKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Line      │    │              StorageEngine                   │    │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │    │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linekv::server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `SET key value [EX seconds]`
//! - `GET key`
//! - `DEL key`
//! - `EXISTS key`
//! - `EXPIRE key seconds`
//! - `TTL key`
//! - `KEYS pattern`
//! - `FLUSHALL`
//! - `HELP`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Line framing, request parsing, and response encoding
//! - [`storage`]: Thread-safe storage engine with TTL support
//! - [`commands`]: Executes parsed commands against storage
//! - [`connection`]: Client connection management
//! - [`server`]: TCP listener tying it all together
//!
//! ## Design Highlights
//!
//! ### Thread Safety
//!
//! The storage engine uses a sharded design with 64 independent RwLocks.
//! Commands on different keys rarely contend. `KEYS` and `FLUSHALL` take every
//! shard lock in a fixed order, so they see or produce one consistent state.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: Every read checks the deadline and treats an expired key as absent
//! 2. **Active**: A background task removes expired keys to reclaim memory
//!
//! Only the first decides what clients see.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, ParseError, Response};
pub use server::{Server, ServerConfig};
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port LineKV listens on
pub const DEFAULT_PORT: u16 = 6379;

/// The default host LineKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of LineKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
