//! Storage Engine Module
//!
//! This module provides the core storage functionality for LineKV.
//! It includes a thread-safe, sharded key-value store with TTL support,
//! the glob matcher behind `KEYS`, and a background expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **TTL Support**: Keys can have a deadline, fixed when it is set
//! - **Lazy Expiry**: Reads treat keys past their deadline as absent
//! - **Active Expiry**: Background sweeper reclaims expired keys in bounded batches
//!
//! ## Example
//!
//! ```
//! use linekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set("user:1".to_string(), Bytes::from("John"), None).unwrap();
//! engine
//!     .set("visitor:1".to_string(), Bytes::from("active"), Some(Duration::from_secs(3)))
//!     .unwrap();
//!
//! assert_eq!(engine.keys("user*").unwrap(), vec!["user:1".to_string()]);
//! ```

pub mod engine;
pub mod expiry;
pub mod pattern;

// Re-export commonly used types
pub use engine::{Entry, StorageEngine, StorageError, StorageResult, StorageStats, Ttl};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use pattern::GlobPattern;
