//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for LineKV.
//! It provides a thread-safe, concurrent map from string keys to byte values
//! with TTL (Time-To-Live) support.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, keys are spread over shards to reduce contention.
//! 2. **Lazy Expiry**: Every read checks the deadline, so an expired key is absent the moment
//!    its deadline passes, whether or not the sweeper has removed it yet.
//! 3. **Deadline Index**: Each shard keeps its expiring keys ordered by deadline, so the
//!    sweeper can pop expired keys in bounded batches without scanning the shard.
//! 4. **Fallible Locking**: A poisoned lock is reported as a [`StorageError`] instead of
//!    taking the whole server down.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  │ entries │ │ entries │ │ entries │ │ entries │            │
//! │  │ index   │ │ index   │ │ index   │ │ index   │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-key commands lock exactly one shard. `KEYS` and `FLUSHALL` lock every
//! shard in ascending order, which gives them one consistent view of the whole
//! store. Since every other path holds at most one shard lock, the fixed order
//! cannot deadlock.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use super::pattern::GlobPattern;

/// Default number of shards for the storage engine.
pub const DEFAULT_SHARDS: usize = 64;

/// Errors reported by the storage engine.
///
/// These should never happen with a healthy engine. They exist so that a
/// broken invariant fails the one command that hit it instead of the server.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A thread panicked while holding a shard lock.
    #[error("storage shard {0} is unavailable")]
    LockPoisoned(usize),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry whose deadline is `ttl` from now.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    /// Checks if this entry had expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Result of a TTL lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key expires in this many seconds (rounded up)
    Remaining(u64),
    /// The key exists and never expires
    Persistent,
    /// The key does not exist or has expired
    Missing,
}

impl Ttl {
    /// The integer form sent to clients: seconds, `-1` or `-2`.
    pub fn as_i64(self) -> i64 {
        match self {
            Ttl::Remaining(secs) => i64::try_from(secs).unwrap_or(i64::MAX),
            Ttl::Persistent => -1,
            Ttl::Missing => -2,
        }
    }
}

/// Rounds a remaining duration up to whole seconds.
fn ceil_secs(remaining: Duration) -> u64 {
    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
}

/// The keys owned by one shard.
#[derive(Debug, Default)]
struct Keyspace {
    /// Key -> entry
    entries: HashMap<String, Entry>,
    /// Every expiring key, ordered by deadline
    deadlines: BTreeSet<(Instant, String)>,
}

impl Keyspace {
    /// Inserts an entry, replacing (and unindexing) any previous one.
    fn insert(&mut self, key: String, entry: Entry) -> Option<Entry> {
        let previous = self.remove(&key);
        if let Some(at) = entry.expires_at {
            self.deadlines.insert((at, key.clone()));
        }
        self.entries.insert(key, entry);
        previous
    }

    /// Removes an entry along with its deadline.
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if let Some(at) = entry.expires_at {
            self.deadlines.remove(&(at, key.to_owned()));
        }
        Some(entry)
    }

    /// Moves the deadline of an existing entry. Returns false if the key is missing.
    fn set_deadline(&mut self, key: &str, at: Instant) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if let Some(old) = entry.expires_at.replace(at) {
            self.deadlines.remove(&(old, key.to_owned()));
        }
        self.deadlines.insert((at, key.to_owned()));
        true
    }

    /// Returns the entry if it exists and has not expired at `now`.
    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.entries.get(key).filter(|e| !e.is_expired_at(now))
    }

    /// Rebuilds the deadline index from the entries.
    fn rebuild_deadlines(&mut self) {
        self.deadlines = self
            .entries
            .iter()
            .filter_map(|(key, entry)| entry.expires_at.map(|at| (at, key.clone())))
            .collect();
    }

    /// Removes up to `limit` entries whose deadline is at or before `now`.
    fn purge_expired(&mut self, now: Instant, limit: usize) -> usize {
        let mut removed = 0;
        while removed < limit {
            match self.deadlines.first() {
                Some((at, _)) if *at <= now => {}
                _ => break,
            }
            if let Some((_, key)) = self.deadlines.pop_first() {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }
}

/// The main storage engine for LineKV.
///
/// This is the single owner of all stored data. It is created once at
/// startup, wrapped in an `Arc`, and shared by every connection task and the
/// expiry sweeper. All operations are thread-safe and each one is atomic with
/// respect to every other.
///
/// # Example
///
/// ```
/// use linekv::storage::{StorageEngine, Ttl};
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// // Set a key
/// engine.set("name".to_string(), Bytes::from("Ariz"), None).unwrap();
///
/// // Get the value
/// let value = engine.get("name").unwrap();
/// assert_eq!(value, Some(Bytes::from("Ariz")));
///
/// // Set with expiry
/// engine
///     .set("session".to_string(), Bytes::from("abc123"), Some(Duration::from_secs(60)))
///     .unwrap();
/// assert_eq!(engine.ttl("session").unwrap(), Ttl::Remaining(60));
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<RwLock<Keyspace>>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: expired keys removed by the sweeper
    swept_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new storage engine with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a new storage engine with `count` shards (at least one).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| RwLock::new(Keyspace::default()))
            .collect();

        Self {
            shards,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            swept_count: AtomicU64::new(0),
        }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn read_shard(&self, index: usize) -> StorageResult<RwLockReadGuard<'_, Keyspace>> {
        self.shards[index]
            .read()
            .map_err(|_| StorageError::LockPoisoned(index))
    }

    fn write_shard(&self, index: usize) -> StorageResult<RwLockWriteGuard<'_, Keyspace>> {
        self.shards[index]
            .write()
            .map_err(|_| StorageError::LockPoisoned(index))
    }

    /// Takes a poisoned shard back into service.
    ///
    /// The panic that poisoned it may have left the deadline index out of
    /// step with the entries, so the index is rebuilt before the poison flag
    /// is cleared.
    fn recover_shard(&self, index: usize) -> RwLockWriteGuard<'_, Keyspace> {
        let mut data = self.shards[index]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        data.rebuild_deadlines();
        self.shards[index].clear_poison();
        data
    }

    /// Locks every shard for reading, in index order.
    fn read_all(&self) -> StorageResult<Vec<RwLockReadGuard<'_, Keyspace>>> {
        (0..self.shards.len()).map(|i| self.read_shard(i)).collect()
    }

    /// Locks every shard for writing, in index order.
    fn write_all(&self) -> StorageResult<Vec<RwLockWriteGuard<'_, Keyspace>>> {
        (0..self.shards.len()).map(|i| self.write_shard(i)).collect()
    }

    /// Sets a key-value pair, replacing any previous entry.
    ///
    /// With a `ttl` the deadline is fixed now, at set time. Without one the
    /// entry lives until it is deleted or flushed.
    pub fn set(&self, key: String, value: Bytes, ttl: Option<Duration>) -> StorageResult<()> {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(value, ttl),
            None => Entry::new(value),
        };

        let index = self.shard_index(&key);
        self.write_shard(index)?.insert(key, entry);
        Ok(())
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or its deadline has passed.
    /// Expired entries are left in place for the sweeper.
    pub fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let data = self.read_shard(self.shard_index(key))?;
        Ok(data.live(key, now).map(|entry| entry.value.clone()))
    }

    /// Deletes a key from the database.
    ///
    /// Returns `true` if a live key was deleted. An entry whose deadline has
    /// already passed is removed too, but counts as absent.
    pub fn delete(&self, key: &str) -> StorageResult<bool> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut data = self.write_shard(self.shard_index(key))?;
        Ok(data
            .remove(key)
            .is_some_and(|entry| !entry.is_expired_at(now)))
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &str) -> StorageResult<bool> {
        let now = Instant::now();
        let data = self.read_shard(self.shard_index(key))?;
        Ok(data.live(key, now).is_some())
    }

    /// Sets an expiry time on an existing key, replacing any previous one.
    ///
    /// A zero `ttl` removes the key right away.
    ///
    /// # Returns
    ///
    /// Returns `true` if the expiry was set, `false` if the key doesn't exist
    /// or has already expired.
    pub fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let now = Instant::now();
        let mut data = self.write_shard(self.shard_index(key))?;

        if data.live(key, now).is_none() {
            return Ok(false);
        }

        if ttl.is_zero() {
            data.remove(key);
        } else {
            data.set_deadline(key, now + ttl);
        }
        Ok(true)
    }

    /// Gets the remaining TTL for a key.
    pub fn ttl(&self, key: &str) -> StorageResult<Ttl> {
        let now = Instant::now();
        let data = self.read_shard(self.shard_index(key))?;

        Ok(match data.live(key, now) {
            None => Ttl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => Ttl::Persistent,
            Some(Entry {
                expires_at: Some(exp),
                ..
            }) => Ttl::Remaining(ceil_secs(exp.saturating_duration_since(now))),
        })
    }

    /// Returns all live keys matching a glob pattern.
    ///
    /// All shards are read-locked together, so the result is one snapshot of
    /// the store. Keys come back in shard order, then map order; the order is
    /// stable for an unchanged store but not sorted.
    ///
    /// **Warning**: This operation scans all keys and can be slow on large databases.
    pub fn keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let pattern = GlobPattern::new(pattern);
        let now = Instant::now();
        let shards = self.read_all()?;

        let mut result = Vec::new();
        for data in &shards {
            for (key, entry) in &data.entries {
                if !entry.is_expired_at(now) && pattern.matches(key) {
                    result.push(key.clone());
                }
            }
        }

        Ok(result)
    }

    /// Clears all data from the database.
    ///
    /// Every shard is write-locked before any is cleared, so no reader can
    /// see a half-emptied store.
    pub fn flush(&self) -> StorageResult<()> {
        let mut shards = self.write_all()?;
        for data in shards.iter_mut() {
            **data = Keyspace::default();
        }
        Ok(())
    }

    /// Returns the number of stored entries, including expired ones that
    /// have not been swept yet.
    pub fn len(&self) -> usize {
        (0..self.shards.len())
            .filter_map(|i| self.read_shard(i).ok())
            .map(|data| data.entries.len())
            .sum()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.swept_count.load(Ordering::Relaxed),
        }
    }

    /// Removes expired keys from all shards.
    ///
    /// This is called by the background expiry sweeper. Each shard is locked
    /// on its own and gives up at most `batch_size` expired keys per call, so
    /// no lock is held for more than one bounded batch.
    ///
    /// A poisoned shard is logged, recovered, and swept like the others; until
    /// then commands touching it fail with [`StorageError::LockPoisoned`].
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self, batch_size: usize) -> u64 {
        let mut cleaned = 0u64;

        for index in 0..self.shards.len() {
            let mut data = match self.write_shard(index) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "Recovering poisoned storage shard");
                    self.recover_shard(index)
                }
            };
            let removed = data.purge_expired(Instant::now(), batch_size);
            cleaned += removed as u64;
        }

        if cleaned > 0 {
            self.swept_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of entries currently stored
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Total expired keys removed by the sweeper
    pub expired: u64,
}
