//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically removes expired
//! keys from the storage engine. This is "active expiry", as opposed to the
//! "lazy expiry" every read already performs.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry decides what clients see: an expired key is absent the moment
//! its deadline passes. But a key that expires and is never touched again
//! would stay in memory forever. The sweeper reclaims that memory. Turning it
//! off changes memory use, never a command result.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for a configurable interval (default: 100ms)
//! 2. Wakes up and pops at most `batch_size` expired keys from each shard,
//!    locking one shard at a time
//! 3. Logs statistics about the cleanup
//!
//! ## Adaptive Frequency
//!
//! If many keys are expiring, the sweeper will run more frequently.
//! If few keys are expiring, it will back off to save CPU.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// Most expired keys removed from one shard per sweep (default: 256)
    pub batch_size: usize,

    /// If this fraction of stored keys was swept, speed up sweeping
    pub speedup_threshold: f64,

    /// If this fraction of stored keys was swept, slow down sweeping
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            batch_size: 256,
            speedup_threshold: 0.25,  // Speed up if >25% of keys were expired
            slowdown_threshold: 0.01, // Slow down if <1% of keys were expired
        }
    }
}

impl ExpiryConfig {
    /// Next interval given how many of `keys_before` stored keys were swept.
    fn next_interval(&self, current: Duration, swept: u64, keys_before: u64) -> Duration {
        if keys_before == 0 {
            return current;
        }

        let expiry_rate = swept as f64 / keys_before as f64;

        if expiry_rate > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else if expiry_rate < self.slowdown_threshold && swept == 0 {
            (current * 2).min(self.max_interval)
        } else {
            current
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime. The sweeper stops when
    /// the returned handle is stopped or dropped.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use linekv::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = config.base_interval.as_millis() as u64,
            batch_size = config.batch_size,
            "Background expiry sweeper started"
        );

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let keys_before = engine.len() as u64;

        let expired = engine.cleanup_expired(config.batch_size);

        let next_interval = config.next_interval(current_interval, expired, keys_before);
        if next_interval < current_interval {
            debug!(
                expired = expired,
                new_interval_ms = next_interval.as_millis() as u64,
                "High expiry rate, speeding up sweeper"
            );
        } else if next_interval > current_interval {
            trace!(
                new_interval_ms = next_interval.as_millis() as u64,
                "Low expiry rate, slowing down sweeper"
            );
        }
        current_interval = next_interval;

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = keys_before.saturating_sub(expired),
                "Expired keys cleaned up"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn set_ttl(engine: &StorageEngine, key: String, ttl: Duration) {
        engine.set(key, Bytes::from("value"), Some(ttl)).unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        // Add some keys with short TTL
        for i in 0..10 {
            set_ttl(&engine, format!("key{}", i), Duration::from_millis(50));
        }

        // Add a persistent key
        engine
            .set("persistent".to_string(), Bytes::from("value"), None)
            .unwrap();

        assert_eq!(engine.len(), 11);

        // Start sweeper with fast interval
        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        // Wait for keys to expire and be cleaned up
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent key should remain
        assert_eq!(engine.len(), 1);
        assert!(engine.exists("persistent").unwrap());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
            // Sweeper is dropped here
        }

        // Add keys after sweeper is stopped
        set_ttl(&engine, "key".to_string(), Duration::from_millis(10));

        // Keys are not swept since the sweeper is stopped
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.len(), 1);

        // but reads already treat the key as absent
        assert!(engine.get("key").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweeper_drains_in_batches() {
        let engine = Arc::new(StorageEngine::with_shards(4));

        // Many more expired keys than one sweep may take
        for i in 0..1000 {
            set_ttl(&engine, format!("key{}", i), Duration::from_millis(20));
        }

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(20),
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_secs(1),
            batch_size: 16,
            speedup_threshold: 0.01,
            slowdown_threshold: 0.001,
        };

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(800)).await;

        // All keys should be expired and cleaned
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().expired, 1000);
    }

    #[test]
    fn test_adaptive_interval() {
        let config = ExpiryConfig::default();
        let base = config.base_interval;

        // Many keys expiring: speed up, bounded by min_interval
        assert_eq!(config.next_interval(base, 50, 100), base / 2);
        assert_eq!(
            config.next_interval(config.min_interval, 50, 100),
            config.min_interval
        );

        // Nothing expiring: back off, bounded by max_interval
        assert_eq!(config.next_interval(base, 0, 100), base * 2);
        assert_eq!(
            config.next_interval(config.max_interval, 0, 100),
            config.max_interval
        );

        // In between, or an empty store: unchanged
        assert_eq!(config.next_interval(base, 10, 100), base);
        assert_eq!(config.next_interval(base, 0, 0), base);
    }
}
