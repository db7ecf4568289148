//! Process-local cache store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{CacheError, Result};
use crate::CacheStore;

/// In-memory implementation of [`CacheStore`].
///
/// Used when no Redis URI is configured. Writes can be made to fail or stall
/// per key for testing.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
    failing: RwLock<HashSet<String>>,
    write_delay: RwLock<Option<Duration>>,
    writes: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// All keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryCache {
    /// Make writes to `key` fail until [`MemoryCache::clear_failures`].
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.failing.write().insert(key.into());
    }

    /// Let every write succeed again.
    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Delay every write by `delay`.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.write() = delay;
    }

    /// Highest number of writes observed running at the same time.
    #[must_use]
    pub fn peak_concurrent_writes(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set(&self, key: &str, value: String) -> Result<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.write_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.failing.read().contains(key) {
            Err(CacheError::Command(format!("write to {key} rejected")))
        } else {
            self.entries.write().insert(key.to_string(), value);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }
}
