//! Role cache synchronizer for warden.
//!
//! Keeps the per-project permission projections in the cache eventually
//! consistent with the role store:
//!
//! 1. **Initial sync**: every active role is read, transformed and written,
//!    one cache entry per project. Projects left with only deleted roles get
//!    an empty entry. Any failure here stops the synchronizer.
//! 2. **Poll loop**: on a fixed interval, roles updated after the last
//!    watermark are read; each project they touch is rebuilt from its full set
//!    of active roles and rewritten.
//!
//! ```text
//! ┌──────────────┐  find_roles   ┌──────────────────┐  put_project_roles  ┌──────────────┐
//! │  RoleStore   │──────────────▶│ RoleSynchronizer │────────────────────▶│ CacheStore   │
//! │  (RocksDB)   │               │  transform()     │                     │ roles:<id>   │
//! └──────────────┘               └──────────────────┘                     └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod synchronizer;
pub mod transform;

use std::time::Duration;

pub use error::{Result, SyncError};
pub use synchronizer::{PollReport, RoleSynchronizer};
pub use transform::{transform, Projection};

/// Configuration for the synchronizer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between incremental polls.
    pub poll_interval: Duration,
    /// Upper bound on a single role store query.
    pub store_timeout: Duration,
    /// Maximum project writes in flight at once.
    pub write_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            store_timeout: Duration::from_secs(30),
            write_concurrency: 16,
        }
    }
}

impl SyncConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `REDIS_SYNC_INTERVAL`: Poll interval in seconds (default: 10)
    /// - `DB_QUERY_TIMEOUT_SECONDS`: Store query timeout (default: 30)
    /// - `SYNC_WRITE_CONCURRENCY`: Parallel project writes (default: 16)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_secs("REDIS_SYNC_INTERVAL")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.poll_interval),
            store_timeout: env_secs("DB_QUERY_TIMEOUT_SECONDS").unwrap_or(defaults.store_timeout),
            write_concurrency: std::env::var("SYNC_WRITE_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.write_concurrency),
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.store_timeout, Duration::from_secs(30));
        assert_eq!(config.write_concurrency, 16);
    }
}
