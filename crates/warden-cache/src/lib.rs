//! Permission projection cache for warden.
//!
//! The cache holds one entry per project under `roles:<project_id>`, whose
//! value is the JSON-encoded [`ProjectRoles`] projection: role name → resource
//! URN → allowed actions. Entries have no TTL; each sync overwrites them whole.
//!
//! Two backends implement [`CacheStore`]:
//!
//! - [`RedisCache`]: a Redis server, used when `REDIS_URI` is set
//! - [`MemoryCache`]: a process-local map, for single-node deployments and tests
//!
//! [`ProjectionCache`] layers typed reads, writes and the authorization check
//! on top of either backend.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod projection;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{CacheError, Result};
pub use memory::MemoryCache;
pub use projection::{project_key, ProjectRoles, ProjectionCache, PROJECT_KEY_PREFIX};
pub use redis_cache::RedisCache;

/// String key-value store holding the projections.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value. No expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Read the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Configuration for the cache backend.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URI. `None` selects the in-memory backend.
    pub redis_uri: Option<String>,
    /// Upper bound on a single cache command.
    pub query_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_uri: None,
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `REDIS_URI`: Redis URI (default: unset, in-memory cache)
    /// - `REDIS_QUERY_TIMEOUT_SECONDS`: Command timeout (default: 30)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_uri: std::env::var("REDIS_URI").ok().filter(|s| !s.is_empty()),
            query_timeout: std::env::var("REDIS_QUERY_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.query_timeout, Duration::from_secs),
        }
    }
}
