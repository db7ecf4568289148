//! Redis-backed cache store.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use crate::error::{CacheError, Result};
use crate::CacheStore;

/// Redis implementation of [`CacheStore`].
///
/// All clones share one multiplexed connection, opened on first use and
/// re-established by the connection manager after a drop.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    connection: Arc<OnceCell<ConnectionManager>>,
}

impl RedisCache {
    /// Create a cache over an existing Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            connection: Arc::new(OnceCell::new()),
        }
    }

    /// Parse `uri` and create a cache. No connection is made until first use.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Connection` if the URI is malformed.
    pub fn open(uri: &str) -> Result<Self> {
        let client = redis::Client::open(uri)
            .map_err(|e| CacheError::Connection(format!("invalid redis uri: {e}")))?;
        Ok(Self::new(client))
    }

    /// The shared connection. A failed attempt is not cached; the next call
    /// tries again.
    async fn connection(&self) -> Result<ConnectionManager> {
        self.connection
            .get_or_try_init(|| async {
                let manager = self.client.get_connection_manager().await.map_err(|e| {
                    tracing::warn!(error = %e, "Redis connection failed");
                    CacheError::Connection(format!("failed to connect to redis: {e}"))
                })?;
                tracing::debug!("Redis connection established");
                Ok(manager)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut connection = self.connection().await?;
        let () = connection
            .set(key, value)
            .await
            .map_err(|e| CacheError::Command(format!("failed to write {key}: {e}")))?;
        tracing::trace!(key, "Redis key written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.connection().await?;
        connection
            .get(key)
            .await
            .map_err(|e| CacheError::Command(format!("failed to read {key}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_uri_is_rejected() {
        let err = RedisCache::open("not a uri").err().unwrap();
        assert!(matches!(err, CacheError::Connection(_)));
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_connection_error() {
        let cache = RedisCache::open("redis://127.0.0.1:1/").unwrap();
        let err = cache.get("roles:x").await.unwrap_err();
        assert!(matches!(err, CacheError::Connection(_)));
    }

    #[tokio::test]
    async fn failed_connect_is_not_remembered() {
        let cache = RedisCache::open("redis://127.0.0.1:1/").unwrap();
        let clone = cache.clone();

        assert!(cache.set("roles:x", "{}".to_string()).await.is_err());
        assert!(!cache.connection.initialized());
        assert!(Arc::ptr_eq(&cache.connection, &clone.connection));
    }
}
