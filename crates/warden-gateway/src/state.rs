//! Gateway application state.

use std::sync::Arc;

use warden_auth::JwtValidator;
use warden_cache::{CacheStore, ProjectionCache};
use warden_store::RoleStore;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct AppState<S, C, V> {
    /// The authoritative role store.
    pub store: Arc<S>,
    /// Read access to the permission projections.
    pub cache: ProjectionCache<C>,
    /// The bearer token validator.
    pub validator: Arc<V>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<S, C, V> AppState<S, C, V>
where
    S: RoleStore,
    C: CacheStore,
    V: JwtValidator,
{
    /// Create a new gateway state.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        cache: ProjectionCache<C>,
        validator: Arc<V>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            cache,
            validator,
            config,
        }
    }
}

impl<S, C, V> Clone for AppState<S, C, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
            validator: Arc::clone(&self.validator),
            config: self.config.clone(),
        }
    }
}
