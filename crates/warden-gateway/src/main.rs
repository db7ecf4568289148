//! Warden Gateway - authorization backend entry point.
//!
//! Opens the role store, connects the permission cache, starts the role
//! synchronizer and serves the HTTP API until ctrl-c.
//!
//! Without `REDIS_URI` the projection lives in process memory, which is only
//! useful for a single-instance development setup.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden_auth::{AuthConfig, JwksValidator};
use warden_cache::{CacheConfig, CacheStore, MemoryCache, ProjectionCache, RedisCache};
use warden_gateway::{create_router, AppState, GatewayConfig};
use warden_store::{RocksStore, StoreConfig};
use warden_sync::{RoleSynchronizer, SyncConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Warden Gateway");

    let config = GatewayConfig::from_env();
    let store_config = StoreConfig::from_env();
    let cache_config = CacheConfig::from_env();
    let sync_config = SyncConfig::from_env();
    let auth_config = AuthConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        roles_collection = %store_config.roles_collection,
        jwks_url = %auth_config.jwks_url,
        sync_interval_secs = sync_config.poll_interval.as_secs(),
        "Gateway configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open_with_collection(
        &config.data_dir,
        &store_config.roles_collection,
    )?);

    let validator = Arc::new(JwksValidator::new(auth_config));

    match &cache_config.redis_uri {
        Some(uri) => {
            let cache = Arc::new(RedisCache::open(uri)?);
            tracing::info!("Redis cache configured");
            serve(config, store, cache, cache_config.query_timeout, validator, sync_config).await
        }
        None => {
            tracing::warn!("No REDIS_URI set - using in-process permission cache");
            let cache = Arc::new(MemoryCache::new());
            serve(config, store, cache, cache_config.query_timeout, validator, sync_config).await
        }
    }
}

async fn serve<C: CacheStore + 'static>(
    config: GatewayConfig,
    store: Arc<RocksStore>,
    cache: Arc<C>,
    cache_timeout: Duration,
    validator: Arc<JwksValidator>,
    sync_config: SyncConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    let cache = ProjectionCache::new(cache, cache_timeout);

    let sync = RoleSynchronizer::new(Arc::clone(&store), cache.clone(), sync_config)
        .spawn(shutdown.clone());

    let listen_addr = config.listen_addr.clone();
    let app = create_router(AppState::new(store, cache, validator, config));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    shutdown.cancel();
    match sync.await {
        Ok(Ok(())) => tracing::info!("Role synchronizer stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Role synchronizer exited with error"),
        Err(e) => tracing::error!(error = %e, "Role synchronizer task failed"),
    }

    Ok(())
}
