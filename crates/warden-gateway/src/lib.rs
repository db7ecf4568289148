//! HTTP gateway for warden.
//!
//! This crate is the public face of the authorization backend. It handles:
//!
//! - Bearer token authentication against the JWKS-backed validator
//! - Role and scope guards on protected routes
//! - REST endpoints for managing project roles and their permissions
//! - Authorization checks against the cached permission projection
//!
//! # Architecture
//!
//! ```text
//!                         ┌────────────────────────┐
//!   Authorization: ──────▶│ authenticate           │── 401 ──▶
//!   Bearer <token>        │  require_scopes        │── 403 ──▶
//!                         │   require_roles        │── 403 ──▶
//!                         └───────────┬────────────┘
//!                                     ▼
//!                    ┌────────────────┴────────────────┐
//!                    ▼                                 ▼
//!            ┌──────────────┐                 ┌──────────────────┐
//!            │ roles        │                 │ permissions      │
//!            │ (RoleStore)  │                 │ (ProjectionCache)│
//!            └──────┬───────┘                 └────────▲─────────┘
//!                   │        RoleSynchronizer          │
//!                   └──────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warden_auth::{AuthConfig, JwksValidator};
//! use warden_cache::{MemoryCache, ProjectionCache};
//! use warden_gateway::{create_router, AppState, GatewayConfig};
//! use warden_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/warden")?);
//! let cache = ProjectionCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(30));
//! let validator = Arc::new(JwksValidator::new(AuthConfig::from_env()?));
//!
//! let state = AppState::new(store, cache, validator, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::AuthClaims;
pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
