//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use warden_auth::JwtValidator;
use warden_cache::CacheStore;
use warden_store::RoleStore;

use crate::auth::{authenticate, require_roles, require_scopes};
use crate::handlers::{health, permissions, roles};
use crate::state::AppState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Reads (authenticated)
/// - `GET /v1/projects/:project_id/roles` - List roles
/// - `GET /v1/projects/:project_id/roles/:role_id` - Get role
/// - `GET /v1/projects/:project_id/permissions` - Cached projection
/// - `POST /v1/authorize` - Check one action
///
/// ## Mutations (authenticated, admin roles if configured)
/// - `POST /v1/projects/:project_id/roles` - Create role
/// - `PUT /v1/projects/:project_id/roles/:role_id` - Update role
/// - `DELETE /v1/projects/:project_id/roles/:role_id` - Delete role
/// - `PUT /v1/projects/:project_id/roles/:role_id/permissions` - Set resource actions
/// - `DELETE /v1/projects/:project_id/roles/:role_id/permissions?resource=` - Remove resource
///
/// When `required_scopes` is configured every authenticated route requires
/// all of them.
pub fn create_router<S, C, V>(state: AppState<S, C, V>) -> Router
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let config = state.config.clone();
    let state = Arc::new(state);

    let mut mutations = Router::new()
        .route(
            "/v1/projects/:project_id/roles",
            post(roles::create_role::<S, C, V>),
        )
        .route(
            "/v1/projects/:project_id/roles/:role_id",
            put(roles::update_role::<S, C, V>).delete(roles::delete_role::<S, C, V>),
        )
        .route(
            "/v1/projects/:project_id/roles/:role_id/permissions",
            put(roles::update_permission::<S, C, V>)
                .delete(roles::remove_permission::<S, C, V>),
        );
    if !config.admin_roles.is_empty() {
        let accepted: Arc<[String]> = config.admin_roles.clone().into();
        mutations = mutations.route_layer(from_fn_with_state(accepted, require_roles));
    }

    let mut protected = Router::new()
        .route(
            "/v1/projects/:project_id/roles",
            get(roles::list_roles::<S, C, V>),
        )
        .route(
            "/v1/projects/:project_id/roles/:role_id",
            get(roles::get_role::<S, C, V>),
        )
        .route(
            "/v1/projects/:project_id/permissions",
            get(permissions::get_project_permissions::<S, C, V>),
        )
        .route("/v1/authorize", post(permissions::authorize::<S, C, V>))
        .merge(mutations);
    if !config.required_scopes.is_empty() {
        let required: Arc<[String]> = config.required_scopes.clone().into();
        protected = protected.route_layer(from_fn_with_state(required, require_scopes));
    }
    let protected = protected.route_layer(from_fn_with_state(
        Arc::clone(&state),
        authenticate::<S, C, V>,
    ));

    Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
