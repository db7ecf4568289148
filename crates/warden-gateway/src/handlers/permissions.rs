//! Projection read endpoints.
//!
//! These read the cached permission projection, never the role store, so
//! answers lag role changes by up to one sync interval.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use warden_auth::JwtValidator;
use warden_cache::{CacheStore, ProjectRoles};
use warden_core::ProjectId;
use warden_store::RoleStore;

use crate::auth::AuthClaims;
use crate::error::ApiError;
use crate::handlers::roles::parse_project_id;
use crate::state::AppState;

/// Request to check one action.
#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    /// Project the resource belongs to.
    pub project_id: ProjectId,
    /// Roles to check. Defaults to the caller's `roles` claim.
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    /// Resource URN.
    pub resource: String,
    /// Action to perform.
    pub action: String,
}

/// Result of an authorization check.
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    /// Whether any of the roles grants the action.
    pub allowed: bool,
}

/// Get the cached permission projection of a project.
///
/// A project that has not been synced yet returns an empty projection.
///
/// # Errors
///
/// Returns an error if the cache cannot be read.
pub async fn get_project_permissions<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let project_id = parse_project_id(&project_id)?;
    let roles = state
        .cache
        .get_project_roles(&project_id)
        .await?
        .unwrap_or_else(|| ProjectRoles::new(project_id, BTreeMap::new()));

    Ok(Json(roles))
}

/// Check whether a set of roles may perform an action on a resource.
///
/// # Errors
///
/// Returns an error if the cache cannot be read.
pub async fn authorize<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    AuthClaims(claims): AuthClaims,
    Json(body): Json<AuthorizeBody>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let roles = body.roles.unwrap_or_else(|| {
        claims
            .roles()
            .into_iter()
            .map(str::to_string)
            .collect()
    });

    let allowed = state
        .cache
        .is_allowed(&body.project_id, &roles, &body.resource, &body.action)
        .await?;

    tracing::debug!(
        project_id = %body.project_id,
        resource = %body.resource,
        action = %body.action,
        allowed,
        "Authorization check"
    );
    Ok(Json(AuthorizeResponse { allowed }))
}
