//! Role management endpoints.
//!
//! Every route is scoped to a project; a role addressed under a project it
//! does not belong to is rejected.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_auth::JwtValidator;
use warden_cache::CacheStore;
use warden_core::{PermissionMap, ProjectId, RoleId};
use warden_store::{NewRole, Role, RoleStore, RoleUpdate};

use crate::auth::AuthClaims;
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a single role.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    /// Role ID.
    pub role_id: RoleId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Identity of the creator.
    pub owner: String,
    /// Role name.
    pub role: String,
    /// Free-text description.
    pub description: String,
    /// Resource URN → allowed actions.
    pub permissions: PermissionMap,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            role_id: role.role_id,
            project_id: role.project_id,
            owner: role.owner,
            role: role.role,
            description: role.description,
            permissions: role.permissions,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

/// Response for a role list.
#[derive(Debug, Serialize)]
pub struct ListRolesResponse {
    /// Active roles of the project.
    pub roles: Vec<RoleResponse>,
}

/// Request to create a role.
#[derive(Debug, Deserialize)]
pub struct CreateRoleBody {
    /// Role name, unique among the project's active roles.
    pub role: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Initial permissions.
    #[serde(default)]
    pub permissions: PermissionMap,
}

/// Request to set the actions on one resource.
#[derive(Debug, Deserialize)]
pub struct PermissionBody {
    /// Resource URN.
    pub resource: String,
    /// Allowed actions. An empty list removes the resource.
    #[serde(default)]
    pub actions: Vec<String>,
}

/// Query naming a resource to remove.
#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    /// Resource URN.
    pub resource: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a role in a project. The owner is the caller's identity.
///
/// # Errors
///
/// Returns an error if the name is empty or already taken in the project.
pub async fn create_role<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    AuthClaims(claims): AuthClaims,
    Path(project_id): Path<String>,
    Json(body): Json<CreateRoleBody>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let project_id = parse_project_id(&project_id)?;
    let name = validate_name(&body.role)?;
    let owner = claims.identity().ok_or(ApiError::Unauthorized)?.to_string();

    let new_role = NewRole {
        project_id,
        owner,
        role: name,
        description: body.description,
        permissions: body.permissions,
    };
    let role = with_store(&state.store, move |store| Ok(store.create_role(new_role)?)).await?;

    tracing::info!(role_id = %role.role_id, project_id = %project_id, "Role created");
    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

/// List the active roles of a project.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub async fn list_roles<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let project_id = parse_project_id(&project_id)?;
    let roles = with_store(&state.store, move |store| {
        Ok(store.list_project_roles(&project_id)?)
    })
    .await?;

    Ok(Json(ListRolesResponse {
        roles: roles.into_iter().map(RoleResponse::from).collect(),
    }))
}

/// Get one role.
///
/// # Errors
///
/// Returns an error if the role does not exist in this project.
pub async fn get_role<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    Path((project_id, role_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let (project_id, role_id) = parse_ids(&project_id, &role_id)?;
    let role = with_store(&state.store, move |store| {
        load_project_role(store, &project_id, &role_id)
    })
    .await?;

    Ok(Json(RoleResponse::from(role)))
}

/// Update the name, description or permissions of a role.
///
/// # Errors
///
/// Returns an error if the role does not exist in this project or the new
/// name is taken.
pub async fn update_role<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    Path((project_id, role_id)): Path<(String, String)>,
    Json(mut update): Json<RoleUpdate>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    if let Some(name) = update.role.as_mut() {
        *name = validate_name(name)?;
    }
    let (project_id, role_id) = parse_ids(&project_id, &role_id)?;
    let role = with_store(&state.store, move |store| {
        load_project_role(store, &project_id, &role_id)?;
        Ok(store.update_role(&role_id, update)?)
    })
    .await?;

    Ok(Json(RoleResponse::from(role)))
}

/// Soft-delete a role.
///
/// # Errors
///
/// Returns an error if the role does not exist in this project.
pub async fn delete_role<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    Path((project_id, role_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let (project_id, role_id) = parse_ids(&project_id, &role_id)?;
    with_store(&state.store, move |store| {
        load_project_role(store, &project_id, &role_id)?;
        Ok(store.soft_delete_role(&role_id)?)
    })
    .await?;

    tracing::info!(role_id = %role_id, project_id = %project_id, "Role deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Set the actions a role grants on one resource.
///
/// # Errors
///
/// Returns an error if the resource is empty or the role does not exist in
/// this project.
pub async fn update_permission<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    Path((project_id, role_id)): Path<(String, String)>,
    Json(body): Json<PermissionBody>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    if body.resource.trim().is_empty() {
        return Err(ApiError::BadRequest("resource must not be empty".to_string()));
    }
    let (project_id, role_id) = parse_ids(&project_id, &role_id)?;
    let actions: BTreeSet<String> = body.actions.into_iter().collect();
    let role = with_store(&state.store, move |store| {
        load_project_role(store, &project_id, &role_id)?;
        Ok(store.update_permission(&role_id, &body.resource, actions)?)
    })
    .await?;

    Ok(Json(RoleResponse::from(role)))
}

/// Remove one resource from a role.
///
/// # Errors
///
/// Returns an error if the role does not exist in this project.
pub async fn remove_permission<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    Path((project_id, role_id)): Path<(String, String)>,
    Query(query): Query<ResourceQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let (project_id, role_id) = parse_ids(&project_id, &role_id)?;
    let role = with_store(&state.store, move |store| {
        load_project_role(store, &project_id, &role_id)?;
        Ok(store.remove_permission(&role_id, &query.resource)?)
    })
    .await?;

    Ok(Json(RoleResponse::from(role)))
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn parse_project_id(raw: &str) -> Result<ProjectId, ApiError> {
    ProjectId::from_hex(raw).map_err(|_| ApiError::BadRequest("invalid project ID".to_string()))
}

fn parse_role_id(raw: &str) -> Result<RoleId, ApiError> {
    RoleId::from_hex(raw).map_err(|_| ApiError::BadRequest("invalid role ID".to_string()))
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.len() > 128 {
        return Err(ApiError::BadRequest(
            "role name must be 1-128 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn parse_ids(project_id: &str, role_id: &str) -> Result<(ProjectId, RoleId), ApiError> {
    Ok((parse_project_id(project_id)?, parse_role_id(role_id)?))
}

/// Run blocking role store calls off the async runtime.
async fn with_store<S, T, F>(store: &Arc<S>, call: F) -> Result<T, ApiError>
where
    S: RoleStore + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, ApiError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Role store task failed");
            ApiError::Internal("storage error".to_string())
        })?
}

/// Load an active role and check that it belongs to `project_id`.
fn load_project_role<S: RoleStore>(
    store: &S,
    project_id: &ProjectId,
    role_id: &RoleId,
) -> Result<Role, ApiError> {
    let role = store
        .get_role(role_id)?
        .ok_or_else(|| ApiError::NotFound(format!("role {role_id}")))?;

    if role.project_id != *project_id {
        return Err(ApiError::Forbidden(
            "role does not belong to this project".to_string(),
        ));
    }
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_store::MemoryRoleStore;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  admin ").unwrap(), "admin");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(129)).is_err());
    }

    #[tokio::test]
    async fn store_calls_run_off_the_runtime() {
        let store = Arc::new(MemoryRoleStore::new());
        let project_id = ProjectId::from_seed("p1");
        let runtime_thread = std::thread::current().id();

        let roles = with_store(&store, move |store| {
            assert_ne!(std::thread::current().id(), runtime_thread);
            Ok(store.list_project_roles(&project_id)?)
        })
        .await
        .unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn panicking_store_call_is_an_internal_error() {
        let store = Arc::new(MemoryRoleStore::new());

        let err = with_store(&store, |_| -> Result<(), ApiError> { panic!("store blew up") })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
