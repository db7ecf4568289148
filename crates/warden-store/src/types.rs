//! Domain types stored in the role collection.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{Permission, PermissionMap, ProjectId, RoleId};

use crate::collection::Document;
use crate::keys;

/// A role record: one named role within one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier for the role record.
    pub role_id: RoleId,
    /// Project that owns the role.
    pub project_id: ProjectId,
    /// Identity (usually an email address) of the user who created the role.
    pub owner: String,
    /// Human-readable role name, e.g. `admin`.
    pub role: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Resource URN → allowed actions.
    #[serde(default)]
    pub permissions: PermissionMap,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp; drives incremental cache sync.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag. Deleted roles are never returned by active queries.
    #[serde(default)]
    pub deleted: bool,
}

impl Role {
    /// Set or clear the actions granted on `resource`.
    ///
    /// An empty action set removes the resource entry entirely.
    pub fn set_permission(&mut self, resource: &str, actions: BTreeSet<String>) {
        if actions.is_empty() {
            self.permissions.remove(resource);
        } else {
            self.permissions
                .insert(resource.to_string(), Permission { actions });
        }
    }
}

impl Document for Role {
    fn key(&self) -> Vec<u8> {
        keys::role_key(&self.role_id)
    }
}

/// Input for creating a role. Identity, timestamps and the delete flag are
/// assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    /// Owning project.
    pub project_id: ProjectId,
    /// Identity of the creator.
    pub owner: String,
    /// Role name.
    pub role: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Initial permissions.
    #[serde(default)]
    pub permissions: PermissionMap,
}

/// Whole-record update of the mutable role fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    /// New role name, if changing.
    #[serde(default)]
    pub role: Option<String>,
    /// New description, if changing.
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement permission map, if changing.
    #[serde(default)]
    pub permissions: Option<PermissionMap>,
}

/// How soft-deleted records are treated by a [`RoleFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletedFilter {
    /// Only records whose delete flag is not set.
    #[default]
    Exclude,
    /// Records regardless of the delete flag.
    Include,
    /// Only soft-deleted records.
    Only,
}

/// Query over the role collection.
///
/// Filters compose: every populated criterion must match.
///
/// ```
/// use chrono::Utc;
/// use warden_core::ProjectId;
/// use warden_store::RoleFilter;
///
/// let since = Utc::now();
/// let filter = RoleFilter::active()
///     .in_project(ProjectId::from_seed("p1"))
///     .updated_after(since);
/// assert!(filter.updated_after.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    /// Restrict to one project.
    pub project_id: Option<ProjectId>,
    /// Restrict to one role name (exact match).
    pub role: Option<String>,
    /// Only records with `updated_at` strictly greater than this instant.
    pub updated_after: Option<DateTime<Utc>>,
    /// Soft-delete handling.
    pub deleted: DeletedFilter,
}

impl RoleFilter {
    /// All roles whose delete flag is not set.
    #[must_use]
    pub fn active() -> Self {
        Self::default()
    }

    /// Only soft-deleted roles.
    #[must_use]
    pub fn deleted() -> Self {
        Self {
            deleted: DeletedFilter::Only,
            ..Self::default()
        }
    }

    /// Every role, deleted or not.
    #[must_use]
    pub fn all() -> Self {
        Self {
            deleted: DeletedFilter::Include,
            ..Self::default()
        }
    }

    /// Restrict to a project.
    #[must_use]
    pub fn in_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Restrict to a role name.
    #[must_use]
    pub fn named(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Restrict to records updated strictly after `since`.
    #[must_use]
    pub fn updated_after(mut self, since: DateTime<Utc>) -> Self {
        self.updated_after = Some(since);
        self
    }

    /// Returns `true` if `role` satisfies every criterion of this filter.
    #[must_use]
    pub fn matches(&self, role: &Role) -> bool {
        let deleted_ok = match self.deleted {
            DeletedFilter::Exclude => !role.deleted,
            DeletedFilter::Include => true,
            DeletedFilter::Only => role.deleted,
        };

        deleted_ok
            && self.project_id.map_or(true, |p| p == role.project_id)
            && self.role.as_deref().map_or(true, |r| r == role.role)
            && self.updated_after.map_or(true, |t| role.updated_at > t)
    }
}
