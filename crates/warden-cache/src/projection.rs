//! Project-role-permission projection stored in the cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::{PermissionMap, ProjectId};

use crate::error::{CacheError, Result};
use crate::CacheStore;

/// Prefix of every projection key.
pub const PROJECT_KEY_PREFIX: &str = "roles:";

/// Cache key for a project's projection: `roles:<project_id hex>`.
#[must_use]
pub fn project_key(project_id: &ProjectId) -> String {
    format!("{PROJECT_KEY_PREFIX}{project_id}")
}

/// All role permissions of one project, keyed by role name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoles {
    /// Owning project.
    pub project_id: ProjectId,
    /// Role name → resource URN → allowed actions.
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionMap>,
}

impl ProjectRoles {
    /// Create a projection.
    #[must_use]
    pub const fn new(project_id: ProjectId, permissions: BTreeMap<String, PermissionMap>) -> Self {
        Self {
            project_id,
            permissions,
        }
    }

    /// `true` if any of `roles` grants `action` on `resource`.
    #[must_use]
    pub fn allows<S: AsRef<str>>(&self, roles: &[S], resource: &str, action: &str) -> bool {
        roles.iter().any(|role| {
            self.permissions
                .get(role.as_ref())
                .and_then(|resources| resources.get(resource))
                .is_some_and(|permission| permission.allows(action))
        })
    }
}

/// Typed access to projections over a [`CacheStore`].
///
/// Every command is bounded by the configured timeout.
pub struct ProjectionCache<C> {
    store: Arc<C>,
    timeout: Duration,
}

impl<C> Clone for ProjectionCache<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
        }
    }
}

impl<C: CacheStore> ProjectionCache<C> {
    /// Wrap `store`, bounding each command by `timeout`.
    #[must_use]
    pub const fn new(store: Arc<C>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<C> {
        &self.store
    }

    /// Overwrite the projection of one project.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails, the write fails, or it times out.
    pub async fn put_project_roles(&self, roles: &ProjectRoles) -> Result<()> {
        let value = serde_json::to_string(roles)?;
        let key = project_key(&roles.project_id);
        tokio::time::timeout(self.timeout, self.store.set(&key, value))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }

    /// Read the projection of one project.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, times out, or the value does not decode.
    pub async fn get_project_roles(&self, project_id: &ProjectId) -> Result<Option<ProjectRoles>> {
        let key = project_key(project_id);
        let value = tokio::time::timeout(self.timeout, self.store.get(&key))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))??;

        value
            .map(|v| serde_json::from_str(&v).map_err(CacheError::from))
            .transpose()
    }

    /// `true` if any of `roles` in `project_id` grants `action` on `resource`.
    ///
    /// A project with no cached projection allows nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the projection cannot be read.
    pub async fn is_allowed<S: AsRef<str> + Sync>(
        &self,
        project_id: &ProjectId,
        roles: &[S],
        resource: &str,
        action: &str,
    ) -> Result<bool> {
        Ok(self
            .get_project_roles(project_id)
            .await?
            .is_some_and(|p| p.allows(roles, resource, action)))
    }
}
