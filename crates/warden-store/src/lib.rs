//! `RocksDB` storage layer for warden.
//!
//! This crate persists role records: named sets of resource permissions scoped to
//! a project. Records are never physically removed; deletion sets a flag, and
//! every mutation stamps `updated_at` so downstream consumers can follow changes
//! incrementally.
//!
//! # Architecture
//!
//! The role collection (default name `roles`) uses two column families:
//!
//! - `<collection>`: Primary role records, keyed by `role_id`
//! - `<collection>_by_project`: Index for listing roles by project
//!
//! # Example
//!
//! ```no_run
//! use warden_core::ProjectId;
//! use warden_store::{NewRole, RocksStore, RoleStore};
//!
//! let store = RocksStore::open("/tmp/warden-db").unwrap();
//!
//! let role = store
//!     .create_role(NewRole {
//!         project_id: ProjectId::from_seed("acme"),
//!         owner: "ops@acme.io".into(),
//!         role: "admin".into(),
//!         description: String::new(),
//!         permissions: Default::default(),
//!     })
//!     .unwrap();
//! assert!(store.get_role(&role.role_id).unwrap().is_some());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collection;
pub mod error;
pub mod keys;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use warden_core::{PermissionMap, ProjectId, RoleId};

pub use collection::{Collection, Document};
pub use error::{Result, StoreError};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRoleStore;
pub use rocks::RocksStore;
pub use types::{DeletedFilter, NewRole, Role, RoleFilter, RoleUpdate};

/// Configuration for the role store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name of the role collection (column family).
    pub roles_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            roles_collection: schema::DEFAULT_ROLES_COLLECTION.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `DB_ROLES_COLLECTION`: Role collection name (default: `roles`)
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            roles_collection: std::env::var("DB_ROLES_COLLECTION")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| schema::DEFAULT_ROLES_COLLECTION.to_string()),
        }
    }
}

/// The role storage trait.
///
/// Implementors provide five primitives; the role API is built on top of them.
/// All mutations stamp `updated_at` with the current time. Mutating a missing
/// or soft-deleted role returns `StoreError::NotFound`.
pub trait RoleStore: Send + Sync {
    // =========================================================================
    // Primitives
    // =========================================================================

    /// Query roles matching `filter`.
    ///
    /// # Errors
    ///
    /// The outer result fails if the query itself fails. Records that exist
    /// but cannot be decoded appear as inner errors.
    fn find_roles(&self, filter: &RoleFilter) -> Result<Vec<Result<Role>>>;

    /// Load a role by ID, including soft-deleted records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn load_role(&self, role_id: &RoleId) -> Result<Option<Role>>;

    /// Insert a new role record, stamping `created_at` and `updated_at` while
    /// holding the store's write lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if an active role with the same name
    /// already exists in the project.
    fn insert_role(&self, role: Role) -> Result<Role>;

    /// Atomically apply `apply` to an active role and stamp `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the role is missing or deleted,
    /// `StoreError::Conflict` if `apply` renamed it onto another active role
    /// of the project, or any error returned by `apply`.
    fn modify_role(
        &self,
        role_id: &RoleId,
        apply: &mut dyn FnMut(&mut Role) -> Result<()>,
    ) -> Result<Role>;

    /// A point in time at or before which every mutation is visible to
    /// [`find_roles`](Self::find_roles).
    ///
    /// Waits for in-flight writes, so a change stamped earlier can never
    /// commit after a caller has scanned up to the returned time.
    fn commit_horizon(&self) -> DateTime<Utc>;

    // =========================================================================
    // Role Operations
    // =========================================================================

    /// Create a role with a fresh ID and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` on a duplicate name within the project.
    fn create_role(&self, new_role: NewRole) -> Result<Role> {
        let now = Utc::now();
        let mut permissions = new_role.permissions;
        drop_empty_permissions(&mut permissions);

        let role = self.insert_role(Role {
            role_id: RoleId::generate(),
            project_id: new_role.project_id,
            owner: new_role.owner,
            role: new_role.role,
            description: new_role.description,
            permissions,
            created_at: now,
            updated_at: now,
            deleted: false,
        })?;
        tracing::debug!(role_id = %role.role_id, project_id = %role.project_id, "Role created");
        Ok(role)
    }

    /// Get an active role by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_role(&self, role_id: &RoleId) -> Result<Option<Role>> {
        Ok(self.load_role(role_id)?.filter(|r| !r.deleted))
    }

    /// List the active roles of a project. Undecodable records are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_project_roles(&self, project_id: &ProjectId) -> Result<Vec<Role>> {
        let results = self.find_roles(&RoleFilter::active().in_project(*project_id))?;
        Ok(results
            .into_iter()
            .filter_map(|r| match r {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::warn!(project_id = %project_id, error = %e, "Skipping undecodable role");
                    None
                }
            })
            .collect())
    }

    /// Find an active role in a project by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find_project_role(&self, project_id: &ProjectId, name: &str) -> Result<Option<Role>> {
        let results = self.find_roles(&RoleFilter::active().in_project(*project_id).named(name))?;
        Ok(results.into_iter().find_map(std::result::Result::ok))
    }

    /// Replace the mutable fields of a role. Resources with no actions in a
    /// replacement permission map are dropped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for a missing role and
    /// `StoreError::Conflict` when renaming onto an existing name.
    fn update_role(&self, role_id: &RoleId, mut update: RoleUpdate) -> Result<Role> {
        if let Some(permissions) = update.permissions.as_mut() {
            drop_empty_permissions(permissions);
        }

        self.modify_role(role_id, &mut |role| {
            if let Some(name) = &update.role {
                role.role.clone_from(name);
            }
            if let Some(description) = &update.description {
                role.description.clone_from(description);
            }
            if let Some(permissions) = &update.permissions {
                role.permissions.clone_from(permissions);
            }
            Ok(())
        })
    }

    /// Set the actions granted on one resource. An empty set removes it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for a missing role.
    fn update_permission(
        &self,
        role_id: &RoleId,
        resource: &str,
        actions: BTreeSet<String>,
    ) -> Result<Role> {
        self.modify_role(role_id, &mut |role| {
            role.set_permission(resource, actions.clone());
            Ok(())
        })
    }

    /// Remove one resource from a role's permissions.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for a missing role.
    fn remove_permission(&self, role_id: &RoleId, resource: &str) -> Result<Role> {
        self.modify_role(role_id, &mut |role| {
            role.permissions.remove(resource);
            Ok(())
        })
    }

    /// Replace a role's entire permission map. Resources with no actions are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for a missing role.
    fn replace_permissions(&self, role_id: &RoleId, permissions: PermissionMap) -> Result<Role> {
        self.update_role(
            role_id,
            RoleUpdate {
                permissions: Some(permissions),
                ..RoleUpdate::default()
            },
        )
    }

    /// Soft-delete a role.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the role is missing or already deleted.
    fn soft_delete_role(&self, role_id: &RoleId) -> Result<()> {
        self.modify_role(role_id, &mut |role| {
            role.deleted = true;
            Ok(())
        })?;
        tracing::debug!(role_id = %role_id, "Role deleted");
        Ok(())
    }

    /// Soft-delete every active role of a project. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or any write fails.
    fn soft_delete_project_roles(&self, project_id: &ProjectId) -> Result<usize> {
        let mut deleted = 0;
        for role in self.list_project_roles(project_id)? {
            match self.soft_delete_role(&role.role_id) {
                Ok(()) => deleted += 1,
                // Deleted concurrently.
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}

/// A resource is either absent or grants at least one action.
fn drop_empty_permissions(permissions: &mut PermissionMap) {
    permissions.retain(|_, permission| !permission.is_empty());
}
