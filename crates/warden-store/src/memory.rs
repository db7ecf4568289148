//! In-memory role store for tests.
//!
//! Supports fault injection: failing every query, and emitting undecodable
//! records alongside real ones.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use warden_core::RoleId;

use crate::error::{Result, StoreError};
use crate::types::{Role, RoleFilter};
use crate::RoleStore;

/// In-memory implementation of [`RoleStore`].
#[derive(Default)]
pub struct MemoryRoleStore {
    roles: RwLock<BTreeMap<RoleId, Role>>,
    fail_queries: AtomicBool,
    corrupt_records: AtomicUsize,
    queries: AtomicUsize,
}

impl MemoryRoleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `role` as-is, without stamping timestamps or checking names.
    pub fn put_raw(&self, role: Role) {
        self.roles.write().insert(role.role_id, role);
    }

    /// Make every subsequent `find_roles` call fail (or succeed again).
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Append `count` undecodable records to every query result.
    pub fn inject_corrupt_records(&self, count: usize) {
        self.corrupt_records.store(count, Ordering::SeqCst);
    }

    /// Number of `find_roles` calls made so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl RoleStore for MemoryRoleStore {
    fn find_roles(&self, filter: &RoleFilter) -> Result<Vec<Result<Role>>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected query failure".to_string()));
        }

        let mut results: Vec<Result<Role>> = self
            .roles
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .map(Ok)
            .collect();

        for _ in 0..self.corrupt_records.load(Ordering::SeqCst) {
            results.push(Err(StoreError::Serialization(
                "injected corrupt record".to_string(),
            )));
        }

        Ok(results)
    }

    fn load_role(&self, role_id: &RoleId) -> Result<Option<Role>> {
        Ok(self.roles.read().get(role_id).cloned())
    }

    fn insert_role(&self, mut role: Role) -> Result<Role> {
        let mut roles = self.roles.write();
        if name_taken(&roles, &role) {
            return Err(StoreError::Conflict(format!(
                "role '{}' already exists",
                role.role
            )));
        }

        let now = Utc::now();
        role.created_at = now;
        role.updated_at = now;
        roles.insert(role.role_id, role.clone());
        Ok(role)
    }

    fn modify_role(
        &self,
        role_id: &RoleId,
        apply: &mut dyn FnMut(&mut Role) -> Result<()>,
    ) -> Result<Role> {
        let mut roles = self.roles.write();
        let mut updated = roles
            .get(role_id)
            .filter(|r| !r.deleted)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let name = updated.role.clone();
        apply(&mut updated)?;
        if updated.role != name && name_taken(&roles, &updated) {
            return Err(StoreError::Conflict(format!(
                "role '{}' already exists",
                updated.role
            )));
        }

        updated.updated_at = Utc::now();
        roles.insert(updated.role_id, updated.clone());
        Ok(updated)
    }

    fn commit_horizon(&self) -> DateTime<Utc> {
        let _roles = self.roles.write();
        Utc::now()
    }
}

fn name_taken(roles: &BTreeMap<RoleId, Role>, role: &Role) -> bool {
    roles.values().any(|r| {
        !r.deleted
            && r.role_id != role.role_id
            && r.project_id == role.project_id
            && r.role == role.role
    })
}
