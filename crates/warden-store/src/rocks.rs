//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `RoleStore` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch};
use warden_core::{ProjectId, RoleId};

use crate::collection::{Collection, Db};
use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema;
use crate::types::{Role, RoleFilter};
use crate::RoleStore;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<Db>,
    roles: Collection<Role>,
    project_index: String,
    /// Serializes read-modify-write cycles. Timestamps are taken under it,
    /// so commit order matches `updated_at` order.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path using the default
    /// role collection name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_collection(path, schema::DEFAULT_ROLES_COLLECTION)
    }

    /// Open or create a `RocksDB` database with a named role collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with_collection<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = schema::column_families(collection)
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let db = Arc::new(db);

        tracing::debug!(collection, "Role store opened");

        Ok(Self {
            roles: Collection::new(Arc::clone(&db), collection),
            project_index: schema::project_index(collection),
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Primary keys of every role indexed under a project.
    fn project_role_keys(&self, project_id: &ProjectId) -> Result<Vec<Vec<u8>>> {
        let cf_index = self.cf(&self.project_index)?;
        let prefix = keys::project_prefix(project_id);

        let mut role_keys = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_index,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(&prefix) {
                break;
            }

            if let Some(role_id) = keys::extract_role_id(&key) {
                role_keys.push(keys::role_key(&role_id));
            }
        }

        Ok(role_keys)
    }

    /// Fail if another active role of the project already uses the name.
    /// Must be called with `write_lock` held.
    fn check_name_free(&self, role: &Role) -> Result<()> {
        let taken = self
            .find_roles(&RoleFilter::active().in_project(role.project_id).named(&role.role))?
            .into_iter()
            .filter_map(std::result::Result::ok)
            .any(|existing| existing.role_id != role.role_id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "role '{}' already exists",
                role.role
            )));
        }
        Ok(())
    }

    fn write_role(&self, role: &Role) -> Result<()> {
        let cf_index = self.cf(&self.project_index)?;

        let mut batch = WriteBatch::default();
        self.roles.stage_put(&mut batch, role)?;
        // Project membership never changes, so the index entry is idempotent.
        batch.put_cf(
            &cf_index,
            keys::project_role_key(&role.project_id, &role.role_id),
            b"",
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl RoleStore for RocksStore {
    fn find_roles(&self, filter: &RoleFilter) -> Result<Vec<Result<Role>>> {
        let candidates = match filter.project_id {
            Some(project_id) => {
                let role_keys = self.project_role_keys(&project_id)?;
                self.roles.get_many(&role_keys)?
            }
            None => self.roles.scan()?,
        };

        Ok(candidates
            .into_iter()
            .filter(|r| r.as_ref().map_or(true, |role| filter.matches(role)))
            .collect())
    }

    fn load_role(&self, role_id: &RoleId) -> Result<Option<Role>> {
        self.roles.get(&keys::role_key(role_id))
    }

    fn insert_role(&self, mut role: Role) -> Result<Role> {
        let _guard = self.write_lock.lock();

        self.check_name_free(&role)?;

        let now = Utc::now();
        role.created_at = now;
        role.updated_at = now;
        self.write_role(&role)?;
        Ok(role)
    }

    fn modify_role(
        &self,
        role_id: &RoleId,
        apply: &mut dyn FnMut(&mut Role) -> Result<()>,
    ) -> Result<Role> {
        let _guard = self.write_lock.lock();

        let mut role = self
            .load_role(role_id)?
            .filter(|r| !r.deleted)
            .ok_or(StoreError::NotFound)?;

        let name = role.role.clone();
        apply(&mut role)?;
        if role.role != name {
            self.check_name_free(&role)?;
        }
        role.updated_at = Utc::now();

        self.write_role(&role)?;
        Ok(role)
    }

    fn commit_horizon(&self) -> DateTime<Utc> {
        let _guard = self.write_lock.lock();
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewRole, RoleUpdate};
    use chrono::Duration;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use warden_core::{Permission, PermissionMap};

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn new_role(project: &ProjectId, name: &str) -> NewRole {
        let mut permissions = PermissionMap::new();
        permissions.insert(
            "urn:documents".to_string(),
            Permission::new(["read", "write"]),
        );
        NewRole {
            project_id: *project,
            owner: "owner@example.com".to_string(),
            role: name.to_string(),
            description: format!("{name} role"),
            permissions,
        }
    }

    fn actions(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn role_crud() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();

        let role = store.create_role(new_role(&project, "admin")).unwrap();
        assert_eq!(role.created_at, role.updated_at);
        assert!(!role.deleted);

        let fetched = store.get_role(&role.role_id).unwrap().unwrap();
        assert_eq!(fetched, role);

        let updated = store
            .update_role(
                &role.role_id,
                RoleUpdate {
                    description: Some("changed".to_string()),
                    ..RoleUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.description, "changed");
        assert!(updated.updated_at >= role.updated_at);

        store.soft_delete_role(&role.role_id).unwrap();
        assert!(store.get_role(&role.role_id).unwrap().is_none());

        // The record is still present, flagged.
        let raw = store.load_role(&role.role_id).unwrap().unwrap();
        assert!(raw.deleted);
    }

    #[test]
    fn duplicate_name_in_project_conflicts() {
        let (store, _dir) = create_test_store();
        let p1 = ProjectId::from_seed("p1");
        let p2 = ProjectId::from_seed("p2");

        store.create_role(new_role(&p1, "admin")).unwrap();
        let err = store.create_role(new_role(&p1, "admin")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Same name in another project is fine.
        store.create_role(new_role(&p2, "admin")).unwrap();
    }

    #[test]
    fn name_can_be_reused_after_soft_delete() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();

        let first = store.create_role(new_role(&project, "admin")).unwrap();
        store.soft_delete_role(&first.role_id).unwrap();
        store.create_role(new_role(&project, "admin")).unwrap();
    }

    #[test]
    fn rename_onto_existing_name_conflicts() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();

        store.create_role(new_role(&project, "admin")).unwrap();
        let viewer = store.create_role(new_role(&project, "viewer")).unwrap();

        let err = store
            .update_role(
                &viewer.role_id,
                RoleUpdate {
                    role: Some("admin".to_string()),
                    ..RoleUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn list_and_find_project_roles() {
        let (store, _dir) = create_test_store();
        let p1 = ProjectId::from_seed("p1");
        let p2 = ProjectId::from_seed("p2");

        store.create_role(new_role(&p1, "admin")).unwrap();
        store.create_role(new_role(&p1, "viewer")).unwrap();
        store.create_role(new_role(&p2, "admin")).unwrap();

        assert_eq!(store.list_project_roles(&p1).unwrap().len(), 2);
        assert_eq!(store.list_project_roles(&p2).unwrap().len(), 1);

        let viewer = store.find_project_role(&p1, "viewer").unwrap().unwrap();
        assert_eq!(viewer.project_id, p1);
        assert!(store.find_project_role(&p2, "viewer").unwrap().is_none());
    }

    #[test]
    fn permission_updates() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();
        let role = store.create_role(new_role(&project, "admin")).unwrap();

        let role = store
            .update_permission(&role.role_id, "urn:billing", actions(&["read"]))
            .unwrap();
        assert!(role.permissions["urn:billing"].allows("read"));
        assert_eq!(role.permissions.len(), 2);

        // Empty action set removes the resource.
        let role = store
            .update_permission(&role.role_id, "urn:billing", BTreeSet::new())
            .unwrap();
        assert!(!role.permissions.contains_key("urn:billing"));

        let role = store.remove_permission(&role.role_id, "urn:documents").unwrap();
        assert!(role.permissions.is_empty());
    }

    #[test]
    fn resources_without_actions_are_never_stored() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();

        let mut input = new_role(&project, "admin");
        input.permissions.insert("urn:empty".to_string(), Permission::default());
        let role = store.create_role(input).unwrap();
        assert_eq!(
            role.permissions.keys().collect::<Vec<_>>(),
            vec!["urn:documents"]
        );

        let mut replacement = PermissionMap::new();
        replacement.insert("urn:billing".to_string(), Permission::new(["read"]));
        replacement.insert("urn:documents".to_string(), Permission::default());
        let role = store.replace_permissions(&role.role_id, replacement).unwrap();
        assert_eq!(
            role.permissions.keys().collect::<Vec<_>>(),
            vec!["urn:billing"]
        );

        let stored = store.get_role(&role.role_id).unwrap().unwrap();
        assert_eq!(stored.permissions, role.permissions);
    }

    #[test]
    fn concurrent_renames_onto_one_name_admit_one() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();
        let ids: Vec<RoleId> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| store.create_role(new_role(&project, name)).unwrap().role_id)
            .collect();

        let results: Vec<Result<Role>> = std::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .iter()
                .map(|id| {
                    let store = &store;
                    scope.spawn(move || {
                        store.update_role(
                            id,
                            RoleUpdate {
                                role: Some("owner".to_string()),
                                ..RoleUpdate::default()
                            },
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StoreError::Conflict(_))));
        let owners = store
            .find_roles(&RoleFilter::active().in_project(project).named("owner"))
            .unwrap();
        assert_eq!(owners.len(), 1);
    }

    #[test]
    fn rename_to_own_name_is_allowed() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();
        let role = store.create_role(new_role(&project, "admin")).unwrap();

        let renamed = store
            .update_role(
                &role.role_id,
                RoleUpdate {
                    role: Some("admin".to_string()),
                    ..RoleUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.role, "admin");
    }

    #[test]
    fn commit_horizon_covers_every_committed_write() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();
        let role = store.create_role(new_role(&project, "admin")).unwrap();
        let role = store
            .update_permission(&role.role_id, "urn:billing", actions(&["read"]))
            .unwrap();

        let horizon = store.commit_horizon();
        assert!(horizon >= role.updated_at);
        assert!(store
            .find_roles(&RoleFilter::active().updated_after(horizon))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn mutations_on_deleted_or_missing_roles_fail() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();
        let role = store.create_role(new_role(&project, "admin")).unwrap();
        store.soft_delete_role(&role.role_id).unwrap();

        assert!(matches!(
            store.soft_delete_role(&role.role_id),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.update_permission(&role.role_id, "urn:x", actions(&["read"])),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.remove_permission(&RoleId::generate(), "urn:x"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn soft_delete_project_roles_counts() {
        let (store, _dir) = create_test_store();
        let p1 = ProjectId::from_seed("p1");
        let p2 = ProjectId::from_seed("p2");

        store.create_role(new_role(&p1, "admin")).unwrap();
        store.create_role(new_role(&p1, "viewer")).unwrap();
        store.create_role(new_role(&p2, "admin")).unwrap();

        assert_eq!(store.soft_delete_project_roles(&p1).unwrap(), 2);
        assert!(store.list_project_roles(&p1).unwrap().is_empty());
        assert_eq!(store.list_project_roles(&p2).unwrap().len(), 1);
        assert_eq!(store.soft_delete_project_roles(&p1).unwrap(), 0);
    }

    #[test]
    fn updated_after_and_deleted_filters() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();

        let old = store.create_role(new_role(&project, "old")).unwrap();
        let watermark = old.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let fresh = store.create_role(new_role(&project, "fresh")).unwrap();

        let changed: Vec<Role> = store
            .find_roles(&RoleFilter::active().updated_after(watermark))
            .unwrap()
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].role_id, fresh.role_id);

        store.soft_delete_role(&old.role_id).unwrap();
        let tombstones = store
            .find_roles(&RoleFilter::deleted().updated_after(watermark - Duration::seconds(1)))
            .unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].as_ref().unwrap().role_id, old.role_id);

        assert_eq!(store.find_roles(&RoleFilter::all()).unwrap().len(), 2);
    }

    #[test]
    fn undecodable_record_is_reported_per_item() {
        let (store, _dir) = create_test_store();
        let project = ProjectId::generate();
        store.create_role(new_role(&project, "admin")).unwrap();

        store
            .roles
            .put_raw(&keys::role_key(&RoleId::generate()), b"not cbor")
            .unwrap();

        let results = store.find_roles(&RoleFilter::active()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StoreError::Serialization(_)))));
    }

    #[test]
    fn data_persists_across_reopen_with_custom_collection() {
        let dir = TempDir::new().unwrap();
        let project = ProjectId::generate();

        let role_id = {
            let store = RocksStore::open_with_collection(dir.path(), "acl_roles").unwrap();
            assert_eq!(store.roles.name(), "acl_roles");
            store.create_role(new_role(&project, "admin")).unwrap().role_id
        };

        let store = RocksStore::open_with_collection(dir.path(), "acl_roles").unwrap();
        let role = store.get_role(&role_id).unwrap().unwrap();
        assert_eq!(role.project_id, project);
    }
}
