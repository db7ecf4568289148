//! Flat role records → nested project projection.

use std::collections::BTreeMap;

use warden_core::{PermissionMap, ProjectId};
use warden_store::Role;

/// Project → role name → resource URN → allowed actions.
pub type Projection = BTreeMap<ProjectId, BTreeMap<String, PermissionMap>>;

/// Group roles by project and role name, merging their permission maps.
///
/// Records sharing a project and role name accumulate into one map; on a
/// resource collision the later record wins. Deleted roles and resources
/// without actions contribute nothing.
#[must_use]
pub fn transform<'a, I>(roles: I) -> Projection
where
    I: IntoIterator<Item = &'a Role>,
{
    let mut projection = Projection::new();
    for role in roles.into_iter().filter(|r| !r.deleted) {
        projection
            .entry(role.project_id)
            .or_default()
            .entry(role.role.clone())
            .or_default()
            .extend(
                role.permissions
                    .iter()
                    .filter(|(_, permission)| !permission.is_empty())
                    .map(|(resource, permission)| (resource.clone(), permission.clone())),
            );
    }
    projection
}
