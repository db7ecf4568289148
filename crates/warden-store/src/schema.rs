//! Column family naming.
//!
//! Each document collection lives in a column family named after the collection.
//! The role collection carries one secondary index column family.

/// Default name of the role collection.
pub const DEFAULT_ROLES_COLLECTION: &str = "roles";

/// Name of the per-project index column family for a role collection.
#[must_use]
pub fn project_index(collection: &str) -> String {
    format!("{collection}_by_project")
}

/// Returns all column family names needed for the given role collection.
#[must_use]
pub fn column_families(roles_collection: &str) -> Vec<String> {
    vec![
        roles_collection.to_string(),
        project_index(roles_collection),
    ]
}
