//! Key encoding utilities for `RocksDB`.
//!
//! Role records are keyed by their raw ID bytes. The per-project index is keyed
//! by `project_id || role_id` so that a prefix scan lists one project's roles.

use warden_core::{ProjectId, RoleId, OBJECT_ID_LEN};

/// Encode a role key (just the role ID bytes).
#[must_use]
pub fn role_key(role_id: &RoleId) -> Vec<u8> {
    role_id.as_bytes().to_vec()
}

/// Encode a project-role index key: `project_id || role_id`.
#[must_use]
pub fn project_role_key(project_id: &ProjectId, role_id: &RoleId) -> Vec<u8> {
    let mut key = Vec::with_capacity(OBJECT_ID_LEN * 2);
    key.extend_from_slice(project_id.as_bytes());
    key.extend_from_slice(role_id.as_bytes());
    key
}

/// Encode a project prefix for scanning all roles of a project.
#[must_use]
pub fn project_prefix(project_id: &ProjectId) -> Vec<u8> {
    project_id.as_bytes().to_vec()
}

/// Extract the role ID from a project-role index key.
///
/// Returns `None` if the key is not exactly `2 * OBJECT_ID_LEN` bytes.
#[must_use]
pub fn extract_role_id(key: &[u8]) -> Option<RoleId> {
    if key.len() != OBJECT_ID_LEN * 2 {
        return None;
    }
    let mut bytes = [0u8; OBJECT_ID_LEN];
    bytes.copy_from_slice(&key[OBJECT_ID_LEN..]);
    Some(RoleId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_role_key_roundtrip() {
        let project_id = ProjectId::from_bytes([1u8; OBJECT_ID_LEN]);
        let role_id = RoleId::from_bytes([2u8; OBJECT_ID_LEN]);

        let key = project_role_key(&project_id, &role_id);
        assert_eq!(key.len(), 24);
        assert!(key.starts_with(&project_prefix(&project_id)));
        assert_eq!(extract_role_id(&key), Some(role_id));
    }

    #[test]
    fn malformed_index_key_is_rejected() {
        assert_eq!(extract_role_id(&[0u8; 5]), None);
    }
}
