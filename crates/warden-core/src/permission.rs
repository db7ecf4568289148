//! Typed permission records.
//!
//! A role grants, per resource URN, a concrete set of action names. A resource
//! that is absent from a role's map grants nothing; there is no "inherit" state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The set of actions a role may perform on one resource.
///
/// Serialized as `{"actions": ["read", "write"]}`. Actions are kept sorted and
/// de-duplicated so that equal permissions always encode identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Allowed action names (case-sensitive).
    #[serde(default)]
    pub actions: BTreeSet<String>,
}

impl Permission {
    /// Build a permission from any collection of action names.
    #[must_use]
    pub fn new<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `action` is granted.
    #[must_use]
    pub fn allows(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    /// Returns `true` if no action is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Resource URN → permission granted on that resource.
pub type PermissionMap = BTreeMap<String, Permission>;
