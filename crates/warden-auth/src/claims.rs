//! Verified token claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The full JSON body of a verified token.
///
/// Every claim is kept; typed accessors cover the ones the gateway reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Wrap a claims map.
    #[must_use]
    pub const fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Raw access to a claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The whole claims map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    /// The `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.str_claim("iss")
    }

    /// The `email` claim.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.str_claim("email")
    }

    /// The `nonce` claim, if it is a string.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.str_claim("nonce")
    }

    /// Audience entries. `aud` may be a single string or a list.
    #[must_use]
    pub fn audience(&self) -> Vec<&str> {
        match self.0.get("aud") {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Role names from the `roles` list claim.
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        match self.0.get("roles") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Granted scopes, from a space-delimited string or a list.
    ///
    /// Returns `None` if `scope` is absent or of any other type.
    #[must_use]
    pub fn scopes(&self) -> Option<Vec<&str>> {
        match self.0.get("scope")? {
            Value::String(s) => Some(s.split_whitespace().collect()),
            Value::Array(items) => Some(items.iter().filter_map(Value::as_str).collect()),
            _ => None,
        }
    }

    /// Identity used as the owner of created records: `email`, else `sub`.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.email().or_else(|| self.subject())
    }

    /// `true` if at least one of `accepted` appears in the `roles` claim.
    #[must_use]
    pub fn has_any_role<S: AsRef<str>>(&self, accepted: &[S]) -> bool {
        let roles = self.roles();
        accepted.iter().any(|r| roles.contains(&r.as_ref()))
    }

    /// `true` if every one of `required` appears in the `scope` claim.
    #[must_use]
    pub fn has_all_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        let Some(scopes) = self.scopes() else {
            return false;
        };
        required.iter().all(|s| scopes.contains(&s.as_ref()))
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn audience_string_or_list() {
        assert_eq!(claims(json!({"aud": "api"})).audience(), vec!["api"]);
        assert_eq!(
            claims(json!({"aud": ["api", "web"]})).audience(),
            vec!["api", "web"]
        );
        assert!(claims(json!({})).audience().is_empty());
    }

    #[test]
    fn scopes_string_or_list() {
        let c = claims(json!({"scope": "read:roles  write:roles"}));
        assert!(c.has_all_scopes(&["read:roles", "write:roles"]));

        let c = claims(json!({"scope": ["a", "b"]}));
        assert!(c.has_all_scopes(&["a", "b"]));
        assert!(!c.has_all_scopes(&["a", "c"]));
    }

    #[test]
    fn missing_or_mistyped_scope_fails_closed() {
        assert!(!claims(json!({})).has_all_scopes(&["a"]));
        assert!(!claims(json!({"scope": 7})).has_all_scopes(&["a"]));
        assert_eq!(claims(json!({"scope": 7})).scopes(), None);
    }

    #[test]
    fn roles_are_case_sensitive() {
        let c = claims(json!({"roles": ["Admin", "viewer"]}));
        assert!(c.has_any_role(&["viewer", "owner"]));
        assert!(!c.has_any_role(&["admin"]));
        assert!(!claims(json!({"roles": "admin"})).has_any_role(&["admin"]));
    }

    #[test]
    fn identity_prefers_email() {
        let c = claims(json!({"sub": "auth0|42", "email": "dev@example.com"}));
        assert_eq!(c.identity(), Some("dev@example.com"));
        assert_eq!(claims(json!({"sub": "auth0|42"})).identity(), Some("auth0|42"));
    }
}
