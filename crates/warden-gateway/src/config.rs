//! Gateway configuration types.

use std::time::Duration;

/// Configuration for the gateway service.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    pub listen_addr: String,

    /// Directory holding the `RocksDB` role store.
    pub data_dir: String,

    /// Roles accepted on mutating role routes. Empty disables the check.
    pub admin_roles: Vec<String>,

    /// Scopes every protected route requires. Empty disables the check.
    pub required_scopes: Vec<String>,

    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `LISTEN_ADDR`: Listen address (default: `0.0.0.0:8080`)
    /// - `DATA_DIR`: Role store directory (default: `/data/warden`)
    /// - `ADMIN_ROLES`: Comma separated admin role names
    /// - `REQUIRED_SCOPES`: Comma or space separated scopes
    /// - `CORS_ORIGINS`: Comma separated origins (default: `*`)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            admin_roles: env_list("ADMIN_ROLES").unwrap_or(defaults.admin_roles),
            required_scopes: env_list("REQUIRED_SCOPES").unwrap_or(defaults.required_scopes),
            cors_origins: env_list("CORS_ORIGINS")
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.cors_origins),
            ..defaults
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: "/data/warden".to_string(),
            admin_roles: Vec::new(),
            required_scopes: Vec::new(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| split_list(&raw))
}

/// Split a comma or whitespace separated list, dropping empty items.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(config.admin_roles.is_empty());
        assert!(config.required_scopes.is_empty());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn lists_split_on_commas_and_spaces() {
        assert_eq!(split_list("admin, owner"), vec!["admin", "owner"]);
        assert_eq!(split_list("roles:read roles:write"), vec!["roles:read", "roles:write"]);
        assert!(split_list(" , ").is_empty());
    }
}
