//! JWT authentication for warden.
//!
//! This crate turns bearer tokens issued by an external identity provider into
//! verified claims:
//!
//! - JWKS (JSON Web Key Set) fetching with a lazily populated key cache
//! - RS256 signature validation against X.509 certificate keys
//! - Issuer, audience, expiry, type and nonce checks
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   JwtValidator   │
//! │   (middleware)   │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  JwksValidator   │
//!                          │  (impl)          │
//!                          └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  JwksCache       │
//!                          │  (kid → JWK)     │
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │  Identity        │
//!                          │  provider JWKS   │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use warden_auth::{AuthConfig, JwksValidator, JwtValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig {
//!     jwks_url: "https://login.example.com/.well-known/jwks.json".to_string(),
//!     issuer: "https://login.example.com/".to_string(),
//!     audience: "warden-api".to_string(),
//!     fetch_timeout_seconds: 10,
//! };
//!
//! let validator = JwksValidator::new(config);
//!
//! // In a request handler:
//! let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9...";
//! let claims = validator.validate(token).await?;
//!
//! println!("Subject: {:?}", claims.subject());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod claims;
pub mod error;
pub mod jwks;
pub mod jwt;

pub use claims::Claims;
pub use error::{AuthError, Result};
pub use jwks::{Jwk, JwkSet, JwksCache};
pub use jwt::{JwksValidator, JwtValidator, LEEWAY_SECONDS};

#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockJwtValidator;

/// Configuration for token validation.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// URL of the JWKS document.
    pub jwks_url: String,
    /// Expected `iss` claim. Empty disables the issuer check.
    pub issuer: String,
    /// Expected `aud` entry. Empty disables the audience check.
    pub audience: String,
    /// Timeout for a single JWKS fetch, in seconds.
    pub fetch_timeout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: String::new(),
            issuer: String::new(),
            audience: String::new(),
            fetch_timeout_seconds: 10,
        }
    }
}

impl AuthConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads:
    /// - `JWKS_URL`: JWKS document URL (required)
    /// - `AUTH_ISSUER`: Expected issuer (default: empty, check disabled)
    /// - `AUTH_AUDIENCE`: Expected audience (default: empty, check disabled)
    /// - `JWKS_FETCH_TIMEOUT_SECONDS`: Fetch timeout (default: 10)
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `JWKS_URL` is unset or empty.
    pub fn from_env() -> Result<Self> {
        let jwks_url = std::env::var("JWKS_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Configuration("JWKS_URL must be set".to_string()))?;

        let defaults = Self::default();
        Ok(Self {
            jwks_url,
            issuer: std::env::var("AUTH_ISSUER").unwrap_or_default(),
            audience: std::env::var("AUTH_AUDIENCE").unwrap_or_default(),
            fetch_timeout_seconds: std::env::var("JWKS_FETCH_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_timeout_seconds),
        })
    }
}
