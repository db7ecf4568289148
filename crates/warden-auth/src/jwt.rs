//! JWT validation and claims extraction.
//!
//! Validation runs in a fixed order: header parse and algorithm gate, key
//! resolution, signature and time checks, then the explicit claim checks
//! (issuer, type, audience, nonce). The first failure rejects.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};

use crate::claims::Claims;
use crate::error::{AuthError, Result};
use crate::jwks::JwksCache;
use crate::AuthConfig;

/// Allowed clock skew for `exp`/`nbf`, in seconds.
pub const LEEWAY_SECONDS: u64 = 30;

/// Trait for validating JWTs.
#[async_trait]
pub trait JwtValidator: Send + Sync {
    /// Validate a JWT and return its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or cannot be validated.
    async fn validate(&self, token: &str) -> Result<Claims>;
}

/// JWKS-based JWT validator.
///
/// Only RS256 is accepted. Keys are resolved through a [`JwksCache`] and
/// taken from the leaf X.509 certificate of the matching JWK.
pub struct JwksValidator {
    config: AuthConfig,
    jwks: JwksCache,
}

impl JwksValidator {
    /// Create a new JWKS-based validator.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let jwks = JwksCache::from_config(&config);
        Self { config, jwks }
    }

    /// Get a reference to the key cache.
    #[must_use]
    pub const fn jwks(&self) -> &JwksCache {
        &self.jwks
    }

    /// Validate `token` against explicit expectations.
    ///
    /// An empty `audience` or `issuer` disables that check.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure encountered.
    pub async fn validate_with(&self, token: &str, audience: &str, issuer: &str) -> Result<Claims> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::MissingClaim("kid".to_string()))?;

        let key = self.jwks.fetch_key(&kid).await?.rsa_decoding_key()?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = LEEWAY_SECONDS;
        validation.set_required_spec_claims(&["exp"]);
        // Audience may be a string or a list; checked below.
        validation.validate_aud = false;
        if !issuer.is_empty() {
            validation.set_issuer(&[issuer]);
        }

        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
                _ => AuthError::InvalidToken(e.to_string()),
            })?
            .claims;

        if !issuer.is_empty() && claims.issuer() != Some(issuer) {
            return Err(AuthError::InvalidIssuer);
        }

        if let Some(typ) = header.typ.as_deref() {
            if typ != "JWT" {
                return Err(AuthError::InvalidTokenType(typ.to_string()));
            }
        }

        if !audience.is_empty() && !claims.audience().contains(&audience) {
            return Err(AuthError::InvalidAudience);
        }

        if claims.nonce() == Some("") {
            return Err(AuthError::EmptyNonce);
        }

        Ok(claims)
    }
}

#[async_trait]
impl JwtValidator for JwksValidator {
    async fn validate(&self, token: &str) -> Result<Claims> {
        self.validate_with(token, &self.config.audience, &self.config.issuer)
            .await
    }
}

/// A mock JWT validator for testing.
///
/// Accepts only the tokens registered with [`MockJwtValidator::with_token`]
/// and returns their claims.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockJwtValidator {
    tokens: std::collections::HashMap<String, Claims>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockJwtValidator {
    /// Create a validator that rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as valid, carrying `claims`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, claims: serde_json::Value) -> Self {
        let claims = match claims {
            serde_json::Value::Object(map) => Claims::new(map),
            _ => Claims::default(),
        };
        self.tokens.insert(token.into(), claims);
        self
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl JwtValidator for MockJwtValidator {
    async fn validate(&self, token: &str) -> Result<Claims> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown test token".to_string()))
    }
}
