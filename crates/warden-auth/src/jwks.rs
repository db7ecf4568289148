//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Keys are cached by key ID, populated lazily on a miss and never evicted.
//! A lookup that misses fetches the whole document again; unknown IDs are not
//! remembered, so a key published later is picked up by the next request.

use std::collections::HashMap;
use std::time::Duration;

use base64::prelude::*;
use jsonwebtoken::DecodingKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// JWKS document returned by the identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// The list of keys.
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// A single JWK (JSON Web Key).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key ID.
    #[serde(default)]
    pub kid: String,
    /// Key type (e.g., "RSA").
    #[serde(default)]
    pub kty: String,
    /// Algorithm (e.g., "RS256").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Key use (e.g., "sig").
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// X.509 certificate chain, standard base64 DER, leaf first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x5c: Vec<String>,
    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    /// Build an RSA verification key from this JWK.
    ///
    /// The leaf certificate in `x5c` is preferred; bare `n`/`e` components are
    /// accepted for RSA keys published without a certificate.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` if the certificate is malformed or does
    /// not carry an RSA public key.
    pub fn rsa_decoding_key(&self) -> Result<DecodingKey> {
        if let Some(cert) = self.x5c.first() {
            let der = BASE64_STANDARD
                .decode(cert)
                .map_err(|e| AuthError::InvalidKey(format!("invalid certificate encoding: {e}")))?;
            return DecodingKey::from_rsa_pem(certificate_pem(&der).as_bytes())
                .map_err(|e| AuthError::InvalidKey(format!("certificate has no RSA key: {e}")));
        }

        match (self.kty.as_str(), &self.n, &self.e) {
            ("RSA", Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e)
                .map_err(|e| AuthError::InvalidKey(e.to_string())),
            _ => Err(AuthError::InvalidKey(format!(
                "key {} has no certificate",
                self.kid
            ))),
        }
    }
}

/// Wrap DER bytes in PEM certificate armour.
fn certificate_pem(der: &[u8]) -> String {
    let body = BASE64_STANDARD.encode(der);
    let mut pem = String::with_capacity(body.len() + body.len() / 64 + 64);
    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    let mut rest = body.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(64));
        pem.push_str(line);
        pem.push('\n');
        rest = tail;
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Key-ID-addressed cache in front of a remote JWKS document.
pub struct JwksCache {
    url: String,
    client: reqwest::Client,
    keys: RwLock<HashMap<String, Jwk>>,
}

impl JwksCache {
    /// Create a cache for the JWKS document at `url`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(url: impl Into<String>, fetch_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            url: url.into(),
            client,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Create a cache from authentication configuration.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.jwks_url.clone(),
            Duration::from_secs(config.fetch_timeout_seconds),
        )
    }

    /// Resolve a key ID, fetching the JWKS document on a miss.
    ///
    /// Concurrent misses may each fetch; inserts are idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyNotFound` if the fetched document has no such key,
    /// or `AuthError::JwksFetchFailed` if the fetch or decode fails.
    pub async fn fetch_key(&self, kid: &str) -> Result<Jwk> {
        {
            let keys = self.keys.read();
            if let Some(key) = keys.get(kid) {
                return Ok(key.clone());
            }
        }

        let set = self.fetch_set().await?;
        let key = set
            .keys
            .into_iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))?;

        self.keys.write().insert(kid.to_string(), key.clone());
        tracing::debug!(kid, "Cached JWKS key");

        Ok(key)
    }

    /// Number of keys currently cached.
    #[must_use]
    pub fn cached_keys(&self) -> usize {
        self.keys.read().len()
    }

    async fn fetch_set(&self) -> Result<JwkSet> {
        tracing::debug!(url = %self.url, "Fetching JWKS");

        self.client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))
    }
}
