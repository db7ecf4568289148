//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The JWT has expired (beyond the allowed leeway).
    #[error("token expired")]
    TokenExpired,

    /// The JWT signature is invalid.
    #[error("invalid signature")]
    InvalidSignature,

    /// The JWT issuer does not match the expected value.
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The JWT audience does not contain the expected value.
    #[error("invalid audience")]
    InvalidAudience,

    /// The `typ` header is present but is not `JWT`.
    #[error("invalid token type: {0}")]
    InvalidTokenType(String),

    /// The `nonce` claim is present but empty.
    #[error("empty nonce")]
    EmptyNonce,

    /// The token is signed with an algorithm other than RS256.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A required claim or header field is missing from the token.
    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// The key ID specified in the token was not found in the JWKS document.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The key material could not be turned into an RSA public key.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Failed to fetch JWKS from the identity provider.
    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    /// The token format is invalid.
    #[error("invalid token format: {0}")]
    InvalidToken(String),

    /// Required configuration is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if this error indicates the client should retry with a new token.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::TokenExpired | Self::JwksFetchFailed(_))
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::TokenExpired
            | Self::InvalidSignature
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::InvalidTokenType(_)
            | Self::EmptyNonce
            | Self::UnsupportedAlgorithm(_)
            | Self::MissingClaim(_)
            | Self::KeyNotFound(_)
            | Self::InvalidKey(_)
            | Self::InvalidToken(_) => 401,
            Self::JwksFetchFailed(_) | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }
}
