//! Authorization middleware and extractors.
//!
//! [`authenticate`] gates every protected route: it requires an
//! `Authorization: Bearer <token>` header, validates the token and stores the
//! verified [`Claims`] in the request extensions. [`require_roles`] and
//! [`require_scopes`] run after it and read those claims; handlers get them
//! through the [`AuthClaims`] extractor.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use warden_auth::{Claims, JwtValidator};
use warden_cache::CacheStore;
use warden_store::RoleStore;

use crate::error::ApiError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Verified claims of the current request.
#[derive(Debug, Clone)]
pub struct AuthClaims(pub Claims);

#[async_trait]
impl<T: Send + Sync> FromRequestParts<T> for AuthClaims {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &T) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(Self)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The `Bearer ` prefix is matched exactly, including case.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
}

/// Validate the bearer token and attach its claims to the request.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` for a missing or malformed header, or a
/// token the validator rejects. The validator is not called in the first case.
pub async fn authenticate<S, C, V>(
    State(state): State<Arc<AppState<S, C, V>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
    V: JwtValidator + 'static,
{
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.validator.validate(token).await?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Pass only callers whose `roles` claim contains one of `accepted`.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the request was not authenticated and
/// `ApiError::Forbidden` if no role matches.
pub async fn require_roles(
    State(accepted): State<Arc<[String]>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(ApiError::Unauthorized)?;

    if !claims.has_any_role(&accepted[..]) {
        return Err(ApiError::Forbidden("missing required role".to_string()));
    }
    Ok(next.run(request).await)
}

/// Pass only callers whose `scope` claim contains every one of `required`.
/// An empty `required` list passes nobody, as with [`require_roles`].
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the request was not authenticated and
/// `ApiError::Forbidden` if any scope is missing.
pub async fn require_scopes(
    State(required): State<Arc<[String]>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(ApiError::Unauthorized)?;

    if required.is_empty() || !claims.has_all_scopes(&required[..]) {
        return Err(ApiError::Forbidden("missing required scope".to_string()));
    }
    Ok(next.run(request).await)
}
