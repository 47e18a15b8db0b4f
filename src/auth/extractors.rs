use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::{JwtKeys, TokenError};
use crate::error::AppError;

/// Identity attached to a request once its bearer token checks out.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

/// Returns the token when the header is exactly `Bearer <token>`.
fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Rejects the request with 401 unless it carries a valid bearer token;
/// otherwise stores an [`AuthUser`] in the request extensions.
pub async fn require_auth(
    State(keys): State<JwtKeys>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .filter(|v| !v.is_empty())
        .ok_or(AppError::Unauthorized("authorization header required"))?;

    let token = header
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or(AppError::Unauthorized("invalid authorization header format"))?;

    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        match e {
            TokenError::Invalid(_) => AppError::Unauthorized("invalid token"),
            TokenError::BadClaims => AppError::Unauthorized("invalid token claims"),
        }
    })?;

    let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| {
        warn!(user_id = %claims.user_id, "token subject is not a uuid");
        AppError::Unauthorized("invalid token claims")
    })?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email,
    });
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized("unauthorized"))
    }
}
