use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{claims::Claims, jwt::JwtKeys};
use crate::{error::AppError, state::AppState, store::UserId};

/// Identity of an authenticated caller. Every protected route takes this
/// extractor, so requests are resolved to a user in exactly one place.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("invalid auth scheme".into()))?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|_| {
            warn!("invalid or expired token");
            AppError::Unauthorized("invalid or expired token".into())
        })?;

        resolve_user(state, &claims).await
    }
}

/// Accepts the claims only while their session id is still the user's
/// active auth token.
pub async fn resolve_user(state: &AppState, claims: &Claims) -> Result<AuthUser, AppError> {
    if state.users.auth_token_matches(claims.sub, &claims.sid).await? {
        Ok(AuthUser(claims.sub))
    } else {
        warn!(user_id = claims.sub, "token no longer active");
        Err(AppError::Unauthorized("session expired".into()))
    }
}
