use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::{JwtKeys, SessionError};
use crate::{error::AppError, state::AppState, users::repo_types::Role};

/// Authenticated caller, taken from a verified bearer token whose subject
/// still exists in the user store.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

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
            .ok_or(SessionError::Missing)?;

        // Expect "Bearer <token>"; any other scheme is not a session
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| {
                warn!("invalid auth scheme");
                SessionError::InvalidOrExpired
            })?
            .trim();
        if token.is_empty() {
            return Err(SessionError::Missing.into());
        }

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!("invalid or expired token");
            e
        })?;

        // Deleting a user revokes their sessions.
        if !state.users.exists(claims.sub).await {
            warn!(user_id = %claims.sub, "token for deleted user");
            return Err(SessionError::SubjectGone.into());
        }

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}
