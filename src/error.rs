use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::{
    auth::{gate::Denial, jwt::SessionError, password::WeakPassword},
    tokens::TokenError,
    users::repo::DuplicateEmail,
};

#[derive(Debug, Error)]
pub enum AppError {
    // client-correctable
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid token: {0}")]
    InvalidToken(TokenError),
    #[error("account is already active")]
    AlreadyActive,

    // credentials / identity
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("current password is incorrect")]
    WrongCurrentPassword,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Denied(#[from] Denial),

    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("user already exists")]
    AlreadyExists,
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64, message: &'static str },

    // infra
    #[error("email delivery failed")]
    Delivery(#[source] crate::mail::DeliveryError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError::InvalidToken(e)
    }
}

impl From<WeakPassword> for AppError {
    fn from(e: WeakPassword) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Malformed bodies, wrong field types and a missing JSON content type are
/// all validation failures.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<DuplicateEmail> for AppError {
    fn from(_: DuplicateEmail) -> Self {
        AppError::AlreadyExists
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InvalidToken(reason) => reason.code(),
            Self::AlreadyActive => "ALREADY_ACTIVE",
            Self::InvalidCredentials | Self::WrongCurrentPassword => "INVALID_CREDENTIALS",
            Self::Session(e) => e.code(),
            Self::Denied(d) => d.code(),
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Delivery(_) => "EMAIL_DELIVERY_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::BadRequest(_)
            | Self::InvalidToken(_)
            | Self::AlreadyActive => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::WrongCurrentPassword | Self::Session(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Denied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Delivery(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid credentials".into(),
            Self::WrongCurrentPassword => "Current password is incorrect".into(),
            Self::InvalidToken(reason) => format!("Invalid or expired token: {reason}"),
            Self::NotFound(what) => format!("{what} not found"),
            Self::AlreadyExists => "User already exists".into(),
            Self::AlreadyActive => "Account is already activated".into(),
            Self::RateLimited { message, .. } => (*message).into(),
            Self::Delivery(_) => "Failed to send email, please try again later".into(),
            Self::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Internal(e) => error!(error = ?e, "internal error"),
            Self::Delivery(e) => error!(error = %e, "email delivery error"),
            _ => {}
        }

        let retry_after = match &self {
            Self::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.public_message(),
            retry_after,
        };

        let mut res = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::Internal(anyhow::anyhow!("argon2 exploded at /srv/secret"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn token_reasons_surface_their_own_code() {
        let err = AppError::from(TokenError::Expired);
        assert_eq!(err.kind(), "TOKEN_EXPIRED");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let res = AppError::RateLimited {
            retry_after_secs: 42,
            message: "slow down",
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
