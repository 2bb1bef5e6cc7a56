use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::auth::services::AuthError;
use crate::store::StoreError;
use crate::timer::TimerError;

/// Error returned by every handler.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => AppError::Conflict(format!("{what} already taken")),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<TimerError> for AppError {
    fn from(e: TimerError) -> Self {
        match e {
            TimerError::NoActiveTimer => AppError::NotFound("no active timer".into()),
            TimerError::Storage(s) => s.into(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        let message = e.to_string();
        match e {
            AuthError::Invalid(msg) => AppError::BadRequest(msg),
            AuthError::DomainNotAllowed => AppError::Forbidden(message),
            AuthError::UsernameTaken | AuthError::EmailTaken => AppError::Conflict(message),
            AuthError::InvalidCredentials | AuthError::InvalidCode | AuthError::NotConfirmed => {
                AppError::Unauthorized(message)
            }
            AuthError::Storage(s) => s.into(),
            AuthError::Internal(inner) => AppError::Internal(inner),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(e) => {
                error!(error = %e, "request failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
            }
        };

        (status, self.to_string()).into_response()
    }
}
