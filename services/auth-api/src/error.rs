//! Error types for the Auth API service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use castgate_types::{ErrorEnvelope, ErrorKind};

use crate::tokens::TokenError;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Error envelope for this error
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::InvalidCredentials => {
                ErrorEnvelope::from_kind(ErrorKind::Unauthorized, self.to_string())
            }
            Self::RefreshFailed(_) => {
                ErrorEnvelope::from_kind(ErrorKind::RefreshFailed, self.to_string())
            }
            Self::AccountInactive => ErrorEnvelope::forbidden(self.to_string()),
            Self::NotFound(message) => ErrorEnvelope::new("NOT_FOUND", message.clone(), 404),
            Self::BadRequest(message) => ErrorEnvelope::bad_request(message.clone()),
            Self::Conflict(message) => ErrorEnvelope::conflict(message.clone()),
            Self::Internal(_) => ErrorEnvelope::internal(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(message) => Self::Internal(message),
            other => Self::RefreshFailed(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Log internal errors
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = ?self, "Internal API error");
        }

        let envelope = self.to_envelope();
        let status = StatusCode::from_u16(envelope.status_code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(envelope)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
