//! Error types for the guard and extractors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use castgate_types::{ErrorEnvelope, ErrorKind};

/// Authentication and authorization errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// No access token was presented.
    #[error("authentication required")]
    Unauthenticated,

    /// The access token did not decode.
    #[error("malformed access token")]
    MalformedToken,

    /// The access token has expired.
    #[error("access token expired")]
    TokenExpired,

    /// The caller lacks a required role.
    #[error("insufficient permissions: requires {0} role")]
    InsufficientRole(String),
}

impl GuardError {
    /// Taxonomy kind, if this is an authentication failure.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Unauthenticated => Some(ErrorKind::Unauthorized),
            Self::MalformedToken => Some(ErrorKind::MalformedToken),
            Self::TokenExpired => Some(ErrorKind::TokenExpired),
            Self::InsufficientRole(_) => None,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "missing",
            Self::MalformedToken => "malformed",
            Self::TokenExpired => "expired",
            Self::InsufficientRole(_) => "forbidden",
        }
    }

    /// Error envelope for this error.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self.kind() {
            Some(kind) => ErrorEnvelope::from_kind(kind, self.to_string()),
            None => ErrorEnvelope::forbidden(self.to_string()),
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let envelope = self.to_envelope();
        let status =
            StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::UNAUTHORIZED);
        (status, Json(envelope)).into_response()
    }
}
