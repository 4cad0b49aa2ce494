//! Error envelope returned to callers

use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Error envelope: `{"error": {"code", "message"}, "statusCode"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Error details
    pub error: ErrorBody,
    /// HTTP status code
    pub status_code: u16,
}

/// Error details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (e.g., `UNAUTHORIZED`, `REFRESH_FAILED`)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(code: impl Into<String>, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            status_code,
        }
    }

    /// Envelope for a session error kind
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.code(), message, kind.status_code())
    }

    // Common error constructors

    /// Unauthorized error
    pub fn unauthorized() -> Self {
        Self::from_kind(ErrorKind::Unauthorized, "Authentication required")
    }

    /// Forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message, 403)
    }

    /// Bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message, 400)
    }

    /// Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message, 409)
    }

    /// Internal server error
    pub fn internal() -> Self {
        Self::new("INTERNAL_ERROR", "An internal error occurred", 500)
    }
}
