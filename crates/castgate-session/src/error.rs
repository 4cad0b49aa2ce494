//! Client errors
//!
//! [`ApiClientError`] covers calls to the auth API. [`SessionError`] is what
//! the [`SessionClient`](crate::SessionClient) facade returns; each variant
//! wraps the error of the component that failed.

use castgate_types::{ErrorEnvelope, ErrorKind};
use thiserror::Error;

use crate::config::ConfigError;
use crate::decode::DecodeError;
use crate::interceptor::InterceptError;
use crate::refresh::RefreshError;
use crate::store::StoreError;

/// Errors from the auth API (`/auth/login`, `/auth/refresh`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiClientError {
    /// The server answered with a non-success status.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Error code from the envelope, if the body carried one
        code: Option<String>,
        /// Error message
        message: String,
    },

    /// No response reached the client.
    #[error("network error: {0}")]
    Network(String),

    /// A response arrived but could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiClientError {
    /// Build a rejection from a status and an optional error envelope.
    #[must_use]
    pub fn rejected(status: u16, envelope: Option<ErrorEnvelope>) -> Self {
        match envelope {
            Some(env) => Self::Rejected {
                status,
                code: Some(env.error.code),
                message: env.error.message,
            },
            None => Self::Rejected {
                status,
                code: None,
                message: "no error body".to_string(),
            },
        }
    }

    /// Taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Rejected { .. } | Self::InvalidResponse(_) => ErrorKind::Unauthorized,
        }
    }

    /// Returns true if the caller may retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors returned by the session client facade.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Login was rejected or could not reach the server.
    #[error("login failed: {0}")]
    Login(#[from] ApiClientError),

    /// The server returned a token that does not decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Token storage failed.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Refresh failed.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// An intercepted request failed.
    #[error(transparent)]
    Request(#[from] InterceptError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Login(e) => e.kind(),
            Self::Decode(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Refresh(e) => e.kind(),
            Self::Request(e) => e.kind(),
            Self::Config(_) => ErrorKind::NetworkError,
        }
    }

    /// Error envelope for rendering this error to a caller.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from_kind(self.kind(), self.to_string())
    }
}
