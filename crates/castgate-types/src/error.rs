//! Session error taxonomy

use serde::{Deserialize, Serialize};

/// Kinds of session failure shared across client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No credential, or the server rejected it
    #[error("unauthorized")]
    Unauthorized,

    /// Local decode shows the access token is expired
    #[error("token expired")]
    TokenExpired,

    /// The refresh endpoint rejected the refresh token or timed out
    #[error("refresh failed")]
    RefreshFailed,

    /// No response reached the client
    #[error("network error")]
    NetworkError,

    /// The token could not be decoded
    #[error("malformed token")]
    MalformedToken,

    /// The token store could not be reached
    #[error("storage unavailable")]
    StorageUnavailable,
}

impl ErrorKind {
    /// Stable error code used in the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
        }
    }

    /// HTTP status reported for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized | Self::TokenExpired | Self::RefreshFailed | Self::MalformedToken => {
                401
            }
            Self::NetworkError | Self::StorageUnavailable => 503,
        }
    }

    /// Whether this kind is an authorization failure that a refresh may recover
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::TokenExpired)
    }
}
