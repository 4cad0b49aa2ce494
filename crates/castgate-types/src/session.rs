//! Session and token types

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token pair returned after login or refresh.
///
/// Both values are opaque to the client. `Debug` never prints them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived)
    pub refresh_token: String,
}

impl TokenPair {
    /// Create a new token pair
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// A pair with either half empty is not a usable session.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Identity decoded from an access token.
///
/// Never stored on its own; the access token is the single source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Subject (user ID)
    pub subject_id: String,
    /// Email address
    pub email: String,
    /// Role names carried by the token
    pub roles: BTreeSet<String>,
    /// Expiration time
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    /// Check whether the identity is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check if the identity carries a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Roles joined with commas, in sorted order
    pub fn roles_header(&self) -> String {
        self.roles.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}
