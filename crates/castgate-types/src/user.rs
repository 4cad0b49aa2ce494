//! User and role types

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Platform role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Creates and publishes podcasts
    Creator,
    /// Edits content owned by creators
    Editor,
    /// Read-only access
    Viewer,
}

impl Role {
    /// All known roles
    pub const ALL: [Role; 4] = [Role::Admin, Role::Creator, Role::Editor, Role::Viewer];

    /// Role name as carried in tokens
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Creator => "creator",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Viewer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role: {0}")]
pub struct InvalidRole(pub String);

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "creator" => Ok(Self::Creator),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(InvalidRole(other.to_string())),
        }
    }
}

/// Public view of a user, as returned by login and `/auth/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User ID
    pub id: String,
    /// Email address
    pub email: String,
    /// Role names
    #[serde(default)]
    pub roles: BTreeSet<String>,
}
