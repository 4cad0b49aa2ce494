//! Authentication context types.
//!
//! The guard builds an [`AuthContext`] from the decoded access token and
//! stores it in the request extensions for handlers and extractors.

use std::collections::BTreeSet;

use castgate_types::{Identity, Role};
use chrono::{DateTime, Utc};

/// Where the guard found the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// `Authorization: Bearer` header.
    BearerToken,
    /// `<app>_access_token` cookie.
    Cookie,
}

/// Identity of the caller of a guarded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Subject id from the token.
    pub subject_id: String,
    /// Email address from the token, possibly empty.
    pub email: String,
    /// Role names from the token.
    pub roles: BTreeSet<String>,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Where the token came from.
    pub source: AuthSource,
}

impl AuthContext {
    /// Build a context from a decoded identity.
    #[must_use]
    pub fn from_identity(identity: Identity, source: AuthSource) -> Self {
        Self {
            subject_id: identity.subject_id,
            email: identity.email,
            roles: identity.roles,
            expires_at: identity.expires_at,
            source,
        }
    }

    /// Check if the caller holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Check if the caller is an admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin.as_str())
    }

    /// Roles as sent in `X-User-Roles`: sorted and comma-joined.
    #[must_use]
    pub fn roles_header(&self) -> String {
        self.roles.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(roles: &[&str]) -> Identity {
        Identity {
            subject_id: "user-1".to_string(),
            email: "host@example.com".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_context_from_identity() {
        let ctx = AuthContext::from_identity(identity(&["viewer", "creator"]), AuthSource::Cookie);

        assert_eq!(ctx.subject_id, "user-1");
        assert_eq!(ctx.source, AuthSource::Cookie);
        assert!(ctx.has_role("creator"));
        assert!(!ctx.is_admin());
        assert_eq!(ctx.roles_header(), "creator,viewer");
    }

    #[test]
    fn test_admin_role() {
        let ctx = AuthContext::from_identity(identity(&["admin"]), AuthSource::BearerToken);
        assert!(ctx.is_admin());
    }
}
