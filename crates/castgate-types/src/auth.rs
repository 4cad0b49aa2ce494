//! Authentication request and response bodies

use serde::{Deserialize, Serialize};

use crate::{TokenPair, UserInfo};

/// Login request
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Login response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// The authenticated user
    pub user: UserInfo,
}

impl LoginResponse {
    /// The token pair carried by this response
    pub fn token_pair(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.refresh_token.clone())
    }
}

/// Refresh request
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh token issued by the last login or refresh
    pub refresh_token: String,
}

impl std::fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest").finish_non_exhaustive()
    }
}

/// Refresh response. Same shape as [`TokenPair`].
pub type RefreshResponse = TokenPair;

/// Registration request
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
    /// Requested role name (defaults to viewer)
    #[serde(default)]
    pub role: Option<String>,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Partial profile update for the calling user. Absent fields are left as is.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    /// New email address
    #[serde(default)]
    pub email: Option<String>,
    /// New password
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for UpdateProfileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateProfileRequest")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Admin request to change a user's role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRoleRequest {
    /// Role name
    pub role: String,
}

/// Admin request to activate or deactivate an account
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    /// Whether the account may sign in
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_response_wire_format() {
        let body = serde_json::json!({
            "accessToken": "a1",
            "refreshToken": "r1",
            "user": {"id": "u1", "email": "host@example.com", "roles": ["creator"]}
        });
        let resp: LoginResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.token_pair(), TokenPair::new("a1", "r1"));
        assert!(resp.user.roles.contains("creator"));
    }

    #[test]
    fn test_refresh_request_wire_format() {
        let req = RefreshRequest {
            refresh_token: "r1".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"refreshToken": "r1"}));
    }

    #[test]
    fn test_debug_hides_password() {
        let req = LoginRequest {
            email: "host@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        assert!(!format!("{req:?}").contains("hunter2"));
    }

    #[test]
    fn test_profile_update_fields_are_optional() {
        let req: UpdateProfileRequest =
            serde_json::from_value(serde_json::json!({"email": "new@example.com"})).unwrap();
        assert_eq!(req.email.as_deref(), Some("new@example.com"));
        assert!(req.password.is_none());

        let req = UpdateProfileRequest {
            email: None,
            password: Some("hunter2hunter2".to_string()),
        };
        assert!(!format!("{req:?}").contains("hunter2"));
    }
}
