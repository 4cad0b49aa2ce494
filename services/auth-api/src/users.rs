//! In-memory user registry with Argon2 password hashes.
//!
//! Records are keyed by id with a separate email index, so an email change
//! never moves a record. Hashing and verification run on the blocking pool.

use std::collections::BTreeSet;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use castgate_types::{Role, UserInfo};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand_core::OsRng;
use tokio::task;
use uuid::Uuid;

use crate::error::ApiError;

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// A registered user.
#[derive(Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub roles: BTreeSet<String>,
    /// Inactive accounts cannot sign in or refresh.
    pub active: bool,
    password_hash: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl UserRecord {
    /// Public view of this user.
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: &str, email: &str, roles: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            active: true,
            password_hash: String::new(),
        }
    }
}

/// Result of checking a user's credentials.
#[derive(Debug)]
pub enum Authentication {
    /// Credentials match an active account.
    Success(UserRecord),
    /// Credentials match, but the account is deactivated.
    Inactive,
    /// Unknown email or wrong password.
    Rejected,
}

/// Registered users.
#[derive(Debug, Default)]
pub struct UserStore {
    users: DashMap<String, UserRecord>,
    id_by_email: DashMap<String, String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn validated_email(email: &str) -> Result<String, ApiError> {
    let email = normalize_email(email);
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(ApiError::BadRequest("invalid email address".to_string()))
    }
}

fn check_password_len(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

async fn hash_password(password: &str) -> Result<String, ApiError> {
    let password = password.to_string();
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {e}")))?
}

async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    task::spawn_blocking(move || {
        PasswordHash::new(&hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

fn not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("user {id} not found"))
}

impl UserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. The email must be unused.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<UserRecord, ApiError> {
        let email = validated_email(email)?;
        check_password_len(password)?;
        if self.id_by_email.contains_key(&email) {
            return Err(ApiError::Conflict("email already registered".to_string()));
        }

        let user = UserRecord {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            roles: BTreeSet::from([role.as_str().to_string()]),
            active: true,
            password_hash: hash_password(password).await?,
        };

        self.users.insert(user.id.clone(), user.clone());
        let claimed = match self.id_by_email.entry(email) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
                true
            }
        };
        if !claimed {
            self.users.remove(&user.id);
            return Err(ApiError::Conflict("email already registered".to_string()));
        }
        Ok(user)
    }

    /// Check credentials.
    pub async fn authenticate(&self, email: &str, password: &str) -> Authentication {
        let Some(id) = self.id_by_email.get(&normalize_email(email)).map(|id| id.clone()) else {
            return Authentication::Rejected;
        };
        let Some(user) = self.find(&id) else {
            return Authentication::Rejected;
        };
        if !verify_password(password, &user.password_hash).await {
            return Authentication::Rejected;
        }
        if user.active {
            Authentication::Success(user)
        } else {
            Authentication::Inactive
        }
    }

    /// Look up a user by id.
    pub fn find(&self, id: &str) -> Option<UserRecord> {
        self.users.get(id).map(|user| user.clone())
    }

    /// Look up a user by id, skipping deactivated accounts.
    pub fn find_active(&self, id: &str) -> Option<UserRecord> {
        self.find(id).filter(|user| user.active)
    }

    /// Partial profile update. `None` fields are left unchanged.
    pub async fn update_profile(
        &self,
        id: &str,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<UserRecord, ApiError> {
        let current = self.find(id).ok_or_else(|| not_found(id))?;

        let email = email.map(validated_email).transpose()?;
        let password_hash = match password {
            Some(password) => {
                check_password_len(password)?;
                Some(hash_password(password).await?)
            }
            None => None,
        };

        if let Some(email) = email.as_ref().filter(|email| **email != current.email) {
            let claimed = match self.id_by_email.entry(email.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(id.to_string());
                    true
                }
            };
            if !claimed {
                return Err(ApiError::Conflict("email already registered".to_string()));
            }
            self.id_by_email.remove(&current.email);
        }

        let mut user = self.users.get_mut(id).ok_or_else(|| not_found(id))?;
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        Ok(user.clone())
    }

    /// Replace a user's role.
    pub fn set_role(&self, id: &str, role: Role) -> Result<UserRecord, ApiError> {
        let mut user = self.users.get_mut(id).ok_or_else(|| not_found(id))?;
        user.roles = BTreeSet::from([role.as_str().to_string()]);
        Ok(user.clone())
    }

    /// Activate or deactivate an account.
    pub fn set_active(&self, id: &str, active: bool) -> Result<UserRecord, ApiError> {
        let mut user = self.users.get_mut(id).ok_or_else(|| not_found(id))?;
        user.active = active;
        Ok(user.clone())
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no users are registered.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
