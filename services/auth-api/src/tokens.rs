//! Token issuing and refresh rotation.
//!
//! Access tokens are HS256 JWTs carrying `sub`, `email`, `roles`, `iat`,
//! `exp` and `jti`. Refresh tokens are opaque; only their SHA-256
//! fingerprints are kept. Each refresh token is single use. Every pair
//! belongs to a family started at login, and presenting an already used
//! refresh token revokes the whole family.
//!
//! [`AccessTokenVerifier`] checks signatures for the route guard.

use std::time::Duration;

use castgate_axum::{GuardError, TokenVerifier};
use castgate_types::{Identity, TokenPair};
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::users::UserRecord;

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Token issuing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("refresh token not recognized")]
    Unknown,

    #[error("refresh token expired")]
    Expired,

    #[error("refresh token already used")]
    Reused,

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone)]
struct RefreshRecord {
    user_id: String,
    family: Uuid,
    expires_at: DateTime<Utc>,
    used: bool,
}

/// Issues token pairs and tracks refresh tokens.
pub struct TokenIssuer {
    key: EncodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    refresh_tokens: DashMap<String, RefreshRecord>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("refresh_tokens", &self.refresh_tokens.len())
            .finish_non_exhaustive()
    }
}

fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, TokenError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| TokenError::Encoding(format!("token lifetime out of range: {ttl:?}")))
}

impl TokenIssuer {
    /// Create an issuer signing with `secret`.
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
            refresh_tokens: DashMap::new(),
        }
    }

    /// Issue a pair for a fresh login.
    pub fn issue(&self, user: &UserRecord) -> Result<TokenPair, TokenError> {
        self.issue_in_family(user, Uuid::new_v4())
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// `find_user` resolves the token's subject; a subject that no longer
    /// exists invalidates the token.
    pub fn rotate(
        &self,
        refresh_token: &str,
        find_user: impl Fn(&str) -> Option<UserRecord>,
    ) -> Result<TokenPair, TokenError> {
        let key = fingerprint(refresh_token);

        let record = {
            let Some(mut entry) = self.refresh_tokens.get_mut(&key) else {
                return Err(TokenError::Unknown);
            };
            let record = entry.clone();
            entry.used = true;
            record
        };

        if record.used {
            warn!(family = %record.family, "Refresh token reuse detected, revoking family");
            self.revoke_family(record.family);
            return Err(TokenError::Reused);
        }
        if record.expires_at <= Utc::now() {
            self.refresh_tokens.remove(&key);
            return Err(TokenError::Expired);
        }

        let Some(user) = find_user(&record.user_id) else {
            self.revoke_family(record.family);
            return Err(TokenError::Unknown);
        };
        self.issue_in_family(&user, record.family)
    }

    /// Revoke every refresh token of a family.
    pub fn revoke_family(&self, family: Uuid) {
        self.refresh_tokens.retain(|_, record| record.family != family);
    }

    /// Revoke every refresh token held by a user.
    pub fn revoke_user(&self, user_id: &str) -> usize {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, record| record.user_id != user_id);
        before.saturating_sub(self.refresh_tokens.len())
    }

    /// Drop refresh tokens past their expiry.
    pub fn purge_expired(&self) -> usize {
        let before = self.refresh_tokens.len();
        let now = Utc::now();
        self.refresh_tokens.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.refresh_tokens.len())
    }

    fn issue_in_family(&self, user: &UserRecord, family: Uuid) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let access_expires_at = expiry(now, self.access_ttl)?;
        let refresh_expires_at = expiry(now, self.refresh_ttl)?;
        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            roles: user.roles.iter().cloned().collect(),
            iat: now.timestamp(),
            exp: access_expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let access_token = encode(&Header::default(), &claims, &self.key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        let refresh_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.refresh_tokens.insert(
            fingerprint(&refresh_token),
            RefreshRecord {
                user_id: user.id.clone(),
                family,
                expires_at: refresh_expires_at,
                used: false,
            },
        );

        debug!(subject_id = %user.id, family = %family, "Issued token pair");
        Ok(TokenPair::new(access_token, refresh_token))
    }
}

/// Verifies access tokens signed by this service.
#[derive(Clone)]
pub struct AccessTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for AccessTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenVerifier").finish_non_exhaustive()
    }
}

impl AccessTokenVerifier {
    /// Create a verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenVerifier for AccessTokenVerifier {
    fn verify(&self, token: &str) -> Result<Identity, GuardError> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Token validation failed: {}", e);
            match e.kind() {
                JwtErrorKind::ExpiredSignature => GuardError::TokenExpired,
                _ => GuardError::MalformedToken,
            }
        })?;

        let claims = data.claims;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(GuardError::MalformedToken)?;
        Ok(Identity {
            subject_id: claims.sub,
            email: claims.email,
            roles: claims.roles.into_iter().collect(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn user() -> UserRecord {
        UserRecord::for_tests("user-1", "host@example.com", &["creator"])
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn issuer(refresh_ttl: Duration) -> TokenIssuer {
        TokenIssuer::new(
            SECRET,
            Duration::from_secs(900),
            refresh_ttl,
        )
    }

    #[test]
    fn test_access_token_carries_identity() {
        let issuer = issuer(Duration::from_secs(3600));
        let pair = issuer.issue(&user()).unwrap();

        let identity = castgate_session::decode(&pair.access_token).unwrap();
        assert_eq!(identity.subject_id, "user-1");
        assert_eq!(identity.email, "host@example.com");
        assert_eq!(identity.roles, BTreeSet::from(["creator".to_string()]));
        assert!(!identity.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_rotation_is_single_use() {
        let issuer = issuer(Duration::from_secs(3600));
        let first = issuer.issue(&user()).unwrap();

        let second = issuer.rotate(&first.refresh_token, |_| Some(user())).unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        assert_eq!(
            issuer.rotate(&first.refresh_token, |_| Some(user())),
            Err(TokenError::Reused)
        );
        // Reuse revoked the family, including the newest token.
        assert_eq!(
            issuer.rotate(&second.refresh_token, |_| Some(user())),
            Err(TokenError::Unknown)
        );
    }

    #[test]
    fn test_unknown_token() {
        let issuer = issuer(Duration::from_secs(3600));
        assert_eq!(issuer.rotate("nope", |_| Some(user())), Err(TokenError::Unknown));
    }

    #[test]
    fn test_expired_refresh_token() {
        let issuer = issuer(Duration::ZERO);
        let pair = issuer.issue(&user()).unwrap();
        assert_eq!(
            issuer.rotate(&pair.refresh_token, |_| Some(user())),
            Err(TokenError::Expired)
        );
        assert_eq!(issuer.purge_expired(), 0);
    }

    #[test]
    fn test_deleted_user_invalidates_token() {
        let issuer = issuer(Duration::from_secs(3600));
        let pair = issuer.issue(&user()).unwrap();
        assert_eq!(issuer.rotate(&pair.refresh_token, |_| None), Err(TokenError::Unknown));
    }

    #[test]
    fn test_families_are_independent() {
        let issuer = issuer(Duration::from_secs(3600));
        let laptop = issuer.issue(&user()).unwrap();
        let phone = issuer.issue(&user()).unwrap();

        issuer.rotate(&laptop.refresh_token, |_| Some(user())).unwrap();
        let _ = issuer.rotate(&laptop.refresh_token, |_| Some(user()));

        assert!(issuer.rotate(&phone.refresh_token, |_| Some(user())).is_ok());
    }

    #[test]
    fn test_oversized_lifetime_is_an_error() {
        let issuer = issuer(Duration::from_secs(u64::MAX));
        assert!(matches!(issuer.issue(&user()), Err(TokenError::Encoding(_))));
        assert!(issuer.refresh_tokens.is_empty());
    }

    #[test]
    fn test_revoke_user() {
        let issuer = issuer(Duration::from_secs(3600));
        let pair = issuer.issue(&user()).unwrap();
        issuer.issue(&user()).unwrap();

        assert_eq!(issuer.revoke_user("user-1"), 2);
        assert_eq!(
            issuer.rotate(&pair.refresh_token, |_| Some(user())),
            Err(TokenError::Unknown)
        );
    }

    #[test]
    fn test_verifier_accepts_own_tokens() {
        let issuer = issuer(Duration::from_secs(3600));
        let pair = issuer.issue(&user()).unwrap();

        let identity = AccessTokenVerifier::new(SECRET).verify(&pair.access_token).unwrap();
        assert_eq!(identity.subject_id, "user-1");
        assert!(identity.has_role("creator"));
    }

    #[test]
    fn test_verifier_rejects_foreign_and_unsigned_tokens() {
        let other = TokenIssuer::new(
            "another-secret-0123456789abcdef01",
            Duration::from_secs(900),
            Duration::from_secs(3600),
        );
        let foreign = other.issue(&user()).unwrap().access_token;
        let verifier = AccessTokenVerifier::new(SECRET);
        assert_eq!(verifier.verify(&foreign), Err(GuardError::MalformedToken));

        // {"alg":"none"} . {"sub":"attacker","roles":["admin"],"exp":4102444800}
        let unsigned = "eyJhbGciOiJub25lIn0.\
            eyJzdWIiOiJhdHRhY2tlciIsInJvbGVzIjpbImFkbWluIl0sImV4cCI6NDEwMjQ0NDgwMH0.\
            not-a-signature";
        assert_eq!(verifier.verify(unsigned), Err(GuardError::MalformedToken));
    }

    #[test]
    fn test_verifier_reports_expiry() {
        let claims = AccessClaims {
            sub: "user-1".to_string(),
            email: "host@example.com".to_string(),
            roles: vec!["creator".to_string()],
            iat: 0,
            exp: Utc::now().timestamp() - 60,
            jti: "j".to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(
            AccessTokenVerifier::new(SECRET).verify(&token),
            Err(GuardError::TokenExpired)
        );
    }

    #[test]
    fn test_only_fingerprints_are_stored() {
        let issuer = issuer(Duration::from_secs(3600));
        let pair = issuer.issue(&user()).unwrap();
        assert!(!issuer.refresh_tokens.contains_key(&pair.refresh_token));
        assert!(issuer.refresh_tokens.contains_key(&fingerprint(&pair.refresh_token)));
    }
}
