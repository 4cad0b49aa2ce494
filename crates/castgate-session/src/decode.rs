//! Identity decoding.
//!
//! Access tokens are JWT-shaped: `header.payload.signature`, each segment
//! base64url without padding. Only the payload is read and the signature is
//! not checked. The decoded identity drives local decisions such as what to
//! show and when to refresh. Anything that grants access on the strength of a
//! token must verify it with the signing key (see the guard's verifier hook).

use std::collections::BTreeSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use castgate_types::{ErrorKind, Identity};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Token decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The token is not a structurally valid access token.
    #[error("malformed token: {0}")]
    Malformed(&'static str),
}

impl DecodeError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedToken
    }
}

/// Claims as they appear in the payload. Everything is optional so that a
/// missing claim is reported by [`decode`] rather than by serde.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    email: Option<String>,
    roles: Option<Vec<String>>,
    role: Option<String>,
    exp: Option<i64>,
}

/// Decode the identity carried by an access token.
///
/// Total over all inputs: returns the identity or [`DecodeError::Malformed`].
pub fn decode(token: &str) -> Result<Identity, DecodeError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(DecodeError::Malformed("expected three segments"));
    };

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(DecodeError::Malformed("empty segment"));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| DecodeError::Malformed("payload is not base64url"))?;

    let claims: RawClaims = serde_json::from_slice(&bytes)
        .map_err(|_| DecodeError::Malformed("payload is not a claims object"))?;

    let subject_id = claims
        .sub
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::Malformed("missing subject"))?;

    let exp = claims.exp.ok_or(DecodeError::Malformed("missing expiry"))?;
    let expires_at = Utc
        .timestamp_opt(exp, 0)
        .single()
        .ok_or(DecodeError::Malformed("expiry out of range"))?;

    let mut roles: BTreeSet<String> = claims.roles.unwrap_or_default().into_iter().collect();
    if let Some(role) = claims.role {
        roles.insert(role);
    }
    roles.retain(|r| !r.is_empty());

    Ok(Identity {
        subject_id,
        email: claims.email.unwrap_or_default(),
        roles,
        expires_at,
    })
}

/// `now >= identity.expires_at`
#[must_use]
pub fn is_expired(identity: &Identity, now: DateTime<Utc>) -> bool {
    identity.is_expired_at(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_with(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    #[test]
    fn test_decode_full_claims() {
        let exp = Utc::now().timestamp() + 600;
        let token = token_with(serde_json::json!({
            "sub": "user-42",
            "email": "host@example.com",
            "roles": ["creator", "editor"],
            "exp": exp,
        }));

        let identity = decode(&token).unwrap();
        assert_eq!(identity.subject_id, "user-42");
        assert_eq!(identity.email, "host@example.com");
        assert_eq!(identity.roles_header(), "creator,editor");
        assert_eq!(identity.expires_at.timestamp(), exp);
    }

    #[test]
    fn test_single_role_claim() {
        let token = token_with(serde_json::json!({"sub": "u", "role": "admin", "exp": 1}));
        let identity = decode(&token).unwrap();
        assert!(identity.has_role("admin"));
        assert_eq!(identity.email, "");
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let body = base64::engine::general_purpose::URL_SAFE
            .encode(serde_json::json!({"sub": "u", "exp": 10}).to_string());
        let token = format!("{header}.{body}.sig");
        assert!(decode(&token).is_ok());
    }

    #[test]
    fn test_missing_subject() {
        let token = token_with(serde_json::json!({"exp": 10}));
        assert_eq!(
            decode(&token).unwrap_err(),
            DecodeError::Malformed("missing subject")
        );
    }

    #[test]
    fn test_missing_expiry() {
        let token = token_with(serde_json::json!({"sub": "u"}));
        assert_eq!(
            decode(&token).unwrap_err(),
            DecodeError::Malformed("missing expiry")
        );
    }

    #[test]
    fn test_wrong_claim_types() {
        let token = token_with(serde_json::json!({"sub": "u", "exp": "tomorrow"}));
        assert!(decode(&token).is_err());

        let token = token_with(serde_json::json!({"sub": "u", "exp": 1, "roles": [1, 2]}));
        assert!(decode(&token).is_err());
    }

    #[test]
    fn test_structural_failures() {
        for token in ["", ".", "..", "a.b", "a.b.c.d", "a..c", "!!.??.##"] {
            let err = decode(token).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedToken, "token {token:?}");
        }
    }

    #[test]
    fn test_is_expired_boundary() {
        let now = Utc::now();
        let token = token_with(serde_json::json!({"sub": "u", "exp": now.timestamp()}));
        let identity = decode(&token).unwrap();

        assert!(is_expired(&identity, identity.expires_at));
        assert!(!is_expired(&identity, identity.expires_at - Duration::seconds(1)));
    }
}
