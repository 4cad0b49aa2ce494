//! Axum extractors for authentication and authorization.
//!
//! These read the [`AuthContext`] that [`GuardLayer`](crate::GuardLayer)
//! attaches to allowed requests.
//!
//! # Usage
//!
//! ```ignore
//! use castgate_axum::{MaybeAuth, RequireAdmin, RequireAuth};
//!
//! // 401 if the guard did not attach an identity
//! async fn dashboard(auth: RequireAuth) -> String {
//!     format!("Hello, {}!", auth.subject_id)
//! }
//!
//! // 403 unless the caller holds the admin role
//! async fn settings(admin: RequireAdmin) -> &'static str {
//!     "Settings"
//! }
//!
//! // Optional authentication on a public route
//! async fn landing(auth: MaybeAuth) -> String {
//!     match auth.0 {
//!         Some(ctx) => format!("Welcome back, {}!", ctx.email),
//!         None => "Welcome!".to_string(),
//!     }
//! }
//! ```

use std::ops::Deref;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use castgate_types::Role;

use crate::context::AuthContext;
use crate::error::GuardError;

/// Extractor that requires authentication.
///
/// Returns 401 with an `UNAUTHORIZED` envelope if no identity is attached.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = GuardError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(Self)
            .ok_or(GuardError::Unauthenticated)
    }
}

/// Extractor for optional authentication.
#[derive(Debug, Clone)]
pub struct MaybeAuth(pub Option<AuthContext>);

impl Deref for MaybeAuth {
    type Target = Option<AuthContext>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AuthContext>().cloned()))
    }
}

/// Role checks for handlers that need something other than admin.
///
/// ```ignore
/// async fn publish(auth: RequireAuth) -> Result<&'static str, GuardError> {
///     RequireRole::check(&auth, "creator")?;
///     Ok("Published")
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireRole;

impl RequireRole {
    /// Ok if `ctx` holds `role`, otherwise 403.
    pub fn check(ctx: &AuthContext, role: &str) -> Result<(), GuardError> {
        if ctx.has_role(role) {
            Ok(())
        } else {
            Err(GuardError::InsufficientRole(role.to_string()))
        }
    }
}

/// Extractor that requires the admin role.
///
/// Returns 401 if not authenticated and 403 if not an admin.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthContext);

impl Deref for RequireAdmin {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = GuardError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(ctx) = RequireAuth::from_request_parts(parts, state).await?;
        RequireRole::check(&ctx, Role::Admin.as_str())?;
        Ok(Self(ctx))
    }
}
