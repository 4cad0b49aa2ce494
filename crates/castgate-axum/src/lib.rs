//! Castgate Axum Integration
//!
//! Route guard, extractors and response hardening for Axum services that
//! accept castgate access tokens.
//!
//! # Quick Start
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use castgate_axum::{security_headers, GuardConfig, GuardLayer, RequireAuth};
//!
//! async fn dashboard(auth: RequireAuth) -> String {
//!     format!("Hello, {}!", auth.subject_id)
//! }
//!
//! let app = Router::new()
//!     .route("/dashboard", get(dashboard))
//!     .route("/login", get(login_page))
//!     .layer(GuardLayer::with_config(GuardConfig::new().app_name("studio")))
//!     .layer(security_headers());
//! ```
//!
//! # Extractors
//!
//! - [`RequireAuth`] - Requires an identity (401 if missing)
//! - [`MaybeAuth`] - Optional identity (None if missing)
//! - [`RequireAdmin`] - Requires the admin role (403 if missing)
//! - [`RequireRole`] - Role check for use inside handlers

pub mod context;
pub mod error;
pub mod extractors;
pub mod guard;
pub mod security;

pub use context::{AuthContext, AuthSource};
pub use error::GuardError;
pub use extractors::{MaybeAuth, RequireAdmin, RequireAuth, RequireRole};
pub use guard::{
    GuardConfig, GuardLayer, GuardService, TokenVerifier, USER_ID_HEADER, USER_ROLES_HEADER,
};
pub use security::{security_headers, SecurityHeadersLayer};
