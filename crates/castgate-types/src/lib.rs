//! Castgate Types - Shared session types
//!
//! This crate contains the types shared by the session client, the route guard
//! and the issuing service:
//! - Token pairs and decoded identities
//! - Login, refresh and registration bodies
//! - The error taxonomy and the JSON error envelope

pub mod api;
pub mod auth;
pub mod error;
pub mod session;
pub mod user;

pub use api::*;
pub use auth::*;
pub use error::*;
pub use session::*;
pub use user::*;
