//! HTTP handlers

mod auth;
mod health;
mod pages;
mod users;

pub use auth::{login, me, refresh, register};
pub use health::health;
pub use pages::{dashboard, login_page};
pub use users::{update_profile, update_role, update_status};
