//! Application state

use std::sync::Arc;

use crate::config::Config;
use crate::tokens::TokenIssuer;
use crate::users::UserStore;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Registered users
    pub users: Arc<UserStore>,
    /// Token issuing and refresh rotation
    pub tokens: Arc<TokenIssuer>,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Self {
        let tokens = TokenIssuer::new(
            &config.token_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        );
        Self {
            users: Arc::new(UserStore::new()),
            tokens: Arc::new(tokens),
            config: Arc::new(config),
        }
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}
