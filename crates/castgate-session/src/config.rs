//! Session client configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::store::StorageKeys;

/// Default application name used to namespace storage keys.
pub const DEFAULT_APP_NAME: &str = "castgate";

/// Default upper bound on a refresh round trip.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for outbound requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Session client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Application identity, used to namespace storage keys
    pub app_name: String,
    /// Base URL of the auth API (login and refresh live under `/auth`)
    pub base_url: String,
    /// A refresh taking longer than this is treated as failed
    pub refresh_timeout: Duration,
    /// Timeout applied by the HTTP client to each request
    pub request_timeout: Duration,
    /// Token file location. `None` keeps tokens in memory.
    pub token_path: Option<PathBuf>,
}

impl SessionConfig {
    /// Create a configuration with default timeouts and in-memory storage.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            base_url: base_url.into(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            token_path: None,
        }
    }

    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the refresh timeout.
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Persist tokens to a file.
    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Storage key names for this application.
    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys::new(&self.app_name)
    }

    /// Load configuration from environment variables.
    ///
    /// - `CASTGATE_API_URL` (required)
    /// - `CASTGATE_APP_NAME` (default `castgate`)
    /// - `CASTGATE_REFRESH_TIMEOUT_SECS` (default 10)
    /// - `CASTGATE_REQUEST_TIMEOUT_SECS` (default 30)
    /// - `CASTGATE_TOKEN_PATH` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("CASTGATE_API_URL").ok_or(ConfigError::Missing("CASTGATE_API_URL"))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid("CASTGATE_API_URL"));
        }

        let app_name = lookup("CASTGATE_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string());
        if app_name.is_empty() {
            return Err(ConfigError::Invalid("CASTGATE_APP_NAME"));
        }

        let refresh_timeout = secs(&lookup, "CASTGATE_REFRESH_TIMEOUT_SECS", DEFAULT_REFRESH_TIMEOUT)?;
        let request_timeout = secs(&lookup, "CASTGATE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?;

        Ok(Self {
            app_name,
            base_url,
            refresh_timeout,
            request_timeout,
            token_path: lookup("CASTGATE_TOKEN_PATH").map(PathBuf::from),
        })
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::Invalid(key)),
            Ok(secs) => Ok(Duration::from_secs(secs)),
        },
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
