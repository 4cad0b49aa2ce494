//! Configuration for the Auth API service.

use std::time::Duration;

/// Minimum length of the token signing secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime (ten years).
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Account created at startup with the admin role.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Auth API configuration
#[derive(Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,

    /// Application name, used for the access token cookie
    pub app_name: String,

    /// HS256 signing secret for access tokens
    pub token_secret: String,

    /// Access token lifetime
    pub access_token_ttl: Duration,

    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,

    /// Request timeout
    pub request_timeout: Duration,

    /// Metrics enabled
    pub metrics_enabled: bool,

    /// Admin account seeded at startup, if configured
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("app_name", &self.app_name)
            .field("token_secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("request_timeout", &self.request_timeout)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parsed = |key: &'static str, default: &str| -> Result<u64, ConfigError> {
            lookup(key)
                .unwrap_or_else(|| default.to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid(key))
        };

        // Server port
        let http_port = lookup("HTTP_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("HTTP_PORT"))?;

        let app_name = lookup("APP_NAME").unwrap_or_else(|| "castgate".to_string());
        if app_name.is_empty() {
            return Err(ConfigError::Invalid("APP_NAME"));
        }

        // Signing secret (minimum 32 bytes)
        let token_secret = lookup("TOKEN_SECRET").ok_or(ConfigError::Missing("TOKEN_SECRET"))?;
        if token_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(
                "TOKEN_SECRET must be at least 32 characters",
            ));
        }

        // Token lifetimes (15 minutes and 14 days)
        let access_ttl_secs = parsed("ACCESS_TOKEN_TTL_SECS", "900")?;
        let refresh_ttl_secs = parsed("REFRESH_TOKEN_TTL_SECS", "1209600")?;
        if access_ttl_secs == 0 || access_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Invalid("ACCESS_TOKEN_TTL_SECS"));
        }
        if refresh_ttl_secs <= access_ttl_secs || refresh_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Invalid("REFRESH_TOKEN_TTL_SECS"));
        }

        // Request timeout (default 30 seconds)
        let request_timeout_secs = parsed("REQUEST_TIMEOUT_SECS", "30")?;

        // Metrics
        let metrics_enabled = lookup("METRICS_ENABLED")
            .unwrap_or_else(|| "true".to_string())
            .parse()
            .unwrap_or(true);

        // Optional admin account, both variables or neither
        let bootstrap_admin = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        Ok(Self {
            http_port,
            app_name,
            token_secret,
            access_token_ttl: Duration::from_secs(access_ttl_secs),
            refresh_token_ttl: Duration::from_secs(refresh_ttl_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            metrics_enabled,
            bootstrap_admin,
        })
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("TOKEN_SECRET", SECRET)])).unwrap();

        assert_eq!(config.http_port, 8080);
        assert_eq!(config.app_name, "castgate");
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(1_209_600));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_secret_required_and_long() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("TOKEN_SECRET"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("TOKEN_SECRET", "short")])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_numbers() {
        let err = Config::from_lookup(lookup(&[("TOKEN_SECRET", SECRET), ("HTTP_PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("HTTP_PORT")));

        let err = Config::from_lookup(lookup(&[
            ("TOKEN_SECRET", SECRET),
            ("ACCESS_TOKEN_TTL_SECS", "3600"),
            ("REFRESH_TOKEN_TTL_SECS", "60"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("REFRESH_TOKEN_TTL_SECS")));
    }

    #[test]
    fn test_token_lifetimes_are_bounded() {
        let err = Config::from_lookup(lookup(&[
            ("TOKEN_SECRET", SECRET),
            ("REFRESH_TOKEN_TTL_SECS", "18446744073709551615"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("REFRESH_TOKEN_TTL_SECS")));

        let err = Config::from_lookup(lookup(&[
            ("TOKEN_SECRET", SECRET),
            ("ACCESS_TOKEN_TTL_SECS", "315360001"),
            ("REFRESH_TOKEN_TTL_SECS", "315360002"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ACCESS_TOKEN_TTL_SECS")));

        let config = Config::from_lookup(lookup(&[
            ("TOKEN_SECRET", SECRET),
            ("REFRESH_TOKEN_TTL_SECS", "315360000"),
        ]))
        .unwrap();
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(MAX_TOKEN_TTL_SECS));
    }

    #[test]
    fn test_bootstrap_admin_needs_both_values() {
        let config = Config::from_lookup(lookup(&[
            ("TOKEN_SECRET", SECRET),
            ("ADMIN_EMAIL", "ops@example.com"),
            ("ADMIN_PASSWORD", "admin password"),
        ]))
        .unwrap();
        let admin = config.bootstrap_admin.unwrap();
        assert_eq!(admin.email, "ops@example.com");
        assert!(!format!("{admin:?}").contains("admin password"));

        let err = Config::from_lookup(lookup(&[
            ("TOKEN_SECRET", SECRET),
            ("ADMIN_EMAIL", "ops@example.com"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ADMIN_PASSWORD")));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config::from_lookup(lookup(&[("TOKEN_SECRET", SECRET)])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("[REDACTED]"));
    }
}
