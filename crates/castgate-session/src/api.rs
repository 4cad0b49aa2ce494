//! Auth API client.
//!
//! [`AuthApi`] is the seam between the session machinery and the issuing
//! service. [`HttpAuthApi`] talks JSON over HTTP; tests substitute scripted
//! implementations.

use async_trait::async_trait;
use castgate_types::{ErrorEnvelope, LoginRequest, LoginResponse, RefreshRequest, TokenPair};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use crate::config::SessionConfig;
use crate::error::ApiClientError;

/// Login and refresh endpoints of the issuing service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiClientError>;

    /// `POST /auth/refresh`
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiClientError>;
}

/// JSON-over-HTTP implementation of [`AuthApi`].
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Build a client with the configured request timeout.
    pub fn new(config: &SessionConfig) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, &config.base_url))
    }

    /// Use an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiClientError::InvalidResponse(e.to_string()));
        }

        let body = response.bytes().await.unwrap_or_default();
        let envelope = serde_json::from_slice::<ErrorEnvelope>(&body).ok();
        Err(ApiClientError::rejected(status.as_u16(), envelope))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip_all, level = "debug")]
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiClientError> {
        self.post("/auth/login", request).await
    }

    #[instrument(skip_all, level = "debug")]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiClientError> {
        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post("/auth/refresh", &request).await
    }
}
