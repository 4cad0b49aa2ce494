//! Outbound request interceptor.
//!
//! Wraps a [`Transport`] and attaches the session to every call:
//! - `Authorization: Bearer <access token>` when a token is stored
//! - `X-Request-ID: <uuid>`, one per call, reused by the retry
//!
//! A 401 is recovered at most once through the refresh coordinator. Transport
//! failures are returned as-is; retrying them is the caller's decision.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use castgate_types::ErrorKind;
use chrono::Utc;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::decode::{decode, is_expired};
use crate::metrics::record_request;
use crate::refresh::{RefreshCoordinator, RefreshError};
use crate::state::SessionEvent;
use crate::store::TokenStore;

/// Correlation header attached to every outbound call.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Failure to get any response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Sends a request and returns the full response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an existing client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let request = reqwest::Request::try_from(request.map(reqwest::Body::from))
            .map_err(|e| TransportError(e.to_string()))?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response.headers().clone());
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        builder.body(body).map_err(|e| TransportError(e.to_string()))
    }
}

/// Errors surfaced by [`Interceptor::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterceptError {
    /// The server rejected the call and one refresh did not fix it.
    #[error("unauthorized")]
    Unauthorized,

    /// No response reached the client.
    #[error("network error: {0}")]
    Network(String),

    /// The token store could not be reached.
    #[error("token storage unavailable: {0}")]
    Storage(String),

    /// The request could not be built (e.g. a token that is not a valid header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl InterceptError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized | Self::InvalidRequest(_) => ErrorKind::Unauthorized,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Storage(_) => ErrorKind::StorageUnavailable,
        }
    }

    fn from_refresh(err: RefreshError) -> Self {
        match err.kind() {
            ErrorKind::StorageUnavailable => Self::Storage(err.to_string()),
            _ => Self::Unauthorized,
        }
    }
}

/// The parts of a request needed to send it again.
struct Template {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl Template {
    fn new(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }

    fn build(&self, token: Option<&str>, request_id: &HeaderValue) -> Result<Request<Bytes>, InterceptError> {
        let mut request = Request::new(self.body.clone());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();

        let headers = request.headers_mut();
        headers.insert(REQUEST_ID_HEADER.clone(), request_id.clone());
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| InterceptError::InvalidRequest("token is not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Attaches session credentials to outbound calls.
#[derive(Clone)]
pub struct Interceptor {
    store: Arc<dyn TokenStore>,
    coordinator: RefreshCoordinator,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    /// Create an interceptor.
    pub fn new(
        store: Arc<dyn TokenStore>,
        coordinator: RefreshCoordinator,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            coordinator,
            transport,
        }
    }

    /// Send `request` with the current session attached.
    #[instrument(skip_all, fields(method = %request.method(), uri = %request.uri(), request_id = tracing::field::Empty), level = "debug")]
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, InterceptError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());
        let request_id = HeaderValue::from_str(&request_id)
            .map_err(|e| InterceptError::InvalidRequest(e.to_string()))?;

        let template = Template::new(request);
        let (token, refreshed) = self.prepare_token().await.inspect_err(|e| {
            record_request(result_label(e));
        })?;

        let response = self.send(&template, token.as_deref(), &request_id).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            record_request("ok");
            return Ok(response);
        }

        // Anonymous calls and calls already sent with a fresh token get no second chance.
        let Some(rejected) = token.filter(|_| !refreshed) else {
            debug!("Unauthorized response without a recoverable token");
            if refreshed {
                self.force_anonymous();
            }
            record_request("unauthorized");
            return Err(InterceptError::Unauthorized);
        };

        debug!("Unauthorized response, refreshing once");
        if let Err(err) = self.coordinator.refresh_after_rejection(&rejected).await {
            let err = InterceptError::from_refresh(err);
            record_request(result_label(&err));
            return Err(err);
        }

        let token = self.stored_access_token()?;
        let retried = self.send(&template, token.as_deref(), &request_id).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!("Retried call rejected again, ending session");
            self.force_anonymous();
            record_request("unauthorized");
            return Err(InterceptError::Unauthorized);
        }

        record_request("retried");
        Ok(retried)
    }

    /// Stored access token, refreshed first when it is locally expired.
    /// The flag is true when this call performed or joined a refresh.
    async fn prepare_token(&self) -> Result<(Option<String>, bool), InterceptError> {
        let Some(token) = self.stored_access_token()? else {
            return Ok((None, false));
        };

        let expired = decode(&token).is_ok_and(|identity| is_expired(&identity, Utc::now()));
        if !expired {
            return Ok((Some(token), false));
        }

        debug!("Access token expired locally, refreshing before send");
        self.coordinator
            .ensure_fresh()
            .await
            .map_err(InterceptError::from_refresh)?;
        Ok((self.stored_access_token()?, true))
    }

    fn stored_access_token(&self) -> Result<Option<String>, InterceptError> {
        self.store
            .load()
            .map(|pair| pair.map(|p| p.access_token))
            .map_err(|e| InterceptError::Storage(e.to_string()))
    }

    async fn send(
        &self,
        template: &Template,
        token: Option<&str>,
        request_id: &HeaderValue,
    ) -> Result<Response<Bytes>, InterceptError> {
        let request = template.build(token, request_id)?;
        self.transport.send(request).await.map_err(|e| {
            record_request("network_error");
            InterceptError::Network(e.0)
        })
    }

    fn force_anonymous(&self) {
        if let Err(e) = self
            .coordinator
            .end_session(SessionEvent::RefreshFailed(ErrorKind::Unauthorized))
        {
            warn!(error = %e, "Failed to clear token store");
        }
    }
}

fn result_label(err: &InterceptError) -> &'static str {
    match err {
        InterceptError::Unauthorized | InterceptError::InvalidRequest(_) => "unauthorized",
        InterceptError::Network(_) => "network_error",
        InterceptError::Storage(_) => "storage_error",
    }
}
