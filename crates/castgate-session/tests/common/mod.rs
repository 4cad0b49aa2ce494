//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use castgate_session::{
    ApiClientError, AuthApi, MemoryTokenStore, SessionClient, SessionConfig, Transport,
    TransportError,
};
use castgate_types::{LoginRequest, LoginResponse, TokenPair, UserInfo};
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::{Request, Response, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use tokio::sync::Notify;

pub const APP: &str = "castgate";
pub const EMAIL: &str = "host@example.com";
pub const PASSWORD: &str = "correct horse battery";

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    email: &'a str,
    roles: Vec<&'a str>,
    exp: i64,
    jti: usize,
}

/// Mint an HS256 access token expiring `ttl_secs` from now.
pub fn mint(sub: &str, roles: &[&str], ttl_secs: i64, jti: usize) -> String {
    let claims = Claims {
        sub,
        email: EMAIL,
        roles: roles.to_vec(),
        exp: Utc::now().timestamp() + ttl_secs,
        jti,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"integration-test-secret"),
    )
    .unwrap()
}

// =============================================================================
// Auth API
// =============================================================================

/// Scripted issuing service. Refresh tokens rotate on every use.
pub struct MockAuthApi {
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    /// Seconds until expiry for newly minted access tokens.
    pub access_ttl: AtomicI64,
    pub offline: AtomicBool,
    pub entered: Notify,
    gate: Option<Notify>,
    live_refresh: Mutex<HashSet<String>>,
    issued: AtomicUsize,
}

impl Default for MockAuthApi {
    fn default() -> Self {
        Self {
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            access_ttl: AtomicI64::new(900),
            offline: AtomicBool::new(false),
            entered: Notify::new(),
            gate: None,
            live_refresh: Mutex::new(HashSet::new()),
            issued: AtomicUsize::new(0),
        }
    }
}

impl MockAuthApi {
    /// Refresh calls block until [`MockAuthApi::release`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn set_access_ttl(&self, secs: i64) {
        self.access_ttl.store(secs, Ordering::SeqCst);
    }

    pub fn revoke_all(&self) {
        self.live_refresh.lock().unwrap().clear();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> TokenPair {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let ttl = self.access_ttl.load(Ordering::SeqCst);
        let pair = TokenPair::new(mint("user-1", &["creator"], ttl, n), format!("r{n}"));
        self.live_refresh
            .lock()
            .unwrap()
            .insert(pair.refresh_token.clone());
        pair
    }

    fn unauthorized(message: &str) -> ApiClientError {
        ApiClientError::Rejected {
            status: 401,
            code: Some("UNAUTHORIZED".to_string()),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiClientError::Network("connection refused".to_string()));
        }
        if request.email != EMAIL || request.password != PASSWORD {
            return Err(Self::unauthorized("invalid credentials"));
        }
        let pair = self.issue();
        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserInfo {
                id: "user-1".to_string(),
                email: EMAIL.to_string(),
                roles: BTreeSet::from(["creator".to_string()]),
            },
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiClientError::Network("connection refused".to_string()));
        }
        if !self.live_refresh.lock().unwrap().remove(refresh_token) {
            return Err(Self::unauthorized("refresh token revoked"));
        }
        Ok(self.issue())
    }
}

// =============================================================================
// Transport
// =============================================================================

/// One request as seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct Seen {
    pub authorization: Option<String>,
    pub request_id: Option<String>,
}

/// Resource server stand-in. Answers 401 to rejected tokens and 200 otherwise.
#[derive(Default)]
pub struct MockTransport {
    pub seen: Mutex<Vec<Seen>>,
    pub rejected: Mutex<HashSet<String>>,
    pub reject_all: AtomicBool,
    pub offline: AtomicBool,
}

impl MockTransport {
    pub fn reject(&self, token: &str) {
        self.rejected.lock().unwrap().insert(format!("Bearer {token}"));
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let authorization = header(AUTHORIZATION.as_str());
        self.seen.lock().unwrap().push(Seen {
            authorization: authorization.clone(),
            request_id: header("x-request-id"),
        });

        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError("connection reset".to_string()));
        }

        let rejected = self.reject_all.load(Ordering::SeqCst)
            || authorization
                .as_ref()
                .is_some_and(|a| self.rejected.lock().unwrap().contains(a));
        let status = if rejected {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::OK
        };
        Ok(Response::builder()
            .status(status)
            .body(Bytes::from_static(b"{}"))
            .unwrap())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub client: Arc<SessionClient>,
    pub store: Arc<MemoryTokenStore>,
    pub api: Arc<MockAuthApi>,
    pub transport: Arc<MockTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_api(MockAuthApi::default())
    }

    pub fn with_api(api: MockAuthApi) -> Self {
        let store = Arc::new(MemoryTokenStore::new(APP));
        let api = Arc::new(api);
        let transport = Arc::new(MockTransport::default());
        let config = SessionConfig::new("http://api.test").with_app_name(APP);
        let client = SessionClient::from_parts(
            config,
            store.clone(),
            api.clone(),
            transport.clone(),
        );
        Self {
            client: Arc::new(client),
            store,
            api,
            transport,
        }
    }

    pub async fn logged_in(self) -> Self {
        self.client.login(EMAIL, PASSWORD).await.unwrap();
        self
    }

    pub fn stored(&self) -> Option<TokenPair> {
        use castgate_session::TokenStore;
        self.store.load().unwrap()
    }
}

pub fn get(path: &str) -> Request<Bytes> {
    Request::get(format!("http://api.test{path}"))
        .body(Bytes::new())
        .unwrap()
}
