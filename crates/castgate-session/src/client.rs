//! Session client facade.
//!
//! [`SessionClient`] wires the token store, state machine, refresh
//! coordinator and interceptor together. Applications hold one per device.

use std::sync::Arc;

use bytes::Bytes;
use castgate_types::{ErrorKind, Identity, LoginRequest};
use chrono::{DateTime, Utc};
use http::{Request, Response};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::api::{AuthApi, HttpAuthApi};
use crate::config::SessionConfig;
use crate::decode::{decode, is_expired};
use crate::error::{ApiClientError, SessionError};
use crate::interceptor::{InterceptError, Interceptor, ReqwestTransport, Transport};
use crate::metrics::record_login;
use crate::refresh::{RefreshCoordinator, RefreshError};
use crate::state::{SessionEvent, SessionState, SessionStateMachine};
use crate::store::{FileTokenStore, MemoryTokenStore, TokenStore};

/// Client-side session for one device.
pub struct SessionClient {
    config: SessionConfig,
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    state: Arc<SessionStateMachine>,
    coordinator: RefreshCoordinator,
    interceptor: Interceptor,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("config", &self.config)
            .field("phase", &self.state.snapshot().phase())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Build a client that talks HTTP to `config.base_url`.
    ///
    /// Tokens go to `config.token_path` when set, otherwise they stay in memory.
    pub fn connect(config: SessionConfig) -> Result<Self, SessionError> {
        let store: Arc<dyn TokenStore> = match &config.token_path {
            Some(path) => Arc::new(FileTokenStore::new(&config.app_name, path)),
            None => Arc::new(MemoryTokenStore::new(&config.app_name)),
        };
        let api = Arc::new(HttpAuthApi::new(&config)?);
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiClientError::from)?;
        let transport = Arc::new(ReqwestTransport::new(http));

        Ok(Self::from_parts(config, store, api, transport))
    }

    /// Build a client from explicit components.
    pub fn from_parts(
        config: SessionConfig,
        store: Arc<dyn TokenStore>,
        api: Arc<dyn AuthApi>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let state = Arc::new(SessionStateMachine::new());
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            api.clone(),
            state.clone(),
            config.refresh_timeout,
        );
        let interceptor = Interceptor::new(store.clone(), coordinator.clone(), transport);

        Self {
            config,
            store,
            api,
            state,
            coordinator,
            interceptor,
        }
    }

    /// Re-read the token store and rebuild the session from it.
    ///
    /// Call on startup and whenever the store may have changed externally.
    /// An unreachable store counts as no session.
    pub fn restore(&self) -> SessionState {
        match self.store.load() {
            Ok(None) => self.state.dispatch(SessionEvent::TokensChanged(None)),
            Ok(Some(pair)) => match decode(&pair.access_token) {
                Ok(identity) => self.state.dispatch(SessionEvent::TokensChanged(Some(identity))),
                Err(e) => {
                    warn!(error = %e, "Stored access token does not decode, dropping session");
                    if let Err(e) = self.coordinator.end_session(SessionEvent::TokensChanged(None)) {
                        warn!(error = %e, "Failed to clear token store");
                    }
                    self.state
                        .dispatch(SessionEvent::OperationFailed(ErrorKind::MalformedToken))
                }
            },
            Err(e) => {
                warn!(error = %e, "Token store unavailable, treating as signed out");
                self.state.dispatch(SessionEvent::TokensChanged(None));
                self.state
                    .dispatch(SessionEvent::OperationFailed(ErrorKind::StorageUnavailable))
            }
        }
    }

    /// Log in with email and password.
    #[instrument(skip_all, level = "debug")]
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        self.state.dispatch(SessionEvent::LoginStarted);

        let result = self.try_login(email, password).await;
        record_login(result.is_ok());

        match &result {
            Ok(identity) => info!(subject_id = %identity.subject_id, "Logged in"),
            Err(err) => {
                warn!(error = %err, "Login failed");
                self.state.dispatch(SessionEvent::LoginFailed(err.kind()));
            }
        }
        result
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&request).await?;

        let pair = response.token_pair();
        if !pair.is_complete() {
            return Err(ApiClientError::InvalidResponse("incomplete token pair".to_string()).into());
        }
        let identity = decode(&pair.access_token)?;
        self.coordinator.begin_session(&pair, identity.clone())?;
        Ok(identity)
    }

    /// End the session. Calling it again is harmless.
    ///
    /// The session is anonymous afterwards even if clearing the store failed.
    pub fn logout(&self) -> Result<(), SessionError> {
        self.coordinator.end_session(SessionEvent::LoggedOut)?;
        info!("Logged out");
        Ok(())
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.snapshot()
    }

    /// Watch session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// True iff a pair is stored and its access token is unexpired now.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    /// True iff a pair is stored and its access token is unexpired at `now`.
    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        match self.store.load() {
            Ok(Some(pair)) => decode(&pair.access_token).is_ok_and(|id| !is_expired(&id, now)),
            _ => false,
        }
    }

    /// Fresh identity, refreshing if the stored token is expired.
    pub async fn ensure_fresh(&self) -> Result<Identity, RefreshError> {
        self.coordinator.ensure_fresh().await
    }

    /// Send a request with the session attached.
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, InterceptError> {
        self.interceptor.execute(request).await
    }

    /// The refresh coordinator.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
