//! Single-flight token refresh.
//!
//! At most one refresh runs at a time. The running refresh is held as a
//! shared future; every caller that needs fresh tokens while it runs awaits
//! that same future and sees the same result. The network exchange runs on
//! its own task so a caller dropping its future never cancels it.
//!
//! Every change to the stored pair goes through an epoch lock. Login and
//! logout bump the epoch; a refresh that finishes under a stale epoch drops
//! its result without touching the store or the session state. Its waiters
//! then pick up the session that replaced it, if a login started one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use castgate_types::{ErrorKind, Identity, TokenPair};
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::AuthApi;
use crate::decode::{decode, is_expired, DecodeError};
use crate::error::ApiClientError;
use crate::metrics::{record_refresh, record_refresh_joined, RefreshOutcome};
use crate::state::{SessionEvent, SessionStateMachine};
use crate::store::{StoreError, TokenStore};

/// Refresh failure, delivered to every caller awaiting the flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No token pair is stored.
    #[error("no refresh token stored")]
    NoRefreshToken,

    /// The refresh endpoint rejected the refresh token.
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The refresh endpoint could not be reached.
    #[error("refresh network error: {0}")]
    Network(String),

    /// The exchange exceeded the configured bound.
    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint returned an access token that does not decode.
    #[error("refresh returned an unusable token: {0}")]
    MalformedToken(DecodeError),

    /// The token store could not be read or written.
    #[error("token storage unavailable: {0}")]
    Storage(String),

    /// The session was ended or replaced while the refresh was running.
    #[error("session ended while refreshing")]
    Discarded,

    /// The refresh task stopped before producing a result.
    #[error("refresh task interrupted: {0}")]
    Interrupted(String),
}

impl RefreshError {
    /// Taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Storage(_) => ErrorKind::StorageUnavailable,
            Self::Discarded => ErrorKind::Unauthorized,
            Self::NoRefreshToken
            | Self::Rejected(_)
            | Self::Timeout(_)
            | Self::MalformedToken(_)
            | Self::Interrupted(_) => ErrorKind::RefreshFailed,
        }
    }
}

impl From<ApiClientError> for RefreshError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::Network(message) => Self::Network(message),
            other => Self::Rejected(other.to_string()),
        }
    }
}

impl From<StoreError> for RefreshError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

type Flight = Shared<BoxFuture<'static, Result<Identity, RefreshError>>>;

struct InFlight {
    id: u64,
    epoch: u64,
    future: Flight,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    state: Arc<SessionStateMachine>,
    timeout: Duration,
    epoch: Mutex<u64>,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinates refreshes and every other write to the stored token pair.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("timeout", &self.inner.timeout)
            .field("epoch", &*lock(&self.inner.epoch))
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator. `timeout` bounds each refresh round trip.
    pub fn new(
        store: Arc<dyn TokenStore>,
        api: Arc<dyn AuthApi>,
        state: Arc<SessionStateMachine>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                state,
                timeout,
                epoch: Mutex::new(0),
                in_flight: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Identity of a stored, unexpired access token, refreshing first if needed.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_fresh(&self) -> Result<Identity, RefreshError> {
        if let Some(pair) = self.inner.store.load()? {
            if let Ok(identity) = decode(&pair.access_token) {
                if !is_expired(&identity, Utc::now()) {
                    return Ok(identity);
                }
            }
        }
        self.refresh().await
    }

    /// Recover from a server rejection of `rejected_access_token`.
    ///
    /// If another caller already replaced that token, the replacement is
    /// returned without a network call.
    #[instrument(skip_all, level = "debug")]
    pub async fn refresh_after_rejection(
        &self,
        rejected_access_token: &str,
    ) -> Result<Identity, RefreshError> {
        if let Some(pair) = self.inner.store.load()? {
            if pair.access_token != rejected_access_token {
                if let Ok(identity) = decode(&pair.access_token) {
                    if !is_expired(&identity, Utc::now()) {
                        debug!("Access token already rotated");
                        return Ok(identity);
                    }
                }
            }
        }
        self.refresh().await
    }

    /// Refresh unconditionally, joining the flight in progress if there is one.
    pub async fn refresh(&self) -> Result<Identity, RefreshError> {
        match self.flight().await {
            Err(RefreshError::Discarded) => match self.stored_identity() {
                Some(identity) => {
                    debug!(subject_id = %identity.subject_id, "Refresh superseded by a new session");
                    Ok(identity)
                }
                None => Err(RefreshError::Discarded),
            },
            other => other,
        }
    }

    /// Identity of the stored access token, if it decodes and is unexpired.
    fn stored_identity(&self) -> Option<Identity> {
        let pair = self.inner.store.load().ok().flatten()?;
        decode(&pair.access_token)
            .ok()
            .filter(|identity| !is_expired(identity, Utc::now()))
    }

    /// Whether a refresh for the current session is running.
    pub fn is_refreshing(&self) -> bool {
        let slot = lock(&self.inner.in_flight);
        let epoch = *lock(&self.inner.epoch);
        slot.as_ref().is_some_and(|flight| flight.epoch == epoch)
    }

    /// Store a pair obtained by login and start a new session epoch.
    pub fn begin_session(&self, pair: &TokenPair, identity: Identity) -> Result<(), StoreError> {
        let mut epoch = lock(&self.inner.epoch);
        *epoch += 1;
        self.inner.store.save(pair)?;
        self.inner.state.dispatch(SessionEvent::LoginSucceeded(identity));
        Ok(())
    }

    /// Clear the stored pair and start a new epoch, so any running refresh
    /// is discarded when it completes. `event` records why.
    ///
    /// The state transition happens even when clearing the store fails.
    pub fn end_session(&self, event: SessionEvent) -> Result<(), StoreError> {
        let mut epoch = lock(&self.inner.epoch);
        *epoch += 1;
        let cleared = self.inner.store.clear();
        self.inner.state.dispatch(event);
        cleared
    }

    fn flight(&self) -> Flight {
        let mut slot = lock(&self.inner.in_flight);
        let epoch_guard = lock(&self.inner.epoch);
        let epoch = *epoch_guard;

        if let Some(flight) = slot.as_ref() {
            if flight.epoch == epoch {
                debug!(flight = flight.id, "Joining in-flight refresh");
                record_refresh_joined();
                return flight.future.clone();
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(flight = id, epoch, "Starting refresh");
        self.inner.state.dispatch(SessionEvent::RefreshStarted);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.run(epoch).await;
            inner.finish(id);
            result
        });
        drop(epoch_guard);

        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(RefreshError::Interrupted(e.to_string())))
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            epoch,
            future: future.clone(),
        });
        future
    }
}

impl Inner {
    async fn run(&self, epoch: u64) -> Result<Identity, RefreshError> {
        let started = Instant::now();
        let exchanged = match tokio::time::timeout(self.timeout, self.exchange()).await {
            Ok(exchanged) => exchanged,
            Err(_) => Err(RefreshError::Timeout(self.timeout)),
        };

        let (result, outcome) = self.settle(epoch, exchanged);
        record_refresh(outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn exchange(&self) -> Result<(TokenPair, Identity), RefreshError> {
        let current = self.store.load()?.ok_or(RefreshError::NoRefreshToken)?;
        let next = self.api.refresh(&current.refresh_token).await?;
        if !next.is_complete() {
            return Err(RefreshError::Rejected("incomplete token pair".to_string()));
        }
        let identity = decode(&next.access_token).map_err(RefreshError::MalformedToken)?;
        Ok((next, identity))
    }

    fn settle(
        &self,
        epoch: u64,
        exchanged: Result<(TokenPair, Identity), RefreshError>,
    ) -> (Result<Identity, RefreshError>, RefreshOutcome) {
        let current = lock(&self.epoch);
        if *current != epoch {
            info!("Session changed during refresh, discarding result");
            return (Err(RefreshError::Discarded), RefreshOutcome::Discarded);
        }

        let saved = exchanged.and_then(|(pair, identity)| {
            self.store.save(&pair)?;
            Ok(identity)
        });

        match saved {
            Ok(identity) => {
                info!(subject_id = %identity.subject_id, "Token pair refreshed");
                self.state
                    .dispatch(SessionEvent::RefreshSucceeded(identity.clone()));
                (Ok(identity), RefreshOutcome::Success)
            }
            Err(err) => {
                warn!(error = %err, "Refresh failed, clearing session");
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to clear token store");
                }
                self.state.dispatch(SessionEvent::RefreshFailed(err.kind()));
                (Err(err), RefreshOutcome::Failure)
            }
        }
    }

    fn finish(&self, id: u64) {
        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|flight| flight.id == id) {
            *slot = None;
        }
    }
}
