//! Session state machine.
//!
//! State only changes through [`SessionEvent`]s applied by [`reduce`]. The
//! [`SessionStateMachine`] owns the current value and publishes every change
//! on a `watch` channel for the rest of the application.

use castgate_types::{ErrorKind, Identity};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle phase of the client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// No session. Initial state and the state after logout.
    #[default]
    Anonymous,
    /// A login request is in flight.
    Authenticating,
    /// Identity present and unexpired.
    Authenticated,
    /// A refresh is in flight.
    Refreshing,
    /// Identity present but expired; no refresh has started yet.
    Expired,
    /// The last login failed and there is no prior session.
    Error,
}

impl SessionPhase {
    /// Phase name for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
            Self::Expired => "expired",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named transitions. Nothing else can change a [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoginStarted,
    LoginSucceeded(Identity),
    LoginFailed(ErrorKind),
    RefreshStarted,
    RefreshSucceeded(Identity),
    RefreshFailed(ErrorKind),
    LoggedOut,
    /// The token store content changed underneath the session (restore on
    /// startup, external clear).
    TokensChanged(Option<Identity>),
    /// A non-authorization failure to record without changing the session.
    OperationFailed(ErrorKind),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::LoginStarted => "login_started",
            Self::LoginSucceeded(_) => "login_succeeded",
            Self::LoginFailed(_) => "login_failed",
            Self::RefreshStarted => "refresh_started",
            Self::RefreshSucceeded(_) => "refresh_succeeded",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::LoggedOut => "logged_out",
            Self::TokensChanged(_) => "tokens_changed",
            Self::OperationFailed(_) => "operation_failed",
        }
    }
}

/// Snapshot of the client session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    identity: Option<Identity>,
    phase: SessionPhase,
    last_error: Option<ErrorKind>,
}

impl SessionState {
    /// Decoded identity, if a session exists.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Error left by the last failed operation.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Authenticated with an identity still valid at `now`.
    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.phase == SessionPhase::Authenticated
            && self.identity.as_ref().is_some_and(|id| !id.is_expired_at(now))
    }

    /// The application should send the user to the login entry point.
    pub fn requires_login(&self) -> bool {
        matches!(self.phase, SessionPhase::Anonymous | SessionPhase::Error)
    }

    fn with_identity(identity: Identity, now: DateTime<Utc>) -> Self {
        let phase = settled_phase(&identity, now);
        Self {
            identity: Some(identity),
            phase,
            last_error: None,
        }
    }
}

fn settled_phase(identity: &Identity, now: DateTime<Utc>) -> SessionPhase {
    if identity.is_expired_at(now) {
        SessionPhase::Expired
    } else {
        SessionPhase::Authenticated
    }
}

/// Apply an event to a state. Pure.
#[must_use]
pub fn reduce(state: &SessionState, event: SessionEvent, now: DateTime<Utc>) -> SessionState {
    match event {
        SessionEvent::LoginStarted => SessionState {
            identity: state.identity.clone(),
            phase: SessionPhase::Authenticating,
            last_error: None,
        },
        SessionEvent::LoginSucceeded(identity) | SessionEvent::RefreshSucceeded(identity) => {
            SessionState::with_identity(identity, now)
        }
        SessionEvent::LoginFailed(kind) => match &state.identity {
            // A failed re-login leaves the existing session alone.
            Some(identity) => SessionState {
                identity: Some(identity.clone()),
                phase: settled_phase(identity, now),
                last_error: Some(kind),
            },
            None => SessionState {
                identity: None,
                phase: SessionPhase::Error,
                last_error: Some(kind),
            },
        },
        SessionEvent::RefreshStarted => SessionState {
            identity: state.identity.clone(),
            phase: SessionPhase::Refreshing,
            last_error: None,
        },
        SessionEvent::RefreshFailed(kind) => SessionState {
            identity: None,
            phase: SessionPhase::Anonymous,
            last_error: Some(kind),
        },
        SessionEvent::LoggedOut | SessionEvent::TokensChanged(None) => SessionState::default(),
        SessionEvent::TokensChanged(Some(identity)) => SessionState::with_identity(identity, now),
        SessionEvent::OperationFailed(kind) => SessionState {
            last_error: Some(kind),
            ..state.clone()
        },
    }
}

/// Owner of the live session state.
#[derive(Debug)]
pub struct SessionStateMachine {
    tx: watch::Sender<SessionState>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Start in [`SessionPhase::Anonymous`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx }
    }

    /// Apply an event using the current time.
    pub fn dispatch(&self, event: SessionEvent) -> SessionState {
        self.dispatch_at(event, Utc::now())
    }

    /// Apply an event at a given time and publish the result.
    pub fn dispatch_at(&self, event: SessionEvent, now: DateTime<Utc>) -> SessionState {
        let name = event.name();
        let mut next = SessionState::default();
        let mut from = SessionPhase::default();

        self.tx.send_modify(|state| {
            from = state.phase;
            next = reduce(state, event, now);
            *state = next.clone();
        });

        debug!(
            event = name,
            from = %from,
            to = %next.phase,
            last_error = ?next.last_error,
            "Session transition"
        );
        next
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identity(now: DateTime<Utc>, ttl_secs: i64) -> Identity {
        Identity {
            subject_id: "user-1".to_string(),
            email: "host@example.com".to_string(),
            roles: Default::default(),
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    fn authenticated(now: DateTime<Utc>) -> SessionState {
        reduce(
            &SessionState::default(),
            SessionEvent::LoginSucceeded(identity(now, 60)),
            now,
        )
    }

    #[test]
    fn test_initial_state_is_anonymous() {
        let state = SessionState::default();
        assert_eq!(state.phase(), SessionPhase::Anonymous);
        assert!(state.identity().is_none());
        assert!(state.requires_login());
    }

    #[test]
    fn test_login_flow() {
        let now = Utc::now();
        let state = reduce(&SessionState::default(), SessionEvent::LoginStarted, now);
        assert_eq!(state.phase(), SessionPhase::Authenticating);

        let state = reduce(&state, SessionEvent::LoginSucceeded(identity(now, 60)), now);
        assert_eq!(state.phase(), SessionPhase::Authenticated);
        assert!(state.is_authenticated_at(now));
        assert!(!state.is_authenticated_at(now + Duration::seconds(60)));
    }

    #[test]
    fn test_login_failure_without_session() {
        let now = Utc::now();
        let state = reduce(&SessionState::default(), SessionEvent::LoginStarted, now);
        let state = reduce(&state, SessionEvent::LoginFailed(ErrorKind::Unauthorized), now);

        assert_eq!(state.phase(), SessionPhase::Error);
        assert_eq!(state.last_error(), Some(ErrorKind::Unauthorized));
        assert!(state.identity().is_none());
    }

    #[test]
    fn test_login_failure_preserves_existing_session() {
        let now = Utc::now();
        let before = authenticated(now);
        let state = reduce(&before, SessionEvent::LoginStarted, now);
        let state = reduce(&state, SessionEvent::LoginFailed(ErrorKind::NetworkError), now);

        assert_eq!(state.phase(), SessionPhase::Authenticated);
        assert_eq!(state.identity(), before.identity());
        assert_eq!(state.last_error(), Some(ErrorKind::NetworkError));
    }

    #[test]
    fn test_refresh_success_and_failure() {
        let now = Utc::now();
        let state = reduce(&authenticated(now), SessionEvent::RefreshStarted, now);
        assert_eq!(state.phase(), SessionPhase::Refreshing);
        assert!(state.identity().is_some());

        let ok = reduce(&state, SessionEvent::RefreshSucceeded(identity(now, 120)), now);
        assert_eq!(ok.phase(), SessionPhase::Authenticated);

        let failed = reduce(&state, SessionEvent::RefreshFailed(ErrorKind::RefreshFailed), now);
        assert_eq!(failed.phase(), SessionPhase::Anonymous);
        assert!(failed.identity().is_none());
        assert_eq!(failed.last_error(), Some(ErrorKind::RefreshFailed));
    }

    #[test]
    fn test_restored_expired_identity() {
        let now = Utc::now();
        let state = reduce(
            &SessionState::default(),
            SessionEvent::TokensChanged(Some(identity(now, -5))),
            now,
        );
        assert_eq!(state.phase(), SessionPhase::Expired);
        assert!(!state.is_authenticated_at(now));
    }

    #[test]
    fn test_external_clear_and_logout() {
        let now = Utc::now();
        let cleared = reduce(&authenticated(now), SessionEvent::TokensChanged(None), now);
        assert_eq!(cleared, SessionState::default());

        let once = reduce(&authenticated(now), SessionEvent::LoggedOut, now);
        let twice = reduce(&once, SessionEvent::LoggedOut, now);
        assert_eq!(once, twice);
        assert_eq!(twice.phase(), SessionPhase::Anonymous);
    }

    #[test]
    fn test_operation_failure_keeps_phase() {
        let now = Utc::now();
        let state = reduce(
            &authenticated(now),
            SessionEvent::OperationFailed(ErrorKind::StorageUnavailable),
            now,
        );
        assert_eq!(state.phase(), SessionPhase::Authenticated);
        assert_eq!(state.last_error(), Some(ErrorKind::StorageUnavailable));
    }

    #[tokio::test]
    async fn test_machine_publishes_transitions() {
        let machine = SessionStateMachine::new();
        let mut rx = machine.subscribe();

        machine.dispatch(SessionEvent::LoginStarted);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().phase(), SessionPhase::Authenticating);

        let now = Utc::now();
        machine.dispatch_at(SessionEvent::LoginSucceeded(identity(now, 60)), now);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().phase(), SessionPhase::Authenticated);
        assert_eq!(machine.snapshot().phase(), SessionPhase::Authenticated);
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let machine = SessionStateMachine::new();
        let state = machine.dispatch(SessionEvent::LoggedOut);
        assert_eq!(state.phase(), SessionPhase::Anonymous);
    }
}
