//! Route guard middleware.
//!
//! [`GuardLayer`] decodes the caller's access token locally and either lets
//! the request through with an [`AuthContext`] attached or denies it on the
//! spot. It never talks to the issuing service and never refreshes; clients
//! refresh before they navigate.
//!
//! Without a [`TokenVerifier`] the guard only checks a token's structure and
//! expiry. Services holding the signing key install one so that forged
//! tokens are rejected.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use castgate_session::{decode, is_expired, StorageKeys};
use castgate_types::Identity;
use chrono::Utc;
use metrics::counter;
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tracing::debug;

use crate::context::{AuthContext, AuthSource};
use crate::error::GuardError;

/// Subject id forwarded to handlers and upstreams.
pub static USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Sorted, comma-joined roles forwarded to handlers and upstreams.
pub static USER_ROLES_HEADER: HeaderName = HeaderName::from_static("x-user-roles");

/// Metric name for guard decisions.
pub const GUARD_DECISIONS_TOTAL: &str = "castgate_guard_decisions_total";

/// Signature check applied to presented tokens.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return the identity it carries.
    fn verify(&self, token: &str) -> Result<Identity, GuardError>;
}

/// Configuration for the route guard.
#[derive(Clone)]
pub struct GuardConfig {
    /// Paths that bypass the guard. An entry ending in `/*` matches as a prefix.
    pub public_paths: Vec<String>,
    /// Where page navigations are sent when denied. `None` always answers 401.
    pub login_redirect: Option<String>,
    /// Application name, used for the access token cookie name.
    pub app_name: String,
    /// Whether the access token cookie is accepted.
    pub allow_cookie: bool,
    /// Signature check. `None` accepts any well-formed token.
    pub verifier: Option<Arc<dyn TokenVerifier>>,
}

impl std::fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardConfig")
            .field("public_paths", &self.public_paths)
            .field("login_redirect", &self.login_redirect)
            .field("app_name", &self.app_name)
            .field("allow_cookie", &self.allow_cookie)
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            public_paths: vec!["/login".to_string(), "/auth/*".to_string(), "/health".to_string()],
            login_redirect: Some("/login".to_string()),
            app_name: "castgate".to_string(),
            allow_cookie: true,
            verifier: None,
        }
    }
}

impl GuardConfig {
    /// Create a config with the default allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a public path.
    #[must_use]
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.push(path.into());
        self
    }

    /// Set the login redirect target.
    #[must_use]
    pub fn login_redirect(mut self, target: Option<String>) -> Self {
        self.login_redirect = target;
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set whether the access token cookie is accepted.
    #[must_use]
    pub fn allow_cookie(mut self, allow: bool) -> Self {
        self.allow_cookie = allow;
        self
    }

    /// Verify token signatures with `verifier`.
    #[must_use]
    pub fn verifier(mut self, verifier: impl TokenVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Whether `path` is on the allow-list.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|entry| match entry.strip_suffix("/*") {
            Some(prefix) => path == prefix || path.starts_with(&format!("{prefix}/")),
            None => path == entry,
        })
    }

    /// Name of the access token cookie.
    #[must_use]
    pub fn cookie_name(&self) -> String {
        StorageKeys::new(&self.app_name).access
    }
}

/// Outcome of checking one request.
#[derive(Debug)]
enum Decision {
    Public,
    Allow(AuthContext),
    Deny(GuardError),
}

impl Decision {
    fn label(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Allow(_) => "allow",
            Self::Deny(_) => "deny",
        }
    }
}

fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn cookie_token<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

fn check<B>(config: &GuardConfig, req: &Request<B>) -> Decision {
    if config.is_public(req.uri().path()) {
        return Decision::Public;
    }

    let cookie = config.cookie_name();
    let found = bearer_token(req)
        .map(|token| (token, AuthSource::BearerToken))
        .or_else(|| {
            config
                .allow_cookie
                .then(|| cookie_token(req, &cookie))
                .flatten()
                .map(|token| (token, AuthSource::Cookie))
        });

    let Some((token, source)) = found else {
        return Decision::Deny(GuardError::Unauthenticated);
    };
    let verified = match config.verifier.as_deref() {
        Some(verifier) => verifier.verify(token),
        None => decode(token).map_err(|_| GuardError::MalformedToken),
    };
    let identity = match verified {
        Ok(identity) => identity,
        Err(err) => return Decision::Deny(err),
    };
    if is_expired(&identity, Utc::now()) {
        return Decision::Deny(GuardError::TokenExpired);
    }
    Decision::Allow(AuthContext::from_identity(identity, source))
}

fn is_navigation<B>(req: &Request<B>) -> bool {
    (req.method() == Method::GET || req.method() == Method::HEAD)
        && !req.headers().contains_key(header::AUTHORIZATION)
}

fn deny<B>(config: &GuardConfig, req: &Request<B>, err: GuardError) -> Response<Body> {
    if let Some(login) = config.login_redirect.as_deref().filter(|_| is_navigation(req)) {
        let next = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.uri().path(), |pq| pq.as_str());
        let location = format!("{login}?next={}", urlencoding::encode(next));
        if let Ok(location) = HeaderValue::from_str(&location) {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::SEE_OTHER;
            response.headers_mut().insert(header::LOCATION, location);
            return response;
        }
    }
    err.into_response()
}

fn attach(req: &mut Request<Body>, ctx: AuthContext) {
    let headers = req.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&ctx.subject_id) {
        headers.insert(USER_ID_HEADER.clone(), value);
    }
    if let Ok(value) = HeaderValue::from_str(&ctx.roles_header()) {
        headers.insert(USER_ROLES_HEADER.clone(), value);
    }
    req.extensions_mut().insert(ctx);
}

/// Tower layer that guards every non-public route.
#[derive(Debug, Clone, Default)]
pub struct GuardLayer {
    config: Arc<GuardConfig>,
}

impl GuardLayer {
    /// Create a guard with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a guard with custom configuration.
    #[must_use]
    pub fn with_config(config: GuardConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// The route guard service.
#[derive(Debug, Clone)]
pub struct GuardService<S> {
    inner: S,
    config: Arc<GuardConfig>,
}

impl<S> Service<Request<Body>> for GuardService<S>
where
    S: Service<Request<Body>, Response = Response<Body>>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = GuardFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Identity headers only ever come from the guard.
        req.headers_mut().remove(&USER_ID_HEADER);
        req.headers_mut().remove(&USER_ROLES_HEADER);

        let decision = check(&self.config, &req);
        counter!(GUARD_DECISIONS_TOTAL, "decision" => decision.label()).increment(1);

        match decision {
            Decision::Public => GuardFuture::passed(self.inner.call(req)),
            Decision::Allow(ctx) => {
                attach(&mut req, ctx);
                GuardFuture::passed(self.inner.call(req))
            }
            Decision::Deny(err) => {
                debug!(path = %req.uri().path(), reason = err.reason(), "Guard denied request");
                GuardFuture::denied(deny(&self.config, &req, err))
            }
        }
    }
}

pin_project! {
    /// Future for [`GuardService`].
    pub struct GuardFuture<F> {
        #[pin]
        state: GuardState<F>,
    }
}

pin_project! {
    #[project = GuardStateProj]
    enum GuardState<F> {
        Passed {
            #[pin]
            future: F,
        },
        Denied {
            response: Option<Response<Body>>,
        },
    }
}

impl<F> GuardFuture<F> {
    fn passed(future: F) -> Self {
        Self {
            state: GuardState::Passed { future },
        }
    }

    fn denied(response: Response<Body>) -> Self {
        Self {
            state: GuardState::Denied {
                response: Some(response),
            },
        }
    }
}

impl<F, E> Future for GuardFuture<F>
where
    F: Future<Output = Result<Response<Body>, E>>,
{
    type Output = Result<Response<Body>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().state.project() {
            GuardStateProj::Passed { future } => future.poll(cx),
            GuardStateProj::Denied { response } => match response.take() {
                Some(response) => Poll::Ready(Ok(response)),
                None => panic!("polled after completion"),
            },
        }
    }
}
