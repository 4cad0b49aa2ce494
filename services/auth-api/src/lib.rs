//! Castgate Auth API
//!
//! Issuing service for castgate sessions.
//!
//! ## REST Endpoints
//!
//! - `POST /auth/register` - Create an account
//! - `POST /auth/login` - Exchange credentials for a token pair
//! - `POST /auth/refresh` - Rotate a refresh token
//! - `GET /auth/me` - Identity of the caller (guarded)
//! - `PUT /auth/me` - Update the caller's email or password (guarded)
//! - `PUT /auth/users/:id/role` - Change a user's role (admin)
//! - `PUT /auth/users/:id/status` - Activate or deactivate an account (admin)
//!
//! Every guarded route verifies the access token's signature.
//!
//! ## Pages
//!
//! - `GET /login` - Sign-in page (public)
//! - `GET /dashboard` - Guarded page
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /metrics` - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;
pub mod tokens;
pub mod users;

use axum::routing::{get, post, put};
use axum::Router;
use castgate_axum::{security_headers, GuardConfig, GuardLayer};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::state::AppState;
use crate::tokens::AccessTokenVerifier;

/// Paths served without a session.
pub const PUBLIC_PATHS: [&str; 6] = [
    "/login",
    "/health",
    "/metrics",
    "/auth/register",
    "/auth/login",
    "/auth/refresh",
];

/// Guard configuration for this service.
pub fn guard_config(state: &AppState) -> GuardConfig {
    GuardConfig {
        public_paths: PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
        ..GuardConfig::default()
    }
    .app_name(state.config.app_name.clone())
    .verifier(AccessTokenVerifier::new(&state.config.token_secret))
}

/// Build the HTTP router.
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/me", get(handlers::me).put(handlers::update_profile))
        .route("/auth/users/:id/role", put(handlers::update_role))
        .route("/auth/users/:id/status", put(handlers::update_status));

    let page_routes = Router::new()
        .route("/login", get(handlers::login_page))
        .route("/dashboard", get(handlers::dashboard));

    // Metrics route
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let middleware = ServiceBuilder::new()
        // Request ID propagation (outermost)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        // Tracing with request details
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(security_headers())
        // Request timeout (innermost - closest to handler)
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .merge(auth_routes)
        .merge(page_routes)
        .route("/health", get(handlers::health))
        .merge(metrics_route)
        .layer(GuardLayer::with_config(guard_config(&state)))
        .layer(middleware)
        .with_state(state)
}
