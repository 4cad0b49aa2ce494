//! Shared helpers for Auth API tests.

#![allow(dead_code)]

use auth_api::config::Config;
use auth_api::state::AppState;
use auth_api::build_router;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const EMAIL: &str = "host@example.com";
pub const PASSWORD: &str = "correct horse battery";

pub const SECRET: &str = "integration-secret-0123456789abcdef";
pub const ADMIN_EMAIL: &str = "ops@example.com";

pub fn config() -> Config {
    config_with(&[])
}

pub fn config_with(overrides: &[(&str, &str)]) -> Config {
    let overrides: Vec<(String, String)> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(move |key| {
        if let Some((_, value)) = overrides.iter().find(|(k, _)| k == key) {
            return Some(value.clone());
        }
        match key {
            "TOKEN_SECRET" => Some(SECRET.to_string()),
            "METRICS_ENABLED" => Some("false".to_string()),
            _ => None,
        }
    })
    .unwrap()
}

pub fn app() -> (Router, AppState) {
    let state = AppState::new(config());
    (build_router(state.clone(), None), state)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authorized(method: &str, uri: &str, token: &Value, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token.as_str().unwrap()));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log in, returning the response.
pub async fn login(app: &Router, email: &str, password: &str) -> Response<Body> {
    send(
        app,
        json_request(
            "POST",
            "/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ),
    )
    .await
}

/// Seed an admin account directly in the store and log it in.
pub async fn admin_login(app: &Router, state: &AppState) -> Value {
    state
        .users
        .register(ADMIN_EMAIL, PASSWORD, castgate_types::Role::Admin)
        .await
        .unwrap();
    let response = login(app, ADMIN_EMAIL, PASSWORD).await;
    assert_eq!(response.status(), 200);
    json_body(response).await
}

/// Register the default user and log in, returning the login body.
pub async fn register_and_login(app: &Router) -> Value {
    let response = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            serde_json::json!({ "email": EMAIL, "password": PASSWORD, "role": "creator" }),
        ),
    )
    .await;
    assert_eq!(response.status(), 201);

    let response = send(
        app,
        json_request(
            "POST",
            "/auth/login",
            serde_json::json!({ "email": EMAIL, "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(response.status(), 200);
    json_body(response).await
}
