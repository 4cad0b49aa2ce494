//! Minimal pages for browser navigation through the guard.

use axum::extract::Query;
use axum::response::Html;
use castgate_axum::{MaybeAuth, RequireAuth};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LoginPageQuery {
    pub next: Option<String>,
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// GET /login
pub async fn login_page(auth: MaybeAuth, Query(query): Query<LoginPageQuery>) -> Html<String> {
    // Only same-site paths are followed after sign in.
    let next = query
        .next
        .filter(|next| next.starts_with('/') && !next.starts_with("//"))
        .unwrap_or_else(|| "/dashboard".to_string());

    let status = match auth.0 {
        Some(ctx) => format!("<p>Signed in as {}.</p>", escape(&ctx.email)),
        None => "<p>Sign in to continue.</p>".to_string(),
    };
    Html(format!(
        "<!doctype html><title>Sign in</title><h1>Sign in</h1>{status}\
         <form method=\"post\" action=\"/auth/login\" data-next=\"{}\"></form>",
        escape(&next)
    ))
}

/// GET /dashboard
pub async fn dashboard(RequireAuth(ctx): RequireAuth) -> Html<String> {
    Html(format!(
        "<!doctype html><title>Dashboard</title><h1>Dashboard</h1><p>{} ({})</p>",
        escape(&ctx.email),
        escape(&ctx.roles_header())
    ))
}
