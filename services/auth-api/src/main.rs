//! Castgate Auth API
//!
//! Issuing service for castgate sessions. See the library docs for routes.

use std::net::SocketAddr;

use auth_api::config::Config;
use auth_api::error::ApiError;
use auth_api::state::AppState;
use auth_api::build_router;
use castgate_types::Role;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("auth_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Castgate Auth API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        app_name = %config.app_name,
        "Configuration loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    let state = AppState::new(config.clone());
    bootstrap_admin(&state).await?;
    spawn_token_purge(state.clone());

    let app = build_router(state, metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    let refresh_buckets = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(castgate_session::metrics::REFRESH_DURATION_SECONDS.to_string()),
            refresh_buckets,
        )?
        .install_recorder()?;

    // Register metrics with descriptions
    castgate_session::metrics::describe_metrics();
    metrics::describe_counter!(
        castgate_axum::guard::GUARD_DECISIONS_TOTAL,
        "Route guard decisions by outcome"
    );
    metrics::describe_counter!("auth_registrations_total", "Total accounts registered");
    metrics::describe_counter!("auth_logins_total", "Login attempts by outcome");
    metrics::describe_counter!("auth_refreshes_total", "Refresh token rotations by outcome");

    Ok(handle)
}

/// Create the configured admin account, if any.
async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    let Some(admin) = state.config.bootstrap_admin.as_ref() else {
        return Ok(());
    };
    match state.users.register(&admin.email, &admin.password, Role::Admin).await {
        Ok(user) => tracing::info!(subject_id = %user.id, "Bootstrap admin created"),
        Err(ApiError::Conflict(_)) => tracing::debug!("Bootstrap admin already exists"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Periodically drop expired refresh tokens.
fn spawn_token_purge(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = state.tokens.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired refresh tokens");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
