//! HTTP surface for the feedback web UI.
//!
//! Mounts the REST endpoints behind the access-control and rate-limit
//! guard, serves until the cancellation token fires, and never holds the
//! queue lock across any I/O (handlers copy state out and respond).

pub mod routes;
pub mod security;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::mcp::handler::AppState;
use crate::{AppError, Result};

/// Body cap for multipart submissions: a few images under the per-image
/// limit plus form overhead.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Assemble the full router with all middleware layers.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/api/config", get(routes::get_config))
        .route("/api/tasks", get(routes::list_tasks))
        .route("/api/tasks/{id}", get(routes::get_task))
        .route("/api/tasks/{id}/activate", post(routes::activate_task))
        .route("/api/tasks/{id}/submit", post(routes::submit_task))
        .route("/api/submit", post(routes::submit_active))
        .route("/api/close", post(routes::close_task))
        .route(
            "/api/get-notification-config",
            get(routes::get_notification_config),
        )
        .route(
            "/api/update-notification-config",
            post(routes::update_notification_config),
        )
        .route("/api/test-bark", post(routes::test_bark))
        .route("/api/get-feedback-prompts", get(routes::get_feedback_prompts))
        .route("/api/health", get(routes::health))
        .layer(middleware::from_fn(security::security_headers))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            security::guard,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the HTTP surface until cancellation.
///
/// The listener binds `network_security.bind_interface` on
/// `web_ui.port`.
///
/// # Errors
///
/// Returns `AppError::Config` when the listener cannot bind — fatal at
/// startup per the process exit-code contract.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let snapshot = state.config.snapshot();
    let host = snapshot.network_security.bind_interface.clone();
    let port = snapshot.web_ui.port;

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {host}:{port}: {err}")))?;

    let bound = listener
        .local_addr()
        .map_err(|err| AppError::Config(format!("listener address unavailable: {err}")))?;
    info!(%bound, "starting HTTP surface");

    let router = build_router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { ct.cancelled().await })
    .await
    .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("HTTP surface shut down");
    Ok(())
}
