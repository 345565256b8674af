//! Router assembly and the serve loop with graceful shutdown.

use crate::config::{ConfigError, ServerConfig};
use crate::gateway::{self, GatewayState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tokio::time;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Errors that abort the serve loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the full application router: gateway routes, health endpoint,
/// 404 fallback, CORS and request tracing.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .merge(gateway::routes())
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until ctrl-c, then shut the hub down (closing every registered
/// connection) within the configured shutdown timeout.
pub async fn serve(config: &ServerConfig, state: GatewayState) -> Result<(), ServerError> {
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server is listening");

    let hub = state.hub.clone();
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    if time::timeout(config.shutdown_timeout(), hub.shutdown())
        .await
        .is_err()
    {
        warn!("hub did not shut down within the timeout");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
}

async fn health(State(state): State<GatewayState>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => Json(json!({ "status": "ok", "stats": stats })).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
            .into_response(),
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}
