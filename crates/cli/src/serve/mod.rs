//! `recluster serve` -- HTTP JSON API over a run store.
//!
//! Serves the reclustering progress snapshot and the runs behind it using
//! `axum` + `tokio`, backed by an in-memory run store.
//!
//! Security features:
//! - CORS headers on all responses (permissive)
//! - Optional API key authentication via config or RECLUSTER_API_KEY
//!
//! Endpoints:
//! - GET  /health                                   - Server status (exempt from auth)
//! - GET  /projects/{project}/reclusteringProgress  - Progress snapshot
//! - GET  /projects/{project}/runs                  - Runs, newest first
//! - GET  /projects/{project}/runs/{attempt}        - One run by attempt timestamp
//! - POST /projects/{project}/runs                  - Create a run
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use recluster_progress::ProgressOptions;
use recluster_storage::InMemoryStorage;
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{
    handle_create_run, handle_get_run, handle_health, handle_list_runs, handle_not_found,
    handle_reclustering_progress,
};
use self::middleware::auth_middleware;
use self::state::AppState;
use crate::config::ServiceConfig;

/// Maximum request body size: 64 KB. A run is a few hundred bytes.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/projects/{project}/reclusteringProgress",
            get(handle_reclustering_progress),
        )
        .route(
            "/projects/{project}/runs",
            get(handle_list_runs).post(handle_create_run),
        )
        .route("/projects/{project}/runs/{attempt}", get(handle_get_run))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub(crate) async fn start_server(
    config: ServiceConfig,
    storage: InMemoryStorage,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }

    let state = Arc::new(AppState {
        storage,
        options: ProgressOptions {
            algorithms_version: config.algorithms_version,
            ..ProgressOptions::default()
        },
        api_key: config.api_key,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "reclustering progress API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
