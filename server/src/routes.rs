//! HTTP surface of the booth server.
//!
//! Routes:
//!   GET  /                        → capture page, default theme
//!   GET  /wedding, /party         → themed capture pages
//!   GET  /assets/*                → static assets
//!   GET  /api/health              → health check
//!   POST /api/upload              → forward one media file to the host
//!   POST /api/host-notification   → eager-rendition callback sink

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use snapbooth_common::protocol::HealthResponse;

use crate::provider::MediaHost;
use crate::theme::{self, Theme};
use crate::upload;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub host: MediaHost,
    /// Payload cap in bytes, checked before any provider call.
    pub max_upload_bytes: u64,
    start_time: Instant,
}

impl AppState {
    pub fn new(host: MediaHost, max_upload_bytes: u64) -> Self {
        Self {
            host,
            max_upload_bytes,
            start_time: Instant::now(),
        }
    }
}

/// Build the router.  Split out from [`run`] so tests can serve it on an
/// ephemeral port.
pub fn router(state: AppState, assets_dir: PathBuf) -> Router {
    // The body limit sits above the media cap so an oversized-but-sane
    // upload reaches the handler and gets the envelope's 413 instead of
    // a bare framework rejection.
    let body_limit = (state.max_upload_bytes as usize) * 2;

    Router::new()
        .route("/", get(index))
        .route("/wedding", get(wedding))
        .route("/party", get(party))
        .route("/api/health", get(health))
        .route("/api/upload", post(upload::handle))
        .route("/api/host-notification", post(host_notification))
        .nest_service("/assets", ServeDir::new(assets_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.  Blocks until shutdown.
pub async fn run(
    state: AppState,
    assets_dir: PathBuf,
    listen_addr: &str,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let app = router(state, assets_dir);

    let listener = TcpListener::bind(listen_addr).await?;
    info!("Booth server listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

// ── route handlers ───────────────────────────────────────────────────────

async fn index() -> Html<String> {
    Html(theme::render(Theme::Default))
}

async fn wedding() -> Html<String> {
    Html(theme::render(Theme::Wedding))
}

async fn party() -> Html<String> {
    Html(theme::render(Theme::Party))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// The media host calls back here when an eager video rendition is
/// ready.  Nothing downstream consumes it; acknowledge and log.
async fn host_notification(body: Bytes) -> StatusCode {
    info!("Eager-rendition notification received ({} bytes)", body.len());
    StatusCode::OK
}
