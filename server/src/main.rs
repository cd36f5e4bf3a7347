//! Snapbooth Server – receives booth uploads and forwards them to the
//! media host.
//!
//! This binary:
//! 1. Reads configuration from `booth.conf`
//! 2. Registers itself on the LAN via mDNS so kiosks can find it
//! 3. Runs the axum HTTP server with the themed pages and the upload
//!    endpoint.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use snapbooth_common::config::{self, Config};
use snapbooth_common::discovery::{self, ServiceRole};
use snapbooth_server::provider::MediaHost;
use snapbooth_server::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapbooth_server=info,tower_http=warn".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Config::default_path().to_string());
    let config = config::load(&PathBuf::from(&config_path)).context("Config load failed")?;

    info!(
        "Snapbooth Server starting (listen={}, folder={})",
        config.listen_addr, config.media_host_folder
    );

    // ── media host client ────────────────────────────────────────────
    let api_base = config
        .media_host_url
        .clone()
        .context("MEDIA_HOST_URL must be set")?;
    let notification_url = format!(
        "{}/api/host-notification",
        config.base_url.trim_end_matches('/')
    );
    let host = MediaHost::new(
        api_base,
        config.media_host_key.clone().unwrap_or_default(),
        config.media_host_folder.clone(),
        notification_url,
        Duration::from_secs(config.upload_timeout_secs),
    )
    .context("Cannot create media host client")?;

    // ── ctrl-c ───────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_flag.store(true, Ordering::Relaxed);
        info!("Shutdown signal received");
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── mDNS registration ────────────────────────────────────────────
    let port = config
        .listen_addr
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let discovery = if std::env::var("BOOTH_DISABLE_MDNS").is_ok() {
        info!("BOOTH_DISABLE_MDNS set – mDNS skipped");
        None
    } else {
        match discovery::register(ServiceRole::Server, port) {
            Ok(h) => {
                info!("mDNS: registered as {}", h.instance_name());
                Some(h)
            }
            Err(e) => {
                warn!("mDNS registration failed (non-fatal): {e:#}");
                None
            }
        }
    };

    // ── HTTP server ──────────────────────────────────────────────────
    let assets_dir = PathBuf::from(
        std::env::var("SNAPBOOTH_ASSETS_DIR").unwrap_or_else(|_| "server/assets".into()),
    );
    let state = AppState::new(host, config.max_upload_bytes());
    routes::run(state, assets_dir, &config.listen_addr, shutdown).await?;

    if let Some(dh) = discovery {
        dh.shutdown();
    }
    info!("Snapbooth Server stopped");
    Ok(())
}
