//! Snapbooth Kiosk – drives the camera, the capture session, and the
//! in-session gallery from a line-oriented console.
//!
//! Commands:
//!   mode photo|video   switch capture mode
//!   snap               start the photo countdown
//!   record / stop      start / stop a video recording
//!   ingest <path>      use a file from disk as the payload
//!   upload             send the captured payload to the booth server
//!   retake             discard the capture and return to ready
//!   gallery            list uploaded media, newest first
//!   select <n>         re-show gallery entry n
//!   status             show the session state
//!   quit               release the camera and exit

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use snapbooth_common::config::{self, Config};
use snapbooth_common::discovery::{self, ServiceRole};
use snapbooth_common::media::format_duration;
use snapbooth_kiosk::controller::{Booth, BoothEvent};
use snapbooth_kiosk::gallery::Thumbnail;
use snapbooth_kiosk::session::CaptureMode;
use snapbooth_kiosk::source;
use snapbooth_kiosk::uploader::UploadClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapbooth_kiosk=info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Config::default_path().to_string());
    let config = config::load(&PathBuf::from(&config_path)).context("Config load failed")?;

    info!(
        "Snapbooth Kiosk starting (camera={}, server={})",
        config.camera_device, config.server_url
    );

    // ── mDNS registration + server discovery ─────────────────────────
    // BOOTH_DISABLE_MDNS=1 skips mDNS for environments where multicast
    // is not available (e.g. bridge networking, CI).
    let discovery = if std::env::var("BOOTH_DISABLE_MDNS").is_ok() {
        info!("BOOTH_DISABLE_MDNS set – mDNS skipped");
        None
    } else {
        match discovery::register(ServiceRole::Kiosk, 0) {
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

    let server_url = resolve_server_url(&config, discovery.as_ref());
    info!("Booth server: {server_url}");

    // ── booth ────────────────────────────────────────────────────────
    let uploader = UploadClient::new(
        server_url.as_str(),
        Duration::from_secs(config.upload_timeout_secs),
    )
    .context("Cannot create upload client")?;
    let booth = Booth::new(
        source::from_config(&config.camera_device),
        uploader,
        config.event_tag.clone(),
        config.max_upload_bytes(),
    );

    if booth.acquire_camera().await.is_err() {
        warn!("Camera not available yet – fix it and run 'retake' to retry");
    }

    // ── event printer ────────────────────────────────────────────────
    let mut events = booth.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    // ── command loop ─────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_command(&booth, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => break, // stdin closed
                    Err(e) => {
                        warn!("stdin error: {e}");
                        break;
                    }
                }
            }
        }
    }

    // ── shutdown ─────────────────────────────────────────────────────
    booth.release_camera().await;
    if let Some(dh) = discovery {
        dh.shutdown();
    }
    info!("Snapbooth Kiosk stopped");
    Ok(())
}

/// `SERVER_URL=auto` browses mDNS for a booth server; anything else is
/// used as-is.  Falls back to localhost when nothing is found.
fn resolve_server_url(
    config: &Config,
    discovery: Option<&discovery::DiscoveryHandle>,
) -> String {
    if config.server_url != "auto" {
        return config.server_url.clone();
    }
    if let Some(dh) = discovery {
        if let Some(peer) = dh.find_peer(ServiceRole::Server, Duration::from_secs(5)) {
            if let Some(url) = peer.http_url() {
                info!("Discovered booth server {} at {url}", peer.instance_name);
                return url;
            }
        }
        warn!("No booth server found via mDNS, falling back to localhost");
    }
    "http://localhost:3000".into()
}

/// Run one console command.  Returns false to quit.  Failures reach the
/// user through the event printer.
async fn handle_command(booth: &Booth, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next();

    match cmd {
        "" => {}
        "mode" => match arg {
            Some("photo") => {
                let _ = booth.set_mode(CaptureMode::Photo).await;
            }
            Some("video") => {
                let _ = booth.set_mode(CaptureMode::Video).await;
            }
            _ => println!("usage: mode photo|video"),
        },
        "snap" => {
            let _ = booth.trigger_photo().await;
        }
        "record" => {
            let _ = booth.start_recording().await;
        }
        "stop" => {
            let _ = booth.stop_recording().await;
        }
        "ingest" => match arg {
            Some(path) => {
                let _ = booth.ingest_file(std::path::Path::new(path)).await;
            }
            None => println!("usage: ingest <path>"),
        },
        "upload" => {
            let _ = booth.upload().await;
        }
        "retake" => booth.reset().await,
        "gallery" => print_gallery(booth).await,
        "select" => match arg.and_then(|a| a.parse::<usize>().ok()) {
            Some(n) => match booth.select_entry(n).await {
                Some(entry) => println!("[{}] {}", entry.kind.resource_type(), entry.url),
                None => println!("no gallery entry {n}"),
            },
            None => println!("usage: select <index>"),
        },
        "status" => {
            println!(
                "mode={:?} status={:?} elapsed={}s",
                booth.mode().await,
                booth.status().await,
                booth.elapsed_secs().await,
            );
        }
        "quit" | "exit" => return false,
        other => println!("unknown command: {other}"),
    }
    true
}

async fn print_gallery(booth: &Booth) {
    let entries = booth.gallery_entries().await;
    if entries.is_empty() {
        println!("gallery is empty");
        return;
    }
    for (i, entry) in entries.iter().enumerate() {
        let badge = entry
            .duration_badge()
            .map(|d| format!(" {d}"))
            .unwrap_or_default();
        let thumb = match &entry.thumbnail {
            Thumbnail::Image(png) => format!("thumb {}B", png.len()),
            Thumbnail::Placeholder => "no thumb".to_string(),
        };
        println!(
            "{i}: [{}{badge}] {} ({thumb}, {})",
            entry.kind.resource_type(),
            entry.url,
            entry.captured_at.format("%H:%M:%S"),
        );
    }
}

fn print_event(event: &BoothEvent) {
    match event {
        BoothEvent::ModeChanged(mode) => println!("* mode: {mode:?}"),
        BoothEvent::CameraReady => println!("* camera ready"),
        BoothEvent::CountdownTick(n) => println!("* {n}..."),
        BoothEvent::PhotoCaptured => {
            println!("* photo captured – 'upload' to send, 'retake' to discard")
        }
        BoothEvent::RecordingStarted => println!("* recording"),
        BoothEvent::RecordingTick(n) => {
            println!("* recording {}", format_duration(f64::from(*n)))
        }
        BoothEvent::RecordingStopped {
            auto,
            duration_secs,
        } => {
            let reason = if *auto { " (time limit)" } else { "" };
            println!(
                "* recording stopped at {}{reason}",
                format_duration(f64::from(*duration_secs)),
            );
        }
        BoothEvent::FileIngested(kind) => {
            println!("* {} ready – 'upload' to send", kind.resource_type())
        }
        BoothEvent::UploadStarted => println!("* uploading..."),
        BoothEvent::UploadSucceeded(entry) => println!("* uploaded: {}", entry.url),
        BoothEvent::Failure(msg) => println!("! {msg}"),
    }
}
