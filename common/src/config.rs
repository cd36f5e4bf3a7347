//! Configuration parsing – reads a KEY=VALUE file (`booth.conf`).
//!
//! The booth server and the kiosk load the same file; each ignores the
//! keys it does not need.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

/// Application configuration, shared between the booth server and the kiosk.
#[derive(Debug, Clone)]
pub struct Config {
    // ── server ───────────────────────────────────────────────────────
    /// Address the booth HTTP server listens on.
    pub listen_addr: String,
    /// Public base URL of the booth server, used to build the
    /// eager-notification callback handed to the media host.
    pub base_url: String,

    // ── media host (server) ──────────────────────────────────────────
    /// Media-host API base, e.g. `https://media.example.com/v1`.
    pub media_host_url: Option<String>,
    /// API key sent with every media-host upload.
    pub media_host_key: Option<String>,
    /// Folder all booth uploads land in on the media host.
    pub media_host_folder: String,
    /// Per-request timeout for media-host uploads (seconds).
    pub upload_timeout_secs: u64,

    // ── limits (both ends) ───────────────────────────────────────────
    /// Maximum accepted payload size in MiB.
    pub max_upload_mb: u64,

    // ── kiosk ────────────────────────────────────────────────────────
    /// URL the kiosk uses to reach the booth server; `auto` resolves
    /// a server via mDNS.
    pub server_url: String,
    /// Event tag attached to uploads.
    pub event_tag: String,
    /// Camera device: `synthetic` for the built-in test pattern, or a
    /// V4L2 device path such as `/dev/video0`.
    pub camera_device: String,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/snapbooth/booth.conf"
    }

    /// The payload cap in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}

/// Parse a `KEY=VALUE` configuration file.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let map = parse_conf(&text);
    info!("Loaded config from {}", path.display());

    let get = |key: &str| -> Option<String> { map.get(key).cloned() };
    let get_u64 = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };

    Ok(Config {
        listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
        base_url: get("BASE_URL").unwrap_or_else(|| "http://localhost:3000".into()),

        media_host_url: get("MEDIA_HOST_URL").filter(|s| !s.is_empty()),
        media_host_key: get("MEDIA_HOST_KEY").filter(|s| !s.is_empty()),
        media_host_folder: get("MEDIA_HOST_FOLDER").unwrap_or_else(|| "photobooth".into()),
        upload_timeout_secs: get_u64("UPLOAD_TIMEOUT_SECS", 120),

        max_upload_mb: get_u64("MAX_UPLOAD_MB", 50),

        server_url: get("SERVER_URL").unwrap_or_else(|| "auto".into()),
        event_tag: get("EVENT_TAG").unwrap_or_else(|| "photo_booth".into()),
        camera_device: get("CAMERA_DEVICE").unwrap_or_else(|| "synthetic".into()),
    })
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_conf() {
        let text = r#"
# comment
LISTEN_ADDR=0.0.0.0:8080
BASE_URL="https://booth.example.com"
EVENT_TAG=spring_gala
MAX_UPLOAD_MB=25
"#;
        let map = parse_conf(text);
        assert_eq!(map["LISTEN_ADDR"], "0.0.0.0:8080");
        assert_eq!(map["BASE_URL"], "https://booth.example.com");
        assert_eq!(map["EVENT_TAG"], "spring_gala");
    }

    #[test]
    fn test_defaults_for_missing_keys() {
        let tmp = tempfile("defaults.conf", "# nothing set\n");
        let config = load(tmp.as_path()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.media_host_folder, "photobooth");
        assert_eq!(config.upload_timeout_secs, 120);
        assert_eq!(config.max_upload_mb, 50);
        assert_eq!(config.server_url, "auto");
        assert_eq!(config.event_tag, "photo_booth");
        assert_eq!(config.camera_device, "synthetic");
        assert!(config.media_host_url.is_none());
    }

    #[test]
    fn test_max_upload_bytes() {
        let tmp = tempfile("limits.conf", "MAX_UPLOAD_MB=50\n");
        let config = load(tmp.as_path()).unwrap();
        assert_eq!(config.max_upload_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn test_empty_values_treated_as_unset() {
        let tmp = tempfile("empty.conf", "MEDIA_HOST_URL=\nMEDIA_HOST_KEY=\"\"\n");
        let config = load(tmp.as_path()).unwrap();
        assert!(config.media_host_url.is_none());
        assert!(config.media_host_key.is_none());
    }

    fn tempfile(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("snapbooth_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}
