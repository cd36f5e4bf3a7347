//! Client for the external media host.
//!
//! One multipart POST per upload to `{base}/{image|video}/upload`.
//! Images carry a synchronous downscale transformation; videos request
//! an eager rendition produced asynchronously, with completion reported
//! to our notification endpoint.  The host answers with the hosted
//! media descriptor or an `{error:{message}}` body, both of which are
//! decoded here so callers only ever see a typed [`HostError`].

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use snapbooth_common::media::MediaKind;

/// Synchronous transformation applied to every image upload.
const IMAGE_TRANSFORMATION: &str = "c_limit,w_1200/q_auto";

/// Eager rendition requested for every video upload.
const VIDEO_EAGER: &str = "c_limit,w_720/q_auto";

#[derive(Debug, Error)]
pub enum HostError {
    /// The host refused the upload; carries its message verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("media host unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed media host response: {0}")]
    BadResponse(String),
}

/// A successfully hosted media item, as the host describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct HostUpload {
    pub secure_url: String,
    pub public_id: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Measured from the container; absent for images.
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HostFailure {
    error: HostFailureBody,
}

#[derive(Debug, Deserialize)]
struct HostFailureBody {
    message: String,
}

/// The media-hosting provider, as a typed HTTP client.
#[derive(Clone)]
pub struct MediaHost {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    folder: String,
    /// Where the host reports completed eager renditions.
    notification_url: String,
}

impl MediaHost {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        folder: impl Into<String>,
        notification_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HostError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            folder: folder.into(),
            notification_url: notification_url.into(),
        })
    }

    /// Forward one payload to the host.
    pub async fn upload(
        &self,
        kind: MediaKind,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        tags: &str,
    ) -> Result<HostUpload, HostError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let mut form = Form::new()
            .part("file", part)
            .text("folder", self.folder.clone())
            .text("tags", tags.to_string())
            .text("api_key", self.api_key.clone());
        form = match kind {
            MediaKind::Image => form.text("transformation", IMAGE_TRANSFORMATION),
            MediaKind::Video => form
                .text("eager", VIDEO_EAGER)
                .text("eager_async", "true")
                .text("eager_notification_url", self.notification_url.clone()),
        };

        let url = format!("{}/{}/upload", self.api_base, kind.resource_type());
        info!("Forwarding {} upload to {url}", kind.resource_type());

        let resp = self.http.post(&url).multipart(form).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            // The host's own failure shape when it bothered to send one.
            let message = serde_json::from_str::<HostFailure>(&body)
                .map(|f| f.error.message)
                .unwrap_or_else(|_| format!("media host returned {status}"));
            warn!("Media host rejected upload ({status}): {message}");
            return Err(HostError::Rejected(message));
        }

        serde_json::from_str(&body)
            .map_err(|e| HostError::BadResponse(format!("status {status}: {e}")))
    }
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_host_upload() {
        let text = r#"{
            "secure_url": "https://cdn.example.com/photobooth/x.webm",
            "public_id": "photobooth/x",
            "format": "webm",
            "width": 1280,
            "height": 720,
            "duration": 9.4,
            "bytes": 123456
        }"#;
        let upload: HostUpload = serde_json::from_str(text).unwrap();
        assert_eq!(upload.public_id, "photobooth/x");
        assert_eq!(upload.duration, Some(9.4));
    }

    #[test]
    fn test_decode_host_upload_without_duration() {
        let text = r#"{
            "secure_url": "https://cdn.example.com/photobooth/p.jpg",
            "public_id": "photobooth/p",
            "format": "jpg",
            "width": 1200,
            "height": 800
        }"#;
        let upload: HostUpload = serde_json::from_str(text).unwrap();
        assert_eq!(upload.duration, None);
    }

    #[test]
    fn test_decode_host_failure() {
        let text = r#"{"error":{"message":"Invalid video file"}}"#;
        let failure: HostFailure = serde_json::from_str(text).unwrap();
        assert_eq!(failure.error.message, "Invalid video file");
    }
}
