//! HTTP client for the booth server's upload endpoint.
//!
//! One multipart POST per payload: the `media` file part plus the
//! `eventTag` and `fileType` text fields.  The server always answers
//! with the uniform envelope, so failures carry a user-presentable
//! message whenever one exists.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::{info, warn};

use snapbooth_common::protocol::{MediaRecord, UploadResponse};

use crate::session::CapturedMedia;

#[derive(Debug, Error)]
pub enum UploadError {
    /// The server (or the media host behind it) rejected the upload;
    /// carries the envelope message verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("upload failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed server response: {0}")]
    BadResponse(String),
}

pub struct UploadClient {
    http: reqwest::Client,
    base_url: String,
}

impl UploadClient {
    /// `base_url` is the booth server root, e.g. `http://192.168.1.20:3000`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub async fn upload(
        &self,
        media: &CapturedMedia,
        event_tag: &str,
    ) -> Result<MediaRecord, UploadError> {
        let part = Part::bytes(media.bytes.clone())
            .file_name(media.file_name.clone())
            .mime_str(&media.content_type)?;
        let form = Form::new()
            .part("media", part)
            .text("eventTag", event_tag.to_string())
            .text("fileType", media.kind.resource_type().to_string());

        let url = format!("{}/api/upload", self.base_url);
        info!(
            "POST {url} ({}, {:.2}MB)",
            media.file_name,
            media.bytes.len() as f64 / (1024.0 * 1024.0)
        );

        let resp = self.http.post(&url).multipart(form).send().await?;
        let status = resp.status();
        let envelope: UploadResponse = resp
            .json()
            .await
            .map_err(|e| UploadError::BadResponse(format!("status {status}: {e}")))?;

        if !envelope.success {
            warn!("Upload rejected ({status}): {}", envelope.message);
            return Err(UploadError::Rejected(envelope.message));
        }
        envelope
            .media
            .ok_or_else(|| UploadError::BadResponse("success envelope without media".into()))
    }
}
