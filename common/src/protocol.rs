//! Shared HTTP protocol types between the kiosk and the booth server.
//!
//! The upload envelope is a fixed wire contract: camelCase field names,
//! `type` as the media discriminator, and `success`/`message` always
//! present so a client can render a failure without inspecting the HTTP
//! status code.

use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// Descriptor of one hosted media item, returned inside a successful
/// upload envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    /// Public URL of the uploaded media.
    pub url: String,
    /// Provider-assigned identifier (includes the folder prefix).
    pub public_id: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Video duration in seconds; absent for images.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_seconds: Option<f64>,
}

/// Uniform response envelope for `POST /api/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub media: Option<MediaRecord>,
}

impl UploadResponse {
    /// Failure envelope with no media attached.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            media: None,
        }
    }
}

/// Health-check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

// ─── tests ───────────────────────────────────────────────────────────────
