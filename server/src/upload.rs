//! The `/api/upload` handler.
//!
//! Accepts one multipart request with a single `media` file field plus
//! optional `eventTag` and `fileType` text fields, forwards the payload
//! to the media host, and answers with the uniform envelope on every
//! path.  No upstream failure ever escapes as anything but a
//! `success:false` envelope.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use tracing::{info, warn};

use snapbooth_common::media::{size_limit_message, MediaKind};
use snapbooth_common::protocol::{MediaRecord, UploadResponse};

use crate::routes::AppState;

/// Event tag used when the client sends none.
const DEFAULT_EVENT_TAG: &str = "photo_booth";

struct MediaField {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

pub async fn handle(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<UploadResponse>) {
    let mut media: Option<MediaField> = None;
    let mut event_tag = DEFAULT_EVENT_TAG.to_string();
    let mut file_type_hint: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                warn!("Multipart read failed: {e}");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(UploadResponse::failure(format!("Malformed upload: {e}"))),
                );
            }
        };
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "media" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        media = Some(MediaField {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        });
                    }
                    Err(e) => {
                        warn!("Media field read failed: {e}");
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(UploadResponse::failure(format!("Malformed upload: {e}"))),
                        );
                    }
                }
            }
            "eventTag" => {
                if let Ok(tag) = field.text().await {
                    if !tag.is_empty() {
                        event_tag = tag;
                    }
                }
            }
            "fileType" => {
                file_type_hint = field.text().await.ok();
            }
            _ => {
                warn!("Ignoring unexpected field: {name}");
            }
        }
    }

    let Some(media) = media else {
        return (
            StatusCode::BAD_REQUEST,
            Json(UploadResponse::failure("No file selected")),
        );
    };

    let kind = MediaKind::from_content_type(&media.content_type);
    info!(
        "Received {} upload ({}, {:.2}MB, tag={event_tag})",
        kind.resource_type(),
        media.content_type,
        media.bytes.len() as f64 / (1024.0 * 1024.0)
    );

    // The size gate sits in front of the provider call, so an oversized
    // payload never leaves this process.
    if media.bytes.len() as u64 > state.max_upload_bytes {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(UploadResponse::failure(size_limit_message(
                state.max_upload_bytes / (1024 * 1024),
            ))),
        );
    }

    match state
        .host
        .upload(
            kind,
            &media.file_name,
            &media.content_type,
            media.bytes,
            &event_tag,
        )
        .await
    {
        Ok(hosted) => {
            info!("Hosted as {} ({})", hosted.public_id, hosted.secure_url);
            (
                StatusCode::OK,
                Json(UploadResponse {
                    success: true,
                    message: format!("{} uploaded successfully!", kind.label()),
                    media: Some(MediaRecord {
                        url: hosted.secure_url,
                        public_id: hosted.public_id,
                        format: hosted.format,
                        width: hosted.width,
                        height: hosted.height,
                        kind,
                        duration_seconds: hosted.duration,
                    }),
                }),
            )
        }
        Err(e) => {
            let what = file_type_hint
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "file".into());
            warn!("Upload to media host failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UploadResponse::failure(format!(
                    "Error uploading {what}: {e}"
                ))),
            )
        }
    }
}
