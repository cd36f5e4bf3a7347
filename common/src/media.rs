//! Media classification and booth-wide capture limits.

use serde::{Deserialize, Serialize};

/// Hard cap on a single recording, enforced by the recording timer.
pub const MAX_RECORDING_SECS: u32 = 30;

/// Image or video.  Serialized lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by declared content type: `video/*` is video, everything
    /// else is treated as an image.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            Self::Video
        } else {
            Self::Image
        }
    }

    /// Media-host resource segment, i.e. the `image` in
    /// `{base}/image/upload`.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Capitalized label for user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Video => "Video",
        }
    }
}

/// Content type for a file extension, used for files ingested from disk.
/// Returns `None` for extensions the booth does not accept.
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => return None,
    })
}

/// `M:SS` badge text for a video duration.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// User-facing message for a payload over the cap.
pub fn size_limit_message(max_mb: u64) -> String {
    format!("File too large. Maximum size is {max_mb}MB")
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_content_type() {
        assert_eq!(MediaKind::from_content_type("video/webm"), MediaKind::Video);
        assert_eq!(MediaKind::from_content_type("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_content_type("image/jpeg"), MediaKind::Image);
        // Anything that is not video/* counts as an image.
        assert_eq!(
            MediaKind::from_content_type("application/octet-stream"),
            MediaKind::Image
        );
    }

    #[test]
    fn test_extension_content_types() {
        assert_eq!(content_type_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(content_type_for_extension("webm"), Some("video/webm"));
        assert_eq!(content_type_for_extension("mov"), Some("video/quicktime"));
        assert_eq!(content_type_for_extension("exe"), None);
        assert_eq!(content_type_for_extension(""), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(5.0), "0:05");
        assert_eq!(format_duration(29.9), "0:29");
        assert_eq!(format_duration(65.0), "1:05");
        assert_eq!(format_duration(600.0), "10:00");
    }

    #[test]
    fn test_size_limit_message() {
        assert_eq!(size_limit_message(50), "File too large. Maximum size is 50MB");
    }
}
