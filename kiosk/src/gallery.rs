//! In-session gallery of uploaded media.
//!
//! Entries are immutable and ordered most-recent-first.  Selecting an
//! entry re-presents its URL without another upload.  Video entries get
//! a poster frame pulled from one second into the recording; when that
//! fails the entry keeps a placeholder thumbnail instead of being lost.

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use snapbooth_common::media::{format_duration, MediaKind};
use snapbooth_common::protocol::MediaRecord;

use crate::session::CapturedMedia;

/// Thumbnail bounding box in pixels.
const THUMB_SIZE: u32 = 160;

#[derive(Debug, Clone)]
pub enum Thumbnail {
    /// PNG bytes bounded by [`THUMB_SIZE`].
    Image(Vec<u8>),
    /// Derivation failed; the front end renders a solid tile.
    Placeholder,
}

/// One successfully uploaded media item.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub url: String,
    pub kind: MediaKind,
    pub duration_secs: Option<f64>,
    pub captured_at: DateTime<Local>,
    pub thumbnail: Thumbnail,
}

impl GalleryEntry {
    /// `M:SS` badge for video tiles; `None` for images.
    pub fn duration_badge(&self) -> Option<String> {
        self.duration_secs.map(format_duration)
    }
}

/// Most-recent-first collection of uploads, alive for the kiosk session.
#[derive(Debug, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend, newest first.  Entries are never mutated or removed.
    pub fn add(&mut self, entry: GalleryEntry) {
        self.entries.insert(0, entry);
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Entry at display position `index` (0 = newest), for re-display
    /// without re-uploading.
    pub fn select(&self, index: usize) -> Option<&GalleryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the gallery entry for a payload the server just accepted.
/// Prefers the media host's duration (measured from the actual
/// container) over the kiosk's recording clock.
pub async fn build_entry(record: &MediaRecord, media: &CapturedMedia) -> GalleryEntry {
    let thumbnail = match media.kind {
        MediaKind::Image => image_thumbnail(&media.bytes),
        MediaKind::Video => video_poster(&media.bytes).await,
    };
    GalleryEntry {
        url: record.url.clone(),
        kind: record.kind,
        duration_secs: record
            .duration_seconds
            .or(media.duration_secs.map(f64::from)),
        captured_at: media.captured_at,
        thumbnail,
    }
}

/// Downscale an image payload to a PNG tile.
fn image_thumbnail(bytes: &[u8]) -> Thumbnail {
    let img = match image::load_from_memory(bytes) {
        Ok(i) => i,
        Err(e) => {
            warn!("Thumbnail decode failed: {e}");
            return Thumbnail::Placeholder;
        }
    };
    let thumb = img.thumbnail(THUMB_SIZE, THUMB_SIZE);
    let mut buf = Vec::new();
    match thumb.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png) {
        Ok(()) => Thumbnail::Image(buf),
        Err(e) => {
            warn!("Thumbnail encode failed: {e}");
            Thumbnail::Placeholder
        }
    }
}

/// Pull a poster frame from one second into the recording and tile it.
/// Needs ffmpeg on the path; any failure degrades to the placeholder.
async fn video_poster(bytes: &[u8]) -> Thumbnail {
    match extract_poster(bytes).await {
        Ok(jpeg) => image_thumbnail(&jpeg),
        Err(e) => {
            debug!("Poster extraction failed, using placeholder: {e}");
            Thumbnail::Placeholder
        }
    }
}

async fn extract_poster(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;

    let mut child = tokio::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error"])
        .args(["-ss", "1", "-i", "pipe:0"])
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    // Feed the recording from a separate task; ffmpeg may stop reading
    // as soon as it has its frame, and a broken pipe here is fine.
    let stdin = child.stdin.take();
    let payload = bytes.to_vec();
    let writer = tokio::spawn(async move {
        if let Some(mut stdin) = stdin {
            let _ = stdin.write_all(&payload).await;
        }
    });

    let output = child.wait_with_output().await?;
    writer.await.ok();

    if !output.status.success() || output.stdout.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "ffmpeg produced no poster frame",
        ));
    }
    Ok(output.stdout)
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, kind: MediaKind, duration: Option<f64>) -> GalleryEntry {
        GalleryEntry {
            url: url.into(),
            kind,
            duration_secs: duration,
            captured_at: Local::now(),
            thumbnail: Thumbnail::Placeholder,
        }
    }

    #[test]
    fn test_newest_entry_first() {
        let mut g = Gallery::new();
        g.add(entry("https://cdn/a.jpg", MediaKind::Image, None));
        g.add(entry("https://cdn/b.webm", MediaKind::Video, Some(12.0)));

        assert_eq!(g.len(), 2);
        assert_eq!(g.entries()[0].url, "https://cdn/b.webm");
        assert_eq!(g.entries()[1].url, "https://cdn/a.jpg");
    }

    #[test]
    fn test_select_re_presents_without_upload() {
        let mut g = Gallery::new();
        g.add(entry("https://cdn/a.jpg", MediaKind::Image, None));

        assert_eq!(g.select(0).unwrap().url, "https://cdn/a.jpg");
        assert!(g.select(5).is_none());
    }

    #[test]
    fn test_duration_badge() {
        let video = entry("https://cdn/v.webm", MediaKind::Video, Some(30.0));
        assert_eq!(video.duration_badge(), Some("0:30".into()));

        let image = entry("https://cdn/p.jpg", MediaKind::Image, None);
        assert_eq!(image.duration_badge(), None);
    }

    #[test]
    fn test_image_thumbnail_from_valid_payload() {
        let img = image::RgbImage::from_pixel(320, 240, image::Rgb([10, 200, 30]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        match image_thumbnail(&jpeg) {
            Thumbnail::Image(png) => {
                let thumb = image::load_from_memory(&png).unwrap();
                assert!(thumb.width() <= THUMB_SIZE);
                assert!(thumb.height() <= THUMB_SIZE);
            }
            Thumbnail::Placeholder => panic!("expected a real thumbnail"),
        }
    }

    #[test]
    fn test_image_thumbnail_degrades_to_placeholder() {
        assert!(matches!(
            image_thumbnail(b"definitely not an image"),
            Thumbnail::Placeholder
        ));
    }

    #[tokio::test]
    async fn test_video_poster_failure_keeps_entry() {
        // Garbage bytes: whether or not ffmpeg is installed, no poster
        // frame can come out of them.
        let record = MediaRecord {
            url: "https://cdn/v.webm".into(),
            public_id: "photobooth/v".into(),
            format: "webm".into(),
            width: 640,
            height: 480,
            kind: MediaKind::Video,
            duration_seconds: None,
        };
        let media = CapturedMedia::video(vec![0u8; 512], 7);

        let entry = build_entry(&record, &media).await;
        assert!(matches!(entry.thumbnail, Thumbnail::Placeholder));
        // Kiosk clock fills in when the host reports no duration.
        assert_eq!(entry.duration_secs, Some(7.0));
    }
}
