//! Booth controller – single owner of the capture session, the camera
//! source, and the gallery.
//!
//! Every transition goes through [`Booth`]; nothing else mutates the
//! session.  The countdown and recording timers are tokio tasks, each
//! holding a cancellation token that is cancelled whenever a transition
//! leaves the timer's owning state.  A stale tick that fires anyway
//! re-checks the status under the lock and exits.
//!
//! Methods return typed results for programmatic callers and mirror
//! every user-visible change onto a broadcast [`BoothEvent`] stream for
//! the front end.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use snapbooth_common::media::{self, MediaKind, MAX_RECORDING_SECS};

use crate::gallery::{self, Gallery, GalleryEntry};
use crate::session::{
    CaptureMode, CaptureSession, CapturedMedia, RecordingTick, SessionError, SessionStatus,
};
use crate::source::{CameraSource, SourceError};
use crate::uploader::{UploadClient, UploadError};

/// Seconds counted down before a photo is taken.
pub const COUNTDOWN_START: u32 = 3;

/// Notifications for the kiosk front end.
#[derive(Debug, Clone)]
pub enum BoothEvent {
    ModeChanged(CaptureMode),
    CameraReady,
    CountdownTick(u32),
    PhotoCaptured,
    RecordingStarted,
    RecordingTick(u32),
    /// `auto` is true when the recording cap stopped it.
    RecordingStopped { auto: bool, duration_secs: u32 },
    FileIngested(MediaKind),
    UploadStarted,
    UploadSucceeded(GalleryEntry),
    Failure(String),
}

#[derive(Debug, Error)]
pub enum BoothError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),
    #[error("{0}")]
    FileTooLarge(String),
    #[error("cannot read file: {0}")]
    FileRead(#[from] std::io::Error),
}

struct BoothCore {
    session: CaptureSession,
    source: Box<dyn CameraSource>,
    gallery: Gallery,
    countdown: Option<CancellationToken>,
    recorder: Option<CancellationToken>,
}

/// The booth.  Cheap to share: all state sits behind one async mutex,
/// and the upload request is the only await issued while state matters,
/// so the lock is never held across the network.
pub struct Booth {
    core: Arc<Mutex<BoothCore>>,
    uploader: UploadClient,
    event_tag: String,
    max_upload_bytes: u64,
    events: broadcast::Sender<BoothEvent>,
}

impl Booth {
    pub fn new(
        source: Box<dyn CameraSource>,
        uploader: UploadClient,
        event_tag: impl Into<String>,
        max_upload_bytes: u64,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            core: Arc::new(Mutex::new(BoothCore {
                session: CaptureSession::new(),
                source,
                gallery: Gallery::new(),
                countdown: None,
                recorder: None,
            })),
            uploader,
            event_tag: event_tag.into(),
            max_upload_bytes,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoothEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: BoothEvent) {
        let _ = self.events.send(event);
    }

    // ── camera ───────────────────────────────────────────────────────

    /// Request the camera (and, in video mode, the microphone).
    /// Failure surfaces as an error state; the user retries explicitly.
    pub async fn acquire_camera(&self) -> Result<(), BoothError> {
        let mut core = self.core.lock().await;
        let want_audio = core.session.mode() == CaptureMode::Video;
        match core.source.acquire(want_audio) {
            Ok(()) => {
                core.session.mark_camera_ready();
                self.emit(BoothEvent::CameraReady);
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                core.session.fail(&msg);
                self.emit(BoothEvent::Failure(msg));
                Err(e.into())
            }
        }
    }

    /// Switch capture mode.  Stops any active recording (discarding it),
    /// cancels timers, and re-acquires the stream when the audio
    /// requirement changes.  Refused while an upload is in flight: the
    /// payload has exactly one owner until the request settles.
    pub async fn set_mode(&self, mode: CaptureMode) -> Result<(), BoothError> {
        let mut core = self.core.lock().await;
        if core.session.status() == SessionStatus::Uploading {
            let err = SessionError::UploadInFlight;
            self.emit(BoothEvent::Failure(err.to_string()));
            return Err(err.into());
        }
        cancel_timers(&mut core);
        if core.session.status() == SessionStatus::Recording {
            if let Err(e) = core.source.stop_recording() {
                warn!("Recorder did not stop cleanly on mode switch: {e}");
            }
        }

        let want_audio = mode == CaptureMode::Video;
        let live = if core.source.is_live() && core.source.audio_enabled() == want_audio {
            true
        } else {
            match core.source.acquire(want_audio) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Camera unavailable after mode switch: {e}");
                    false
                }
            }
        };

        core.session.set_mode(mode, live);
        self.emit(BoothEvent::ModeChanged(mode));
        if live {
            self.emit(BoothEvent::CameraReady);
        }
        Ok(())
    }

    // ── photo ────────────────────────────────────────────────────────

    /// Start the photo countdown.  A trigger while counting down or
    /// before the camera is ready is a no-op.
    pub async fn trigger_photo(&self) -> Result<(), BoothError> {
        let mut core = self.core.lock().await;
        if core.session.mode() != CaptureMode::Photo {
            debug!("Capture trigger ignored: not in photo mode");
            return Ok(());
        }
        match core.session.begin_countdown() {
            Ok(()) => {}
            Err(SessionError::AlreadyCounting) => {
                debug!("Capture trigger ignored: countdown already running");
                return Ok(());
            }
            Err(SessionError::NotReady) => {
                debug!("Capture trigger ignored: camera not ready");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let token = CancellationToken::new();
        core.countdown = Some(token.clone());
        drop(core);

        let core_ref = self.core.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            for n in (1..=COUNTDOWN_START).rev() {
                let _ = events.send(BoothEvent::CountdownTick(n));
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }

            let mut core = core_ref.lock().await;
            if core.session.status() != SessionStatus::CountingDown {
                // Something reset the session while the last tick slept.
                return;
            }
            core.countdown = None;
            match core.source.still_frame() {
                Ok(jpeg) => {
                    if core.session.complete_photo(CapturedMedia::photo(jpeg)).is_ok() {
                        let _ = events.send(BoothEvent::PhotoCaptured);
                    }
                }
                Err(e) => {
                    let msg = e.to_string();
                    core.session.fail(&msg);
                    let _ = events.send(BoothEvent::Failure(msg));
                }
            }
        });
        Ok(())
    }

    // ── video ────────────────────────────────────────────────────────

    /// Start recording.  The tick task advances the clock once per
    /// second and forces a stop at the cap.
    pub async fn start_recording(&self) -> Result<(), BoothError> {
        let mut core = self.core.lock().await;
        if core.session.mode() != CaptureMode::Video {
            debug!("Record trigger ignored: not in video mode");
            return Ok(());
        }
        match core.session.begin_recording() {
            Ok(()) => {}
            Err(SessionError::AlreadyRecording) => {
                debug!("Record trigger ignored: already recording");
                return Ok(());
            }
            Err(SessionError::NotReady) => {
                debug!("Record trigger ignored: camera not ready");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = core.source.start_recording() {
            let msg = e.to_string();
            core.session.fail(&msg);
            self.emit(BoothEvent::Failure(msg));
            return Err(e.into());
        }

        let token = CancellationToken::new();
        core.recorder = Some(token.clone());
        self.emit(BoothEvent::RecordingStarted);
        drop(core);

        let core_ref = self.core.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                let mut core = core_ref.lock().await;
                if core.session.status() != SessionStatus::Recording {
                    return; // stale tick
                }
                core.source.record_tick();
                match core.session.tick_recording() {
                    Ok(RecordingTick::Running(n)) => {
                        let _ = events.send(BoothEvent::RecordingTick(n));
                    }
                    Ok(RecordingTick::LimitReached) => {
                        let _ = events.send(BoothEvent::RecordingTick(MAX_RECORDING_SECS));
                        info!("Recording cap reached, stopping");
                        finish_recording(&mut core, &events, true);
                        return;
                    }
                    Err(_) => return,
                }
            }
        });
        Ok(())
    }

    /// Stop recording.  Stopping when no recording is active is a no-op;
    /// stopping right away (zero elapsed) is allowed.
    pub async fn stop_recording(&self) -> Result<(), BoothError> {
        let mut core = self.core.lock().await;
        if core.session.status() != SessionStatus::Recording {
            debug!("Stop ignored: not recording");
            return Ok(());
        }
        finish_recording(&mut core, &self.events, false);
        Ok(())
    }

    // ── file ingestion ───────────────────────────────────────────────

    /// Bring a file from disk in as the payload.  Videos go in directly;
    /// images are decoded and re-encoded through the same JPEG path as a
    /// camera shot.  Unsupported types and oversized files are rejected
    /// before anything touches the network.
    pub async fn ingest_file(&self, path: &std::path::Path) -> Result<(), BoothError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        let Some(content_type) = media::content_type_for_extension(&ext) else {
            let msg = format!("unsupported file type: .{ext}");
            self.emit(BoothEvent::Failure(msg));
            return Err(BoothError::UnsupportedFile(ext));
        };

        // The declared length alone decides the cap, so an oversized
        // file is refused without ever being read into memory.
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                self.emit(BoothEvent::Failure(format!("cannot read file: {e}")));
                return Err(e.into());
            }
        };
        if size > self.max_upload_bytes {
            let msg = media::size_limit_message(self.max_upload_bytes / (1024 * 1024));
            self.emit(BoothEvent::Failure(msg.clone()));
            return Err(BoothError::FileTooLarge(msg));
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                self.emit(BoothEvent::Failure(format!("cannot read file: {e}")));
                return Err(e.into());
            }
        };

        let kind = MediaKind::from_content_type(content_type);
        let media = match kind {
            MediaKind::Video => {
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("recording.webm");
                CapturedMedia::ingested_video(content_type, file_name, bytes)
            }
            MediaKind::Image => match reencode_jpeg(&bytes) {
                Ok(jpeg) => CapturedMedia::photo(jpeg),
                Err(e) => {
                    self.emit(BoothEvent::Failure(format!("cannot process image: {e}")));
                    return Err(e);
                }
            },
        };

        let mut core = self.core.lock().await;
        cancel_timers(&mut core);
        if core.session.status() == SessionStatus::Recording {
            core.source.stop_recording().ok();
        }
        let live = core.source.is_live();
        match core.session.ingest(media, live) {
            Ok(()) => {
                info!("Ingested {} file from {}", kind.resource_type(), path.display());
                self.emit(BoothEvent::ModeChanged(core.session.mode()));
                self.emit(BoothEvent::FileIngested(kind));
                Ok(())
            }
            Err(e) => {
                self.emit(BoothEvent::Failure(e.to_string()));
                Err(e.into())
            }
        }
    }

    // ── upload ───────────────────────────────────────────────────────

    /// Upload the captured payload.  Exactly one upload can be in
    /// flight; a second call is rejected as busy.  On success the entry
    /// is prepended to the gallery and the session resets with the
    /// camera kept live; on failure the payload survives for a retry.
    pub async fn upload(&self) -> Result<GalleryEntry, BoothError> {
        let media = {
            let mut core = self.core.lock().await;
            let media = match core.session.begin_upload() {
                Ok(m) => m,
                Err(e) => {
                    self.emit(BoothEvent::Failure(e.to_string()));
                    return Err(e.into());
                }
            };
            if media.bytes.len() as u64 > self.max_upload_bytes {
                let msg = media::size_limit_message(self.max_upload_bytes / (1024 * 1024));
                core.session.fail(&msg);
                self.emit(BoothEvent::Failure(msg.clone()));
                return Err(BoothError::FileTooLarge(msg));
            }
            media
        };

        self.emit(BoothEvent::UploadStarted);
        let result = self.uploader.upload(&media, &self.event_tag).await;

        match result {
            Ok(record) => {
                let entry = gallery::build_entry(&record, &media).await;
                let mut core = self.core.lock().await;
                // The session may have been torn down (camera released)
                // while the request was on the wire; a stale completion
                // must not touch whatever state came after.
                if core.session.status() != SessionStatus::Uploading {
                    warn!(
                        "Upload finished after the session left Uploading ({:?}); dropping result",
                        core.session.status()
                    );
                    return Err(SessionError::InvalidTransition {
                        action: "finish upload",
                        status: core.session.status(),
                    }
                    .into());
                }
                core.gallery.add(entry.clone());
                core.session.complete_upload();
                let live = core.source.is_live();
                core.session.reset(live);
                self.emit(BoothEvent::UploadSucceeded(entry.clone()));
                info!("Upload complete: {}", entry.url);
                Ok(entry)
            }
            Err(e) => {
                let msg = e.to_string();
                let mut core = self.core.lock().await;
                if core.session.status() == SessionStatus::Uploading {
                    core.session.fail(&msg);
                }
                self.emit(BoothEvent::Failure(msg));
                Err(e.into())
            }
        }
    }

    // ── reset / shutdown ─────────────────────────────────────────────

    /// Discard the capture in progress and return to the ready baseline.
    /// Keeps the stream when it is still live, otherwise retries camera
    /// acquisition.  Refused while an upload is in flight, so a retake
    /// can never re-arm the booth under an outstanding request.
    pub async fn reset(&self) {
        let mut core = self.core.lock().await;
        if core.session.status() == SessionStatus::Uploading {
            debug!("Reset refused: upload in flight");
            self.emit(BoothEvent::Failure(
                SessionError::UploadInFlight.to_string(),
            ));
            return;
        }
        cancel_timers(&mut core);
        if core.session.status() == SessionStatus::Recording {
            core.source.stop_recording().ok();
        }
        let live = if core.source.is_live() {
            true
        } else {
            let want_audio = core.session.mode() == CaptureMode::Video;
            core.source.acquire(want_audio).is_ok()
        };
        core.session.reset(live);
        if live {
            self.emit(BoothEvent::CameraReady);
        }
    }

    /// Free the camera on kiosk exit.
    pub async fn release_camera(&self) {
        let mut core = self.core.lock().await;
        cancel_timers(&mut core);
        if core.session.status() == SessionStatus::Recording {
            core.source.stop_recording().ok();
        }
        core.source.release();
        core.session.reset(false);
    }

    // ── introspection ────────────────────────────────────────────────

    pub async fn status(&self) -> SessionStatus {
        self.core.lock().await.session.status()
    }

    pub async fn mode(&self) -> CaptureMode {
        self.core.lock().await.session.mode()
    }

    pub async fn elapsed_secs(&self) -> u32 {
        self.core.lock().await.session.elapsed_secs()
    }

    pub async fn payload(&self) -> Option<CapturedMedia> {
        self.core.lock().await.session.payload().cloned()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.core.lock().await.session.last_error().map(String::from)
    }

    pub async fn gallery_entries(&self) -> Vec<GalleryEntry> {
        self.core.lock().await.gallery.entries().to_vec()
    }

    pub async fn select_entry(&self, index: usize) -> Option<GalleryEntry> {
        self.core.lock().await.gallery.select(index).cloned()
    }
}

/// Cancel both timers.  Transitions that leave `CountingDown` or
/// `Recording` must call this so no stale tick ever lands.
fn cancel_timers(core: &mut BoothCore) {
    if let Some(token) = core.countdown.take() {
        token.cancel();
    }
    if let Some(token) = core.recorder.take() {
        token.cancel();
    }
}

/// Shared by the manual stop and the cap-enforced auto-stop: collect the
/// chunks, assemble the payload, move the session to captured.
fn finish_recording(core: &mut BoothCore, events: &broadcast::Sender<BoothEvent>, auto: bool) {
    if let Some(token) = core.recorder.take() {
        token.cancel();
    }
    let duration_secs = core.session.elapsed_secs();
    match core.source.stop_recording() {
        Ok(chunks) => {
            let media = CapturedMedia::video(chunks.concat(), duration_secs);
            if core.session.finish_recording(media).is_ok() {
                let _ = events.send(BoothEvent::RecordingStopped {
                    auto,
                    duration_secs,
                });
            }
        }
        Err(e) => {
            let msg = e.to_string();
            core.session.fail(&msg);
            let _ = events.send(BoothEvent::Failure(msg));
        }
    }
}

/// Decode an ingested image and re-encode it as JPEG, the same in-memory
/// form a camera still takes.
fn reencode_jpeg(bytes: &[u8]) -> Result<Vec<u8>, BoothError> {
    let img = image::load_from_memory(bytes)?;
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;
    Ok(buf)
}
