//! The capture session state machine.
//!
//! One session is active per kiosk.  Every transition goes through the
//! methods here; timers and I/O live in the controller, which calls back
//! in with their results.  Methods return [`SessionError`] for calls that
//! are illegal in the current status, so the controller can tell apart
//! "silently ignore" cases (a second capture trigger mid-countdown) from
//! real faults.

use chrono::{DateTime, Local};
use thiserror::Error;

use snapbooth_common::media::{MediaKind, MAX_RECORDING_SECS};

/// Capture mode selected on the kiosk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Photo,
    Video,
}

/// Lifecycle of the active capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    CameraReady,
    CountingDown,
    Recording,
    Captured,
    Uploading,
    Uploaded,
    Error,
}

/// A captured payload waiting for upload.
#[derive(Debug, Clone)]
pub struct CapturedMedia {
    pub kind: MediaKind,
    pub content_type: String,
    /// Filename sent on the multipart part (`photo.jpg`,
    /// `recording.webm`, or the original name of an ingested file).
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Recording length for videos captured on the kiosk.
    pub duration_secs: Option<u32>,
    pub captured_at: DateTime<Local>,
}

impl CapturedMedia {
    /// A still frame from the camera, JPEG-encoded.  Images ingested
    /// from disk take this form too, after re-encoding.
    pub fn photo(bytes: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Image,
            content_type: "image/jpeg".into(),
            file_name: "photo.jpg".into(),
            bytes,
            duration_secs: None,
            captured_at: Local::now(),
        }
    }

    /// A recording assembled from camera chunks.
    pub fn video(bytes: Vec<u8>, duration_secs: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            content_type: "video/webm".into(),
            file_name: "recording.webm".into(),
            bytes,
            duration_secs: Some(duration_secs),
            captured_at: Local::now(),
        }
    }

    /// A video file ingested from disk; keeps its container type and
    /// original file name, no re-encoding.
    pub fn ingested_video(content_type: &str, file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Video,
            content_type: content_type.into(),
            file_name: file_name.into(),
            bytes,
            duration_secs: None,
            captured_at: Local::now(),
        }
    }
}

/// Outcome of one recording-clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingTick {
    Running(u32),
    /// The cap was hit; the caller must stop the recording now.
    LimitReached,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera is not ready")]
    NotReady,
    #[error("countdown already running")]
    AlreadyCounting,
    #[error("already recording")]
    AlreadyRecording,
    #[error("not recording")]
    NotRecording,
    #[error("no captured media to upload")]
    NoPayload,
    #[error("an upload is already in progress")]
    UploadInFlight,
    #[error("cannot {action} while {status:?}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },
}

/// The single active capture session.
#[derive(Debug, Default)]
pub struct CaptureSession {
    mode: CaptureMode,
    status: SessionStatus,
    payload: Option<CapturedMedia>,
    elapsed_secs: u32,
    last_error: Option<String>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn payload(&self) -> Option<&CapturedMedia> {
        self.payload.as_ref()
    }

    /// Recording clock; only meaningful while `Recording`, and the
    /// duration of the last recording right after it stops.
    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Back to the ready baseline, keeping the current mode.  Drops the
    /// payload, the clock, and any stored error.
    pub fn reset(&mut self, camera_live: bool) {
        self.status = if camera_live {
            SessionStatus::CameraReady
        } else {
            SessionStatus::Idle
        };
        self.payload = None;
        self.elapsed_secs = 0;
        self.last_error = None;
    }

    /// Switch capture mode.  Always an implicit reset; the controller
    /// must stop an active recording and cancel timers before calling.
    pub fn set_mode(&mut self, mode: CaptureMode, camera_live: bool) {
        self.mode = mode;
        self.reset(camera_live);
    }

    pub fn mark_camera_ready(&mut self) {
        self.status = SessionStatus::CameraReady;
        self.last_error = None;
    }

    pub fn begin_countdown(&mut self) -> Result<(), SessionError> {
        match (self.mode, self.status) {
            (_, SessionStatus::CountingDown) => Err(SessionError::AlreadyCounting),
            (CaptureMode::Photo, SessionStatus::CameraReady) => {
                self.status = SessionStatus::CountingDown;
                Ok(())
            }
            _ => Err(SessionError::NotReady),
        }
    }

    /// The countdown hit zero and a frame was grabbed.
    pub fn complete_photo(&mut self, media: CapturedMedia) -> Result<(), SessionError> {
        if self.status != SessionStatus::CountingDown {
            return Err(SessionError::InvalidTransition {
                action: "capture",
                status: self.status,
            });
        }
        self.payload = Some(media);
        self.status = SessionStatus::Captured;
        Ok(())
    }

    pub fn begin_recording(&mut self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Recording {
            return Err(SessionError::AlreadyRecording);
        }
        if self.mode != CaptureMode::Video || self.status != SessionStatus::CameraReady {
            return Err(SessionError::NotReady);
        }
        self.elapsed_secs = 0;
        self.status = SessionStatus::Recording;
        Ok(())
    }

    /// Advance the recording clock by one second.  The clock never
    /// passes [`MAX_RECORDING_SECS`]; hitting it demands an immediate
    /// stop from the caller.
    pub fn tick_recording(&mut self) -> Result<RecordingTick, SessionError> {
        if self.status != SessionStatus::Recording {
            return Err(SessionError::NotRecording);
        }
        self.elapsed_secs = (self.elapsed_secs + 1).min(MAX_RECORDING_SECS);
        if self.elapsed_secs >= MAX_RECORDING_SECS {
            Ok(RecordingTick::LimitReached)
        } else {
            Ok(RecordingTick::Running(self.elapsed_secs))
        }
    }

    /// The recorder stopped (manually or at the cap) and handed back the
    /// assembled payload.
    pub fn finish_recording(&mut self, media: CapturedMedia) -> Result<(), SessionError> {
        if self.status != SessionStatus::Recording {
            return Err(SessionError::NotRecording);
        }
        self.payload = Some(media);
        self.status = SessionStatus::Captured;
        Ok(())
    }

    /// A file from disk becomes the payload directly.  Switches mode to
    /// match the media kind, with the usual implicit reset first.
    pub fn ingest(&mut self, media: CapturedMedia, camera_live: bool) -> Result<(), SessionError> {
        if self.status == SessionStatus::Uploading {
            return Err(SessionError::UploadInFlight);
        }
        let mode = match media.kind {
            MediaKind::Video => CaptureMode::Video,
            MediaKind::Image => CaptureMode::Photo,
        };
        self.set_mode(mode, camera_live);
        self.payload = Some(media);
        self.status = SessionStatus::Captured;
        Ok(())
    }

    /// Move to `Uploading` and hand back a copy of the payload for the
    /// network request.  The session keeps the original so a failed
    /// upload can be retried without re-capturing.
    pub fn begin_upload(&mut self) -> Result<CapturedMedia, SessionError> {
        if self.status == SessionStatus::Uploading {
            return Err(SessionError::UploadInFlight);
        }
        let media = self.payload.clone().ok_or(SessionError::NoPayload)?;
        self.status = SessionStatus::Uploading;
        self.last_error = None;
        Ok(media)
    }

    /// The upload went through; the payload is consumed.
    pub fn complete_upload(&mut self) {
        self.payload = None;
        self.status = SessionStatus::Uploaded;
    }

    /// Record a fault.  The payload (if any) survives so an upload can
    /// be retried.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.status = SessionStatus::Error;
    }
}

// ─── tests ───────────────────────────────────────────────────────────────
