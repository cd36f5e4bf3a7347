//! Camera sources – the seam between the state machine and hardware.
//!
//! The controller acquires and releases a [`CameraSource`], grabs still
//! frames from it, and collects recording chunks through it.
//! [`FfmpegCamera`] drives a V4L2 device with ffmpeg child processes;
//! [`SyntheticCamera`] produces a deterministic test pattern with no
//! hardware at all, selected with `CAMERA_DEVICE=synthetic`.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, info, warn};

use snapbooth_common::media::MAX_RECORDING_SECS;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("camera access denied: {0}")]
    AccessDenied(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera is not live")]
    NotLive,
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("recorder failed: {0}")]
    Recorder(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A camera the booth can drive.
pub trait CameraSource: Send {
    /// Attach to the device.  `with_audio` requests the microphone too
    /// (video mode).  Failures are reported, never silently retried.
    fn acquire(&mut self, with_audio: bool) -> Result<(), SourceError>;

    fn is_live(&self) -> bool;

    /// Whether the current stream includes audio.
    fn audio_enabled(&self) -> bool;

    /// Grab one still frame from the live feed, JPEG-encoded at the
    /// feed's native resolution.
    fn still_frame(&mut self) -> Result<Vec<u8>, SourceError>;

    fn start_recording(&mut self) -> Result<(), SourceError>;

    /// Called once per second of recording; sources that produce chunks
    /// on a clock append one here.
    fn record_tick(&mut self) {}

    /// Stop recording and return the chunks in capture order.
    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>, SourceError>;

    /// Detach from the device and free it.
    fn release(&mut self);
}

// ── Synthetic test pattern ───────────────────────────────────────────────

/// A camera that renders a gradient test pattern.  One second of
/// recording produces one fixed-size chunk, so timer behavior can be
/// tested end to end without hardware.
pub struct SyntheticCamera {
    live: bool,
    with_audio: bool,
    deny: bool,
    frame_no: u32,
    recording: bool,
    chunks: Vec<Vec<u8>>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            live: false,
            with_audio: false,
            deny: false,
            frame_no: 0,
            recording: false,
            chunks: Vec::new(),
        }
    }

    /// A camera that refuses access, for permission-failure paths.
    pub fn denied() -> Self {
        Self { deny: true, ..Self::new() }
    }

    /// Lift the refusal, so a retry after a denied acquire can succeed.
    pub fn allow(&mut self) {
        self.deny = false;
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSource for SyntheticCamera {
    fn acquire(&mut self, with_audio: bool) -> Result<(), SourceError> {
        if self.deny {
            return Err(SourceError::AccessDenied(
                "camera permission denied".into(),
            ));
        }
        self.with_audio = with_audio;
        self.live = true;
        info!("Synthetic camera attached (audio={with_audio})");
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn audio_enabled(&self) -> bool {
        self.with_audio
    }

    fn still_frame(&mut self) -> Result<Vec<u8>, SourceError> {
        if !self.live {
            return Err(SourceError::NotLive);
        }
        self.frame_no += 1;
        test_frame_jpeg(self.frame_no)
    }

    fn start_recording(&mut self) -> Result<(), SourceError> {
        if !self.live {
            return Err(SourceError::NotLive);
        }
        self.chunks.clear();
        self.recording = true;
        Ok(())
    }

    fn record_tick(&mut self) {
        if self.recording {
            let n = self.chunks.len() as u32;
            self.chunks.push(test_chunk(n));
        }
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>, SourceError> {
        if !self.recording {
            return Ok(Vec::new());
        }
        self.recording = false;
        // An immediate stop still yields one chunk, like a recorder
        // flushing its buffer.
        if self.chunks.is_empty() {
            self.chunks.push(test_chunk(0));
        }
        Ok(std::mem::take(&mut self.chunks))
    }

    fn release(&mut self) {
        self.live = false;
        self.recording = false;
        self.chunks.clear();
    }
}

/// Gradient frame, stamped with the frame number so successive captures
/// differ.
fn test_frame_jpeg(frame_no: u32) -> Result<Vec<u8>, SourceError> {
    let (w, h) = (640u32, 480u32);
    let img = image::RgbImage::from_fn(w, h, |x, y| {
        let r = (x * 255 / w) as u8;
        let g = (y * 255 / h) as u8;
        let b = (frame_no.wrapping_mul(37) % 256) as u8;
        image::Rgb([r, g, b])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(|e| SourceError::Encode(e.to_string()))?;
    Ok(buf)
}

/// One second of synthetic recording.  Content is arbitrary but
/// deterministic; callers only care about size and order.
fn test_chunk(n: u32) -> Vec<u8> {
    (0..4096u32)
        .map(|i| (n.wrapping_mul(131).wrapping_add(i) % 251) as u8)
        .collect()
}

// ── V4L2 camera via ffmpeg ───────────────────────────────────────────────

/// Drives a V4L2 device with ffmpeg child processes: one-shot `ffmpeg`
/// invocations for stills, a long-running child piping webm to us for
/// recordings.
pub struct FfmpegCamera {
    device: String,
    live: bool,
    with_audio: bool,
    recorder: Option<Recorder>,
}

struct Recorder {
    child: Child,
    reader: JoinHandle<Vec<Vec<u8>>>,
    /// Set when the child is seen dead before a stop was requested.
    failed: Option<String>,
}

impl FfmpegCamera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            live: false,
            with_audio: false,
            recorder: None,
        }
    }
}

impl CameraSource for FfmpegCamera {
    fn acquire(&mut self, with_audio: bool) -> Result<(), SourceError> {
        if !std::path::Path::new(&self.device).exists() {
            return Err(SourceError::Unavailable(format!(
                "no such device: {}",
                self.device
            )));
        }
        self.with_audio = with_audio;
        self.live = true;
        info!("Camera attached: {} (audio={with_audio})", self.device);
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn audio_enabled(&self) -> bool {
        self.with_audio
    }

    fn still_frame(&mut self) -> Result<Vec<u8>, SourceError> {
        if !self.live {
            return Err(SourceError::NotLive);
        }
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-f", "v4l2", "-i", &self.device])
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"])
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() || output.stdout.is_empty() {
            let err = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Recorder(format!(
                "still frame grab failed: {}",
                err.trim()
            )));
        }
        debug!("Still frame grabbed ({} bytes)", output.stdout.len());
        Ok(output.stdout)
    }

    fn start_recording(&mut self) -> Result<(), SourceError> {
        if !self.live {
            return Err(SourceError::NotLive);
        }
        if self.recorder.is_some() {
            return Ok(());
        }

        // The recording timer stops us at the cap; -t is the child's own
        // bound in case the kiosk dies mid-recording.
        let hard_limit = (MAX_RECORDING_SECS + 1).to_string();

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        cmd.args(["-f", "v4l2", "-i", &self.device]);
        if self.with_audio {
            cmd.args(["-f", "alsa", "-i", "default", "-c:a", "libvorbis"]);
        } else {
            cmd.arg("-an");
        }
        cmd.args(["-c:v", "libvpx", "-b:v", "1M", "-t", &hard_limit]);
        cmd.args(["-f", "webm", "pipe:1"]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(
            "Spawning recorder: ffmpeg -f v4l2 -i {} {} -c:v libvpx -t {hard_limit} -f webm",
            self.device,
            if self.with_audio { "-f alsa -i default" } else { "-an" },
        );

        let mut child = cmd.spawn()?;

        // No waiting here: the caller holds the booth lock, so a bad
        // device is caught by the per-second tick instead (see
        // `record_tick`).  This only notices an instant exec failure.
        if let Ok(Some(status)) = child.try_wait() {
            let mut err = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                stderr.read_to_string(&mut err).ok();
            }
            return Err(SourceError::Recorder(format!(
                "ffmpeg exited immediately with {status}: {}",
                err.trim()
            )));
        }

        let stdout = child.stdout.take().ok_or_else(|| {
            SourceError::Recorder("recorder stdout pipe missing".into())
        })?;
        let reader = std::thread::Builder::new()
            .name("recorder-drain".into())
            .spawn(move || drain_chunks(stdout))?;

        // Drain stderr too so the pipe buffer never fills up and blocks
        // ffmpeg.
        if let Some(stderr) = child.stderr.take() {
            std::thread::Builder::new()
                .name("recorder-stderr".into())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines() {
                        match line {
                            Ok(l) if l.is_empty() => {}
                            Ok(l) => warn!("[ffmpeg] {l}"),
                            Err(_) => break,
                        }
                    }
                })
                .ok();
        }

        self.recorder = Some(Recorder {
            child,
            reader,
            failed: None,
        });
        Ok(())
    }

    /// The recording clock drives liveness checks: a child that died
    /// (bad device, codec error) is flagged here so the stop reports it.
    fn record_tick(&mut self) {
        if let Some(rec) = self.recorder.as_mut() {
            if rec.failed.is_none() {
                if let Ok(Some(status)) = rec.child.try_wait() {
                    warn!("Recorder exited early with {status}");
                    rec.failed = Some(format!("recorder exited early with {status}"));
                }
            }
        }
    }

    fn stop_recording(&mut self) -> Result<Vec<Vec<u8>>, SourceError> {
        let Some(mut rec) = self.recorder.take() else {
            return Ok(Vec::new());
        };
        rec.child.kill().ok();
        rec.child.wait().ok();
        let chunks = rec.reader.join().unwrap_or_default();
        if let Some(msg) = rec.failed {
            return Err(SourceError::Recorder(msg));
        }
        info!(
            "Recorder stopped ({} chunks, {} bytes)",
            chunks.len(),
            chunks.iter().map(Vec::len).sum::<usize>()
        );
        Ok(chunks)
    }

    fn release(&mut self) {
        if let Some(mut rec) = self.recorder.take() {
            rec.child.kill().ok();
            rec.child.wait().ok();
            rec.reader.join().ok();
        }
        self.live = false;
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read the recorder's stdout into chunks until the child exits.
fn drain_chunks(mut stdout: ChildStdout) -> Vec<Vec<u8>> {
    const CHUNK: usize = 256 * 1024;
    let mut chunks = Vec::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => chunks.push(buf[..n].to_vec()),
            Err(_) => break,
        }
    }
    chunks
}

/// Build the camera named by `CAMERA_DEVICE`.
pub fn from_config(camera_device: &str) -> Box<dyn CameraSource> {
    if camera_device == "synthetic" {
        Box::new(SyntheticCamera::new())
    } else {
        Box::new(FfmpegCamera::new(camera_device))
    }
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frames_differ() {
        let mut cam = SyntheticCamera::new();
        cam.acquire(false).unwrap();
        let a = cam.still_frame().unwrap();
        let b = cam.still_frame().unwrap();
        assert!(!a.is_empty());
        assert_ne!(a, b);
        // JPEG magic.
        assert_eq!(&a[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_synthetic_requires_acquire() {
        let mut cam = SyntheticCamera::new();
        assert!(matches!(cam.still_frame(), Err(SourceError::NotLive)));
        assert!(matches!(cam.start_recording(), Err(SourceError::NotLive)));
    }

    #[test]
    fn test_denied_camera_then_allowed() {
        let mut cam = SyntheticCamera::denied();
        assert!(matches!(
            cam.acquire(false),
            Err(SourceError::AccessDenied(_))
        ));
        assert!(!cam.is_live());

        cam.allow();
        cam.acquire(true).unwrap();
        assert!(cam.is_live());
        assert!(cam.audio_enabled());
    }

    #[test]
    fn test_synthetic_chunk_per_tick() {
        let mut cam = SyntheticCamera::new();
        cam.acquire(true).unwrap();
        cam.start_recording().unwrap();
        for _ in 0..5 {
            cam.record_tick();
        }
        let chunks = cam.stop_recording().unwrap();
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 4096));
    }

    #[test]
    fn test_immediate_stop_still_yields_payload() {
        let mut cam = SyntheticCamera::new();
        cam.acquire(true).unwrap();
        cam.start_recording().unwrap();
        let chunks = cam.stop_recording().unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_stop_without_start_is_empty() {
        let mut cam = SyntheticCamera::new();
        cam.acquire(true).unwrap();
        assert!(cam.stop_recording().unwrap().is_empty());
    }

    #[test]
    fn test_ffmpeg_recorder_death_reported_on_stop() {
        // /dev/null exists but is no V4L2 device, so the recorder child
        // dies right away; the tick must flag it and the stop report it.
        let mut cam = FfmpegCamera::new("/dev/null");
        cam.acquire(false).unwrap();
        match cam.start_recording() {
            // No ffmpeg on this machine: the spawn failure is the error.
            Err(_) => {}
            Ok(()) => {
                std::thread::sleep(std::time::Duration::from_millis(700));
                cam.record_tick();
                assert!(matches!(
                    cam.stop_recording(),
                    Err(SourceError::Recorder(_))
                ));
            }
        }
    }

    #[test]
    fn test_ffmpeg_acquire_missing_device() {
        let mut cam = FfmpegCamera::new("/dev/video-does-not-exist");
        assert!(matches!(
            cam.acquire(false),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_source_selection() {
        let mut synthetic = from_config("synthetic");
        assert!(synthetic.acquire(false).is_ok());

        let mut real = from_config("/dev/video-does-not-exist");
        assert!(real.acquire(false).is_err());
    }
}
