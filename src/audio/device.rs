use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reference to the capture a device is currently producing
///
/// The file-backed recorders hand out the path of the WAV file being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRef {
    path: PathBuf,
}

impl CaptureRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Configuration for recording devices
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory where recordings in progress are written. Each device keeps
    /// only its latest capture; the previous one is removed on `prepare`.
    pub recordings_path: PathBuf,
    /// Sample rate of the capture in Hz
    pub sample_rate: u32,
    /// Channels of the capture (1 = mono, 2 = stereo)
    pub channels: u16,
    /// How often buffered samples are flushed to the capture file
    pub flush_interval_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_path: std::env::temp_dir().join("call-capture"),
            sample_rate: 44100,
            channels: 1,
            flush_interval_ms: 50,
        }
    }
}

/// Recording device abstraction
///
/// Implementations:
/// - `ReplayRecorder`: replays a WAV file in real time (testing, no microphone needed)
/// - `MicrophoneRecorder`: cpal input stream (feature `microphone`)
///
/// All methods take `&self` so the controller can read the capture from its
/// timer task while lifecycle calls go through the same handle.
#[async_trait::async_trait]
pub trait RecordingDevice: Send + Sync {
    /// Get the device ready to record (open files, claim resources)
    async fn prepare(&self) -> Result<()>;

    /// Begin recording into the prepared capture
    async fn record(&self) -> Result<()>;

    /// Stop recording and release the device
    async fn stop(&self) -> Result<()>;

    /// Check if the device is currently recording
    fn is_recording(&self) -> bool;

    /// Reference to the current capture, `None` until data has been buffered
    fn current_capture(&self) -> Option<CaptureRef>;

    /// Read everything recorded so far
    async fn read_capture(&self, capture: &CaptureRef) -> Result<Vec<u8>>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Delete a capture left behind by the previous session
pub(crate) async fn remove_capture_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed previous capture {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove previous capture {:?}: {}", path, e),
    }
}

/// Where recorded audio comes from
#[derive(Debug, Clone)]
pub enum RecorderSource {
    /// Default input device (requires the `microphone` feature)
    Microphone,
    /// Replay a WAV file as if it were being recorded live
    Replay(PathBuf),
}

/// Recording device factory
pub struct RecorderFactory;

impl RecorderFactory {
    pub fn create(source: RecorderSource, config: RecorderConfig) -> Result<Arc<dyn RecordingDevice>> {
        match source {
            RecorderSource::Replay(path) => {
                let recorder = super::replay::ReplayRecorder::new(path, config);
                Ok(Arc::new(recorder))
            }

            RecorderSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    let recorder = super::microphone::MicrophoneRecorder::new(config);
                    Ok(Arc::new(recorder))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires building with the `microphone` feature")
                }
            }
        }
    }
}
