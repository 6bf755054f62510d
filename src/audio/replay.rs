// Replay recording device
//
// Plays a WAV file into a capture file at wall-clock speed, so the capture
// grows exactly like a live microphone recording would. Used for tests and
// for running the CLI on machines without an input device.
//
// The source is converted to the configured sample rate and channel count.
// File work runs on the blocking pool. The latest capture stays on disk until
// the next prepare replaces it.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::device::{remove_capture_file, CaptureRef, RecorderConfig, RecordingDevice};
use super::file::AudioFile;

type WavFileWriter = hound::WavWriter<BufWriter<File>>;

enum ReplayState {
    Idle,
    Prepared(PreparedReplay),
    Recording(RunningReplay),
}

struct PreparedReplay {
    audio: AudioFile,
    writer: WavFileWriter,
    path: PathBuf,
}

struct RunningReplay {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<Result<usize>>,
}

/// Recording device that replays a WAV file in real time
pub struct ReplayRecorder {
    source: PathBuf,
    config: RecorderConfig,
    name: String,
    recording: AtomicBool,
    capture: Arc<Mutex<Option<CaptureRef>>>,
    last_path: Mutex<Option<PathBuf>>,
    state: tokio::sync::Mutex<ReplayState>,
}

impl ReplayRecorder {
    pub fn new(source: impl Into<PathBuf>, config: RecorderConfig) -> Self {
        let source = source.into();
        let name = format!("replay:{}", source.display());

        Self {
            source,
            config,
            name,
            recording: AtomicBool::new(false),
            capture: Arc::new(Mutex::new(None)),
            last_path: Mutex::new(None),
            state: tokio::sync::Mutex::new(ReplayState::Idle),
        }
    }

    fn set_capture(capture: &Mutex<Option<CaptureRef>>, value: Option<CaptureRef>) {
        match capture.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    fn swap_last_path(&self, value: Option<PathBuf>) -> Option<PathBuf> {
        match self.last_path.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, value),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), value),
        }
    }
}

#[async_trait::async_trait]
impl RecordingDevice for ReplayRecorder {
    async fn prepare(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, ReplayState::Recording(_)) {
            bail!("Already recording");
        }

        // Drops the writer of a capture that was prepared but never recorded
        *state = ReplayState::Idle;
        Self::set_capture(&self.capture, None);

        if let Some(previous) = self.swap_last_path(None) {
            remove_capture_file(&previous).await;
        }

        let source = self.source.clone();
        let config = self.config.clone();
        let prepared = tokio::task::spawn_blocking(move || open_replay(&source, &config))
            .await
            .context("Replay setup task failed")??;

        self.swap_last_path(Some(prepared.path.clone()));
        *state = ReplayState::Prepared(prepared);

        Ok(())
    }

    async fn record(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let prepared = match std::mem::replace(&mut *state, ReplayState::Idle) {
            ReplayState::Prepared(prepared) => prepared,
            ReplayState::Recording(running) => {
                *state = ReplayState::Recording(running);
                bail!("Already recording");
            }
            ReplayState::Idle => bail!("Recorder must be prepared before recording"),
        };

        let (stop_tx, stop_rx) = std_mpsc::channel();
        let capture = Arc::clone(&self.capture);
        let flush_interval = Duration::from_millis(self.config.flush_interval_ms.max(1));

        let handle = tokio::task::spawn_blocking(move || {
            write_replay(prepared, capture, flush_interval, stop_rx)
        });

        *state = ReplayState::Recording(RunningReplay { stop_tx, handle });
        self.recording.store(true, Ordering::SeqCst);

        info!("Replay recording started: {}", self.name);

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let running = match std::mem::replace(&mut *state, ReplayState::Idle) {
            ReplayState::Recording(running) => running,
            ReplayState::Prepared(_) | ReplayState::Idle => {
                self.recording.store(false, Ordering::SeqCst);
                return Ok(());
            }
        };

        info!("Stopping replay recording: {}", self.name);

        // The writer may already be gone if it failed; the join result carries why
        let _ = running.stop_tx.send(());
        self.recording.store(false, Ordering::SeqCst);

        match running.handle.await {
            Ok(Ok(frames)) => {
                info!("Replay recording stopped ({} frames written)", frames);
                Ok(())
            }
            Ok(Err(e)) => Err(e.context("Replay writer failed")),
            Err(e) => bail!("Replay writer task panicked: {}", e),
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn current_capture(&self) -> Option<CaptureRef> {
        match self.capture.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn read_capture(&self, capture: &CaptureRef) -> Result<Vec<u8>> {
        tokio::fs::read(capture.path())
            .await
            .with_context(|| format!("Failed to read capture: {:?}", capture.path()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load and convert the source, then create the capture file
fn open_replay(source: &Path, config: &RecorderConfig) -> Result<PreparedReplay> {
    let audio = AudioFile::open(source)?.converted(config.sample_rate, config.channels);

    fs::create_dir_all(&config.recordings_path)
        .context("Failed to create recordings directory")?;

    let path = config
        .recordings_path
        .join(format!("recording-{}.wav", uuid::Uuid::new_v4()));

    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let writer = hound::WavWriter::create(&path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

    info!(
        "Replay recorder prepared: {} -> {} ({}Hz, {} channels)",
        source.display(),
        path.display(),
        audio.sample_rate,
        audio.channels
    );

    Ok(PreparedReplay { audio, writer, path })
}

/// Append the frames due by wall-clock time until told to stop, then finalize
fn write_replay(
    prepared: PreparedReplay,
    capture: Arc<Mutex<Option<CaptureRef>>>,
    flush_interval: Duration,
    stop_rx: std_mpsc::Receiver<()>,
) -> Result<usize> {
    let PreparedReplay {
        audio,
        mut writer,
        path,
    } = prepared;

    let started = Instant::now();
    let mut written_frames = 0;
    let mut published = false;

    loop {
        match stop_rx.recv_timeout(flush_interval) {
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            // Stop requested or the recorder was dropped
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let due = audio.frames_at(started.elapsed().as_millis() as u64);
        if due <= written_frames {
            continue;
        }

        for &sample in audio.frame_range(written_frames, due) {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.flush().context("Failed to flush WAV file")?;

        debug!("Replay wrote frames {}..{}", written_frames, due);
        written_frames = due;

        if !published {
            ReplayRecorder::set_capture(&capture, Some(CaptureRef::new(&path)));
            published = true;
        }
    }

    if let Err(e) = writer.finalize() {
        warn!("Failed to finalize replay capture {:?}: {}", path, e);
    }

    Ok(written_frames)
}
