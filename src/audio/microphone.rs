// Microphone recording device using cpal
//
// cpal streams are not `Send`, so a dedicated thread owns the input stream for
// the whole recording. Samples are written to a WAV file whose header is
// refreshed every flush, which keeps the file readable while it grows.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::device::{remove_capture_file, CaptureRef, RecorderConfig, RecordingDevice};

type SharedWriter = Arc<Mutex<Option<hound::WavWriter<BufWriter<File>>>>>;

struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Recording device backed by the default input device
pub struct MicrophoneRecorder {
    config: RecorderConfig,
    recording: AtomicBool,
    prepared_path: Mutex<Option<PathBuf>>,
    last_path: Mutex<Option<PathBuf>>,
    capture: Arc<Mutex<Option<CaptureRef>>>,
    thread: Mutex<Option<CaptureThread>>,
}

impl MicrophoneRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            recording: AtomicBool::new(false),
            prepared_path: Mutex::new(None),
            last_path: Mutex::new(None),
            capture: Arc::new(Mutex::new(None)),
            thread: Mutex::new(None),
        }
    }

    /// List input device names on the default host
    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }

    /// Check whether the default input device can be opened for capture
    pub fn input_available() -> bool {
        cpal::default_host()
            .default_input_device()
            .map(|device| device.default_input_config().is_ok())
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl RecordingDevice for MicrophoneRecorder {
    async fn prepare(&self) -> Result<()> {
        if self.is_recording() {
            bail!("Already capturing");
        }

        *self.capture.lock().map_err(|_| anyhow!("Recorder state poisoned"))? = None;

        let previous = self
            .last_path
            .lock()
            .map_err(|_| anyhow!("Recorder state poisoned"))?
            .take();
        if let Some(previous) = previous {
            remove_capture_file(&previous).await;
        }

        tokio::fs::create_dir_all(&self.config.recordings_path)
            .await
            .context("Failed to create recordings directory")?;

        let path = self
            .config
            .recordings_path
            .join(format!("recording-{}.wav", uuid::Uuid::new_v4()));

        *self.last_path.lock().map_err(|_| anyhow!("Recorder state poisoned"))? = Some(path.clone());
        *self.prepared_path.lock().map_err(|_| anyhow!("Recorder state poisoned"))? = Some(path);

        Ok(())
    }

    async fn record(&self) -> Result<()> {
        if self.is_recording() {
            bail!("Already capturing");
        }

        let path = self
            .prepared_path
            .lock()
            .map_err(|_| anyhow!("Recorder state poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("Recorder must be prepared before recording"))?;

        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let capture = Arc::clone(&self.capture);
        let config = self.config.clone();

        let handle = std::thread::Builder::new()
            .name("call-capture-mic".to_string())
            .spawn(move || run_capture_thread(config, path, capture, ready_tx, stop_rx))
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                bail!("Microphone thread exited before starting");
            }
        }

        *self.thread.lock().map_err(|_| anyhow!("Recorder state poisoned"))? =
            Some(CaptureThread { stop_tx, handle });
        self.recording.store(true, Ordering::SeqCst);

        info!("Microphone capture started");

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let thread = self
            .thread
            .lock()
            .map_err(|_| anyhow!("Recorder state poisoned"))?
            .take();

        self.recording.store(false, Ordering::SeqCst);

        let Some(thread) = thread else {
            return Ok(());
        };

        info!("Stopping microphone capture");

        let _ = thread.stop_tx.send(());
        tokio::task::spawn_blocking(move || thread.handle.join())
            .await
            .context("Failed to join microphone thread")?
            .map_err(|_| anyhow!("Microphone thread panicked"))?;

        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn current_capture(&self) -> Option<CaptureRef> {
        self.capture.lock().ok().and_then(|guard| guard.clone())
    }

    async fn read_capture(&self, capture: &CaptureRef) -> Result<Vec<u8>> {
        tokio::fs::read(capture.path())
            .await
            .with_context(|| format!("Failed to read capture: {:?}", capture.path()))
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn run_capture_thread(
    config: RecorderConfig,
    path: PathBuf,
    capture: Arc<Mutex<Option<CaptureRef>>>,
    ready_tx: oneshot::Sender<Result<()>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let (stream, writer) = match open_stream(&config, &path) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));
    let mut published = false;

    loop {
        match stop_rx.recv_timeout(flush_interval) {
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                let mut guard = match writer.lock() {
                    Ok(guard) => guard,
                    Err(_) => break,
                };
                let Some(w) = guard.as_mut() else { break };

                if w.len() == 0 {
                    continue;
                }
                if let Err(e) = w.flush() {
                    error!("Failed to flush microphone capture: {}", e);
                    continue;
                }

                if !published {
                    if let Ok(mut current) = capture.lock() {
                        *current = Some(CaptureRef::new(&path));
                        published = true;
                    }
                }
            }
            // Stop requested or the recorder was dropped
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Err(e) = stream.pause() {
        warn!("Failed to pause input stream: {}", e);
    }
    drop(stream);

    let finished = writer.lock().ok().and_then(|mut guard| guard.take());
    if let Some(w) = finished {
        if let Err(e) = w.finalize() {
            warn!("Failed to finalize microphone capture {:?}: {}", path, e);
        }
    }
}

fn open_stream(config: &RecorderConfig, path: &PathBuf) -> Result<(cpal::Stream, SharedWriter)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No default input device found"))?;

    let supported = find_input_config(&device, config)?;
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();

    info!(
        "Opening input device {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        stream_config.sample_rate.0,
        stream_config.channels,
        sample_format
    );

    let spec = hound::WavSpec {
        channels: stream_config.channels,
        sample_rate: stream_config.sample_rate.0,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    let writer: SharedWriter = Arc::new(Mutex::new(Some(writer)));

    let err_fn = |err| error!("Input stream error: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let writer = Arc::clone(&writer);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    write_samples(&writer, data.iter().map(|&s| {
                        (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                    }));
                },
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let writer = Arc::clone(&writer);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    write_samples(&writer, data.iter().copied());
                },
                err_fn,
                None,
            )
        }
        other => bail!("Unsupported input sample format: {:?}", other),
    }
    .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;

    Ok((stream, writer))
}

/// Pick an input configuration with the configured rate and channel count
fn find_input_config(
    device: &cpal::Device,
    config: &RecorderConfig,
) -> Result<cpal::SupportedStreamConfig> {
    let rate = cpal::SampleRate(config.sample_rate);

    device
        .supported_input_configs()
        .context("Failed to query supported input configs")?
        .filter(|range| {
            matches!(range.sample_format(), cpal::SampleFormat::F32 | cpal::SampleFormat::I16)
        })
        .find(|range| {
            range.channels() == config.channels
                && range.min_sample_rate() <= rate
                && range.max_sample_rate() >= rate
        })
        .map(|range| range.with_sample_rate(rate))
        .ok_or_else(|| {
            anyhow!(
                "Input device does not support {}Hz with {} channel(s)",
                config.sample_rate,
                config.channels
            )
        })
}

fn write_samples(writer: &SharedWriter, samples: impl Iterator<Item = i16>) {
    if let Ok(mut guard) = writer.lock() {
        if let Some(w) = guard.as_mut() {
            for sample in samples {
                if w.write_sample(sample).is_err() {
                    break;
                }
            }
        }
    }
}
