use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::CaptureConfig;
use super::session::{spawn_timer, ActiveSession, TickContext};
use super::stats::{CaptureCounters, CaptureStats};
use crate::audio::{ChunkShaper, ChunkSink, RecordingDevice};
use crate::error::{CaptureError, DeviceOperation};
use crate::permission::{PermissionGate, PermissionStatus};

/// Label of the microphone toggle while idle
pub const START_LABEL: &str = "Start Microphone";

/// Label of the microphone toggle while recording
pub const STOP_LABEL: &str = "Stop Microphone";

/// Turns a connection signal into a managed recording and a stream of chunks
///
/// `start` and `stop` are idempotent and serialized, so the connection signal
/// and the manual toggle can drive the same controller in any order.
pub struct CaptureController {
    config: CaptureConfig,
    device: Arc<dyn RecordingDevice>,
    sink: Arc<dyn ChunkSink>,
    permission: PermissionGate,

    /// Active session, if any. Held across start/stop so they never interleave.
    session: Mutex<Option<ActiveSession>>,

    /// Bumped by every start and stop; ticks of older generations never deliver
    generation: Arc<AtomicU64>,

    /// Whether recording is currently active
    recording: AtomicBool,

    counters: Arc<CaptureCounters>,
    live_timers: Arc<AtomicUsize>,
}

impl CaptureController {
    pub fn new(
        config: CaptureConfig,
        device: Arc<dyn RecordingDevice>,
        sink: Arc<dyn ChunkSink>,
        permission: PermissionGate,
    ) -> Self {
        info!(
            "Capture controller created: device={}, interval={}ms, mode={:?}",
            device.name(),
            config.chunk_interval.as_millis(),
            config.chunk_mode
        );

        Self {
            config,
            device,
            sink,
            permission,
            session: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            recording: AtomicBool::new(false),
            counters: Arc::new(CaptureCounters::default()),
            live_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Request microphone permission; a denial is reported once and never blocks
    pub async fn mount(&self) -> PermissionStatus {
        self.permission.ensure().await
    }

    /// React to the host's connection signal
    pub async fn on_connection_change(&self, connected: bool) {
        debug!("Connection changed: connected={}", connected);

        let result = if connected {
            self.start().await
        } else {
            self.stop().await
        };

        if let Err(e) = result {
            error!("Failed to apply connection change (connected={}): {}", connected, e);
        }
    }

    /// Start recording and the chunk timer (no-op while already recording)
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;

        if let Some(active) = session.as_ref() {
            debug!("Recording already started (generation {})", active.generation());
            return Ok(());
        }

        let permission = self.permission.ensure().await;
        if !permission.is_granted() {
            warn!("Starting recording without microphone permission ({:?})", permission);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Starting recording on {} (generation {})", self.device.name(), generation);

        if let Err(e) = self.open_device().await {
            self.recording.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let ctx = TickContext {
            generation,
            current_generation: Arc::clone(&self.generation),
            device: Arc::clone(&self.device),
            sink: Arc::clone(&self.sink),
            counters: Arc::clone(&self.counters),
            shaper: ChunkShaper::new(self.config.chunk_mode),
            sequence: 0,
        };
        let timer = spawn_timer(ctx, self.config.chunk_interval, Arc::clone(&self.live_timers));

        let active = ActiveSession::new(generation, timer);
        self.counters.set_started_at(Some(active.started_at()));
        *session = Some(active);
        self.recording.store(true, Ordering::SeqCst);

        info!("Recording started (generation {})", generation);

        Ok(())
    }

    /// Stop the chunk timer, then the device (no-op while idle)
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;

        self.generation.fetch_add(1, Ordering::SeqCst);

        let result = match session.take() {
            Some(active) => {
                info!("Stopping recording (generation {})", active.generation());
                active.close(self.device.as_ref()).await
            }
            // A failed start can leave the device running without a session
            None if self.device.is_recording() => {
                warn!("Device {} recording without a session, stopping it", self.device.name());
                self.device.stop().await
            }
            None => Ok(()),
        };

        self.recording.store(false, Ordering::SeqCst);
        self.counters.set_started_at(None);

        result.map_err(|e| CaptureError::device(DeviceOperation::Stop, e))
    }

    /// Manual microphone toggle: stop while recording, start while idle
    pub async fn toggle(&self) -> Result<(), CaptureError> {
        if self.is_recording() {
            self.stop().await
        } else {
            self.start().await
        }
    }

    /// Label of the manual toggle for the current state
    pub fn toggle_label(&self) -> &'static str {
        if self.is_recording() {
            STOP_LABEL
        } else {
            START_LABEL
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Number of chunk timers currently alive
    pub fn live_timers(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot(
            self.is_recording(),
            self.generation.load(Ordering::SeqCst),
            self.live_timers(),
        )
    }

    /// Teardown: same cleanup as `stop`
    pub async fn shutdown(&self) -> Result<(), CaptureError> {
        info!("Shutting down capture controller");
        self.stop().await
    }

    /// Follow a connection signal until its sender is dropped or the controller goes away
    pub fn watch_connection(self: &Arc<Self>, mut connected: watch::Receiver<bool>) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);

        tokio::spawn(async move {
            let initial = *connected.borrow_and_update();
            match controller.upgrade() {
                Some(c) => c.on_connection_change(initial).await,
                None => return,
            }

            while connected.changed().await.is_ok() {
                let value = *connected.borrow_and_update();
                let Some(c) = controller.upgrade() else {
                    break;
                };
                c.on_connection_change(value).await;
            }

            debug!("Connection watcher finished");
        })
    }

    async fn open_device(&self) -> Result<(), CaptureError> {
        if let Err(e) = self.device.prepare().await {
            self.release_device().await;
            return Err(CaptureError::device(DeviceOperation::Prepare, e));
        }

        if let Err(e) = self.device.record().await {
            self.release_device().await;
            return Err(CaptureError::device(DeviceOperation::Record, e));
        }

        Ok(())
    }

    async fn release_device(&self) {
        if self.device.is_recording() {
            if let Err(e) = self.device.stop().await {
                error!("Failed to release device {}: {}", self.device.name(), e);
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let Some(active) = self.session.get_mut().take() else {
            return;
        };

        active.abandon();
        self.recording.store(false, Ordering::SeqCst);

        if !self.device.is_recording() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let device = Arc::clone(&self.device);
                handle.spawn(async move {
                    if let Err(e) = device.stop().await {
                        error!("Failed to stop device {} on teardown: {}", device.name(), e);
                    }
                });
            }
            Err(_) => warn!(
                "Capture controller dropped outside a runtime; device {} left recording",
                self.device.name()
            ),
        }
    }
}
