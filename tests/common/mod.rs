// Shared fakes for controller tests
//
// The fake device grows an in-memory capture on every read, so tests can
// check chunk cadence, shapes, and failure isolation without audio hardware.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use call_capture::{
    AudioChunk, CaptureConfig, CaptureController, CaptureRef, ChunkSink, Notifier, PermissionGate,
    PermissionProvider, PermissionStatus, RecordingDevice,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeDevice {
    pub prepare_calls: AtomicUsize,
    pub record_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    capture_queries: AtomicUsize,
    recording: AtomicBool,
    content: Mutex<Vec<u8>>,
    /// Number of `current_capture` calls answered with `None`
    capture_after: usize,
    /// 1-based read numbers that fail
    failing_reads: HashSet<usize>,
    /// Bytes appended per read (defaults to 16)
    growth: Option<Vec<usize>>,
    fail_record: bool,
    fail_prepare: bool,
    /// How long `stop` takes to complete
    stop_delay: Option<Duration>,
    /// Ordered record of reads and stops
    events: Mutex<Vec<&'static str>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture_after(mut self, queries: usize) -> Self {
        self.capture_after = queries;
        self
    }

    pub fn failing_read(mut self, read: usize) -> Self {
        self.failing_reads.insert(read);
        self
    }

    /// Bytes appended on each successive read; reads past the end append nothing
    pub fn with_growth(mut self, growth: Vec<usize>) -> Self {
        self.growth = Some(growth);
        self
    }

    pub fn failing_record(mut self) -> Self {
        self.fail_record = true;
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    pub fn with_slow_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    fn log(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }

    pub fn prepares(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn growth_for(&self, read: usize) -> usize {
        match &self.growth {
            None => 16,
            Some(steps) => steps.get(read - 1).copied().unwrap_or(0),
        }
    }
}

#[async_trait]
impl RecordingDevice for FakeDevice {
    async fn prepare(&self) -> Result<()> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_prepare {
            bail!("recordings directory is read-only");
        }
        self.content.lock().unwrap().clear();
        Ok(())
    }

    async fn record(&self) -> Result<()> {
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_record {
            bail!("microphone busy");
        }
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.log("stop-begin");
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        self.recording.store(false, Ordering::SeqCst);
        self.log("stop-end");
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn current_capture(&self) -> Option<CaptureRef> {
        let query = self.capture_queries.fetch_add(1, Ordering::SeqCst) + 1;
        if query <= self.capture_after {
            None
        } else {
            Some(CaptureRef::new("fake://capture.wav"))
        }
    }

    async fn read_capture(&self, _capture: &CaptureRef) -> Result<Vec<u8>> {
        let read = self.read_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log("read");
        if self.failing_reads.contains(&read) {
            return Err(anyhow!("capture file vanished (read {})", read));
        }

        let mut content = self.content.lock().unwrap();
        let grow = self.growth_for(read);
        let next = content.len() as u8;
        content.extend(std::iter::repeat(next).take(grow));
        Ok(content.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
pub struct CollectingSink {
    chunks: Mutex<Vec<AudioChunk>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().iter().map(|c| c.len()).collect()
    }

    pub fn chunks(&self) -> Vec<AudioChunk> {
        self.chunks.lock().unwrap().clone()
    }
}

impl ChunkSink for CollectingSink {
    fn on_audio_data(&self, chunk: AudioChunk) -> Result<()> {
        self.chunks.lock().unwrap().push(chunk);
        Ok(())
    }
}

pub struct CountingPermission {
    status: PermissionStatus,
    fail: bool,
    pub requests: AtomicUsize,
}

impl CountingPermission {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status,
            fail: false,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            status: PermissionStatus::Undetermined,
            fail: true,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for CountingPermission {
    async fn request_recording_permission(&self) -> Result<PermissionStatus> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("permission service unavailable");
        }
        Ok(self.status)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    warnings: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

pub struct Harness {
    pub controller: Arc<CaptureController>,
    pub device: Arc<FakeDevice>,
    pub sink: Arc<CollectingSink>,
    pub permission: Arc<CountingPermission>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(device: FakeDevice) -> Self {
        Self::build(device, PermissionStatus::Granted, CaptureConfig::default())
    }

    pub fn build(device: FakeDevice, status: PermissionStatus, config: CaptureConfig) -> Self {
        Self::with_permission(device, CountingPermission::new(status), config)
    }

    pub fn with_permission(
        device: FakeDevice,
        permission: CountingPermission,
        config: CaptureConfig,
    ) -> Self {
        let device = Arc::new(device);
        let sink = Arc::new(CollectingSink::new());
        let permission = Arc::new(permission);
        let notifier = Arc::new(RecordingNotifier::default());

        let gate = PermissionGate::new(permission.clone(), notifier.clone());
        let controller = Arc::new(CaptureController::new(
            config,
            device.clone(),
            sink.clone(),
            gate,
        ));

        Self {
            controller,
            device,
            sink,
            permission,
            notifier,
        }
    }
}
