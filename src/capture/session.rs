use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::stats::CaptureCounters;
use crate::audio::{AudioChunk, ChunkShaper, ChunkSink, RecordingDevice};
use crate::error::CaptureError;

/// A live recording: the chunk timer plus the generation that started it
///
/// The device itself is shared with the controller; closing a session cancels
/// the timer before the device is stopped.
pub(crate) struct ActiveSession {
    generation: u64,
    started_at: DateTime<Utc>,
    timer: ChunkTimer,
}

impl ActiveSession {
    pub fn new(generation: u64, timer: ChunkTimer) -> Self {
        Self {
            generation,
            started_at: Utc::now(),
            timer,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Cancel the timer, then stop the device if it is still recording
    pub async fn close(self, device: &dyn RecordingDevice) -> Result<()> {
        let ActiveSession {
            generation,
            started_at,
            timer,
        } = self;

        timer.cancel();

        if device.is_recording() {
            device.stop().await?;
        }

        let elapsed = Utc::now().signed_duration_since(started_at);
        info!(
            "Recording session {} closed after {:.1}s",
            generation,
            elapsed.num_milliseconds() as f64 / 1000.0
        );

        Ok(())
    }

    /// Cancel the timer without touching the device
    pub fn abandon(self) {
        self.timer.cancel();
    }
}

/// Handle of a running chunk timer, counted in the controller's live timers
pub(crate) struct ChunkTimer {
    handle: JoinHandle<()>,
    _live: LiveTimerGuard,
}

impl ChunkTimer {
    /// Abort the timer task without waiting for an in-flight tick
    pub fn cancel(self) {
        self.handle.abort();
    }
}

enum TickOutcome {
    Delivered(usize),
    NoCapture,
    NoNewData,
    Stale,
}

/// State owned by one session's timer task
pub(crate) struct TickContext {
    pub generation: u64,
    pub current_generation: Arc<AtomicU64>,
    pub device: Arc<dyn RecordingDevice>,
    pub sink: Arc<dyn ChunkSink>,
    pub counters: Arc<CaptureCounters>,
    pub shaper: ChunkShaper,
    pub sequence: u64,
}

impl TickContext {
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    async fn tick(&mut self) -> Result<TickOutcome, CaptureError> {
        let Some(capture) = self.device.current_capture() else {
            return Ok(TickOutcome::NoCapture);
        };

        let content = self
            .device
            .read_capture(&capture)
            .await
            .map_err(CaptureError::TickExtraction)?;
        let capture_len = content.len();

        let Some(data) = self.shaper.payload(content) else {
            return Ok(TickOutcome::NoNewData);
        };

        // A stop may have landed while the capture was being read
        if !self.is_current() {
            return Ok(TickOutcome::Stale);
        }

        let chunk = AudioChunk {
            generation: self.generation,
            sequence: self.sequence,
            captured_at: Utc::now(),
            mode: self.shaper.mode(),
            data,
        };
        let bytes = chunk.len();

        self.sink
            .on_audio_data(chunk)
            .map_err(CaptureError::TickExtraction)?;

        self.shaper.mark_delivered(capture_len);
        self.sequence += 1;

        Ok(TickOutcome::Delivered(bytes))
    }
}

/// Decrements the live timer count when the timer handle is released
struct LiveTimerGuard(Arc<AtomicUsize>);

impl LiveTimerGuard {
    fn new(live_timers: Arc<AtomicUsize>) -> Self {
        live_timers.fetch_add(1, Ordering::SeqCst);
        Self(live_timers)
    }
}

impl Drop for LiveTimerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawn the chunk timer: first tick one period from now, then every period
///
/// Ticks never overlap; a tick that overruns the period swallows the missed ones.
pub(crate) fn spawn_timer(
    mut ctx: TickContext,
    period: Duration,
    live_timers: Arc<AtomicUsize>,
) -> ChunkTimer {
    let live = LiveTimerGuard::new(live_timers);
    let first_tick = Instant::now() + period;

    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if !ctx.is_current() {
                break;
            }

            let counters = Arc::clone(&ctx.counters);

            match AssertUnwindSafe(ctx.tick()).catch_unwind().await {
                Ok(Ok(TickOutcome::Delivered(bytes))) => {
                    counters.record_delivery(bytes);
                    debug!(
                        "Delivered audio chunk {} ({} bytes, generation {})",
                        ctx.sequence.saturating_sub(1),
                        bytes,
                        ctx.generation
                    );
                }
                Ok(Ok(TickOutcome::NoCapture | TickOutcome::NoNewData)) => {
                    counters.record_skip();
                }
                Ok(Ok(TickOutcome::Stale)) => break,
                Ok(Err(e)) => {
                    counters.record_failure();
                    error!("Error sending audio chunk: {}", e);
                }
                Err(_) => {
                    counters.record_failure();
                    error!("Audio chunk tick panicked (generation {})", ctx.generation);
                }
            }
        }

        debug!("Chunk timer for generation {} finished", ctx.generation);
    });

    ChunkTimer {
        handle,
        _live: live,
    }
}
