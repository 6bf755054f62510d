use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Snapshot of the controller's activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Whether a recording session is active
    pub is_recording: bool,

    /// Current start generation
    pub generation: u64,

    /// When the active session started
    pub started_at: Option<DateTime<Utc>>,

    /// Chunks handed to the sink
    pub chunks_delivered: u64,

    /// Total payload bytes handed to the sink
    pub bytes_delivered: u64,

    /// Ticks with no capture available yet or nothing new to send
    pub ticks_skipped: u64,

    /// Ticks whose extraction or delivery failed
    pub tick_failures: u64,

    /// Chunk timers currently alive (never more than 1)
    pub live_timers: usize,
}

/// Counters shared between the controller and its timer task
#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    chunks_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
    ticks_skipped: AtomicU64,
    tick_failures: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl CaptureCounters {
    pub fn record_delivery(&self, bytes: usize) {
        self.chunks_delivered.fetch_add(1, Ordering::SeqCst);
        self.bytes_delivered.fetch_add(bytes as u64, Ordering::SeqCst);
    }

    pub fn record_skip(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.tick_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_started_at(&self, value: Option<DateTime<Utc>>) {
        match self.started_at.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn snapshot(&self, is_recording: bool, generation: u64, live_timers: usize) -> CaptureStats {
        let started_at = match self.started_at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };

        CaptureStats {
            is_recording,
            generation,
            started_at,
            chunks_delivered: self.chunks_delivered.load(Ordering::SeqCst),
            bytes_delivered: self.bytes_delivered.load(Ordering::SeqCst),
            ticks_skipped: self.ticks_skipped.load(Ordering::SeqCst),
            tick_failures: self.tick_failures.load(Ordering::SeqCst),
            live_timers,
        }
    }
}
