use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::ChunkMode;

/// Fixed cadence between two chunk deliveries
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for the capture controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Delay between two ticks of the chunk timer
    /// Default: 100ms
    pub chunk_interval: Duration,

    /// Whether chunks carry the whole capture or only new bytes
    pub chunk_mode: ChunkMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
            chunk_mode: ChunkMode::Accumulated,
        }
    }
}
