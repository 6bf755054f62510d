use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// How each delivered chunk relates to the capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    /// Every chunk carries the whole capture recorded so far
    #[default]
    Accumulated,
    /// Every chunk carries only the bytes appended since the previous chunk
    Delta,
}

/// One delivered unit of captured audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Start generation that produced this chunk
    pub generation: u64,
    /// Chunk number within the session (0-indexed)
    pub sequence: u64,
    /// When the tick read the capture
    pub captured_at: DateTime<Utc>,
    /// Shape of `data`
    pub mode: ChunkMode,
    /// Encoded audio bytes
    pub data: Vec<u8>,
}

impl AudioChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Receiver of audio chunks supplied by the host
///
/// Called from the controller's timer task. Errors are logged and counted by
/// the controller; they never stop the recording.
pub trait ChunkSink: Send + Sync {
    fn on_audio_data(&self, chunk: AudioChunk) -> Result<()>;
}

impl<F> ChunkSink for F
where
    F: Fn(AudioChunk) -> Result<()> + Send + Sync,
{
    fn on_audio_data(&self, chunk: AudioChunk) -> Result<()> {
        self(chunk)
    }
}

/// Sink forwarding chunks into a bounded channel
///
/// Never waits: a full or closed channel fails the tick instead of stalling the timer.
pub struct ChannelSink {
    tx: mpsc::Sender<AudioChunk>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AudioChunk>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver the host reads chunks from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AudioChunk>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ChunkSink for ChannelSink {
    fn on_audio_data(&self, chunk: AudioChunk) -> Result<()> {
        self.tx.try_send(chunk).map_err(|e| match e {
            mpsc::error::TrySendError::Full(chunk) => {
                anyhow!("Chunk channel full, dropped chunk {}", chunk.sequence)
            }
            mpsc::error::TrySendError::Closed(chunk) => {
                anyhow!("Chunk channel closed, dropped chunk {}", chunk.sequence)
            }
        })
    }
}

/// Turns successive capture reads into chunk payloads according to a `ChunkMode`
///
/// `payload` computes what to send; `mark_delivered` commits it once the sink
/// accepted the chunk. A failed delivery leaves the offset where it was.
#[derive(Debug)]
pub struct ChunkShaper {
    mode: ChunkMode,
    delivered_len: usize,
}

impl ChunkShaper {
    pub fn new(mode: ChunkMode) -> Self {
        Self {
            mode,
            delivered_len: 0,
        }
    }

    pub fn mode(&self) -> ChunkMode {
        self.mode
    }

    /// Payload for this read, or `None` when there is nothing new to deliver
    pub fn payload(&self, content: Vec<u8>) -> Option<Vec<u8>> {
        if content.is_empty() {
            return None;
        }

        match self.mode {
            ChunkMode::Accumulated => Some(content),
            ChunkMode::Delta => {
                if content.len() < self.delivered_len {
                    // Capture shrank: the device started a new file
                    Some(content)
                } else if content.len() == self.delivered_len {
                    None
                } else {
                    Some(content[self.delivered_len..].to_vec())
                }
            }
        }
    }

    /// Record that the capture was delivered up to `capture_len` bytes
    pub fn mark_delivered(&mut self, capture_len: usize) {
        self.delivered_len = capture_len;
    }
}
