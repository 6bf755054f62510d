pub mod chunk;
pub mod device;
pub mod file;
pub mod replay;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use chunk::{AudioChunk, ChannelSink, ChunkMode, ChunkShaper, ChunkSink};
pub use device::{CaptureRef, RecorderConfig, RecorderFactory, RecorderSource, RecordingDevice};
pub use file::AudioFile;
pub use replay::ReplayRecorder;

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneRecorder;
