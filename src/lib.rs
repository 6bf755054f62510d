pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod permission;

pub use audio::{
    AudioChunk, AudioFile, CaptureRef, ChannelSink, ChunkMode, ChunkSink, RecorderConfig,
    RecorderFactory, RecorderSource, RecordingDevice, ReplayRecorder,
};
pub use capture::{CaptureConfig, CaptureController, CaptureStats};
pub use config::Config;
pub use error::{CaptureError, DeviceOperation};
pub use permission::{
    LogNotifier, Notifier, PermissionGate, PermissionProvider, PermissionStatus, StaticPermission,
};
