use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{ChunkMode, RecorderConfig};
use crate::capture::CaptureConfig;
use crate::error::CaptureError;
use crate::permission::PermissionStatus;

/// Prefix of environment overrides, e.g. `CALL_CAPTURE__CAPTURE__CHUNK_MODE=delta`
pub const ENV_PREFIX: &str = "CALL_CAPTURE";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureSettings,
    pub recorder: RecorderSettings,
    pub permission: PermissionSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptureSettings {
    pub chunk_interval_ms: u64,
    pub chunk_mode: ChunkMode,
}

#[derive(Debug, Deserialize)]
pub struct RecorderSettings {
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Ask the platform (microphone builds), otherwise treated as granted
    System,
    Granted,
    Denied,
}

#[derive(Debug, Deserialize)]
pub struct PermissionSettings {
    pub mode: PermissionMode,
}

impl Config {
    /// Load built-in defaults, then `path` (any format the config crate knows, optional),
    /// then `CALL_CAPTURE__*` environment variables
    pub fn load(path: &str) -> Result<Self, CaptureError> {
        let recordings_path = std::env::temp_dir().join("call-capture");

        let settings = config::Config::builder()
            .set_default("service.name", "call-capture")?
            .set_default("capture.chunk_interval_ms", 100_i64)?
            .set_default("capture.chunk_mode", "accumulated")?
            .set_default("recorder.recordings_path", recordings_path.display().to_string())?
            .set_default("recorder.sample_rate", 44100_i64)?
            .set_default("recorder.channels", 1_i64)?
            .set_default("recorder.flush_interval_ms", 50_i64)?
            .set_default("permission.mode", "system")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            chunk_interval: Duration::from_millis(self.capture.chunk_interval_ms.max(1)),
            chunk_mode: self.capture.chunk_mode,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            recordings_path: PathBuf::from(&self.recorder.recordings_path),
            sample_rate: self.recorder.sample_rate,
            channels: self.recorder.channels,
            flush_interval_ms: self.recorder.flush_interval_ms,
        }
    }

    /// Fixed permission answer, `None` when the platform should be asked
    pub fn permission_override(&self) -> Option<PermissionStatus> {
        match self.permission.mode {
            PermissionMode::System => None,
            PermissionMode::Granted => Some(PermissionStatus::Granted),
            PermissionMode::Denied => Some(PermissionStatus::Denied),
        }
    }
}
