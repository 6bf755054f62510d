use thiserror::Error;

/// Device lifecycle step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOperation {
    Prepare,
    Record,
    Stop,
}

impl std::fmt::Display for DeviceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceOperation::Prepare => "prepare",
            DeviceOperation::Record => "record",
            DeviceOperation::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Errors raised by the capture controller
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Microphone permission was refused. Reported to the user once, never blocks recording.
    #[error("Permission to access microphone was denied")]
    PermissionDenied,

    /// Reading or delivering one chunk failed. Logged by the timer, never returned to the host.
    #[error("Failed to extract audio chunk: {0}")]
    TickExtraction(#[source] anyhow::Error),

    #[error("Recording device failed to {operation}: {source}")]
    Device {
        operation: DeviceOperation,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl CaptureError {
    pub fn device(operation: DeviceOperation, source: anyhow::Error) -> Self {
        CaptureError::Device { operation, source }
    }
}
