//! Microphone permission handling
//!
//! The permission answer is requested once and cached. A denial is reported to
//! the user a single time and never blocks a later start: recording without
//! permission fails at the device layer instead.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::error::CaptureError;

/// Answer to a recording permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

/// Platform permission prompt
#[async_trait::async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request_recording_permission(&self) -> Result<PermissionStatus>;
}

/// User-visible, non-blocking warnings raised by the controller
pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn warn(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Provider with a fixed answer (configuration override, headless hosts)
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub PermissionStatus);

impl StaticPermission {
    pub fn granted() -> Self {
        Self(PermissionStatus::Granted)
    }

    pub fn denied() -> Self {
        Self(PermissionStatus::Denied)
    }
}

#[async_trait::async_trait]
impl PermissionProvider for StaticPermission {
    async fn request_recording_permission(&self) -> Result<PermissionStatus> {
        Ok(self.0)
    }
}

/// Provider that treats an openable default input device as granted
#[cfg(feature = "microphone")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPermission;

#[cfg(feature = "microphone")]
#[async_trait::async_trait]
impl PermissionProvider for SystemPermission {
    async fn request_recording_permission(&self) -> Result<PermissionStatus> {
        let available =
            tokio::task::spawn_blocking(crate::audio::MicrophoneRecorder::input_available).await?;
        Ok(if available {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        })
    }
}

/// Caches the first permission answer and reports a denial exactly once
#[derive(Clone)]
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    notifier: Arc<dyn Notifier>,
    status: Arc<OnceCell<PermissionStatus>>,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            provider,
            notifier,
            status: Arc::new(OnceCell::new()),
        }
    }

    /// Request permission on first call, return the cached answer afterwards
    pub async fn ensure(&self) -> PermissionStatus {
        *self
            .status
            .get_or_init(|| async {
                let status = match self.provider.request_recording_permission().await {
                    Ok(status) => status,
                    Err(e) => {
                        error!("Microphone permission request failed: {}", e);
                        PermissionStatus::Denied
                    }
                };

                info!("Microphone permission: {:?}", status);

                if !status.is_granted() {
                    self.notifier.warn(&CaptureError::PermissionDenied.to_string());
                }

                status
            })
            .await
    }

    /// Cached answer, `None` before the first request
    pub fn status(&self) -> Option<PermissionStatus> {
        self.status.get().copied()
    }
}
