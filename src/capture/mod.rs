//! Chunked audio capture
//!
//! This module provides the `CaptureController` that manages:
//! - Microphone permission (requested once, never blocking)
//! - Start/stop of the recording device, driven by a connection signal or a manual toggle
//! - A 100ms chunk timer delivering the capture to the host's sink
//! - Ordered teardown: timer first, device second

mod config;
mod controller;
mod session;
mod stats;

pub use config::{CaptureConfig, DEFAULT_CHUNK_INTERVAL};
pub use controller::{CaptureController, START_LABEL, STOP_LABEL};
pub use stats::CaptureStats;
