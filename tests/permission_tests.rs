// Tests for permission caching and the one-time denial warning

mod common;

use anyhow::Result;
use call_capture::{CaptureError, PermissionGate, PermissionProvider, PermissionStatus, StaticPermission};
use common::{CountingPermission, RecordingNotifier};
use std::sync::Arc;

#[tokio::test]
async fn test_gate_requests_permission_once() {
    let provider = Arc::new(CountingPermission::new(PermissionStatus::Granted));
    let notifier = Arc::new(RecordingNotifier::default());
    let gate = PermissionGate::new(provider.clone(), notifier.clone());

    assert_eq!(gate.status(), None, "Nothing cached before the first request");

    for _ in 0..3 {
        assert_eq!(gate.ensure().await, PermissionStatus::Granted);
    }

    assert_eq!(provider.count(), 1);
    assert_eq!(gate.status(), Some(PermissionStatus::Granted));
    assert!(notifier.warnings().is_empty(), "Granted permission raises no warning");
}

#[tokio::test]
async fn test_gate_clones_share_cached_answer() {
    let provider = Arc::new(CountingPermission::new(PermissionStatus::Denied));
    let notifier = Arc::new(RecordingNotifier::default());
    let gate = PermissionGate::new(provider.clone(), notifier.clone());
    let other = gate.clone();

    assert_eq!(gate.ensure().await, PermissionStatus::Denied);
    assert_eq!(other.ensure().await, PermissionStatus::Denied);

    assert_eq!(provider.count(), 1);
    assert_eq!(notifier.warnings(), vec![CaptureError::PermissionDenied.to_string()]);
}

#[tokio::test]
async fn test_undetermined_permission_warns() {
    let provider = Arc::new(CountingPermission::new(PermissionStatus::Undetermined));
    let notifier = Arc::new(RecordingNotifier::default());
    let gate = PermissionGate::new(provider, notifier.clone());

    assert_eq!(gate.ensure().await, PermissionStatus::Undetermined);
    assert_eq!(notifier.warnings().len(), 1);
}

#[tokio::test]
async fn test_provider_error_is_treated_as_denied() {
    let provider = Arc::new(CountingPermission::failing());
    let notifier = Arc::new(RecordingNotifier::default());
    let gate = PermissionGate::new(provider.clone(), notifier.clone());

    assert_eq!(gate.ensure().await, PermissionStatus::Denied);
    assert_eq!(gate.ensure().await, PermissionStatus::Denied);

    assert_eq!(provider.count(), 1, "A failed request is not retried");
    assert_eq!(notifier.warnings().len(), 1);
}

#[tokio::test]
async fn test_static_permission() -> Result<()> {
    assert_eq!(
        StaticPermission::granted().request_recording_permission().await?,
        PermissionStatus::Granted
    );
    assert_eq!(
        StaticPermission::denied().request_recording_permission().await?,
        PermissionStatus::Denied
    );

    Ok(())
}

#[test]
fn test_permission_status_serializes_lowercase() -> Result<()> {
    assert_eq!(serde_json::to_string(&PermissionStatus::Granted)?, "\"granted\"");
    assert!(PermissionStatus::Granted.is_granted());
    assert!(!PermissionStatus::Denied.is_granted());

    Ok(())
}

#[test]
fn test_denial_warning_text() {
    assert_eq!(
        CaptureError::PermissionDenied.to_string(),
        "Permission to access microphone was denied"
    );
}
