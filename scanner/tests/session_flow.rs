//! End-to-end tests for a scanner session
//!
//! A session runs the real decode source, store and reducer. The camera is a
//! channel-fed device and the redemption service a scripted mock, so every
//! flow here is exactly what the desk does at the door.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use admission_core::environment::Clock;
use admission_scanner::admission::state::{
    CAMERA_UNAVAILABLE_MESSAGE, EMPTY_MANUAL_PROMPT, SERVICE_ERROR_MESSAGE,
};
use admission_scanner::decode_source::{ChannelCaptureDevice, Frame, PassThroughDecoder};
use admission_scanner::redemption::{MockRedemptionService, MockReply};
use admission_scanner::{
    AdmissionPolicy, RedemptionError, RedemptionResponse, RedemptionStatus, ScanMethod,
    ScanStatus, ScannerAction, ScannerSession, ScannerView, SessionSettings,
};
use admission_testing::test_clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

// ============================================================================
// Test Fixtures
// ============================================================================

const VALID_QR: &str = "https://event.example/scan?ticketId=T1&nonce=abc";

fn settings() -> SessionSettings {
    SessionSettings {
        event_name: "RustConf".to_string(),
        clock: Arc::new(test_clock()),
        ..SessionSettings::default()
    }
}

async fn start_with(
    service: &MockRedemptionService,
    settings: SessionSettings,
) -> (ScannerSession, UnboundedSender<Frame>) {
    let (device, frames) = ChannelCaptureDevice::new();
    let session = ScannerSession::start(
        Box::new(device),
        Arc::new(PassThroughDecoder),
        service.clone().shared(),
        settings,
    )
    .await
    .unwrap();
    (session, frames)
}

/// Poll the session until `done` holds for its view
async fn wait_for<F>(session: &ScannerSession, done: F) -> ScannerView
where
    F: Fn(&ScannerView) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = session.snapshot().await;
            if done(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("session did not reach the expected state")
}

async fn wait_for_status(session: &ScannerSession, status: RedemptionStatus) -> ScannerView {
    wait_for(session, |view| view.status == status).await
}

// ============================================================================
// Door scenarios
// ============================================================================

#[tokio::test]
async fn valid_qr_is_admitted_and_recorded() {
    let service = MockRedemptionService::scripted([MockReply::Respond(
        RedemptionResponse::admitted("ok"),
    )]);
    let (session, frames) = start_with(&service, settings()).await;
    assert_eq!(session.status().await, RedemptionStatus::Scanning);

    frames.send(Frame::from_text(VALID_QR)).unwrap();
    let view = wait_for_status(&session, RedemptionStatus::Success).await;

    assert_eq!(service.calls(), vec![("T1".to_string(), "abc".to_string())]);
    let record = &view.history[0];
    assert_eq!(record.ticket_id, "T1");
    assert_eq!(record.event_name, "RustConf");
    assert_eq!(record.status, ScanStatus::Success);
    assert_eq!(record.message, "ok");
    assert_eq!(record.scan_method, ScanMethod::Qr);
    assert_eq!(record.timestamp, test_clock().now());
    assert_eq!(view.stats.total, 1);
    assert_eq!(view.stats.successful, 1);
    assert_eq!(view.stats.qr, 1);
}

#[tokio::test]
async fn empty_manual_entry_only_prompts() {
    let service = MockRedemptionService::new();
    let (session, _frames) = start_with(&service, settings()).await;

    session.submit_manual("   ").await.unwrap();

    let view = session.snapshot().await;
    assert_eq!(view.status, RedemptionStatus::Scanning);
    assert_eq!(view.message, EMPTY_MANUAL_PROMPT);
    assert!(view.history.is_empty());
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn refused_manual_entry_is_denied_with_reason() {
    let service = MockRedemptionService::scripted([MockReply::Respond(
        RedemptionResponse::refused("Already used"),
    )]);
    let (session, _frames) = start_with(&service, settings()).await;

    session.submit_manual("T2").await.unwrap();
    let view = wait_for_status(&session, RedemptionStatus::Failed).await;

    assert!(view.message.starts_with("DENIED: Already used"), "{}", view.message);
    assert_eq!(service.calls(), vec![("T2".to_string(), "manual_redeem".to_string())]);
    let record = &view.history[0];
    assert_eq!(record.ticket_id, "T2");
    assert_eq!(record.status, ScanStatus::Failed);
    assert_eq!(record.message, "Already used");
    assert_eq!(record.scan_method, ScanMethod::Manual);
}

#[tokio::test(start_paused = true)]
async fn attempts_during_cooldown_are_dropped() {
    let service = MockRedemptionService::new();
    let (session, frames) = start_with(&service, settings()).await;

    frames.send(Frame::from_text(VALID_QR)).unwrap();
    wait_for_status(&session, RedemptionStatus::Success).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    session.submit_manual("T2").await.unwrap();
    assert_eq!(session.status().await, RedemptionStatus::Success);
    assert_eq!(service.call_count(), 1);
    assert_eq!(session.history().await.len(), 1);

    wait_for_status(&session, RedemptionStatus::Scanning).await;
    session.submit_manual("T3").await.unwrap();
    wait_for_status(&session, RedemptionStatus::Success).await;

    assert_eq!(service.call_count(), 2);
    assert_eq!(service.calls()[1], ("T3".to_string(), "manual_redeem".to_string()));
}

#[tokio::test(start_paused = true)]
async fn qr_shown_during_cooldown_is_not_redeemed_later() {
    let service = MockRedemptionService::new();
    let (session, frames) = start_with(&service, settings()).await;

    frames.send(Frame::from_text(VALID_QR)).unwrap();
    wait_for_status(&session, RedemptionStatus::Success).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    frames
        .send(Frame::from_text("https://event.example/scan?ticketId=T2&nonce=def"))
        .unwrap();

    wait_for_status(&session, RedemptionStatus::Scanning).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.status().await, RedemptionStatus::Scanning);
    assert_eq!(service.call_count(), 1);
    assert_eq!(session.history().await.len(), 1);

    frames
        .send(Frame::from_text("https://event.example/scan?ticketId=T3&nonce=ghi"))
        .unwrap();
    wait_for_status(&session, RedemptionStatus::Success).await;

    assert_eq!(service.call_count(), 2);
    assert_eq!(service.calls()[1], ("T3".to_string(), "ghi".to_string()));
}

#[tokio::test]
async fn malformed_qr_fails_without_calling_the_service() {
    let service = MockRedemptionService::new();
    let (session, frames) = start_with(&service, settings()).await;

    frames.send(Frame::from_text("not-a-url")).unwrap();
    let view = wait_for_status(&session, RedemptionStatus::Failed).await;

    assert_eq!(service.call_count(), 0);
    let record = &view.history[0];
    assert_eq!(record.ticket_id, "Invalid QR");
    assert_eq!(record.message, "Invalid QR code format");
    assert_eq!(record.scan_method, ScanMethod::Qr);
}

#[tokio::test(start_paused = true)]
async fn hanging_service_times_out_as_failure() {
    let service = MockRedemptionService::scripted([MockReply::Hang]);
    let policy = AdmissionPolicy {
        redeem_timeout: Duration::from_millis(200),
        ..AdmissionPolicy::default()
    };
    let (session, _frames) = start_with(&service, SessionSettings { policy, ..settings() }).await;

    session.submit_manual("T4").await.unwrap();
    assert_eq!(session.status().await, RedemptionStatus::Validating);

    let view = wait_for_status(&session, RedemptionStatus::Failed).await;
    assert!(view.message.starts_with(SERVICE_ERROR_MESSAGE), "{}", view.message);
    assert_eq!(view.history[0].message, RedemptionError::Timeout.to_string());
}

#[tokio::test]
async fn transport_error_is_a_failed_scan() {
    let service = MockRedemptionService::scripted([MockReply::Fail(
        RedemptionError::RequestFailed("connection refused".to_string()),
    )]);
    let (session, _frames) = start_with(&service, settings()).await;

    session.submit_manual("T5").await.unwrap();
    let view = wait_for_status(&session, RedemptionStatus::Failed).await;

    assert!(view.message.starts_with(SERVICE_ERROR_MESSAGE));
    assert!(view.history[0].message.contains("connection refused"));
    assert_eq!(view.stats.failed, 1);
    assert_eq!(view.stats.manual, 1);
}

#[tokio::test]
async fn concurrent_submissions_make_a_single_call() {
    let service = MockRedemptionService::new().with_latency(Duration::from_millis(20));
    let (session, _frames) = start_with(&service, settings()).await;

    let (first, second) = tokio::join!(session.submit_manual("T6"), session.submit_manual("T7"));
    first.unwrap();
    second.unwrap();

    let view = wait_for_status(&session, RedemptionStatus::Success).await;
    assert_eq!(service.call_count(), 1);
    assert_eq!(view.history.len(), 1);
}

#[tokio::test]
async fn observers_see_outcome_on_notification() {
    let service = MockRedemptionService::new();
    let (session, _frames) = start_with(&service, settings()).await;
    let mut actions = session.subscribe();

    session.submit_manual("T8").await.unwrap();

    let action = tokio::time::timeout(Duration::from_secs(1), actions.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(action, ScannerAction::RedemptionCompleted { .. }));
    assert_eq!(session.status().await, RedemptionStatus::Success);
}

// ============================================================================
// Camera lifecycle
// ============================================================================

#[tokio::test]
async fn camera_failure_leaves_desk_unavailable() {
    let service = MockRedemptionService::new();
    let device = ChannelCaptureDevice::failing("permission denied");
    let tracker = device.tracker();

    let session = ScannerSession::start(
        Box::new(device),
        Arc::new(PassThroughDecoder),
        service.clone().shared(),
        settings(),
    )
    .await
    .unwrap();

    let view = session.snapshot().await;
    assert_eq!(view.status, RedemptionStatus::Unavailable);
    assert_eq!(view.message, CAMERA_UNAVAILABLE_MESSAGE);
    assert!(view.history.is_empty());
    assert_eq!(tracker.starts(), 1);
    assert_eq!(tracker.releases(), 1);

    session.submit_manual("T1").await.unwrap();
    assert_eq!(session.status().await, RedemptionStatus::Unavailable);
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn teardown_releases_the_camera_once() {
    let service = MockRedemptionService::new();
    let (device, _frames) = ChannelCaptureDevice::new();
    let tracker = device.tracker();

    let session = ScannerSession::start(
        Box::new(device),
        Arc::new(PassThroughDecoder),
        service.shared(),
        settings(),
    )
    .await
    .unwrap();
    assert_eq!(tracker.releases(), 0);

    session.teardown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(tracker.starts(), 1);
    assert_eq!(tracker.releases(), 1);
}
