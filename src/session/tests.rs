use super::*;
use crate::error::{HeadTrackerError, SensorError, TransportError};
use crate::events::{EventBus, TrackerEvent};
use crate::source::{ReplaySource, SyntheticSource};
use crate::transport::TransportMode;
use std::sync::Arc;
use std::time::Duration;

fn session() -> TrackingSession {
    TrackingSession::new(Arc::new(EventBus::new(1024)))
}

fn steady_source() -> Box<SyntheticSource> {
    Box::new(SyntheticSource::new(1_000, 45.0))
}

async fn wait_until<F: Fn(&SessionStatus) -> bool>(session: &TrackingSession, condition: F) {
    for _ in 0..300 {
        if condition(&session.status()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never reached expected status: {:?}", session.status());
}

#[tokio::test]
async fn test_udp_session_streams_and_stops() {
    let mut session = session();
    let mut events = session.subscribe();

    session
        .start(
            SessionOptions::udp(Some("127.0.0.1".to_string())),
            Box::new(SyntheticSource::new(200, 45.0)),
        )
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Running);

    wait_until(&session, |status| status.transport.frames_dispatched >= 20).await;
    let status = session.status();
    assert_eq!(status.mode, Some(TransportMode::Udp));
    assert_eq!(status.destination.as_deref(), Some("udp://127.0.0.1:4242"));
    assert!(status.estimator.samples_emitted >= 20);
    assert!(status.last_sample.is_some());

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(!session.is_running());

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let TrackerEvent::SessionStateChanged { state, .. } = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            SessionState::Starting,
            SessionState::Running,
            SessionState::Stopping,
            SessionState::Stopped
        ]
    );
}

#[tokio::test]
async fn test_requests_reach_the_running_pipeline() {
    let mut session = session();
    session
        .start(SessionOptions::udp(Some("127.0.0.1".to_string())), steady_source())
        .await
        .unwrap();

    wait_until(&session, |status| status.estimator.samples_emitted > 10).await;

    session.request_pause().unwrap();
    wait_until(&session, |status| status.paused).await;
    wait_until(&session, |status| status.estimator.paused_ticks > 0).await;

    let emitted = session.status().estimator.samples_emitted;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.status().estimator.samples_emitted, emitted);

    session.request_resume().unwrap();
    session.request_calibrate().unwrap();
    wait_until(&session, |status| !status.paused && status.offsets.yaw > 0.0).await;

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_host_keeps_session_running() {
    let mut session = session();
    let mut events = session.subscribe();

    session
        .start(SessionOptions::udp(None), steady_source())
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Running);

    wait_until(&session, |status| status.transport.dropped_no_destination > 5).await;
    assert_eq!(session.status().transport.frames_sent, 0);

    let mut reported = false;
    while let Ok(event) = events.try_recv() {
        if let TrackerEvent::SystemError { component, .. } = event {
            assert_eq!(component, "transport");
            reported = true;
        }
    }
    assert!(reported);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_unresolvable_host_is_reported_not_fatal() {
    let mut session = session();

    session
        .start(
            SessionOptions::udp(Some("no-such-host.invalid".to_string())),
            steady_source(),
        )
        .await
        .unwrap();

    assert!(session.is_running());
    assert_eq!(
        session.status().destination.as_deref(),
        Some("udp://<unresolved>")
    );
    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_unavailable_sensor_fails_start() {
    let mut session = session();
    let dir = tempfile::tempdir().unwrap();
    let source = ReplaySource::new(dir.path().join("missing.jsonl"));

    let result = session
        .start(SessionOptions::udp(Some("127.0.0.1".to_string())), Box::new(source))
        .await;

    assert!(matches!(
        result,
        Err(HeadTrackerError::Sensor(SensorError::Unavailable(_)))
    ));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!session.is_running());
}

#[tokio::test]
async fn test_missing_serial_device_fails_start() {
    let mut session = session();
    let dir = tempfile::tempdir().unwrap();

    let result = session
        .start(
            SessionOptions::usb_serial(Some(dir.path().join("ttyUSB9"))),
            steady_source(),
        )
        .await;

    assert!(matches!(
        result,
        Err(HeadTrackerError::Transport(TransportError::SerialOpen { .. }))
    ));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let mut session = session();
    let options = SessionOptions::udp(Some("127.0.0.1".to_string()));

    session.start(options.clone(), steady_source()).await.unwrap();
    assert!(session.start(options, steady_source()).await.is_err());
    assert!(session.is_running());

    session.stop().await.unwrap();
    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_requests_without_session_are_rejected() {
    let session = session();
    assert!(session.request_calibrate().is_err());
    assert!(session.request_pause().is_err());
    assert!(session.controller().is_none());
    assert_eq!(session.status().state, SessionState::Stopped);
}

#[tokio::test]
async fn test_run_until_shutdown_on_request() {
    let mut session = session();
    session
        .start(SessionOptions::udp(Some("127.0.0.1".to_string())), steady_source())
        .await
        .unwrap();

    let bus = session.event_bus();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.publish(TrackerEvent::ShutdownRequested {
            timestamp: std::time::SystemTime::now(),
            reason: "test".to_string(),
        });
    });

    let reason = session.run_until_shutdown().await.unwrap();
    assert_eq!(reason, ShutdownReason::UserRequest("test".to_string()));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_replay_session_reaches_the_end_of_the_recording() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    for n in 0..10i64 {
        writeln!(
            file,
            r#"{{"sensor":"gyroscope","x":0.0,"y":0.0,"z":1.0,"timestamp_nanos":{}}}"#,
            n * 10_000_000
        )
        .unwrap();
    }
    file.flush().unwrap();

    let mut session = session();
    let source = ReplaySource::new(file.path()).realtime(false);
    session
        .start(SessionOptions::udp(None), Box::new(source))
        .await
        .unwrap();

    wait_until(&session, |status| status.estimator.samples_emitted == 9).await;
    let yaw = session.status().last_sample.unwrap().yaw;
    assert!((yaw - 0.09f64.to_degrees()).abs() < 1e-9);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_dry_run_opens_without_streaming() {
    let session = session();
    let source = SyntheticSource::new(200, 10.0);

    let description = session
        .dry_run(&SessionOptions::udp(Some("127.0.0.1".to_string())), &source)
        .await
        .unwrap();

    assert_eq!(description, "udp://127.0.0.1:4242");
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(!session.is_running());
}
