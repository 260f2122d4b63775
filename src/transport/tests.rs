use super::*;
use crate::frame::{PoseFrame, FRAME_LEN};
use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_udp_delivers_one_datagram_per_frame() {
    let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let destination: SocketAddr = receiver.local_addr().unwrap();

    let transport = UdpTransport::bind(Some(destination)).await.unwrap();
    assert_eq!(transport.kind(), TransportMode::Udp);

    let frame = PoseFrame::from_orientation(12.5, -3.0, 0.25).encode();
    transport.send(&frame).await.unwrap();

    let mut buf = [0u8; 128];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(len, FRAME_LEN);
    assert_eq!(PoseFrame::decode(&buf[..len]).unwrap().yaw, 12.5);
}

#[tokio::test]
async fn test_udp_without_destination_reports_no_destination() {
    let transport = UdpTransport::bind(None).await.unwrap();
    let frame = PoseFrame::default().encode();

    assert!(matches!(
        transport.send(&frame).await,
        Err(crate::error::TransportError::NoDestination)
    ));
    assert_eq!(transport.describe(), "udp://<unresolved>");
}

#[tokio::test]
async fn test_udp_resolve_uses_tracker_port() {
    let addr = UdpTransport::resolve("127.0.0.1").await.unwrap();
    assert_eq!(addr.port(), UDP_PORT);
    assert!(addr.ip().is_loopback());
}

#[tokio::test]
async fn test_udp_send_after_close_fails() {
    let transport = UdpTransport::bind(Some((Ipv4Addr::LOCALHOST, 9).into()))
        .await
        .unwrap();
    transport.close().await.unwrap();

    assert!(matches!(
        transport.send(&PoseFrame::default().encode()).await,
        Err(crate::error::TransportError::Closed)
    ));
}

#[tokio::test]
async fn test_serial_writes_whole_frames_in_order() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let writer = file.reopen().unwrap();
    let transport = Arc::new(SerialTransport::from_file(writer, "test-port"));

    let frames: Vec<_> = (0..8)
        .map(|i| PoseFrame::from_orientation(i as f64, 0.0, 0.0).encode())
        .collect();

    for frame in &frames {
        transport.send(frame).await.unwrap();
    }
    transport.close().await.unwrap();

    let mut written = Vec::new();
    file.reopen().unwrap().read_to_end(&mut written).unwrap();
    assert_eq!(written.len(), frames.len() * FRAME_LEN);

    for (i, chunk) in written.chunks_exact(FRAME_LEN).enumerate() {
        assert_eq!(PoseFrame::decode(chunk).unwrap().yaw, i as f64);
    }
}

#[tokio::test]
async fn test_serial_concurrent_sends_do_not_interleave() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let transport = Arc::new(SerialTransport::from_file(file.reopen().unwrap(), "test-port"));

    let mut handles = Vec::new();
    for i in 0..16 {
        let transport = Arc::clone(&transport);
        handles.push(tokio::spawn(async move {
            let frame = PoseFrame::from_orientation(i as f64, i as f64, i as f64).encode();
            transport.send(&frame).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut written = Vec::new();
    file.reopen().unwrap().read_to_end(&mut written).unwrap();
    assert_eq!(written.len(), 16 * FRAME_LEN);

    for chunk in written.chunks_exact(FRAME_LEN) {
        let pose = PoseFrame::decode(chunk).unwrap();
        assert_eq!(pose.yaw, pose.pitch);
        assert_eq!(pose.pitch, pose.roll);
    }
}

#[tokio::test]
async fn test_serial_send_after_close_fails() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let transport = SerialTransport::from_file(file.reopen().unwrap(), "test-port");
    assert_eq!(transport.describe(), "serial://test-port");

    transport.close().await.unwrap();
    transport.close().await.unwrap();
    assert!(transport.send(&PoseFrame::default().encode()).await.is_err());
}

#[tokio::test]
async fn test_sink_dispatch_counts_deliveries() {
    let mock = Arc::new(MockTransport::new());
    let sink = TransportSink::new(mock.clone(), tokio::runtime::Handle::current());

    for i in 0..5 {
        sink.dispatch(PoseFrame::from_orientation(i as f64, 0.0, 0.0).encode());
    }

    wait_for(|| sink.stats().frames_sent == 5).await;
    let stats = sink.stats();
    assert_eq!(stats.frames_dispatched, 5);
    assert_eq!(stats.send_failures, 0);
    assert_eq!(stats.in_flight(), 0);
    assert_eq!(mock.frames().len(), 5);
}

#[tokio::test]
async fn test_sink_failures_are_counted_not_raised() {
    let mock = Arc::new(MockTransport::new());
    mock.set_failing(true);
    let sink = TransportSink::new(mock.clone(), tokio::runtime::Handle::current());

    for _ in 0..3 {
        sink.dispatch(PoseFrame::default().encode());
    }
    wait_for(|| sink.stats().send_failures == 3).await;

    mock.set_failing(false);
    sink.dispatch(PoseFrame::default().encode());
    wait_for(|| sink.stats().frames_sent == 1).await;

    assert_eq!(mock.attempts(), 4);
}

#[tokio::test]
async fn test_sink_counts_missing_destination() {
    let transport = Arc::new(UdpTransport::bind(None).await.unwrap());
    let sink = TransportSink::new(transport, tokio::runtime::Handle::current());

    sink.dispatch(PoseFrame::default().encode());
    sink.dispatch(PoseFrame::default().encode());

    wait_for(|| sink.stats().dropped_no_destination == 2).await;
    assert_eq!(sink.stats().send_failures, 0);
}

#[tokio::test]
async fn test_sink_dispatch_does_not_wait_for_slow_sends() {
    let mock = Arc::new(MockTransport::new());
    mock.set_delay(Some(Duration::from_millis(200)));
    let sink = TransportSink::new(mock.clone(), tokio::runtime::Handle::current());

    let started = std::time::Instant::now();
    for _ in 0..10 {
        sink.dispatch(PoseFrame::default().encode());
    }
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(sink.stats().frames_sent, 0);

    wait_for(|| sink.stats().frames_sent == 10).await;
}
