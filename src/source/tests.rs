use super::*;
use std::io::Write;

fn drain(receiver: &SampleReceiver) -> Vec<SensorInput> {
    let mut samples = Vec::new();
    while let Some(input) = receiver.try_recv() {
        samples.push(input);
    }
    samples
}

#[test]
fn test_sensor_input_json_format() {
    let input: SensorInput = serde_json::from_str(
        r#"{"sensor":"gyroscope","x":0.0,"y":0.5,"z":-1.0,"timestamp_nanos":1000}"#,
    )
    .unwrap();

    assert_eq!(
        input,
        SensorInput::Gyroscope {
            x: 0.0,
            y: 0.5,
            z: -1.0,
            timestamp_nanos: 1000
        }
    );
    assert_eq!(input.timestamp_nanos(), 1000);
}

#[test]
fn test_full_queue_drops_newest() {
    let (sender, receiver) = sample_queue(2);

    for n in 0..5 {
        assert!(sender.push(SensorInput::Accelerometer {
            x: n as f64,
            y: 0.0,
            z: 9.8,
            timestamp_nanos: n,
        }));
    }

    let kept: Vec<i64> = drain(&receiver).iter().map(|i| i.timestamp_nanos()).collect();
    assert_eq!(kept, vec![0, 1]);
    assert_eq!(sender.overflows(), 3);
    assert_eq!(receiver.overflows(), 3);
}

#[test]
fn test_push_after_consumer_gone() {
    let (sender, receiver) = sample_queue(4);
    drop(receiver);

    let input = SensorInput::Gyroscope {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        timestamp_nanos: 0,
    };
    assert!(!sender.push(input));
    assert!(!sender.push_blocking(input, &CancellationToken::new()));
}

#[test]
fn test_push_blocking_respects_cancellation() {
    let (sender, _receiver) = sample_queue(1);
    let token = CancellationToken::new();
    let input = SensorInput::Gyroscope {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        timestamp_nanos: 0,
    };

    assert!(sender.push_blocking(input, &token));
    token.cancel();
    assert!(!sender.push_blocking(input, &token));
}

#[test]
fn test_synthetic_source_produces_pairs() {
    let source = SyntheticSource::new(100, 10.0).realtime(false).limit(3);
    source.check_available().unwrap();

    let (sender, receiver) = sample_queue(16);
    Box::new(source).run(sender, CancellationToken::new()).unwrap();

    let samples = drain(&receiver);
    assert_eq!(samples.len(), 6);
    assert!(matches!(samples[0], SensorInput::Accelerometer { .. }));

    match samples[5] {
        SensorInput::Gyroscope {
            z, timestamp_nanos, ..
        } => {
            assert!((z - 10f64.to_radians()).abs() < 1e-12);
            assert_eq!(timestamp_nanos, 20_000_000);
        }
        other => panic!("Unexpected sample: {:?}", other),
    }
}

#[test]
fn test_synthetic_source_rejects_zero_rate() {
    assert!(SyntheticSource::new(0, 10.0).check_available().is_err());
}

#[test]
fn test_replay_source_skips_comments_and_bad_lines() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# recorded on bench").unwrap();
    writeln!(
        file,
        r#"{{"sensor":"accelerometer","x":0.0,"y":0.0,"z":9.8,"timestamp_nanos":0}}"#
    )
    .unwrap();
    writeln!(file).unwrap();
    writeln!(file, "not json").unwrap();
    writeln!(
        file,
        r#"{{"sensor":"gyroscope","x":0.0,"y":0.0,"z":0.01,"timestamp_nanos":10000000}}"#
    )
    .unwrap();
    file.flush().unwrap();

    let source = ReplaySource::new(file.path()).realtime(false);
    source.check_available().unwrap();

    let (sender, receiver) = sample_queue(16);
    Box::new(source).run(sender, CancellationToken::new()).unwrap();

    let samples = drain(&receiver);
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].timestamp_nanos(), 10_000_000);
}

#[test]
fn test_replay_parse_error_reports_line() {
    match ReplaySource::parse_line("{\"sensor\":\"magnetometer\"}", 7) {
        Err(SensorError::Parse { line, .. }) => assert_eq!(line, 7),
        other => panic!("Unexpected result: {:?}", other),
    }
    assert!(ReplaySource::parse_line("   ", 1).unwrap().is_none());
}

#[test]
fn test_replay_missing_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let source = ReplaySource::new(dir.path().join("missing.jsonl"));
    assert!(matches!(
        source.check_available(),
        Err(SensorError::Unavailable(_))
    ));
}

#[test]
fn test_spawned_source_reports_completion() {
    let (sender, receiver) = sample_queue(64);
    let bus = Arc::new(EventBus::new(8));
    let handle = spawn_source(
        Box::new(SyntheticSource::new(1_000, 0.0).realtime(false).limit(10)),
        sender,
        CancellationToken::new(),
        bus,
    )
    .unwrap();

    handle.join().unwrap();
    assert_eq!(drain(&receiver).len(), 20);
}

#[test]
fn test_from_config_builds_configured_source() {
    let mut config = crate::config::SourceConfig::default();
    assert_eq!(from_config(&config).unwrap().name(), "synthetic");

    config.kind = SourceKind::Replay;
    assert!(from_config(&config).is_err());

    config.replay_path = Some("capture.jsonl".into());
    assert_eq!(from_config(&config).unwrap().name(), "replay");
}
