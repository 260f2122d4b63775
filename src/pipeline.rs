use crate::control::{ControlCommand, ControlReceiver};
use crate::events::{EventBus, TrackerEvent};
use crate::frame::PoseFrame;
use crate::orientation::{CalibrationOffsets, EstimatorCounters, OrientationEstimator, OrientationSample};
use crate::source::{SampleReceiver, SensorInput};
use crate::transport::TransportSink;
use crossbeam::channel::RecvTimeoutError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// How long the pipeline waits for a sample before re-checking for cancellation
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State of the estimator as last seen by the pipeline thread
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineSnapshot {
    pub counters: EstimatorCounters,
    pub offsets: CalibrationOffsets,
    pub paused: bool,
    pub last_sample: Option<OrientationSample>,
}

/// The sensor-callback context
///
/// Owns the estimator outright. Every input first applies any queued control
/// commands, then runs through the estimator; an emitted sample is published to the
/// event bus and its encoded frame handed to the sink. Nothing here blocks on I/O.
pub struct SensorPipeline {
    estimator: OrientationEstimator,
    commands: ControlReceiver,
    sink: TransportSink,
    event_bus: Arc<EventBus>,
    snapshot: Arc<Mutex<PipelineSnapshot>>,
}

impl SensorPipeline {
    pub fn new(commands: ControlReceiver, sink: TransportSink, event_bus: Arc<EventBus>) -> Self {
        Self {
            estimator: OrientationEstimator::new(),
            commands,
            sink,
            event_bus,
            snapshot: Arc::new(Mutex::new(PipelineSnapshot::default())),
        }
    }

    /// Shared view of the estimator, refreshed after every input
    pub fn snapshot_handle(&self) -> Arc<Mutex<PipelineSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    pub fn estimator(&self) -> &OrientationEstimator {
        &self.estimator
    }

    /// Process one sensor input; returns the sample if one was emitted
    pub fn handle(&mut self, input: SensorInput) -> Option<OrientationSample> {
        self.apply_pending_commands();

        let emitted = match input {
            SensorInput::Accelerometer {
                x,
                y,
                z,
                timestamp_nanos,
            } => {
                self.estimator.on_accelerometer_sample(x, y, z, timestamp_nanos);
                None
            }
            SensorInput::Gyroscope {
                x,
                y,
                z,
                timestamp_nanos,
            } => self.estimator.on_gyroscope_sample(x, y, z, timestamp_nanos),
        };

        if let Some(sample) = emitted {
            trace!(yaw = sample.yaw, pitch = sample.pitch, roll = sample.roll, "Orientation sample");
            self.event_bus
                .publish(TrackerEvent::orientation(sample.yaw, sample.pitch, sample.roll));
            self.sink.dispatch(PoseFrame::from(sample).encode());
        }

        self.refresh_snapshot(emitted);
        emitted
    }

    /// Apply every queued command in order
    pub fn apply_pending_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: ControlCommand) {
        debug!(command = command.name(), "Applying control command");

        match command {
            ControlCommand::Calibrate => {
                let offsets = self.estimator.calibrate();
                info!(
                    yaw = offsets.yaw,
                    pitch = offsets.pitch,
                    roll = offsets.roll,
                    "Calibrated"
                );
                self.event_bus.publish(TrackerEvent::Calibrated {
                    offsets,
                    timestamp: SystemTime::now(),
                });
            }
            ControlCommand::Pause => self.set_paused(true),
            ControlCommand::Resume => self.set_paused(false),
            ControlCommand::TogglePause => {
                let paused = !self.estimator.is_paused();
                self.set_paused(paused);
            }
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if self.estimator.set_paused(paused) {
            info!(paused, "Frame production {}", if paused { "paused" } else { "resumed" });
            self.event_bus.publish(TrackerEvent::PauseChanged {
                paused,
                timestamp: SystemTime::now(),
            });
        }
    }

    fn refresh_snapshot(&self, emitted: Option<OrientationSample>) {
        let mut snapshot = self.snapshot.lock();
        snapshot.counters = self.estimator.counters();
        snapshot.offsets = self.estimator.offsets();
        snapshot.paused = self.estimator.is_paused();
        if emitted.is_some() {
            snapshot.last_sample = emitted;
        }
    }

    /// Drain the sensor queue until cancelled or the source goes away
    pub fn run(mut self, samples: SampleReceiver, token: CancellationToken) -> Self {
        info!("Sensor pipeline started");

        while !token.is_cancelled() {
            match samples.recv_timeout(RECV_POLL_INTERVAL) {
                Ok(input) => {
                    self.handle(input);
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.apply_pending_commands();
                    self.refresh_snapshot(None);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Sensor feed ended");
                    break;
                }
            }
        }

        // keep honouring requests that arrived after the last sample
        self.apply_pending_commands();
        self.refresh_snapshot(None);

        let counters = self.estimator.counters();
        info!(
            emitted = counters.samples_emitted,
            dropped_non_finite = counters.dropped_non_finite,
            overflows = samples.overflows(),
            "Sensor pipeline stopped"
        );
        self
    }

    /// Run on the dedicated `sensor-pipeline` thread
    pub fn spawn(
        self,
        samples: SampleReceiver,
        token: CancellationToken,
    ) -> std::io::Result<JoinHandle<SensorPipeline>> {
        std::thread::Builder::new()
            .name("sensor-pipeline".to_string())
            .spawn(move || self.run(samples, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::CalibrationController;
    use crate::frame::decode_frame;
    use crate::source::sample_queue;
    use crate::transport::MockTransport;

    fn gyro(z: f64, timestamp_nanos: i64) -> SensorInput {
        SensorInput::Gyroscope {
            x: 0.0,
            y: 0.0,
            z,
            timestamp_nanos,
        }
    }

    fn pipeline() -> (SensorPipeline, CalibrationController, Arc<MockTransport>, Arc<EventBus>) {
        let (controller, commands) = CalibrationController::new();
        let mock = Arc::new(MockTransport::new());
        let sink = TransportSink::new(mock.clone(), tokio::runtime::Handle::current());
        let bus = Arc::new(EventBus::new(64));
        let pipeline = SensorPipeline::new(commands, sink, Arc::clone(&bus));
        (pipeline, controller, mock, bus)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_yaw_scenario_reaches_the_wire() {
        let (mut pipeline, _controller, mock, _bus) = pipeline();

        assert!(pipeline.handle(gyro(1.0, 0)).is_none());
        let sample = pipeline.handle(gyro(1.0, 10_000_000)).unwrap();
        assert!((sample.yaw - 0.572_957_795).abs() < 1e-6);

        settle().await;
        let frames = mock.frames();
        assert_eq!(frames.len(), 1);

        let pose = decode_frame(&frames[0]).unwrap();
        assert_eq!((pose.x, pose.y, pose.z), (0.0, 0.0, 0.0));
        assert!((pose.yaw - 0.572_957_795).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_pause_suppresses_sends_but_keeps_fusing() {
        let (mut pipeline, controller, mock, _bus) = pipeline();

        pipeline.handle(gyro(1.0, 0));
        controller.pause();
        assert!(pipeline.handle(gyro(1.0, 10_000_000)).is_none());
        assert!(pipeline.handle(gyro(1.0, 20_000_000)).is_none());
        settle().await;

        assert_eq!(mock.attempts(), 0);
        assert!(pipeline.estimator().state().fused_yaw > 0.019);

        controller.resume();
        assert!(pipeline.handle(gyro(1.0, 30_000_000)).is_some());
        settle().await;
        assert_eq!(mock.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failing_transport_leaves_fusion_untouched() {
        let (mut reference, _c1, _m1, _b1) = pipeline();
        let (mut failing, _c2, mock, _b2) = pipeline();
        mock.set_failing(true);

        for n in 0..20 {
            let input = gyro(0.5, n * 5_000_000);
            reference.handle(input);
            failing.handle(input);
        }
        settle().await;

        assert_eq!(
            reference.estimator().state().fused_yaw,
            failing.estimator().state().fused_yaw
        );
        assert_eq!(mock.attempts(), 19);
        assert!(mock.frames().is_empty());
    }

    #[tokio::test]
    async fn test_calibrate_applies_before_next_sample() {
        let (mut pipeline, controller, _mock, bus) = pipeline();
        let mut events = bus.subscribe();

        pipeline.handle(gyro(1.0, 0));
        pipeline.handle(gyro(1.0, 10_000_000));
        controller.calibrate();

        let sample = pipeline.handle(gyro(0.0, 20_000_000)).unwrap();
        assert!(sample.yaw.abs() < 1e-9);
        assert!(sample.pitch.abs() < 1e-9);
        assert!(sample.roll.abs() < 1e-9);

        let mut saw_calibrated = false;
        while let Ok(event) = events.try_recv() {
            if let TrackerEvent::Calibrated { offsets, .. } = event {
                assert!((offsets.yaw - 0.572_957_795).abs() < 1e-6);
                saw_calibrated = true;
            }
        }
        assert!(saw_calibrated);
    }

    #[tokio::test]
    async fn test_thread_stops_on_cancel_and_applies_late_commands() {
        let (pipeline, controller, _mock, _bus) = pipeline();
        let snapshot = pipeline.snapshot_handle();
        let (sender, receiver) = sample_queue(16);
        let token = CancellationToken::new();

        let handle = pipeline.spawn(receiver, token.clone()).unwrap();
        assert!(sender.push(gyro(0.0, 0)));
        controller.pause();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(snapshot.lock().paused);

        token.cancel();
        let pipeline = tokio::task::spawn_blocking(move || handle.join())
            .await
            .unwrap()
            .unwrap();
        assert!(pipeline.estimator().is_paused());
    }
}
