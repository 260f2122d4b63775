use super::types::{SessionOptions, SessionState, SessionStatus};
use crate::control::CalibrationController;
use crate::error::{HeadTrackerError, Result, TransportError};
use crate::events::{EventBus, TrackerEvent};
use crate::gesture::GestureDispatcher;
use crate::pipeline::{PipelineSnapshot, SensorPipeline};
use crate::source::{sample_queue, spawn_source, SampleSource};
use crate::transport::{
    FrameTransport, SerialTransport, TransportErrorExt, TransportMode, TransportSink,
    TransportStatsSnapshot, UdpTransport,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything that exists only while a session is running
struct ActiveSession {
    options: SessionOptions,
    started_at: DateTime<Utc>,
    token: CancellationToken,
    controller: CalibrationController,
    gestures: Arc<GestureDispatcher>,
    sink: TransportSink,
    snapshot: Arc<Mutex<PipelineSnapshot>>,
    overflows: Arc<AtomicU64>,
    pipeline: Option<JoinHandle<SensorPipeline>>,
    source: Option<JoinHandle<()>>,
}

/// One head-tracking session: sensors registered, estimator running, frames flowing
///
/// This is the collaborator-facing surface. A session can be started and stopped
/// repeatedly; calibration offsets and pause state never outlive a single run.
pub struct TrackingSession {
    session_id: String,
    event_bus: Arc<EventBus>,
    state: Mutex<SessionState>,
    active: Option<ActiveSession>,
}

impl TrackingSession {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            event_bus,
            state: Mutex::new(SessionState::Stopped),
            active: None,
        }
    }

    /// Open the transport, start the sensor source and the pipeline
    ///
    /// Fails when the sensors are unavailable or the serial adapter cannot be opened.
    /// An unresolvable UDP host is reported but does not stop the session.
    pub async fn start(
        &mut self,
        options: SessionOptions,
        source: Box<dyn SampleSource>,
    ) -> Result<()> {
        if self.active.is_some() {
            return Err(HeadTrackerError::system("Session already running"));
        }

        self.set_state(SessionState::Starting);
        info!(
            session_id = %self.session_id,
            mode = %options.mode,
            source = source.name(),
            "Starting tracking session"
        );

        if let Err(e) = source.check_available() {
            return Err(self.fail("source", e.into()));
        }

        let transport = match self.open_transport(&options).await {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail("transport", e)),
        };

        let sink = TransportSink::new(transport, tokio::runtime::Handle::current());
        let (controller, commands) = CalibrationController::new();
        let token = CancellationToken::new();
        let (sender, receiver) = sample_queue(options.sensor_queue_capacity);
        let overflows = receiver.overflow_counter();

        let pipeline = SensorPipeline::new(commands, sink.clone(), Arc::clone(&self.event_bus));
        let snapshot = pipeline.snapshot_handle();

        let pipeline = match pipeline.spawn(receiver, token.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = sink.close().await;
                return Err(self.fail("pipeline", e.into()));
            }
        };

        let source = match spawn_source(source, sender, token.clone(), Arc::clone(&self.event_bus)) {
            Ok(handle) => handle,
            Err(e) => {
                token.cancel();
                join_thread(pipeline, "sensor-pipeline").await;
                let _ = sink.close().await;
                return Err(self.fail("source", e.into()));
            }
        };

        let gestures = Arc::new(GestureDispatcher::new(
            options.triple_tap_policy,
            controller.clone(),
            Arc::clone(&self.event_bus),
            token.clone(),
        ));

        info!(
            session_id = %self.session_id,
            destination = %sink.describe(),
            "Tracking session running"
        );

        self.active = Some(ActiveSession {
            options,
            started_at: Utc::now(),
            token,
            controller,
            gestures,
            sink,
            snapshot,
            overflows,
            pipeline: Some(pipeline),
            source: Some(source),
        });
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Check the source and open the transport without streaming anything
    pub async fn dry_run(
        &self,
        options: &SessionOptions,
        source: &dyn SampleSource,
    ) -> Result<String> {
        source.check_available()?;
        let transport = self.open_transport(options).await?;
        let description = transport.describe();
        transport.close().await?;
        info!(source = source.name(), transport = %description, "Dry run succeeded");
        Ok(description)
    }

    /// Tear down the session; in-flight sends are left to finish on their own
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            debug!("Stop requested with no session running");
            return Ok(());
        };

        self.set_state(SessionState::Stopping);
        info!(session_id = %self.session_id, "Stopping tracking session");

        active.token.cancel();
        active.gestures.shutdown();

        let mut clean = true;
        if let Some(handle) = active.pipeline.take() {
            clean &= join_thread(handle, "sensor-pipeline").await;
        }
        if let Some(handle) = active.source.take() {
            clean &= join_thread(handle, "source").await;
        }

        if let Err(e) = active.sink.close().await {
            warn!("Error closing transport: {}", e);
            clean = false;
        }

        let stats = active.sink.stats();
        info!(
            session_id = %self.session_id,
            frames_sent = stats.frames_sent,
            send_failures = stats.send_failures,
            "Tracking session stopped"
        );

        if clean {
            self.set_state(SessionState::Stopped);
            Ok(())
        } else {
            self.set_state(SessionState::Failed);
            Err(HeadTrackerError::component("session", "teardown incomplete"))
        }
    }

    pub fn request_calibrate(&self) -> Result<()> {
        self.with_controller(|controller| controller.calibrate())
    }

    pub fn request_pause(&self) -> Result<()> {
        self.with_controller(|controller| controller.pause())
    }

    pub fn request_resume(&self) -> Result<()> {
        self.with_controller(|controller| controller.resume())
    }

    fn with_controller(&self, request: impl FnOnce(&CalibrationController)) -> Result<()> {
        match &self.active {
            Some(active) => {
                request(&active.controller);
                Ok(())
            }
            None => Err(HeadTrackerError::system("No session running")),
        }
    }

    /// Live events: orientation updates, calibration, pause changes and errors
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn controller(&self) -> Option<CalibrationController> {
        self.active.as_ref().map(|active| active.controller.clone())
    }

    /// Gesture router for input handlers attached to this run
    pub fn gestures(&self) -> Option<Arc<GestureDispatcher>> {
        self.active.as_ref().map(|active| Arc::clone(&active.gestures))
    }

    /// Token cancelled when this run is torn down
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.active.as_ref().map(|active| active.token.clone())
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        let Some(active) = &self.active else {
            return SessionStatus {
                session_id: self.session_id.clone(),
                state,
                mode: None,
                destination: None,
                started_at: None,
                paused: false,
                offsets: Default::default(),
                last_sample: None,
                estimator: Default::default(),
                transport: TransportStatsSnapshot::default(),
                queue_overflows: 0,
            };
        };

        let snapshot = *active.snapshot.lock();
        SessionStatus {
            session_id: self.session_id.clone(),
            state,
            mode: Some(active.options.mode),
            destination: Some(active.sink.describe()),
            started_at: Some(active.started_at),
            paused: snapshot.paused,
            offsets: snapshot.offsets,
            last_sample: snapshot.last_sample,
            estimator: snapshot.counters,
            transport: active.sink.stats(),
            queue_overflows: active.overflows.load(Ordering::Relaxed),
        }
    }

    async fn open_transport(&self, options: &SessionOptions) -> Result<Arc<dyn FrameTransport>> {
        match options.mode {
            TransportMode::Udp => {
                let destination = match options.host.as_deref() {
                    Some(host) => match UdpTransport::resolve(host).await {
                        Ok(addr) => Some(addr),
                        Err(e) => {
                            self.report_transport_problem(&e);
                            None
                        }
                    },
                    None => {
                        self.report_transport_problem(&TransportError::NoDestination);
                        None
                    }
                };
                Ok(Arc::new(UdpTransport::bind(destination).await?))
            }
            TransportMode::UsbSerial => {
                let transport = SerialTransport::open(options.serial_device.as_deref()).await?;
                Ok(Arc::new(transport))
            }
        }
    }

    fn report_transport_problem(&self, problem: &TransportError) {
        warn!("{}", problem.user_message());
        self.event_bus.publish(TrackerEvent::SystemError {
            component: "transport".to_string(),
            error: problem.to_string(),
        });
    }

    fn fail(&self, component: &str, error: HeadTrackerError) -> HeadTrackerError {
        error!(session_id = %self.session_id, component, "Session failed to start: {}", error);
        self.event_bus.publish(TrackerEvent::SystemError {
            component: component.to_string(),
            error: error.to_string(),
        });
        self.set_state(SessionState::Failed);
        error
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Session state changed");
            self.event_bus.publish(TrackerEvent::SessionStateChanged {
                state,
                timestamp: SystemTime::now(),
            });
        }
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.token.cancel();
            active.gestures.shutdown();
        }
    }
}

/// Join an OS thread without blocking the runtime
async fn join_thread<T: Send + 'static>(handle: JoinHandle<T>, name: &str) -> bool {
    let join = tokio::task::spawn_blocking(move || handle.join().is_ok());

    match timeout(THREAD_JOIN_TIMEOUT, join).await {
        Ok(Ok(true)) => {
            debug!(thread = name, "Thread joined");
            true
        }
        Ok(Ok(false)) => {
            error!(thread = name, "Thread panicked");
            false
        }
        Ok(Err(e)) => {
            error!(thread = name, "Join task failed: {}", e);
            false
        }
        Err(_) => {
            error!(thread = name, "Thread did not stop within {:?}", THREAD_JOIN_TIMEOUT);
            false
        }
    }
}
