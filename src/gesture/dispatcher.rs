use super::detector::{GestureDetector, KeyInput, TripleTapPolicy};
use super::touch::{TouchGesture, HOLD_TO_CALIBRATE_MS};
use crate::control::{CalibrationController, ControlCommand};
use crate::events::{EventBus, TrackerEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Routes raw key and touch input through the gesture recognisers to the controller
///
/// Input handlers call this from whatever context they run in; the only async part is
/// the hold timer, which is cancelled on release and on shutdown.
pub struct GestureDispatcher {
    detector: Mutex<GestureDetector>,
    touch: Arc<Mutex<TouchGesture>>,
    controller: CalibrationController,
    event_bus: Arc<EventBus>,
    hold_timer: Mutex<Option<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
    epoch: Instant,
}

impl GestureDispatcher {
    pub fn new(
        policy: TripleTapPolicy,
        controller: CalibrationController,
        event_bus: Arc<EventBus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            detector: Mutex::new(GestureDetector::new(policy)),
            touch: Arc::new(Mutex::new(TouchGesture::new())),
            controller,
            event_bus,
            hold_timer: Mutex::new(None),
            cancellation_token,
            epoch: Instant::now(),
        }
    }

    /// Milliseconds on the dispatcher's monotonic clock
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Feed a key event; returns whether it was consumed
    pub fn handle_key(&self, input: KeyInput) -> bool {
        let classification = self.detector.lock().on_key(input);

        match classification {
            Some(classification) => {
                debug!(
                    gesture = classification.gesture.name(),
                    window = ?self.detector.lock().window().slots(),
                    "Volume key press classified"
                );
                dispatch(
                    &self.controller,
                    &self.event_bus,
                    classification.gesture.name(),
                    classification.command,
                );
                true
            }
            None => false,
        }
    }

    /// Convenience for sources that only report presses
    pub fn volume_press(&self) -> bool {
        self.handle_key(KeyInput::down(super::KeyCode::VolumeUp, self.now_ms()))
    }

    pub fn touch_down(&self, timestamp_ms: u64) {
        self.touch.lock().on_touch_down(timestamp_ms);
        self.cancel_hold_timer();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime for hold timer, hold will be evaluated on release");
            return;
        };

        let touch = Arc::clone(&self.touch);
        let controller = self.controller.clone();
        let event_bus = Arc::clone(&self.event_bus);
        let token = self.cancellation_token.clone();

        let timer = handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(HOLD_TO_CALIBRATE_MS)) => {
                    let command = touch.lock().on_hold_elapsed();
                    if command.is_some() {
                        dispatch(&controller, &event_bus, "touch_hold", command);
                    }
                }
            }
        });

        *self.hold_timer.lock() = Some(timer);
    }

    pub fn touch_up(&self, timestamp_ms: u64) {
        self.cancel_hold_timer();
        let command = self.touch.lock().on_touch_up(timestamp_ms);

        let gesture = match command {
            Some(ControlCommand::Calibrate) => "touch_hold",
            Some(_) => "touch_tap",
            None => return,
        };
        dispatch(&self.controller, &self.event_bus, gesture, command);
    }

    /// Cancel any pending hold timer
    pub fn shutdown(&self) {
        self.cancel_hold_timer();
    }

    pub fn controller(&self) -> &CalibrationController {
        &self.controller
    }

    fn cancel_hold_timer(&self) {
        if let Some(timer) = self.hold_timer.lock().take() {
            timer.abort();
        }
    }
}

impl Drop for GestureDispatcher {
    fn drop(&mut self) {
        self.cancel_hold_timer();
    }
}

fn dispatch(
    controller: &CalibrationController,
    event_bus: &EventBus,
    gesture: &str,
    command: Option<ControlCommand>,
) {
    if let Some(command) = command {
        info!(gesture, command = command.name(), "Gesture recognized");
        controller.apply(command);
    }

    event_bus.publish(TrackerEvent::GestureRecognized {
        gesture: gesture.to_string(),
        command,
        timestamp: SystemTime::now(),
    });
}
