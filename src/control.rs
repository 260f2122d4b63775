use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Requests applied by the sensor pipeline to the estimator it owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    Calibrate,
    Pause,
    Resume,
    TogglePause,
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Calibrate => "calibrate",
            ControlCommand::Pause => "pause",
            ControlCommand::Resume => "resume",
            ControlCommand::TogglePause => "toggle_pause",
        }
    }
}

/// Receiving half handed to the sensor pipeline
pub type ControlReceiver = Receiver<ControlCommand>;

const CONTROL_QUEUE_CAPACITY: usize = 64;

/// Front end for calibration and pause requests
///
/// Cloneable and usable from any thread. Requests are queued to the sensor pipeline,
/// which applies them in order before its next sample, so the three offsets always
/// change together. `is_paused` reflects the last pause request the pipeline accepted.
#[derive(Debug, Clone)]
pub struct CalibrationController {
    sender: Sender<ControlCommand>,
    paused: Arc<AtomicBool>,
}

impl CalibrationController {
    /// Create a controller and the receiver the pipeline drains
    pub fn new() -> (Self, ControlReceiver) {
        let (sender, receiver) = channel::bounded(CONTROL_QUEUE_CAPACITY);
        (
            Self {
                sender,
                paused: Arc::new(AtomicBool::new(false)),
            },
            receiver,
        )
    }

    /// Zero the current orientation
    pub fn calibrate(&self) {
        self.submit(ControlCommand::Calibrate);
    }

    /// Stop producing frames; a second call is a no-op
    pub fn pause(&self) {
        self.set_paused(true);
    }

    /// Resume producing frames; a second call is a no-op
    pub fn resume(&self) {
        self.set_paused(false);
    }

    /// The mirror only moves once the pipeline has the command queued
    fn set_paused(&self, paused: bool) {
        if self.is_paused() == paused {
            return;
        }
        let command = if paused {
            ControlCommand::Pause
        } else {
            ControlCommand::Resume
        };
        if self.submit(command) {
            self.paused.store(paused, Ordering::SeqCst);
        }
    }

    /// Flip between paused and running based on the current state
    pub fn toggle_pause(&self) {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Dispatch a command from a gesture or collaborator request
    pub fn apply(&self, command: ControlCommand) {
        match command {
            ControlCommand::Calibrate => self.calibrate(),
            ControlCommand::Pause => self.pause(),
            ControlCommand::Resume => self.resume(),
            ControlCommand::TogglePause => self.toggle_pause(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn submit(&self, command: ControlCommand) -> bool {
        match self.sender.try_send(command) {
            Ok(()) => {
                debug!(command = command.name(), "Control command queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(command = command.name(), "Control queue full, command dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(command = command.name(), "Sensor pipeline gone, command ignored");
                false
            }
        }
    }
}
