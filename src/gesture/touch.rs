use crate::control::ControlCommand;

/// Press duration that turns a touch into a calibration request
pub const HOLD_TO_CALIBRATE_MS: u64 = 1_000;

/// Press-and-hold gesture on the touch surface
///
/// A hold of at least [`HOLD_TO_CALIBRATE_MS`] calibrates once, as soon as the hold
/// timer elapses; a shorter touch toggles pause on release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchGesture {
    down_at: Option<u64>,
    hold_fired: bool,
}

impl TouchGesture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_touch_down(&mut self, timestamp_ms: u64) {
        self.down_at = Some(timestamp_ms);
        self.hold_fired = false;
    }

    /// Called by the hold timer; fires calibrate at most once per touch
    pub fn on_hold_elapsed(&mut self) -> Option<ControlCommand> {
        if self.down_at.is_some() && !self.hold_fired {
            self.hold_fired = true;
            return Some(ControlCommand::Calibrate);
        }
        None
    }

    /// Release or cancel of the touch
    pub fn on_touch_up(&mut self, timestamp_ms: u64) -> Option<ControlCommand> {
        let down_at = self.down_at.take()?;
        let held = timestamp_ms.saturating_sub(down_at);

        if held < HOLD_TO_CALIBRATE_MS {
            return Some(ControlCommand::TogglePause);
        }

        if !self.hold_fired {
            // timer never ran (e.g. not driven); honour the hold on release
            self.hold_fired = true;
            return Some(ControlCommand::Calibrate);
        }

        None
    }

    pub fn is_touching(&self) -> bool {
        self.down_at.is_some()
    }
}
