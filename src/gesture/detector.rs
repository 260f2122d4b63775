use crate::control::ControlCommand;
use serde::{Deserialize, Serialize};

/// Maximum gap between presses for them to count as one multi-tap
pub const TAP_INTERVAL_MS: u64 = 500;

const WINDOW_SLOTS: usize = 3;

/// Key identity as seen by the gesture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    VolumeUp,
    VolumeDown,
    Other(u16),
}

impl KeyCode {
    pub fn is_volume(&self) -> bool {
        matches!(self, KeyCode::VolumeUp | KeyCode::VolumeDown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// A discrete key event with a monotonic timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub code: KeyCode,
    pub action: KeyAction,
    pub timestamp_ms: u64,
}

impl KeyInput {
    pub fn down(code: KeyCode, timestamp_ms: u64) -> Self {
        Self {
            code,
            action: KeyAction::Down,
            timestamp_ms,
        }
    }

    pub fn up(code: KeyCode, timestamp_ms: u64) -> Self {
        Self {
            code,
            action: KeyAction::Up,
            timestamp_ms,
        }
    }
}

/// How a triple tap decides between pause and resume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleTapPolicy {
    /// Resume when the older gap is shorter than the newer one, otherwise pause
    #[default]
    GapOrder,
    /// Flip the current pause state
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gesture {
    TripleTap,
    DoubleTap,
    SinglePress,
}

impl Gesture {
    pub fn name(&self) -> &'static str {
        match self {
            Gesture::TripleTap => "triple_tap",
            Gesture::DoubleTap => "double_tap",
            Gesture::SinglePress => "single_press",
        }
    }
}

/// Result of classifying the press window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub gesture: Gesture,
    pub command: Option<ControlCommand>,
}

/// The last three press timestamps, most recent first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressWindow {
    slots: [Option<u64>; WINDOW_SLOTS],
}

impl PressWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a window directly from timestamps, most recent first
    pub fn from_slots(slots: [Option<u64>; WINDOW_SLOTS]) -> Self {
        Self { slots }
    }

    /// Shift every slot back by one and store the new press in front
    pub fn push(&mut self, timestamp_ms: u64) {
        self.slots.rotate_right(1);
        self.slots[0] = Some(timestamp_ms);
    }

    pub fn slots(&self) -> [Option<u64>; WINDOW_SLOTS] {
        self.slots
    }

    /// Gaps `(t0 - t1, t1 - t2)`; an empty slot counts as infinitely old
    pub fn gaps(&self) -> (u64, u64) {
        (
            Self::gap(self.slots[0], self.slots[1]),
            Self::gap(self.slots[1], self.slots[2]),
        )
    }

    fn gap(newer: Option<u64>, older: Option<u64>) -> u64 {
        match (newer, older) {
            (Some(newer), Some(older)) => newer.saturating_sub(older),
            _ => u64::MAX,
        }
    }

    pub fn clear(&mut self) {
        self.slots = [None; WINDOW_SLOTS];
    }
}

/// Classify the press window; pure so it can be tested without key events
///
/// Under [`TripleTapPolicy::Toggle`] a triple tap yields [`ControlCommand::TogglePause`].
pub fn classify(window: &PressWindow, policy: TripleTapPolicy) -> Classification {
    let (dt1, dt2) = window.gaps();

    if dt1 < TAP_INTERVAL_MS && dt2 < TAP_INTERVAL_MS {
        let command = match policy {
            TripleTapPolicy::GapOrder if dt2 < dt1 => ControlCommand::Resume,
            TripleTapPolicy::GapOrder => ControlCommand::Pause,
            TripleTapPolicy::Toggle => ControlCommand::TogglePause,
        };
        return Classification {
            gesture: Gesture::TripleTap,
            command: Some(command),
        };
    }

    if dt1 < TAP_INTERVAL_MS {
        return Classification {
            gesture: Gesture::DoubleTap,
            command: Some(ControlCommand::Calibrate),
        };
    }

    Classification {
        gesture: Gesture::SinglePress,
        command: None,
    }
}

/// Volume-key tap detector
///
/// Runs for the life of the session; every volume key-down is consumed whether or not
/// it completes a gesture, everything else passes through untouched.
#[derive(Debug, Clone, Default)]
pub struct GestureDetector {
    window: PressWindow,
    policy: TripleTapPolicy,
}

impl GestureDetector {
    pub fn new(policy: TripleTapPolicy) -> Self {
        Self {
            window: PressWindow::new(),
            policy,
        }
    }

    /// Feed one key event; `None` means the event was not consumed
    pub fn on_key(&mut self, input: KeyInput) -> Option<Classification> {
        if input.action != KeyAction::Down || !input.code.is_volume() {
            return None;
        }
        Some(self.on_press(input.timestamp_ms))
    }

    /// Record a qualifying press and classify the updated window
    pub fn on_press(&mut self, timestamp_ms: u64) -> Classification {
        self.window.push(timestamp_ms);
        classify(&self.window, self.policy)
    }

    pub fn window(&self) -> &PressWindow {
        &self.window
    }

    pub fn policy(&self) -> TripleTapPolicy {
        self.policy
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
