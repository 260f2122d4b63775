use serde::{Deserialize, Serialize};

/// Calibrated head orientation in degrees, ready to be framed
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrientationSample {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl OrientationSample {
    pub fn is_finite(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite() && self.roll.is_finite()
    }
}

/// Internal filter state in radians
///
/// Angles are never wrapped so gyroscope integration stays continuous.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FusionState {
    pub fused_yaw: f64,
    pub fused_pitch: f64,
    pub fused_roll: f64,
    /// Timestamp of the previous gyroscope sample, `None` until the first one arrives
    pub last_gyro_timestamp_nanos: Option<i64>,
}

impl FusionState {
    /// Fused orientation converted to degrees, before offsets
    pub fn degrees(&self) -> (f64, f64, f64) {
        (
            self.fused_yaw.to_degrees(),
            self.fused_pitch.to_degrees(),
            self.fused_roll.to_degrees(),
        )
    }
}

/// Per-axis zero reference in degrees, subtracted before emission
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationOffsets {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}
