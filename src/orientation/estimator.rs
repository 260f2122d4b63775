use super::types::{CalibrationOffsets, FusionState, OrientationSample};
use serde::Serialize;
use tracing::{debug, trace};

/// Weight kept from the previous fused pitch/roll on each accelerometer sample
pub const COMPLEMENTARY_ALPHA: f64 = 0.98;

const NANOS_TO_SECONDS: f64 = 1e-9;

/// Running counters for the estimator, read by the session for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EstimatorCounters {
    pub accel_samples: u64,
    pub gyro_samples: u64,
    pub samples_emitted: u64,
    pub dropped_non_finite: u64,
    pub rejected_inputs: u64,
    pub paused_ticks: u64,
}

/// Complementary-filter orientation estimator
///
/// Pitch and roll blend gyroscope integration with the gravity direction seen by the
/// accelerometer; yaw is integrated from the gyroscope alone. The gyroscope axes are
/// mapped to the device mounting: Z drives yaw, X drives pitch, Y drives roll.
///
/// The estimator is synchronous and allocation-free. It never fails: bad input and
/// numerical blow-ups simply produce no sample for that tick.
#[derive(Debug, Clone, Default)]
pub struct OrientationEstimator {
    state: FusionState,
    offsets: CalibrationOffsets,
    paused: bool,
    counters: EstimatorCounters,
}

impl OrientationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pitch and roll (radians) implied by the measured gravity vector
    pub fn accelerometer_tilt(ax: f64, ay: f64, az: f64) -> (f64, f64) {
        let pitch = ax.atan2((ay * ay + az * az).sqrt());
        let roll = (-ay).atan2(az);
        (pitch, roll)
    }

    /// Blend an accelerometer sample into the fused pitch and roll
    ///
    /// Accelerometer samples carry no time step and never touch yaw.
    pub fn on_accelerometer_sample(&mut self, ax: f64, ay: f64, az: f64, now_nanos: i64) {
        if !(ax.is_finite() && ay.is_finite() && az.is_finite()) {
            self.counters.rejected_inputs += 1;
            trace!(now_nanos, "Ignoring non-finite accelerometer sample");
            return;
        }

        self.counters.accel_samples += 1;
        let (acc_pitch, acc_roll) = Self::accelerometer_tilt(ax, ay, az);

        self.state.fused_pitch =
            self.state.fused_pitch * COMPLEMENTARY_ALPHA + acc_pitch * (1.0 - COMPLEMENTARY_ALPHA);
        self.state.fused_roll =
            self.state.fused_roll * COMPLEMENTARY_ALPHA + acc_roll * (1.0 - COMPLEMENTARY_ALPHA);
    }

    /// Integrate a gyroscope sample and produce the calibrated orientation
    ///
    /// Returns `None` for the first sample of a session (no time step yet), while
    /// paused, and whenever the result would not be finite.
    pub fn on_gyroscope_sample(
        &mut self,
        gx: f64,
        gy: f64,
        gz: f64,
        timestamp_nanos: i64,
    ) -> Option<OrientationSample> {
        let last = match self.state.last_gyro_timestamp_nanos {
            Some(last) => last,
            None => {
                self.state.last_gyro_timestamp_nanos = Some(timestamp_nanos);
                trace!(timestamp_nanos, "Gyroscope timestamp baseline recorded");
                return None;
            }
        };

        self.state.last_gyro_timestamp_nanos = Some(timestamp_nanos);

        let elapsed_nanos = match timestamp_nanos.checked_sub(last) {
            Some(elapsed) if elapsed > 0 => elapsed,
            _ => {
                self.counters.rejected_inputs += 1;
                debug!(
                    previous = last,
                    current = timestamp_nanos,
                    "Non-increasing or out-of-range gyroscope timestamp, baseline re-armed"
                );
                return None;
            }
        };

        if !(gx.is_finite() && gy.is_finite() && gz.is_finite()) {
            self.counters.rejected_inputs += 1;
            trace!(timestamp_nanos, "Ignoring non-finite gyroscope sample");
            return None;
        }

        self.counters.gyro_samples += 1;
        let dt = elapsed_nanos as f64 * NANOS_TO_SECONDS;

        self.state.fused_yaw += gz * dt;
        self.state.fused_pitch += gx * dt;
        self.state.fused_roll += gy * dt;

        if self.paused {
            self.counters.paused_ticks += 1;
            return None;
        }

        self.emit()
    }

    fn emit(&mut self) -> Option<OrientationSample> {
        let (yaw, pitch, roll) = self.state.degrees();
        let sample = OrientationSample {
            yaw: yaw - self.offsets.yaw,
            pitch: pitch - self.offsets.pitch,
            roll: roll - self.offsets.roll,
        };

        if !sample.is_finite() {
            self.counters.dropped_non_finite += 1;
            trace!(?sample, "Dropping non-finite orientation sample");
            return None;
        }

        self.counters.samples_emitted += 1;
        Some(sample)
    }

    /// Make the current fused orientation read as zero
    ///
    /// Only the offsets change; the filter keeps integrating from where it is.
    pub fn calibrate(&mut self) -> CalibrationOffsets {
        let (yaw, pitch, roll) = self.state.degrees();
        self.offsets = CalibrationOffsets { yaw, pitch, roll };
        debug!(offsets = ?self.offsets, "Calibration offsets updated");
        self.offsets
    }

    /// Returns true when the pause state actually changed
    pub fn set_paused(&mut self, paused: bool) -> bool {
        if self.paused == paused {
            return false;
        }
        self.paused = paused;
        true
    }

    /// Zero the filter for a new session; offsets and pause state are kept
    pub fn reset_fusion(&mut self) {
        self.state = FusionState::default();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }

    pub fn state(&self) -> &FusionState {
        &self.state
    }

    pub fn counters(&self) -> EstimatorCounters {
        self.counters
    }
}
