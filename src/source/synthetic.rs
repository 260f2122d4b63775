use super::{SampleSender, SampleSource, SensorInput};
use crate::error::SensorError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const STANDARD_GRAVITY: f64 = 9.80665;

/// Device lying flat and turning slowly about its vertical axis
///
/// Emits one accelerometer and one gyroscope sample per tick. Useful for exercising
/// the full pipeline without hardware.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    rate_hz: u32,
    yaw_rate_dps: f64,
    realtime: bool,
    max_ticks: Option<u64>,
}

impl SyntheticSource {
    pub fn new(rate_hz: u32, yaw_rate_dps: f64) -> Self {
        Self {
            rate_hz,
            yaw_rate_dps,
            realtime: true,
            max_ticks: None,
        }
    }

    /// Pace ticks at the configured rate (default) or produce them as fast as the queue allows
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Stop after a fixed number of ticks
    pub fn limit(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.rate_hz.max(1)))
    }

    /// The pair of samples for tick `n`
    pub fn tick(&self, n: u64) -> [SensorInput; 2] {
        let timestamp_nanos = (n as i64).saturating_mul(self.period().as_nanos() as i64);
        [
            SensorInput::Accelerometer {
                x: 0.0,
                y: 0.0,
                z: STANDARD_GRAVITY,
                timestamp_nanos,
            },
            SensorInput::Gyroscope {
                x: 0.0,
                y: 0.0,
                z: self.yaw_rate_dps.to_radians(),
                timestamp_nanos,
            },
        ]
    }
}

impl SampleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn check_available(&self) -> Result<(), SensorError> {
        if self.rate_hz == 0 {
            return Err(SensorError::Unavailable(
                "synthetic source needs a non-zero rate".to_string(),
            ));
        }
        Ok(())
    }

    fn run(
        self: Box<Self>,
        output: SampleSender,
        token: CancellationToken,
    ) -> Result<(), SensorError> {
        let period = self.period();
        let started = Instant::now();
        let mut n = 0u64;

        while !token.is_cancelled() {
            if self.max_ticks.is_some_and(|max| n >= max) {
                break;
            }

            for input in self.tick(n) {
                let delivered = if self.realtime {
                    output.push(input)
                } else {
                    output.push_blocking(input, &token)
                };
                if !delivered {
                    debug!(ticks = n, "Synthetic source stopping");
                    return Ok(());
                }
            }
            n += 1;

            if self.realtime {
                let next = started + Duration::from_nanos((period.as_nanos() as u64).saturating_mul(n));
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    std::thread::sleep(wait);
                }
            }
        }

        debug!(ticks = n, "Synthetic source finished");
        Ok(())
    }
}
