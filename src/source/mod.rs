//! Motion sensor feeds
//!
//! A source runs on its own thread and pushes raw samples into the bounded queue the
//! sensor pipeline drains. Two sources ship: a synthetic generator and a replay of
//! recorded JSON-lines captures.

mod replay;
mod synthetic;

#[cfg(test)]
mod tests;

pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

use crate::config::SourceConfig;
use crate::error::SensorError;
use crate::events::{EventBus, TrackerEvent};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BLOCKING_SEND_SLICE: Duration = Duration::from_millis(100);

/// One raw reading from the motion sensors
///
/// Accelerometer values are m/s², gyroscope values rad/s. Timestamps are
/// monotonic nanoseconds from the sensor clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor", rename_all = "snake_case")]
pub enum SensorInput {
    Accelerometer {
        x: f64,
        y: f64,
        z: f64,
        timestamp_nanos: i64,
    },
    Gyroscope {
        x: f64,
        y: f64,
        z: f64,
        timestamp_nanos: i64,
    },
}

impl SensorInput {
    pub fn timestamp_nanos(&self) -> i64 {
        match self {
            SensorInput::Accelerometer {
                timestamp_nanos, ..
            }
            | SensorInput::Gyroscope {
                timestamp_nanos, ..
            } => *timestamp_nanos,
        }
    }
}

/// Which feed a session reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Synthetic,
    Replay,
}

/// Producer half of the sensor queue
///
/// Real-time producers use [`SampleSender::push`], which never blocks and drops the
/// newest sample when the queue is full. Offline producers use
/// [`SampleSender::push_blocking`] and wait for room instead.
#[derive(Debug, Clone)]
pub struct SampleSender {
    sender: Sender<SensorInput>,
    overflows: Arc<AtomicU64>,
}

impl SampleSender {
    /// Returns `false` once the consumer is gone
    pub fn push(&self, input: SensorInput) -> bool {
        match self.sender.try_send(input) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.overflows.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 1_000 == 0 {
                    warn!(dropped, "Sensor queue full, dropping newest samples");
                }
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Wait for room in the queue; returns `false` on cancellation or disconnect
    pub fn push_blocking(&self, mut input: SensorInput, token: &CancellationToken) -> bool {
        loop {
            if token.is_cancelled() {
                return false;
            }
            match self.sender.send_timeout(input, BLOCKING_SEND_SLICE) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => input = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Samples dropped because the queue was full
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

/// Consumer half of the sensor queue
#[derive(Debug, Clone)]
pub struct SampleReceiver {
    receiver: Receiver<SensorInput>,
    overflows: Arc<AtomicU64>,
}

impl SampleReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SensorInput, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<SensorInput> {
        self.receiver.try_recv().ok()
    }

    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Shared overflow counter, readable after the receiver moves to the pipeline
    pub fn overflow_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.overflows)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Create the bounded sensor queue
pub fn sample_queue(capacity: usize) -> (SampleSender, SampleReceiver) {
    let (sender, receiver) = channel::bounded(capacity.max(1));
    let overflows = Arc::new(AtomicU64::new(0));
    (
        SampleSender {
            sender,
            overflows: Arc::clone(&overflows),
        },
        SampleReceiver {
            receiver,
            overflows,
        },
    )
}

/// A producer of raw sensor samples
pub trait SampleSource: Send + 'static {
    fn name(&self) -> &str;

    /// Verify the required sensors exist before the session starts
    fn check_available(&self) -> Result<(), SensorError>;

    /// Produce samples until exhausted, cancelled, or the queue disconnects
    fn run(
        self: Box<Self>,
        output: SampleSender,
        token: CancellationToken,
    ) -> Result<(), SensorError>;
}

/// Build the source described by the configuration
pub fn from_config(config: &SourceConfig) -> Result<Box<dyn SampleSource>, SensorError> {
    match config.kind {
        SourceKind::Synthetic => Ok(Box::new(
            SyntheticSource::new(config.rate_hz, config.yaw_rate_dps).realtime(config.realtime),
        )),
        SourceKind::Replay => {
            let path = config.replay_path.as_ref().ok_or_else(|| {
                SensorError::Unavailable("replay source has no recording path".to_string())
            })?;
            Ok(Box::new(ReplaySource::new(path).realtime(config.realtime)))
        }
    }
}

/// Run a source on a dedicated named thread; a failure is published as a system error
pub fn spawn_source(
    source: Box<dyn SampleSource>,
    output: SampleSender,
    token: CancellationToken,
    event_bus: Arc<EventBus>,
) -> std::io::Result<JoinHandle<()>> {
    let name = source.name().to_string();
    std::thread::Builder::new()
        .name(format!("source-{}", name))
        .spawn(move || {
            info!(source = %name, "Sample source started");
            match source.run(output, token) {
                Ok(()) => info!(source = %name, "Sample source finished"),
                Err(e) => {
                    error!(source = %name, "Sample source failed: {}", e);
                    event_bus.publish(TrackerEvent::SystemError {
                        component: format!("source-{}", name),
                        error: e.to_string(),
                    });
                }
            }
            debug!(source = %name, "Sample source thread exiting");
        })
}
