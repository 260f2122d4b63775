use crate::config::HeadTrackerConfig;
use crate::gesture::TripleTapPolicy;
use crate::orientation::{CalibrationOffsets, EstimatorCounters, OrientationSample};
use crate::transport::{TransportMode, TransportStatsSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a session is started with; fixed for the session's lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub mode: TransportMode,
    /// Destination host for UDP; `None` starts without a destination
    pub host: Option<String>,
    /// Serial adapter; `None` picks the first one found
    pub serial_device: Option<PathBuf>,
    pub triple_tap_policy: TripleTapPolicy,
    pub sensor_queue_capacity: usize,
}

impl SessionOptions {
    pub fn udp(host: Option<String>) -> Self {
        Self {
            mode: TransportMode::Udp,
            host,
            ..Self::default()
        }
    }

    pub fn usb_serial(serial_device: Option<PathBuf>) -> Self {
        Self {
            mode: TransportMode::UsbSerial,
            serial_device,
            ..Self::default()
        }
    }
}

impl From<&HeadTrackerConfig> for SessionOptions {
    fn from(config: &HeadTrackerConfig) -> Self {
        Self {
            mode: config.transport.mode,
            host: config.transport.host.clone(),
            serial_device: config.transport.serial_device.clone(),
            triple_tap_policy: config.gesture.triple_tap_policy,
            sensor_queue_capacity: config.system.sensor_queue_capacity,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: TransportMode::Udp,
            host: None,
            serial_device: None,
            triple_tap_policy: TripleTapPolicy::default(),
            sensor_queue_capacity: 1024,
        }
    }
}

/// Point-in-time view of a session for the collaborator
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: SessionState,
    pub mode: Option<TransportMode>,
    pub destination: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused: bool,
    pub offsets: CalibrationOffsets,
    pub last_sample: Option<OrientationSample>,
    pub estimator: EstimatorCounters,
    pub transport: TransportStatsSnapshot,
    pub queue_overflows: u64,
}

/// Why a session was shut down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest(String),
    Error(String),
}
