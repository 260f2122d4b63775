use crate::gesture::TripleTapPolicy;
use crate::source::SourceKind;
use crate::transport::TransportMode;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct HeadTrackerConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct TransportConfig {
    /// Link carrying the frames
    #[serde(default)]
    pub mode: TransportMode,

    /// Host running the head-tracking software (UDP only)
    pub host: Option<String>,

    /// Serial adapter; the first /dev/ttyUSB* or /dev/ttyACM* when unset
    pub serial_device: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// JSON-lines recording to play back (replay only)
    pub replay_path: Option<PathBuf>,

    /// Pace samples in real time rather than as fast as possible
    #[serde(default = "default_realtime")]
    pub realtime: bool,

    /// Synthetic sensor rate
    #[serde(default = "default_rate_hz")]
    pub rate_hz: u32,

    /// Synthetic rotation rate about the vertical axis, degrees per second
    #[serde(default = "default_yaw_rate_dps")]
    pub yaw_rate_dps: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct GestureConfig {
    /// How a triple tap chooses between pause and resume
    #[serde(default)]
    pub triple_tap_policy: TripleTapPolicy,

    /// Read gestures from the terminal keyboard
    #[serde(default)]
    pub keyboard: bool,

    /// Linux input device for volume keys and touch
    pub input_device: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Raw samples buffered between the source and the pipeline
    #[serde(default = "default_sensor_queue_capacity")]
    pub sensor_queue_capacity: usize,
}

impl HeadTrackerConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("headtracker.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables use the `HEADTRACKER_` prefix and a double underscore
    /// between section and key, e.g. `HEADTRACKER_TRANSPORT__SERIAL_DEVICE`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("transport.mode", "udp")?
            .set_default("source.kind", "synthetic")?
            .set_default("source.realtime", default_realtime())?
            .set_default("source.rate_hz", default_rate_hz())?
            .set_default("source.yaw_rate_dps", default_yaw_rate_dps())?
            .set_default("gesture.triple_tap_policy", "gap_order")?
            .set_default("gesture.keyboard", false)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.sensor_queue_capacity",
                default_sensor_queue_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("HEADTRACKER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: HeadTrackerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.mode == TransportMode::Udp && self.transport.host.is_none() {
            return Err(ConfigError::Message(
                "transport.host is required in udp mode".to_string(),
            ));
        }

        if self.source.kind == SourceKind::Replay && self.source.replay_path.is_none() {
            return Err(ConfigError::Message(
                "source.replay_path is required for the replay source".to_string(),
            ));
        }

        if self.source.rate_hz == 0 {
            return Err(ConfigError::Message(
                "source.rate_hz must be greater than 0".to_string(),
            ));
        }

        if !self.source.yaw_rate_dps.is_finite() || self.source.yaw_rate_dps < 0.0 {
            return Err(ConfigError::Message(
                "source.yaw_rate_dps must be a finite, non-negative number".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.sensor_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Sensor queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            replay_path: None,
            realtime: default_realtime(),
            rate_hz: default_rate_hz(),
            yaw_rate_dps: default_yaw_rate_dps(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            sensor_queue_capacity: default_sensor_queue_capacity(),
        }
    }
}

fn default_realtime() -> bool {
    true
}
fn default_rate_hz() -> u32 {
    200
}
fn default_yaw_rate_dps() -> f64 {
    10.0
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_sensor_queue_capacity() -> usize {
    1024
}
