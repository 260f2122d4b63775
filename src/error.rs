use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeadTrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl HeadTrackerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures of the motion sensor feed
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Required sensor unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to open sample source {source_name}: {details}")]
    SourceOpen {
        source_name: String,
        details: String,
    },

    #[error("Malformed sensor record at line {line}: {details}")]
    Parse { line: usize, details: String },
}

/// Failures of the frame transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to resolve destination {host}: {details}")]
    Resolve { host: String, details: String },

    #[error("No destination configured")]
    NoDestination,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to open serial device {device}: {details}")]
    SerialOpen { device: String, details: String },

    #[error("Failed to configure serial device {device}: {details}")]
    SerialConfigure { device: String, details: String },

    #[error("No USB serial adapter found")]
    NoSerialDevice,

    #[error("Transport closed")]
    Closed,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, HeadTrackerError>;
