use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which link carries the frames for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Udp,
    UsbSerial,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Udp => write!(f, "udp"),
            TransportMode::UsbSerial => write!(f, "usb_serial"),
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "udp" => Ok(TransportMode::Udp),
            "usb_serial" | "usb" | "serial" => Ok(TransportMode::UsbSerial),
            other => Err(format!("unknown transport mode '{}'", other)),
        }
    }
}

pub trait TransportErrorExt {
    fn is_recoverable(&self) -> bool;
    fn user_message(&self) -> String;
}

impl TransportErrorExt for TransportError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Send(_)
                | TransportError::Timeout(_)
                | TransportError::NoDestination
                | TransportError::Resolve { .. }
        )
    }

    fn user_message(&self) -> String {
        match self {
            TransportError::Resolve { host, .. } => {
                format!("Could not find {} on the network, check the PC address", host)
            }
            TransportError::NoDestination => {
                "No PC address set, frames are not being sent".to_string()
            }
            TransportError::Send(details) => format!("Sending a frame failed: {}", details),
            TransportError::Timeout(after) => {
                format!("Serial write did not complete within {:?}", after)
            }
            TransportError::SerialOpen { device, .. } => {
                format!("Could not open serial adapter {}", device)
            }
            TransportError::SerialConfigure { device, .. } => {
                format!("Could not set 115200 8N1 on {}", device)
            }
            TransportError::NoSerialDevice => "No USB serial adapter is connected".to_string(),
            TransportError::Closed => "Transport already closed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_mode_parsing() {
        assert_eq!("udp".parse::<TransportMode>(), Ok(TransportMode::Udp));
        assert_eq!("USB-Serial".parse::<TransportMode>(), Ok(TransportMode::UsbSerial));
        assert_eq!("usb".parse::<TransportMode>(), Ok(TransportMode::UsbSerial));
        assert!("tcp".parse::<TransportMode>().is_err());
        assert_eq!(TransportMode::UsbSerial.to_string(), "usb_serial");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(TransportError::Send("no route".to_string()).is_recoverable());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(!TransportError::NoSerialDevice.is_recoverable());
        assert!(TransportError::NoSerialDevice
            .user_message()
            .contains("USB serial"));
    }
}
