//! Frame delivery to the head-tracking PC over UDP or a USB serial adapter

mod mock;
mod serial;
mod sink;
mod stats;
mod types;
mod udp;

#[cfg(test)]
mod tests;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use sink::TransportSink;
pub use stats::{TransportStats, TransportStatsSnapshot};
pub use types::{TransportErrorExt, TransportMode};
pub use udp::UdpTransport;

use crate::error::TransportError;
use crate::frame::EncodedFrame;
use async_trait::async_trait;
use std::time::Duration;

/// UDP port the head-tracking software listens on
pub const UDP_PORT: u16 = 4242;

pub const SERIAL_BAUD: u32 = 115_200;

/// Upper bound on a single serial frame write
pub const SERIAL_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// A link that carries encoded frames
#[async_trait]
pub trait FrameTransport: Send + Sync {
    fn kind(&self) -> TransportMode;

    /// Human-readable destination for logs
    fn describe(&self) -> String;

    /// Deliver one complete frame
    async fn send(&self, frame: &EncodedFrame) -> Result<(), TransportError>;

    /// Release the underlying socket or device; later sends fail with `Closed`
    async fn close(&self) -> Result<(), TransportError>;
}
