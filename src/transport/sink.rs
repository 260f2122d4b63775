use super::stats::{TransportStats, TransportStatsSnapshot};
use super::{FrameTransport, TransportErrorExt, TransportMode};
use crate::error::TransportError;
use crate::frame::EncodedFrame;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// A failure streak is re-announced at this interval
const FAILURE_LOG_INTERVAL: u64 = 500;

/// Hands encoded frames to the active transport without blocking the caller
///
/// `dispatch` is called from the sensor thread; the send itself runs on the async
/// runtime and its outcome only ever lands in the stats and the log.
#[derive(Clone)]
pub struct TransportSink {
    transport: Arc<dyn FrameTransport>,
    runtime: Handle,
    stats: Arc<TransportStats>,
}

impl TransportSink {
    pub fn new(transport: Arc<dyn FrameTransport>, runtime: Handle) -> Self {
        Self {
            transport,
            runtime,
            stats: Arc::new(TransportStats::new()),
        }
    }

    /// Queue one frame for delivery and return immediately
    pub fn dispatch(&self, frame: EncodedFrame) {
        self.stats.record_dispatched();

        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);

        self.runtime.spawn(async move {
            match transport.send(&frame).await {
                Ok(()) => stats.record_sent(),
                Err(TransportError::NoDestination) => {
                    let dropped = stats.record_no_destination();
                    if dropped == 1 || dropped % FAILURE_LOG_INTERVAL == 0 {
                        warn!(dropped, "No destination, frames are being discarded");
                    }
                }
                Err(e) => report_failure(&*transport, &stats, &e),
            }
        });
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.kind()
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        let snapshot = self.stats.snapshot();
        info!(
            transport = %self.transport.describe(),
            sent = snapshot.frames_sent,
            failed = snapshot.send_failures,
            "Closing transport"
        );
        self.transport.close().await
    }
}

fn report_failure(transport: &dyn FrameTransport, stats: &TransportStats, error: &TransportError) {
    let streak = stats.record_failure();

    if streak == 1 {
        warn!(
            transport = %transport.describe(),
            recoverable = error.is_recoverable(),
            "Frame send failed: {}",
            error
        );
    } else if streak % FAILURE_LOG_INTERVAL == 0 {
        warn!(
            transport = %transport.describe(),
            streak,
            "Frame sends still failing: {}",
            error
        );
    } else {
        debug!(transport = %transport.describe(), streak, "Frame send failed: {}", error);
    }
}
