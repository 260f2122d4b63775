use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Delivery counters shared between the sink and its in-flight sends
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Frames handed to the sink
    pub frames_dispatched: AtomicU64,
    /// Frames the transport accepted
    pub frames_sent: AtomicU64,
    /// Sends that failed or timed out
    pub send_failures: AtomicU64,
    /// Frames discarded because no destination was resolved
    pub dropped_no_destination: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatched(&self) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Count a failure and return the length of the current failure streak
    pub fn record_failure(&self) -> u64 {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a frame with nowhere to go and return the running total
    pub fn record_no_destination(&self) -> u64 {
        self.dropped_no_destination.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            dropped_no_destination: self.dropped_no_destination.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStatsSnapshot {
    pub frames_dispatched: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub dropped_no_destination: u64,
}

impl TransportStatsSnapshot {
    /// Dispatched frames whose send has not completed yet
    pub fn in_flight(&self) -> u64 {
        self.frames_dispatched
            .saturating_sub(self.frames_sent + self.send_failures + self.dropped_no_destination)
    }
}
