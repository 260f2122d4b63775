use super::{FrameTransport, TransportMode};
use crate::error::TransportError;
use crate::frame::EncodedFrame;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// In-memory transport for tests and dry runs
///
/// Records every frame it accepts; can be told to fail or to stall each send.
#[derive(Debug, Default)]
pub struct MockTransport {
    frames: Mutex<Vec<EncodedFrame>>,
    attempts: AtomicU64,
    failing: AtomicBool,
    closed: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stall every send for `delay` before completing
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn frames(&self) -> Vec<EncodedFrame> {
        self.frames.lock().clone()
    }

    /// Number of sends attempted, successful or not
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameTransport for MockTransport {
    fn kind(&self) -> TransportMode {
        TransportMode::Udp
    }

    fn describe(&self) -> String {
        "mock://".to_string()
    }

    async fn send(&self, frame: &EncodedFrame) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Send("injected failure".to_string()));
        }

        self.frames.lock().push(*frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
