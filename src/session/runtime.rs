use super::tracker::TrackingSession;
use super::types::ShutdownReason;
use crate::error::Result;
use crate::events::{EventFilter, TrackerEvent};
use std::time::SystemTime;
use tokio::signal;
use tracing::{info, warn};

impl TrackingSession {
    /// Block until SIGINT, SIGTERM or a shutdown request, then stop the session
    pub async fn run_until_shutdown(&mut self) -> Result<ShutdownReason> {
        let mut requests = self.event_bus().subscribe_filtered(
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "session-shutdown",
        );

        let reason = tokio::select! {
            reason = wait_for_signal() => reason,
            event = requests.recv() => match event {
                Ok(TrackerEvent::ShutdownRequested { reason, .. }) => {
                    ShutdownReason::UserRequest(reason)
                }
                Ok(other) => ShutdownReason::Error(format!("unexpected event {}", other.event_type())),
                Err(e) => ShutdownReason::Error(e.to_string()),
            },
        };

        info!("Shutdown initiated: {:?}", reason);
        self.stop().await?;
        Ok(reason)
    }

    /// Ask whoever is running the session loop to shut down
    pub fn request_shutdown(&self, reason: impl Into<String>) {
        self.event_bus().publish(TrackerEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: reason.into(),
        });
    }
}

async fn wait_for_signal() -> ShutdownReason {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        return ShutdownReason::Signal("SIGTERM".to_string());
                    }
                    reason = wait_for_ctrl_c() => return reason,
                }
            }
            Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
        }
    }

    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> ShutdownReason {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received SIGINT signal (Ctrl+C)");
            ShutdownReason::Signal("SIGINT".to_string())
        }
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending().await
        }
    }
}
