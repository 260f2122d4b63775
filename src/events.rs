use crate::control::ControlCommand;
use crate::error::HeadTrackerError;
use crate::orientation::CalibrationOffsets;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events published by the tracker for display and coordination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackerEvent {
    /// A calibrated orientation was produced; emitted whether or not the frame was delivered
    OrientationUpdated {
        yaw: f64,
        pitch: f64,
        roll: f64,
        timestamp: SystemTime,
    },
    /// New calibration offsets took effect
    Calibrated {
        offsets: CalibrationOffsets,
        timestamp: SystemTime,
    },
    /// Frame production was paused or resumed
    PauseChanged { paused: bool, timestamp: SystemTime },
    /// A physical gesture was classified
    GestureRecognized {
        gesture: String,
        command: Option<ControlCommand>,
        timestamp: SystemTime,
    },
    /// Session lifecycle transition
    SessionStateChanged {
        state: SessionState,
        timestamp: SystemTime,
    },
    /// A component reported a fault
    SystemError { component: String, error: String },
    /// Shutdown requested by the user or a signal
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl TrackerEvent {
    pub fn orientation(yaw: f64, pitch: f64, roll: f64) -> Self {
        TrackerEvent::OrientationUpdated {
            yaw,
            pitch,
            roll,
            timestamp: SystemTime::now(),
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            TrackerEvent::OrientationUpdated { timestamp, .. } => *timestamp,
            TrackerEvent::Calibrated { timestamp, .. } => *timestamp,
            TrackerEvent::PauseChanged { timestamp, .. } => *timestamp,
            TrackerEvent::GestureRecognized { timestamp, .. } => *timestamp,
            TrackerEvent::SessionStateChanged { timestamp, .. } => *timestamp,
            TrackerEvent::SystemError { .. } => SystemTime::now(),
            TrackerEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            TrackerEvent::OrientationUpdated {
                yaw, pitch, roll, ..
            } => {
                format!("Orientation yaw={:.2} pitch={:.2} roll={:.2}", yaw, pitch, roll)
            }
            TrackerEvent::Calibrated { offsets, .. } => format!(
                "Calibrated with offsets yaw={:.2} pitch={:.2} roll={:.2}",
                offsets.yaw, offsets.pitch, offsets.roll
            ),
            TrackerEvent::PauseChanged { paused, .. } => {
                if *paused {
                    "Tracking paused".to_string()
                } else {
                    "Tracking resumed".to_string()
                }
            }
            TrackerEvent::GestureRecognized {
                gesture, command, ..
            } => match command {
                Some(command) => format!("Gesture {} -> {}", gesture, command.name()),
                None => format!("Gesture {} (no action)", gesture),
            },
            TrackerEvent::SessionStateChanged { state, .. } => {
                format!("Session state: {:?}", state)
            }
            TrackerEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            TrackerEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            TrackerEvent::OrientationUpdated { .. } => "orientation_updated",
            TrackerEvent::Calibrated { .. } => "calibrated",
            TrackerEvent::PauseChanged { .. } => "pause_changed",
            TrackerEvent::GestureRecognized { .. } => "gesture_recognized",
            TrackerEvent::SessionStateChanged { .. } => "session_state_changed",
            TrackerEvent::SystemError { .. } => "system_error",
            TrackerEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus over a tokio broadcast channel
///
/// Publishing never blocks, so it is safe to call from the sensor thread.
/// Slow subscribers lag and lose the oldest events instead of stalling producers.
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of receivers; zero when nobody is listening, which is not an error.
    pub fn publish(&self, event: TrackerEvent) -> usize {
        match &event {
            TrackerEvent::OrientationUpdated { .. } => {}
            TrackerEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            TrackerEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            TrackerEvent::Calibrated { .. } | TrackerEvent::PauseChanged { .. } => {
                info!("{}", event.description());
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&TrackerEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &TrackerEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<TrackerEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<TrackerEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next matching event
    ///
    /// Lagging skips the missed events and keeps going; only a closed bus ends the stream.
    pub async fn recv(&mut self) -> Result<TrackerEvent, HeadTrackerError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(HeadTrackerError::component(
                        "event_bus".to_string(),
                        format!("bus closed for receiver '{}'", self.name),
                    ));
                }
            }
        }
    }

    /// Try to receive a matching event without blocking
    pub fn try_recv(&mut self) -> Option<TrackerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus.publish(TrackerEvent::orientation(1.0, 2.0, 3.0));
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            TrackerEvent::OrientationUpdated {
                yaw, pitch, roll, ..
            } => {
                assert_eq!((yaw, pitch, roll), (1.0, 2.0, 3.0));
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let event_bus = EventBus::new(4);
        assert_eq!(event_bus.publish(TrackerEvent::orientation(0.0, 0.0, 0.0)), 0);
        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver =
            event_bus.subscribe_filtered(EventFilter::EventTypes(vec!["pause_changed"]), "test");

        event_bus.publish(TrackerEvent::orientation(1.0, 1.0, 1.0));
        event_bus.publish(TrackerEvent::PauseChanged {
            paused: true,
            timestamp: SystemTime::now(),
        });

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        match received {
            TrackerEvent::PauseChanged { paused, .. } => assert!(paused),
            _ => panic!("Unexpected event type"),
        }
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_receiver_keeps_latest() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe_filtered(EventFilter::All, "lagging");

        for i in 0..5 {
            event_bus.publish(TrackerEvent::orientation(i as f64, 0.0, 0.0));
        }

        let mut last_yaw = None;
        while let Some(TrackerEvent::OrientationUpdated { yaw, .. }) = receiver.try_recv() {
            last_yaw = Some(yaw);
        }
        assert_eq!(last_yaw, Some(4.0));
    }

    #[test]
    fn test_event_properties() {
        let event = TrackerEvent::GestureRecognized {
            gesture: "double_tap".to_string(),
            command: Some(ControlCommand::Calibrate),
            timestamp: SystemTime::now(),
        };

        assert_eq!(event.event_type(), "gesture_recognized");
        assert_eq!(event.description(), "Gesture double_tap -> calibrate");
    }
}
