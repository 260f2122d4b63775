use crate::error::Result;
use crate::events::{EventBus, TrackerEvent};
use crate::gesture::{self, GestureDispatcher, KeyInput};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a terminal key stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardAction {
    /// Stand-in for a hardware volume key, routed through tap detection
    VolumeKey(gesture::KeyCode),
    Calibrate,
    Pause,
    Resume,
    Quit,
}

/// Terminal key bindings
pub fn map_key(code: KeyCode) -> Option<KeyboardAction> {
    match code {
        KeyCode::Up | KeyCode::Char('+') => {
            Some(KeyboardAction::VolumeKey(gesture::KeyCode::VolumeUp))
        }
        KeyCode::Down | KeyCode::Char('-') => {
            Some(KeyboardAction::VolumeKey(gesture::KeyCode::VolumeDown))
        }
        KeyCode::Char('c') => Some(KeyboardAction::Calibrate),
        KeyCode::Char('p') => Some(KeyboardAction::Pause),
        KeyCode::Char('r') => Some(KeyboardAction::Resume),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyboardAction::Quit),
        _ => None,
    }
}

/// Keyboard gestures for running on a desktop without the handset buttons
pub struct KeyboardInputHandler {
    gestures: Arc<GestureDispatcher>,
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(
        gestures: Arc<GestureDispatcher>,
        event_bus: Arc<EventBus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            gestures,
            event_bus,
            cancellation_token,
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input: Up/Down tap, c calibrate, p pause, r resume, q quit");

        let gestures = Arc::clone(&self.gestures);
        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match map_key(key_event.code) {
                            Some(KeyboardAction::Quit) => {
                                event_bus.publish(TrackerEvent::ShutdownRequested {
                                    timestamp: SystemTime::now(),
                                    reason: "User requested via keyboard".to_string(),
                                });
                                break;
                            }
                            Some(action) => Self::apply(&gestures, action),
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    fn apply(gestures: &GestureDispatcher, action: KeyboardAction) {
        match action {
            KeyboardAction::VolumeKey(code) => {
                gestures.handle_key(KeyInput::down(code, gestures.now_ms()));
            }
            KeyboardAction::Calibrate => gestures.controller().calibrate(),
            KeyboardAction::Pause => gestures.controller().pause(),
            KeyboardAction::Resume => gestures.controller().resume(),
            KeyboardAction::Quit => {}
        }
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // let the poll loop observe the cancel and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{CalibrationController, ControlCommand};
    use crate::gesture::TripleTapPolicy;

    #[test]
    fn test_key_bindings() {
        assert_eq!(
            map_key(KeyCode::Up),
            Some(KeyboardAction::VolumeKey(gesture::KeyCode::VolumeUp))
        );
        assert_eq!(
            map_key(KeyCode::Char('-')),
            Some(KeyboardAction::VolumeKey(gesture::KeyCode::VolumeDown))
        );
        assert_eq!(map_key(KeyCode::Char('c')), Some(KeyboardAction::Calibrate));
        assert_eq!(map_key(KeyCode::Esc), Some(KeyboardAction::Quit));
        assert_eq!(map_key(KeyCode::Char('x')), None);
    }

    #[tokio::test]
    async fn test_actions_reach_the_controller() {
        let (controller, receiver) = CalibrationController::new();
        let bus = Arc::new(EventBus::new(16));
        let gestures = GestureDispatcher::new(
            TripleTapPolicy::GapOrder,
            controller,
            bus,
            CancellationToken::new(),
        );

        KeyboardInputHandler::apply(&gestures, KeyboardAction::Pause);
        KeyboardInputHandler::apply(&gestures, KeyboardAction::Calibrate);
        KeyboardInputHandler::apply(&gestures, KeyboardAction::Resume);

        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![
                ControlCommand::Pause,
                ControlCommand::Calibrate,
                ControlCommand::Resume
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_stop_cancels() {
        let (controller, _receiver) = CalibrationController::new();
        let bus = Arc::new(EventBus::new(16));
        let token = CancellationToken::new();
        let gestures = Arc::new(GestureDispatcher::new(
            TripleTapPolicy::GapOrder,
            controller,
            Arc::clone(&bus),
            token.clone(),
        ));
        let handler = KeyboardInputHandler::new(gestures, bus, token.clone());

        handler.stop().await.unwrap();
        assert!(token.is_cancelled());
    }
}
