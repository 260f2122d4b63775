use crate::error::{HeadTrackerError, Result};
use crate::events::{EventBus, TrackerEvent};
use crate::gesture::{GestureDispatcher, KeyCode, KeyInput};
use evdev::{Device, EventType, InputEvent, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_CONSECUTIVE_ERRORS: u32 = 5;
const IDLE_POLL: Duration = Duration::from_millis(10);

/// A device event the gesture layer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInput {
    Key(KeyCode, bool),
    TouchDown,
    TouchUp,
}

/// Volume keys and touch from a Linux input device
///
/// Reads the device on a blocking thread and retries with exponential backoff when
/// it disappears or errors out.
pub struct DeviceInputHandler {
    device_path: String,
    gestures: Arc<GestureDispatcher>,
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
    max_retries: u32,
    retry_delay: Duration,
}

impl DeviceInputHandler {
    pub fn new(
        device_path: impl Into<String>,
        gestures: Arc<GestureDispatcher>,
        event_bus: Arc<EventBus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            device_path: device_path.into(),
            gestures,
            event_bus,
            cancellation_token,
            max_retries: 10,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Start monitoring the input device
    pub async fn start(&self) -> Result<()> {
        info!("Starting input device handler for {}", self.device_path);

        let device_path = self.device_path.clone();
        let gestures = Arc::clone(&self.gestures);
        let event_bus = Arc::clone(&self.event_bus);
        let token = self.cancellation_token.clone();
        let max_retries = self.max_retries;
        let retry_delay = self.retry_delay;

        tokio::spawn(async move {
            let mut retry_count = 0;

            while !token.is_cancelled() {
                let path = device_path.clone();
                let gestures = Arc::clone(&gestures);
                let monitor_token = token.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    Self::monitor_device(&path, &gestures, &monitor_token)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(HeadTrackerError::component(
                        "input_device".to_string(),
                        format!("monitor task failed: {}", e),
                    ))
                });

                match outcome {
                    Ok(()) => {
                        info!("Input device monitoring ended normally");
                        break;
                    }
                    Err(e) => {
                        error!("Input device error: {}", e);
                        retry_count += 1;

                        event_bus.publish(TrackerEvent::SystemError {
                            component: "input_device".to_string(),
                            error: format!("Attempt {}/{}: {}", retry_count, max_retries, e),
                        });

                        if retry_count >= max_retries {
                            error!(
                                "Input device handler failed after {} attempts, giving up",
                                max_retries
                            );
                            break;
                        }

                        let delay = retry_delay * 2_u32.pow(retry_count.min(5));
                        warn!(
                            "Retrying input device in {:?} (attempt {}/{})",
                            delay, retry_count, max_retries
                        );
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = sleep(delay) => {}
                        }
                    }
                }
            }
            debug!("Input device handler exited");
        });

        Ok(())
    }

    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }

    fn monitor_device(
        device_path: &str,
        gestures: &GestureDispatcher,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut device = Device::open(device_path).map_err(|e| {
            HeadTrackerError::component(
                "input_device".to_string(),
                format!("failed to open {}: {}", device_path, e),
            )
        })?;

        info!(
            "Input device opened: {} ({})",
            device_path,
            device.name().unwrap_or("Unknown")
        );
        Self::validate_device(&device, device_path)?;
        Self::set_nonblocking(&device, device_path)?;

        let mut consecutive_errors = 0;

        while !token.is_cancelled() {
            match device.fetch_events() {
                Ok(events) => {
                    consecutive_errors = 0;
                    for event in events {
                        if let Some(input) = Self::translate(&event) {
                            Self::deliver(gestures, input);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(IDLE_POLL);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(HeadTrackerError::component(
                            "input_device".to_string(),
                            format!("too many consecutive read errors: {}", e),
                        ));
                    }
                    warn!(
                        "Error reading input device (attempt {}): {}",
                        consecutive_errors, e
                    );
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        gestures.shutdown();
        Ok(())
    }

    fn set_nonblocking(device: &Device, device_path: &str) -> Result<()> {
        let fd = device.as_raw_fd();
        // SAFETY: fd belongs to `device`, which outlives this call
        let ok = unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            flags >= 0 && libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) >= 0
        };
        if ok {
            Ok(())
        } else {
            Err(HeadTrackerError::component(
                "input_device".to_string(),
                format!(
                    "failed to set {} non-blocking: {}",
                    device_path,
                    std::io::Error::last_os_error()
                ),
            ))
        }
    }

    fn validate_device(device: &Device, device_path: &str) -> Result<()> {
        if !device.supported_events().contains(EventType::KEY) {
            return Err(HeadTrackerError::component(
                "input_device".to_string(),
                format!("{} does not report key events", device_path),
            ));
        }

        if let Some(keys) = device.supported_keys() {
            let has_volume = keys.contains(Key::KEY_VOLUMEUP) || keys.contains(Key::KEY_VOLUMEDOWN);
            let has_touch = keys.contains(Key::BTN_TOUCH);
            if !has_volume && !has_touch {
                warn!(
                    "Device {} has neither volume keys nor touch, gestures will not fire",
                    device_path
                );
            } else {
                debug!(has_volume, has_touch, "Input device capabilities");
            }
        }

        Ok(())
    }

    /// Map a raw event to a gesture input; repeats and unrelated events yield `None`
    pub fn translate(event: &InputEvent) -> Option<DeviceInput> {
        let InputEventKind::Key(key) = event.kind() else {
            return None;
        };

        let pressed = match event.value() {
            1 => true,
            0 => false,
            _ => return None,
        };

        match key {
            Key::KEY_VOLUMEUP => Some(DeviceInput::Key(KeyCode::VolumeUp, pressed)),
            Key::KEY_VOLUMEDOWN => Some(DeviceInput::Key(KeyCode::VolumeDown, pressed)),
            Key::BTN_TOUCH if pressed => Some(DeviceInput::TouchDown),
            Key::BTN_TOUCH => Some(DeviceInput::TouchUp),
            _ => None,
        }
    }

    fn deliver(gestures: &GestureDispatcher, input: DeviceInput) {
        let now = gestures.now_ms();
        match input {
            DeviceInput::Key(code, true) => {
                gestures.handle_key(KeyInput::down(code, now));
            }
            DeviceInput::Key(code, false) => {
                gestures.handle_key(KeyInput::up(code, now));
            }
            DeviceInput::TouchDown => gestures.touch_down(now),
            DeviceInput::TouchUp => gestures.touch_up(now),
        }
    }
}
