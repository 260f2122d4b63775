//! Host gesture surfaces feeding the gesture dispatcher

mod keyboard;

#[cfg(all(feature = "evdev-input", target_os = "linux"))]
mod device;

pub use keyboard::{map_key, KeyboardAction, KeyboardInputHandler};

#[cfg(all(feature = "evdev-input", target_os = "linux"))]
pub use device::{DeviceInput, DeviceInputHandler};
