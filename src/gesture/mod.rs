mod detector;
mod dispatcher;
mod touch;


pub use detector::{
    classify, Classification, Gesture, GestureDetector, KeyAction, KeyCode, KeyInput,
    PressWindow, TripleTapPolicy, TAP_INTERVAL_MS,
};
pub use dispatcher::GestureDispatcher;
pub use touch::{TouchGesture, HOLD_TO_CALIBRATE_MS};
