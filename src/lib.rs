pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod frame;
pub mod gesture;
pub mod input;
pub mod orientation;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod transport;

pub use config::HeadTrackerConfig;
pub use control::{CalibrationController, ControlCommand};
pub use error::{FrameError, HeadTrackerError, Result, SensorError, TransportError};
pub use events::{EventBus, EventFilter, EventReceiver, TrackerEvent};
pub use frame::{decode_frame, encode_frame, EncodedFrame, PoseFrame, FRAME_LEN};
pub use gesture::{
    classify, Gesture, GestureDetector, GestureDispatcher, PressWindow, TouchGesture,
    TripleTapPolicy,
};
pub use input::KeyboardInputHandler;
pub use orientation::{CalibrationOffsets, OrientationEstimator, OrientationSample};
pub use pipeline::SensorPipeline;
pub use session::{SessionOptions, SessionState, SessionStatus, ShutdownReason, TrackingSession};
pub use source::{ReplaySource, SampleSource, SensorInput, SyntheticSource};
pub use transport::{
    FrameTransport, MockTransport, SerialTransport, TransportMode, TransportSink, UdpTransport,
};
