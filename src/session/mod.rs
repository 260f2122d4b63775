//! Collaborator-facing session lifecycle

mod runtime;
mod tracker;
mod types;

#[cfg(test)]
mod tests;

pub use tracker::TrackingSession;
pub use types::{SessionOptions, SessionState, SessionStatus, ShutdownReason};
