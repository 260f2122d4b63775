mod estimator;
mod types;


pub use estimator::{EstimatorCounters, OrientationEstimator, COMPLEMENTARY_ALPHA};
pub use types::{CalibrationOffsets, FusionState, OrientationSample};
