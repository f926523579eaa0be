//! steadyframe: feature-based digital video stabilization.
//!
//! Camera shake is removed by estimating the rigid motion between
//! consecutive frames, accumulating it into a camera trajectory, smoothing
//! that trajectory and warping each frame by the difference. The stages are:
//!
//! 1. **Features** – Shi–Tomasi corners, tracked with pyramidal Lucas–Kanade.
//! 2. **Motion** – RANSAC fit of a rotation + uniform scale + translation
//!    model; translation and rotation feed the trajectory.
//! 3. **Trajectory** – running sum of per-frame motion, smoothed either
//!    online (per-axis Kalman + exponential blend) or offline (box or
//!    Gaussian window over the whole path).
//! 4. **Compensation** – inverse rigid warp with reflected borders, then a
//!    crop-and-rescale or centred zoom to hide the margins.
//!
//! # Public API
//! - [`Stabilizer`]: the session. [`Stabilizer::process_frame`] for live
//!   streams, [`Stabilizer::process_all`] / [`Stabilizer::process_all_with`]
//!   for recorded sequences behind a [`FrameSource`].
//! - [`StabilizerConfig`] and its per-stage sub-configs.
//! - The individual stages ([`FeatureTracker`], [`MotionEstimator`],
//!   [`TrajectorySmoother`] implementations, [`FrameCompensator`]) for callers
//!   assembling their own pipeline.

mod batch;
mod compensate;
mod config;
mod error;
mod features;
mod imaging;
mod motion;
mod pipeline;
mod session;
mod source;
mod trajectory;

#[cfg(test)]
pub(crate) mod test_utils;

pub use batch::{BatchOutput, TrajectoryReport, TransitionStats};
pub use compensate::FrameCompensator;
pub use config::{
    AxisNoise, BorderFix, EstimatorConfig, FeatureConfig, FlowConfig, KalmanNoise, KernelShape,
    SessionConfig, SmoothingConfig, SmoothingStrategy, StabilizerConfig,
};
pub use error::{ConfigError, SourceError, StabilizeError};
pub use features::{FeatureSet, FeatureTracker, TrackedSet};
pub use imaging::{to_gray, Frame};
pub use motion::{MotionDelta, MotionEstimate, MotionEstimator, SimilarityTransform};
pub use session::{MotionHistory, SessionState, StabilizedFrame, Stabilizer};
pub use source::FrameSource;
pub use trajectory::{
    Pose, RecursiveSmoother, ScalarKalman, Smoother, SmoothingKernel, Trajectory,
    TrajectorySmoother, WindowedSmoother,
};
