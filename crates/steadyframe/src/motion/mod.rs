//! Inter-frame motion: a rotation + uniform scale + translation model fitted
//! robustly to tracked point pairs.

mod ransac;
mod similarity;

pub use ransac::MotionEstimator;
pub use similarity::SimilarityTransform;

use serde::{Deserialize, Serialize};

/// Rigid motion between two consecutive frames.
///
/// `dx`, `dy` are the translation terms of the fitted transform (pixels),
/// `dtheta` its rotation angle (radians). Scale is estimated but not kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionDelta {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl MotionDelta {
    pub const ZERO: Self = Self {
        dx: 0.0,
        dy: 0.0,
        dtheta: 0.0,
    };

    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }

    /// Euclidean length of the translation part.
    pub fn translation_norm(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.dtheta.is_finite()
    }
}

/// A successful robust fit.
#[derive(Debug, Clone)]
pub struct MotionEstimate {
    /// Translation and rotation of `transform`.
    pub delta: MotionDelta,
    /// Full fitted model, mapping previous-frame points to current ones.
    pub transform: SimilarityTransform,
    /// Per input correspondence, `true` when it agrees with the model.
    pub inlier_mask: Vec<bool>,
    /// Current-frame positions of the inliers.
    pub inliers: Vec<[f32; 2]>,
}

impl MotionEstimate {
    pub fn n_inliers(&self) -> usize {
        self.inliers.len()
    }
}
