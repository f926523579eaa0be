//! Frame-to-frame motion measurement shared by the online and the batch
//! paths: keep the previous grayscale frame and its feature set, track into
//! the new frame, fit the motion, refresh the features.

use image::GrayImage;
use tracing::{debug, warn};

use crate::features::{FeatureSet, FeatureTracker};
use crate::motion::{MotionEstimate, MotionEstimator};

/// What one call to [`MotionPass::step`] observed.
#[derive(Debug)]
pub(crate) enum Step {
    /// No previous frame yet; the frame became the baseline.
    Baseline,
    /// Motion from the previous frame to this one.
    Motion(MotionEstimate),
    /// Motion could not be measured; callers treat it as zero.
    Lost,
}

/// Per-transition feature counts.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StepCounts {
    pub(crate) features: usize,
    pub(crate) tracked: usize,
    pub(crate) inliers: usize,
}

struct Baseline {
    gray: GrayImage,
    features: FeatureSet,
}

pub(crate) struct MotionPass {
    baseline: Option<Baseline>,
    min_reuse_points: usize,
}

impl MotionPass {
    pub(crate) fn new(min_reuse_points: usize) -> Self {
        Self {
            baseline: None,
            min_reuse_points,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.baseline = None;
    }

    /// Advance to `gray`. The new frame always becomes the baseline; its
    /// features are the surviving inliers when enough remain, otherwise a
    /// fresh detection.
    pub(crate) fn step(
        &mut self,
        gray: GrayImage,
        tracker: &FeatureTracker,
        estimator: &MotionEstimator,
    ) -> (Step, StepCounts) {
        let Some(prev) = self.baseline.take() else {
            let features = tracker.detect(&gray);
            let counts = StepCounts {
                features: features.len(),
                ..StepCounts::default()
            };
            self.baseline = Some(Baseline { gray, features });
            return (Step::Baseline, counts);
        };

        let mut counts = StepCounts {
            features: prev.features.len(),
            ..StepCounts::default()
        };
        let estimate = if prev.features.is_empty() {
            None
        } else {
            let tracked = tracker.track(&prev.gray, &gray, &prev.features);
            let (p, c) = tracked.valid_pairs(&prev.features);
            counts.tracked = p.len();
            estimator.estimate(&p, &c)
        };

        let (step, features) = match estimate {
            Some(est) => {
                counts.inliers = est.n_inliers();
                let features = if est.n_inliers() >= self.min_reuse_points {
                    FeatureSet::new(est.inliers.clone())
                } else {
                    debug!(inliers = est.n_inliers(), "few inliers left, re-detecting features");
                    tracker.detect(&gray)
                };
                (Step::Motion(est), features)
            }
            None => {
                warn!(
                    features = counts.features,
                    tracked = counts.tracked,
                    "motion lost, re-detecting features"
                );
                (Step::Lost, tracker.detect(&gray))
            }
        };
        self.baseline = Some(Baseline { gray, features });
        (step, counts)
    }
}
