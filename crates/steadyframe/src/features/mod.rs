//! Corner detection and sparse optical flow.
//!
//! [`FeatureTracker`] finds Shi–Tomasi corners in a grayscale frame and
//! follows them into the next frame with pyramidal Lucas–Kanade. Points are
//! `[x, y]` pixel coordinates with the origin at the top-left pixel centre.

mod detect;
mod track;

use image::GrayImage;

use crate::config::{FeatureConfig, FlowConfig};

/// Corner locations detected in (or carried over to) one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    points: Vec<[f32; 2]>,
}

impl FeatureSet {
    /// Wrap an explicit list of points.
    pub fn new(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    /// Point coordinates.
    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<[f32; 2]>> for FeatureSet {
    fn from(points: Vec<[f32; 2]>) -> Self {
        Self::new(points)
    }
}

/// Result of tracking a [`FeatureSet`] into the next frame.
///
/// All vectors are index-aligned with the input feature set.
#[derive(Debug, Clone, Default)]
pub struct TrackedSet {
    /// Estimated position in the next frame (meaningless where not valid).
    pub points: Vec<[f32; 2]>,
    /// `true` when tracking converged inside the frame.
    pub valid: Vec<bool>,
    /// Mean absolute intensity difference over the window (gray levels).
    pub errors: Vec<f32>,
}

impl TrackedSet {
    /// Number of successfully tracked points.
    pub fn n_valid(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Split into index-aligned `(previous, current)` lists of valid pairs.
    pub fn valid_pairs(&self, previous: &FeatureSet) -> (Vec<[f32; 2]>, Vec<[f32; 2]>) {
        previous
            .points()
            .iter()
            .zip(&self.points)
            .zip(&self.valid)
            .filter(|(_, ok)| **ok)
            .map(|((p, c), _)| (*p, *c))
            .unzip()
    }
}

/// Detects corners and tracks them between consecutive frames.
#[derive(Debug, Clone)]
pub struct FeatureTracker {
    features: FeatureConfig,
    flow: FlowConfig,
}

impl FeatureTracker {
    pub fn new(features: FeatureConfig, flow: FlowConfig) -> Self {
        Self { features, flow }
    }

    /// Detect up to `max_features` well-separated corners, strongest first.
    ///
    /// A textureless frame yields an empty set.
    pub fn detect(&self, gray: &GrayImage) -> FeatureSet {
        FeatureSet::new(detect::good_features(gray, &self.features))
    }

    /// Follow `features` from `prev` into `curr`.
    ///
    /// Both images must have the same size. Points whose window leaves the
    /// image, whose window is too flat to solve, or whose final position is
    /// outside `curr` are marked invalid.
    pub fn track(&self, prev: &GrayImage, curr: &GrayImage, features: &FeatureSet) -> TrackedSet {
        track::track_pyramidal(prev, curr, features.points(), &self.flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{shifted_view, textured_canvas};

    #[test]
    fn detect_then_track_recovers_a_translation() {
        let canvas = textured_canvas(260, 200, 7);
        let prev = shifted_view(&canvas, 40.0, 30.0, 160, 120);
        // Viewport moves right by 3.0 and up by 1.5: content moves left, down.
        let curr = shifted_view(&canvas, 43.0, 28.5, 160, 120);

        let tracker = FeatureTracker::new(FeatureConfig::default(), FlowConfig::default());
        let features = tracker.detect(&prev);
        assert!(features.len() >= 8, "only {} corners", features.len());

        let tracked = tracker.track(&prev, &curr, &features);
        let (p, c) = tracked.valid_pairs(&features);
        assert!(p.len() >= features.len() / 2);

        let mut dx = 0.0;
        let mut dy = 0.0;
        for (a, b) in p.iter().zip(&c) {
            dx += (b[0] - a[0]) as f64;
            dy += (b[1] - a[1]) as f64;
        }
        dx /= p.len() as f64;
        dy /= p.len() as f64;
        assert!((dx + 3.0).abs() < 0.25, "dx = {dx}");
        assert!((dy - 1.5).abs() < 0.25, "dy = {dy}");
    }

    #[test]
    fn valid_pairs_drops_lost_points() {
        let prev = FeatureSet::new(vec![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]);
        let tracked = TrackedSet {
            points: vec![[1.5, 1.0], [9.0, 9.0], [3.5, 3.0]],
            valid: vec![true, false, true],
            errors: vec![0.0; 3],
        };
        let (p, c) = tracked.valid_pairs(&prev);
        assert_eq!(p, vec![[1.0, 1.0], [3.0, 3.0]]);
        assert_eq!(c, vec![[1.5, 1.0], [3.5, 3.0]]);
        assert_eq!(tracked.n_valid(), 2);
    }
}
