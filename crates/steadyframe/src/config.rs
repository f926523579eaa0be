//! Stabilizer configuration.
//!
//! Every stage reads its own sub-struct; [`StabilizerConfig`] groups them and
//! is handed to the session once, at construction. All structs deserialize
//! with per-field defaults so partial JSON overlays work.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Corner detection parameters (Shi–Tomasi "good features to track").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Maximum number of corners returned per frame.
    pub max_features: usize,
    /// Minimum accepted corner response, as a fraction of the strongest one.
    pub quality_level: f32,
    /// Minimum Euclidean distance between returned corners (pixels).
    pub min_distance: f32,
    /// Side of the square window the structure tensor is summed over.
    pub block_size: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_features: 200,
            quality_level: 0.01,
            min_distance: 30.0,
            block_size: 3,
        }
    }
}

/// Pyramidal Lucas–Kanade parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Side of the square integration window (odd).
    pub win_size: usize,
    /// Number of pyramid levels above the full-resolution image.
    pub max_level: usize,
    /// Iteration cap per pyramid level.
    pub max_iters: usize,
    /// Convergence threshold on the per-iteration update (pixels).
    pub epsilon: f32,
    /// Minimum smallest eigenvalue of the window-averaged structure tensor
    /// (gray levels squared). Flat or edge-only windows below it are dropped.
    pub min_eigen: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            win_size: 15,
            max_level: 2,
            max_iters: 10,
            epsilon: 0.03,
            min_eigen: 0.1,
        }
    }
}

/// Robust partial-affine fit parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Minimum number of valid correspondences needed to attempt a fit.
    pub min_correspondences: usize,
    /// Reprojection error (pixels) under which a correspondence is an inlier.
    pub inlier_threshold: f64,
    /// Hard cap on RANSAC iterations.
    pub max_iters: usize,
    /// Confidence used to shrink the iteration count as inliers are found.
    pub confidence: f64,
    /// RNG seed; the fit is deterministic for a given seed.
    pub seed: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_correspondences: 5,
            inlier_threshold: 3.0,
            max_iters: 2000,
            confidence: 0.99,
            seed: 42,
        }
    }
}

/// Which trajectory smoother the session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingStrategy {
    /// Per-axis scalar Kalman filter plus exponential blend; online.
    #[default]
    Causal,
    /// Edge-padded convolution over the whole trajectory; batch only.
    Windowed,
}

impl SmoothingStrategy {
    /// `true` when the strategy can emit a value per incoming frame.
    pub fn is_causal(self) -> bool {
        matches!(self, Self::Causal)
    }
}

/// Convolution kernel shape for windowed smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelShape {
    /// Uniform moving average.
    Box,
    /// Gaussian with sigma = window / 6.
    #[default]
    Gaussian,
}

/// Process/measurement noise of one scalar Kalman filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisNoise {
    /// Variance added at every predict step.
    pub process: f64,
    /// Variance of one measurement.
    pub measurement: f64,
}

/// Noise settings for the three causal filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanNoise {
    /// Shared by the x and y filters.
    pub translation: AxisNoise,
    /// Used by the angle filter.
    pub rotation: AxisNoise,
}

impl Default for KalmanNoise {
    fn default() -> Self {
        Self {
            translation: AxisNoise {
                process: 0.01,
                measurement: 0.1,
            },
            rotation: AxisNoise {
                process: 0.001,
                measurement: 0.01,
            },
        }
    }
}

/// Trajectory smoothing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Active strategy.
    pub strategy: SmoothingStrategy,
    /// Windowed: kernel radius in frames (window = 2 * radius + 1).
    pub radius: usize,
    /// Windowed: kernel shape.
    pub kernel: KernelShape,
    /// Windowed: run the filter a second time over its own output.
    pub double_smoothing: bool,
    /// Causal: weight of the previous smoothed pose in the exponential blend.
    pub alpha: f64,
    /// Causal: Kalman noise per axis.
    pub noise: KalmanNoise,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            strategy: SmoothingStrategy::Causal,
            radius: 50,
            kernel: KernelShape::Gaussian,
            double_smoothing: true,
            alpha: 0.8,
            noise: KalmanNoise::default(),
        }
    }
}

/// How the empty margins exposed by the corrective warp are hidden.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum BorderFix {
    /// Leave the warped frame as is.
    None,
    /// Crop `floor(min(w, h) * margin)` pixels per side, then rescale.
    Crop {
        /// Fraction of the shorter side removed on each edge.
        margin: f64,
    },
    /// Zoom in about the frame centre, folded into the corrective warp.
    Zoom {
        /// Scale factor, `>= 1`.
        factor: f64,
    },
}

impl Default for BorderFix {
    fn default() -> Self {
        Self::Crop { margin: 0.05 }
    }
}

/// Top-level configuration handed to [`Stabilizer`](crate::Stabilizer).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Corner detection.
    pub features: FeatureConfig,
    /// Optical flow.
    pub flow: FlowConfig,
    /// Motion model fit.
    pub estimator: EstimatorConfig,
    /// Trajectory smoothing.
    pub smoothing: SmoothingConfig,
    /// Border repair after the corrective warp.
    pub border: BorderFix,
    /// Feature refresh policy.
    pub session: SessionConfig,
}

/// Session bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inlier points are reused for the next frame when at least this many
    /// survive; otherwise corners are re-detected.
    pub min_reuse_points: usize,
    /// Number of recent motion magnitudes kept for diagnostics.
    pub history_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_reuse_points: 50,
            history_len: 30,
        }
    }
}

impl StabilizerConfig {
    /// Preset matching offline processing of a recorded clip: double
    /// Gaussian windowed smoothing and a 4 % zoom border fix.
    pub fn batch() -> Self {
        Self {
            smoothing: SmoothingConfig {
                strategy: SmoothingStrategy::Windowed,
                ..SmoothingConfig::default()
            },
            border: BorderFix::Zoom { factor: 1.04 },
            ..Self::default()
        }
    }

    /// Check every field; the first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.features;
        if f.max_features == 0 {
            return Err(out_of_range("features.max_features", 0.0, ">= 1"));
        }
        check_open_unit(
            "features.quality_level",
            f.quality_level as f64,
            "(0, 1]",
        )?;
        check_non_negative("features.min_distance", f.min_distance as f64)?;
        if f.block_size == 0 {
            return Err(out_of_range("features.block_size", 0.0, ">= 1"));
        }

        let fl = &self.flow;
        if fl.win_size < 3 {
            return Err(out_of_range(
                "flow.win_size",
                fl.win_size as f64,
                "odd, >= 3",
            ));
        }
        if fl.win_size % 2 == 0 {
            return Err(ConfigError::EvenFlowWindow {
                win_size: fl.win_size,
            });
        }
        if fl.max_iters == 0 {
            return Err(out_of_range("flow.max_iters", 0.0, ">= 1"));
        }
        check_positive("flow.epsilon", fl.epsilon as f64)?;
        check_non_negative("flow.min_eigen", fl.min_eigen as f64)?;

        let e = &self.estimator;
        if e.min_correspondences < 2 {
            return Err(out_of_range(
                "estimator.min_correspondences",
                e.min_correspondences as f64,
                ">= 2",
            ));
        }
        check_positive("estimator.inlier_threshold", e.inlier_threshold)?;
        if e.max_iters == 0 {
            return Err(out_of_range("estimator.max_iters", 0.0, ">= 1"));
        }
        if !(e.confidence > 0.0 && e.confidence < 1.0) {
            return Err(out_of_range(
                "estimator.confidence",
                e.confidence,
                "(0, 1)",
            ));
        }

        let s = &self.smoothing;
        if s.radius == 0 {
            return Err(out_of_range("smoothing.radius", 0.0, ">= 1"));
        }
        if !(0.0..=1.0).contains(&s.alpha) {
            return Err(out_of_range("smoothing.alpha", s.alpha, "[0, 1]"));
        }
        check_positive(
            "smoothing.noise.translation.process",
            s.noise.translation.process,
        )?;
        check_positive(
            "smoothing.noise.translation.measurement",
            s.noise.translation.measurement,
        )?;
        check_positive("smoothing.noise.rotation.process", s.noise.rotation.process)?;
        check_positive(
            "smoothing.noise.rotation.measurement",
            s.noise.rotation.measurement,
        )?;

        match self.border {
            BorderFix::None => {}
            BorderFix::Crop { margin } => {
                if !(0.0..0.5).contains(&margin) {
                    return Err(out_of_range("border.margin", margin, "[0, 0.5)"));
                }
            }
            BorderFix::Zoom { factor } => {
                if !(factor.is_finite() && factor >= 1.0) {
                    return Err(out_of_range("border.factor", factor, ">= 1"));
                }
            }
        }

        if self.session.history_len == 0 {
            return Err(out_of_range("session.history_len", 0.0, ">= 1"));
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, value: f64, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value,
        expected,
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(out_of_range(field, value, "> 0"))
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(out_of_range(field, value, ">= 0"))
    }
}

fn check_open_unit(field: &'static str, value: f64, expected: &'static str) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(out_of_range(field, value, expected))
    }
}
