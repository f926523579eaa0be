//! RANSAC fit of the 4-DOF similarity model.

use rand::prelude::*;
use tracing::debug;

use super::similarity::{spread_eigenvalues, SimilarityTransform};
use super::{MotionDelta, MotionEstimate};
use crate::config::EstimatorConfig;

/// Relative minor/major spread below which a point set counts as collinear.
const COLLINEAR_RATIO: f64 = 1e-6;

/// Robust motion estimator between matched point sets.
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    config: EstimatorConfig,
}

impl MotionEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Fit a similarity transform mapping `prev[i]` onto `curr[i]`.
    ///
    /// Samples 2-point minimal subsets, keeps the model with the most
    /// inliers, then refits on all inliers in closed form. Returns `None`
    /// when fewer than `min_correspondences` finite pairs are given, when the
    /// previous points are coincident or collinear, or when no usable model
    /// is found.
    pub fn estimate(&self, prev: &[[f32; 2]], curr: &[[f32; 2]]) -> Option<MotionEstimate> {
        let cfg = &self.config;
        if prev.len() != curr.len() {
            debug!(prev = prev.len(), curr = curr.len(), "mismatched correspondence lists");
            return None;
        }

        let mut index = Vec::with_capacity(prev.len());
        let mut src = Vec::with_capacity(prev.len());
        let mut dst = Vec::with_capacity(prev.len());
        for (i, (p, q)) in prev.iter().zip(curr).enumerate() {
            if p.iter().chain(q).all(|v| v.is_finite()) {
                index.push(i);
                src.push([p[0] as f64, p[1] as f64]);
                dst.push([q[0] as f64, q[1] as f64]);
            }
        }
        let n = src.len();
        if n < cfg.min_correspondences.max(2) {
            return None;
        }

        let (minor, major) = spread_eigenvalues(&src);
        if major < 1e-9 || minor < COLLINEAR_RATIO * major {
            debug!(minor, major, "degenerate point layout");
            return None;
        }

        let thr2 = cfg.inlier_threshold * cfg.inlier_threshold;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut best_count = 0usize;
        let mut best_model: Option<SimilarityTransform> = None;
        let mut best_mask = vec![false; n];
        let mut budget = cfg.max_iters;
        let mut iter = 0usize;

        while iter < budget {
            iter += 1;
            let [i, j] = sample_pair(&mut rng, n);
            let Some(model) = SimilarityTransform::from_two_points(src[i], src[j], dst[i], dst[j])
            else {
                continue;
            };
            if !model.is_usable() {
                continue;
            }

            let mut mask = vec![false; n];
            let mut count = 0usize;
            for (k, (p, q)) in src.iter().zip(&dst).enumerate() {
                if model.residual_sq(*p, *q) <= thr2 {
                    mask[k] = true;
                    count += 1;
                }
            }
            if count > best_count {
                best_count = count;
                best_model = Some(model);
                best_mask = mask;
                let outlier_ratio = (n - count) as f64 / n as f64;
                budget = budget.min(adaptive_iterations(cfg.confidence, outlier_ratio, cfg.max_iters));
            }
        }

        let best_model = best_model?;
        if best_count < 2 {
            return None;
        }

        // Refit on the consensus set.
        let (in_src, in_dst): (Vec<_>, Vec<_>) = src
            .iter()
            .zip(&dst)
            .zip(&best_mask)
            .filter(|(_, m)| **m)
            .map(|((p, q), _)| (*p, *q))
            .unzip();
        let model = SimilarityTransform::fit_least_squares(&in_src, &in_dst)
            .filter(SimilarityTransform::is_usable)
            .unwrap_or(best_model);

        let mut inlier_mask = vec![false; prev.len()];
        let mut inliers = Vec::new();
        for (k, (p, q)) in src.iter().zip(&dst).enumerate() {
            if model.residual_sq(*p, *q) <= thr2 {
                inlier_mask[index[k]] = true;
                inliers.push(curr[index[k]]);
            }
        }
        if inliers.len() < 2 {
            return None;
        }

        let delta = MotionDelta::new(model.tx, model.ty, model.rotation());
        debug!(
            n,
            inliers = inliers.len(),
            iterations = iter,
            dx = delta.dx,
            dy = delta.dy,
            dtheta = delta.dtheta,
            "motion estimated"
        );
        Some(MotionEstimate {
            delta,
            transform: model,
            inlier_mask,
            inliers,
        })
    }
}

/// Two distinct indices from `0..n` (`n >= 2`).
fn sample_pair(rng: &mut impl Rng, n: usize) -> [usize; 2] {
    let i = rng.gen_range(0..n);
    let mut j = rng.gen_range(0..n - 1);
    if j >= i {
        j += 1;
    }
    [i, j]
}

/// Iterations needed to draw one all-inlier 2-point sample with probability
/// `confidence`, never more than `max_iters`.
fn adaptive_iterations(confidence: f64, outlier_ratio: f64, max_iters: usize) -> usize {
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE);
    let denom = 1.0 - (1.0 - outlier_ratio).powi(2);
    if denom < f64::MIN_POSITIVE {
        return 0;
    }
    let num = num.ln();
    let denom = denom.ln();
    if denom >= 0.0 || -num >= max_iters as f64 * -denom {
        max_iters
    } else {
        (num / denom).round() as usize
    }
}
