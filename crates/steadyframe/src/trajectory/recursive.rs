//! Online smoothing: one scalar Kalman filter per axis, followed by an
//! exponential blend with the previous smoothed pose.

use crate::config::{AxisNoise, KalmanNoise};

use super::{Pose, Trajectory, TrajectorySmoother};

/// Constant-position Kalman filter on one scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarKalman {
    estimate: f64,
    variance: f64,
    noise: AxisNoise,
}

impl ScalarKalman {
    /// Starts at estimate 0 with variance 1.
    pub fn new(noise: AxisNoise) -> Self {
        Self {
            estimate: 0.0,
            variance: 1.0,
            noise,
        }
    }

    /// Predict, then correct with `measurement`; returns the new estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        let prior = self.variance + self.noise.process;
        let gain = prior / (prior + self.noise.measurement);
        self.estimate += gain * (measurement - self.estimate);
        self.variance = (1.0 - gain) * prior;
        self.estimate
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }
}

/// Causal trajectory smoother.
///
/// Each axis goes through its own [`ScalarKalman`]; the filtered pose is
/// then blended as `s = alpha * s_prev + (1 - alpha) * filtered`, with
/// `s_prev` starting at the origin.
#[derive(Debug, Clone)]
pub struct RecursiveSmoother {
    noise: KalmanNoise,
    alpha: f64,
    filters: [ScalarKalman; 3],
    smoothed: Pose,
}

impl RecursiveSmoother {
    /// `alpha` is clamped to `[0, 1]`.
    pub fn new(noise: KalmanNoise, alpha: f64) -> Self {
        Self {
            noise,
            alpha: clamp_alpha(alpha, 0.0),
            filters: Self::fresh_filters(&noise),
            smoothed: Pose::ORIGIN,
        }
    }

    fn fresh_filters(noise: &KalmanNoise) -> [ScalarKalman; 3] {
        [
            ScalarKalman::new(noise.translation),
            ScalarKalman::new(noise.translation),
            ScalarKalman::new(noise.rotation),
        ]
    }

    /// Feed the next cumulative pose; returns the smoothed pose.
    pub fn update(&mut self, pose: Pose) -> Pose {
        let mut out = self.smoothed;
        for (axis, filter) in self.filters.iter_mut().enumerate() {
            let filtered = filter.update(pose.axis(axis));
            let blended = self.alpha * self.smoothed.axis(axis) + (1.0 - self.alpha) * filtered;
            out.set_axis(axis, blended);
        }
        self.smoothed = out;
        out
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Set the blend weight, clamped to `[0, 1]`. NaN leaves it unchanged.
    /// Returns the value in effect.
    pub fn set_alpha(&mut self, alpha: f64) -> f64 {
        self.alpha = clamp_alpha(alpha, self.alpha);
        self.alpha
    }

    /// Last smoothed pose (origin before the first update).
    pub fn smoothed(&self) -> Pose {
        self.smoothed
    }

    /// Per-axis filters, `[x, y, angle]`.
    pub fn filters(&self) -> &[ScalarKalman; 3] {
        &self.filters
    }
}

fn clamp_alpha(alpha: f64, fallback: f64) -> f64 {
    if alpha.is_nan() {
        fallback
    } else {
        alpha.clamp(0.0, 1.0)
    }
}

impl TrajectorySmoother for RecursiveSmoother {
    fn smooth(&mut self, trajectory: &Trajectory) -> Trajectory {
        self.reset();
        trajectory.poses().iter().map(|p| self.update(*p)).collect::<Vec<_>>().into()
    }

    fn reset(&mut self) {
        self.filters = Self::fresh_filters(&self.noise);
        self.smoothed = Pose::ORIGIN;
    }

    fn is_causal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn kalman_variance_shrinks_monotonically_and_converges() {
        let mut k = ScalarKalman::new(AxisNoise {
            process: 0.01,
            measurement: 0.1,
        });
        let mut last = k.variance();
        for _ in 0..200 {
            k.update(5.0);
            assert!(k.variance() <= last + 1e-15);
            last = k.variance();
        }
        assert_abs_diff_eq!(k.estimate(), 5.0, epsilon = 1e-6);
        // Steady-state variance solves p = (p + q) r / (p + q + r).
        let (q, r) = (0.01f64, 0.1f64);
        let p_ss = (-q + (q * q + 4.0 * q * r).sqrt()) / 2.0;
        assert_abs_diff_eq!(k.variance(), p_ss, epsilon = 1e-9);
    }

    #[test]
    fn first_update_blends_from_origin() {
        let mut s = RecursiveSmoother::new(KalmanNoise::default(), 0.8);
        let out = s.update(Pose::new(4.0, 0.0, 0.0));
        // gain = 1.01 / 1.11, blended with weight 0.2.
        let est = 4.0 * 1.01 / 1.11;
        assert_abs_diff_eq!(out.x, 0.2 * est, epsilon = 1e-12);
        assert_abs_diff_eq!(out.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_input_converges_to_itself() {
        let mut s = RecursiveSmoother::new(KalmanNoise::default(), 0.8);
        let target = Pose::new(10.0, -3.0, 0.05);
        let mut out = Pose::ORIGIN;
        for _ in 0..400 {
            out = s.update(target);
        }
        assert_abs_diff_eq!(out.x, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.y, -3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.angle, 0.05, epsilon = 1e-6);
    }

    #[test]
    fn alpha_one_freezes_and_alpha_zero_follows_the_filter() {
        let mut frozen = RecursiveSmoother::new(KalmanNoise::default(), 1.0);
        assert_eq!(frozen.update(Pose::new(7.0, 7.0, 0.1)), Pose::ORIGIN);

        let mut follow = RecursiveSmoother::new(KalmanNoise::default(), 0.0);
        let out = follow.update(Pose::new(7.0, 0.0, 0.0));
        assert_abs_diff_eq!(out.x, follow.filters()[0].estimate(), epsilon = 1e-15);
    }

    #[test]
    fn set_alpha_clamps_and_ignores_nan() {
        let mut s = RecursiveSmoother::new(KalmanNoise::default(), 0.8);
        assert_eq!(s.set_alpha(1.3), 1.0);
        assert_eq!(s.set_alpha(-0.2), 0.0);
        assert_eq!(s.set_alpha(f64::NAN), 0.0);
        assert_eq!(s.set_alpha(0.65), 0.65);
    }

    #[test]
    fn reset_restores_configured_noise_and_origin() {
        let noise = KalmanNoise {
            translation: AxisNoise {
                process: 0.5,
                measurement: 2.0,
            },
            rotation: AxisNoise {
                process: 0.2,
                measurement: 0.3,
            },
        };
        let mut s = RecursiveSmoother::new(noise, 0.5);
        let fresh = s.clone();
        for i in 0..10 {
            s.update(Pose::new(i as f64, 1.0, 0.01));
        }
        s.reset();
        assert_eq!(s.filters(), fresh.filters());
        assert_eq!(s.smoothed(), Pose::ORIGIN);
    }

    #[test]
    fn batch_smoothing_matches_streaming() {
        let traj = Trajectory::from_deltas(
            &(0..20)
                .map(|i| crate::MotionDelta::new((i % 3) as f64, 0.5, 0.0))
                .collect::<Vec<_>>(),
        );
        let mut batch = RecursiveSmoother::new(KalmanNoise::default(), 0.8);
        let smoothed = batch.smooth(&traj);
        let mut stream = RecursiveSmoother::new(KalmanNoise::default(), 0.8);
        for (p, s) in traj.poses().iter().zip(smoothed.poses()) {
            assert_eq!(stream.update(*p), *s);
        }
        assert_eq!(smoothed.len(), traj.len());
    }

    #[test]
    fn single_pose_and_empty_trajectories_keep_their_length() {
        let mut s = RecursiveSmoother::new(KalmanNoise::default(), 0.8);
        let one = s.smooth(&Trajectory::new(vec![Pose::new(3.0, 1.0, 0.0)]));
        assert_eq!(one.len(), 1);
        assert!(one.poses()[0].x > 0.0 && one.poses()[0].x < 3.0);
        assert!(s.smooth(&Trajectory::default()).is_empty());
    }
}
