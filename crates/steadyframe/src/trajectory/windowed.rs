//! Offline smoothing: a symmetric convolution over the whole trajectory with
//! edge-replicated padding, so the output has exactly the input length.

use crate::config::KernelShape;

use super::{Pose, Trajectory, TrajectorySmoother};

/// Normalized symmetric kernel of `2 * radius + 1` taps.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingKernel {
    weights: Vec<f64>,
}

impl SmoothingKernel {
    /// Uniform moving average. A zero radius yields the identity kernel.
    pub fn box_filter(radius: usize) -> Self {
        let size = 2 * radius + 1;
        Self {
            weights: vec![1.0 / size as f64; size],
        }
    }

    /// Gaussian with `sigma = (2 * radius + 1) / 6`.
    pub fn gaussian(radius: usize) -> Self {
        let size = 2 * radius + 1;
        let sigma = size as f64 / 6.0;
        let two_s2 = 2.0 * sigma * sigma;
        let raw: Vec<f64> = (0..size)
            .map(|i| {
                let j = i as f64 - radius as f64;
                (-j * j / two_s2).exp()
            })
            .collect();
        let total: f64 = raw.iter().sum();
        Self {
            weights: raw.into_iter().map(|w| w / total).collect(),
        }
    }

    pub fn new(shape: KernelShape, radius: usize) -> Self {
        match shape {
            KernelShape::Box => Self::box_filter(radius),
            KernelShape::Gaussian => Self::gaussian(radius),
        }
    }

    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `out[k] = sum_j w[j] * v[clamp(k + j - r)]`.
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        let n = values.len();
        if n == 0 {
            return Vec::new();
        }
        let r = self.radius() as isize;
        let last = n as isize - 1;
        (0..n as isize)
            .map(|k| {
                self.weights
                    .iter()
                    .enumerate()
                    .map(|(j, w)| w * values[(k + j as isize - r).clamp(0, last) as usize])
                    .sum()
            })
            .collect()
    }
}

/// Per-axis convolution smoother, optionally applied twice.
#[derive(Debug, Clone)]
pub struct WindowedSmoother {
    kernel: SmoothingKernel,
    passes: usize,
}

impl WindowedSmoother {
    pub fn new(kernel: SmoothingKernel, double_smoothing: bool) -> Self {
        Self {
            kernel,
            passes: if double_smoothing { 2 } else { 1 },
        }
    }

    pub fn kernel(&self) -> &SmoothingKernel {
        &self.kernel
    }
}

impl TrajectorySmoother for WindowedSmoother {
    fn smooth(&mut self, trajectory: &Trajectory) -> Trajectory {
        let mut out = vec![Pose::ORIGIN; trajectory.len()];
        for axis in 0..3 {
            let mut values = trajectory.axis_values(axis);
            for _ in 0..self.passes {
                values = self.kernel.apply(&values);
            }
            for (pose, v) in out.iter_mut().zip(values) {
                pose.set_axis(axis, v);
            }
        }
        Trajectory::new(out)
    }

    fn reset(&mut self) {}

    fn is_causal(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn kernels_are_normalized_and_symmetric() {
        for kernel in [SmoothingKernel::box_filter(4), SmoothingKernel::gaussian(7)] {
            let w = kernel.weights();
            assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            for i in 0..w.len() {
                assert_abs_diff_eq!(w[i], w[w.len() - 1 - i], epsilon = 1e-15);
            }
        }
        let g = SmoothingKernel::gaussian(3);
        assert!(g.weights()[3] > g.weights()[2] && g.weights()[2] > g.weights()[0]);
    }

    #[test]
    fn constant_signal_is_unchanged_for_any_kernel() {
        for shape in [KernelShape::Box, KernelShape::Gaussian] {
            for radius in [0, 1, 5, 50] {
                let k = SmoothingKernel::new(shape, radius);
                for len in [1, 4, 120] {
                    let out = k.apply(&vec![3.5; len]);
                    assert_eq!(out.len(), len);
                    for v in out {
                        assert_abs_diff_eq!(v, 3.5, epsilon = 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn single_pose_trajectory_is_kept() {
        let traj = Trajectory::new(vec![Pose::new(2.0, -1.0, 0.03)]);
        for shape in [KernelShape::Box, KernelShape::Gaussian] {
            for double in [false, true] {
                let mut s = WindowedSmoother::new(SmoothingKernel::new(shape, 50), double);
                let out = s.smooth(&traj);
                assert_eq!(out.len(), 1);
                assert_abs_diff_eq!(out.poses()[0].x, 2.0, epsilon = 1e-12);
                assert_abs_diff_eq!(out.poses()[0].y, -1.0, epsilon = 1e-12);
                assert_abs_diff_eq!(out.poses()[0].angle, 0.03, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn edges_are_replicated() {
        let k = SmoothingKernel::box_filter(1);
        let out = k.apply(&[0.0, 3.0, 6.0]);
        assert_abs_diff_eq!(out[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn linear_ramp_survives_away_from_edges() {
        let ramp: Vec<f64> = (0..60).map(|i| 2.0 * i as f64).collect();
        let out = SmoothingKernel::gaussian(5).apply(&ramp);
        for k in 10..50 {
            assert_abs_diff_eq!(out[k], ramp[k], epsilon = 1e-9);
        }
    }

    #[test]
    fn smoother_preserves_length_and_double_pass_is_smoother() {
        let poses: Vec<Pose> = (0..40)
            .map(|i| {
                let jitter = if i % 2 == 0 { 1.0 } else { -1.0 };
                Pose::new(jitter, 0.0, 0.01 * jitter)
            })
            .collect();
        let traj = Trajectory::new(poses);
        let kernel = SmoothingKernel::box_filter(2);
        let single = WindowedSmoother::new(kernel.clone(), false).smooth(&traj);
        let double = WindowedSmoother::new(kernel, true).smooth(&traj);
        assert_eq!(single.len(), 40);
        assert_eq!(double.len(), 40);
        let energy = |t: &Trajectory| t.poses()[5..35].iter().map(|p| p.x * p.x).sum::<f64>();
        assert!(energy(&double) < energy(&single));
        assert!(energy(&single) < energy(&traj));
    }

    #[test]
    fn empty_trajectory_stays_empty() {
        let mut s = WindowedSmoother::new(SmoothingKernel::gaussian(3), true);
        assert!(s.smooth(&Trajectory::default()).is_empty());
    }
}
