//! Cumulative camera path and its smoothing.
//!
//! A [`Trajectory`] is the running sum of per-frame [`MotionDelta`]s: entry
//! `k` is the camera pose after transition `k`. Smoothers map a trajectory
//! to one of equal length; the difference between the two is what the
//! compensation warp removes.

mod recursive;
mod smoother;
mod windowed;

pub use recursive::{RecursiveSmoother, ScalarKalman};
pub use smoother::{Smoother, TrajectorySmoother};
pub use windowed::{SmoothingKernel, WindowedSmoother};

use std::ops::Sub;

use serde::{Deserialize, Serialize};

use crate::motion::MotionDelta;

/// Accumulated camera pose relative to the first frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
}

impl Pose {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        angle: 0.0,
    };

    pub fn new(x: f64, y: f64, angle: f64) -> Self {
        Self { x, y, angle }
    }

    /// Component-wise running sum: `self + delta`.
    pub fn accumulate(self, delta: MotionDelta) -> Self {
        Self {
            x: self.x + delta.dx,
            y: self.y + delta.dy,
            angle: self.angle + delta.dtheta,
        }
    }

    pub(crate) fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.angle,
        }
    }

    pub(crate) fn set_axis(&mut self, axis: usize, value: f64) {
        match axis {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.angle = value,
        }
    }
}

impl Sub for Pose {
    type Output = MotionDelta;

    fn sub(self, rhs: Pose) -> MotionDelta {
        MotionDelta {
            dx: self.x - rhs.x,
            dy: self.y - rhs.y,
            dtheta: self.angle - rhs.angle,
        }
    }
}

/// Ordered sequence of poses, one per frame transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory {
    poses: Vec<Pose>,
}

impl Trajectory {
    pub fn new(poses: Vec<Pose>) -> Self {
        Self { poses }
    }

    /// Running sum of `deltas`, starting from the origin.
    pub fn from_deltas(deltas: &[MotionDelta]) -> Self {
        let mut pose = Pose::ORIGIN;
        let poses = deltas
            .iter()
            .map(|d| {
                pose = pose.accumulate(*d);
                pose
            })
            .collect();
        Self { poses }
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Per-step differences (the first step is measured from the origin).
    pub fn deltas(&self) -> Vec<MotionDelta> {
        let mut prev = Pose::ORIGIN;
        self.poses
            .iter()
            .map(|p| {
                let d = *p - prev;
                prev = *p;
                d
            })
            .collect()
    }

    /// Values of one axis (0 = x, 1 = y, 2 = angle).
    pub(crate) fn axis_values(&self, axis: usize) -> Vec<f64> {
        self.poses.iter().map(|p| p.axis(axis)).collect()
    }
}

impl From<Vec<Pose>> for Trajectory {
    fn from(poses: Vec<Pose>) -> Self {
        Self::new(poses)
    }
}
