//! The stabilization session.
//!
//! A [`Stabilizer`] owns everything that persists between frames: the
//! previous frame and its features, the cumulative and smoothed poses, the
//! smoother state and a short history of motion magnitudes. Online use goes
//! through [`Stabilizer::process_frame`]; whole-sequence use through the
//! batch methods in [`crate::batch`].

use std::collections::VecDeque;

use image::Pixel;
use tracing::{debug, info, warn};

use crate::compensate::FrameCompensator;
use crate::config::StabilizerConfig;
use crate::error::StabilizeError;
use crate::features::FeatureTracker;
use crate::imaging::{to_gray, Frame};
use crate::motion::{MotionDelta, MotionEstimator};
use crate::pipeline::{MotionPass, Step};
use crate::trajectory::{Pose, Smoother, TrajectorySmoother};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No frame seen since construction or the last reset.
    Ready,
    /// At least one frame has been processed.
    Processing,
}

/// One output frame.
#[derive(Debug, Clone)]
pub struct StabilizedFrame<P: Pixel<Subpixel = u8>> {
    /// Corrected frame, same size and pixel type as the input.
    pub frame: Frame<P>,
    /// Translation magnitude of the applied compensation (pixels).
    pub motion: f64,
    /// The compensation itself (`cumulative - smoothed`).
    pub compensation: MotionDelta,
}

/// Bounded record of recent motion magnitudes.
#[derive(Debug, Clone)]
pub struct MotionHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl MotionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of the recorded values, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Video stabilization session.
pub struct Stabilizer {
    pub(crate) config: StabilizerConfig,
    pub(crate) tracker: FeatureTracker,
    pub(crate) estimator: MotionEstimator,
    pub(crate) compensator: FrameCompensator,
    pub(crate) smoother: Smoother,
    pub(crate) history: MotionHistory,
    motion: MotionPass,
    cumulative: Pose,
    smoothed: Pose,
    frame_size: Option<[u32; 2]>,
    frame_index: usize,
    enabled: bool,
}

impl Stabilizer {
    /// Build a session. The configuration is validated once, here.
    pub fn new(config: StabilizerConfig) -> Result<Self, StabilizeError> {
        config.validate()?;
        info!(
            strategy = ?config.smoothing.strategy,
            border = ?config.border,
            "stabilizer ready"
        );
        Ok(Self {
            tracker: FeatureTracker::new(config.features.clone(), config.flow.clone()),
            estimator: MotionEstimator::new(config.estimator.clone()),
            compensator: FrameCompensator::new(config.border),
            smoother: Smoother::from_config(&config.smoothing),
            history: MotionHistory::new(config.session.history_len),
            motion: MotionPass::new(config.session.min_reuse_points),
            cumulative: Pose::ORIGIN,
            smoothed: Pose::ORIGIN,
            frame_size: None,
            frame_index: 0,
            enabled: true,
            config,
        })
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.frame_index == 0 {
            SessionState::Ready
        } else {
            SessionState::Processing
        }
    }

    /// Stabilize the next frame of a live stream.
    ///
    /// The first frame after construction or [`reset`](Self::reset) is
    /// returned unchanged with motion 0 and becomes the reference. When
    /// motion cannot be measured the frame is passed through the border
    /// policy with zero compensation and the trajectory does not advance.
    ///
    /// Fails with [`StabilizeError::NonCausalSmoothing`] if the session uses
    /// windowed smoothing, and with [`StabilizeError::FrameSizeMismatch`] if
    /// the frame size differs from the first frame.
    pub fn process_frame<P>(&mut self, frame: &Frame<P>) -> Result<StabilizedFrame<P>, StabilizeError>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        if !self.smoother.is_causal() {
            return Err(StabilizeError::NonCausalSmoothing);
        }
        if !self.enabled {
            return Ok(StabilizedFrame {
                frame: frame.clone(),
                motion: 0.0,
                compensation: MotionDelta::ZERO,
            });
        }
        self.check_size(frame, self.frame_index)?;

        let (step, counts) = self.motion.step(to_gray(frame), &self.tracker, &self.estimator);
        let index = self.frame_index;
        self.frame_index += 1;

        let compensation = match step {
            Step::Baseline => {
                debug!(features = counts.features, "reference frame");
                return Ok(StabilizedFrame {
                    frame: frame.clone(),
                    motion: 0.0,
                    compensation: MotionDelta::ZERO,
                });
            }
            Step::Motion(estimate) => {
                self.cumulative = self.cumulative.accumulate(estimate.delta);
                let Some(smoother) = self.smoother.as_recursive_mut() else {
                    return Err(StabilizeError::NonCausalSmoothing);
                };
                self.smoothed = smoother.update(self.cumulative);
                self.cumulative - self.smoothed
            }
            Step::Lost => {
                debug!(index, "no motion estimate, passing frame through");
                MotionDelta::ZERO
            }
        };

        let (out, magnitude) = self.compensator.compensate(frame, compensation);
        self.history.push(magnitude);
        debug!(
            index,
            tracked = counts.tracked,
            inliers = counts.inliers,
            magnitude,
            "frame stabilized"
        );
        Ok(StabilizedFrame {
            frame: out,
            motion: magnitude,
            compensation,
        })
    }

    /// Lazily stabilize a stream of owned frames.
    pub fn process_stream<'a, P, I>(
        &'a mut self,
        frames: I,
    ) -> impl Iterator<Item = Result<StabilizedFrame<P>, StabilizeError>> + 'a
    where
        P: Pixel<Subpixel = u8> + 'static,
        I: IntoIterator<Item = Frame<P>>,
        I::IntoIter: 'a,
    {
        frames.into_iter().map(move |f| self.process_frame(&f))
    }

    /// Forget the reference frame, features, trajectory, smoother state and
    /// motion history. The next frame is treated as a first frame.
    pub fn reset(&mut self) {
        self.motion.clear();
        self.history.clear();
        self.smoother.reset();
        self.cumulative = Pose::ORIGIN;
        self.smoothed = Pose::ORIGIN;
        self.frame_size = None;
        self.frame_index = 0;
        debug!("session reset");
    }

    /// Change the causal blend weight. Out-of-range values are clamped to
    /// `[0, 1]`; NaN is ignored. Returns the weight now in effect.
    pub fn set_smoothing_factor(&mut self, alpha: f64) -> f64 {
        if alpha.is_nan() {
            warn!("ignoring NaN smoothing factor");
            return self.config.smoothing.alpha;
        }
        let applied = alpha.clamp(0.0, 1.0);
        if applied != alpha {
            warn!(requested = alpha, applied, "smoothing factor clamped");
        }
        self.config.smoothing.alpha = applied;
        if let Some(s) = self.smoother.as_recursive_mut() {
            s.set_alpha(applied);
        }
        applied
    }

    /// Current causal blend weight.
    pub fn smoothing_factor(&self) -> f64 {
        self.config.smoothing.alpha
    }

    /// Turn stabilization on or off. While off, `process_frame` returns
    /// frames untouched with motion 0 and the session state is frozen.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(enabled, "stabilization toggled");
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Recent compensation magnitudes, oldest first.
    pub fn motion_history(&self) -> &MotionHistory {
        &self.history
    }

    /// Mean of [`motion_history`](Self::motion_history), 0 when empty.
    pub fn mean_motion(&self) -> f64 {
        self.history.mean().unwrap_or(0.0)
    }

    /// Cumulative pose after the last processed frame.
    pub fn cumulative_pose(&self) -> Pose {
        self.cumulative
    }

    /// Smoothed pose after the last processed frame.
    pub fn smoothed_pose(&self) -> Pose {
        self.smoothed
    }

    pub(crate) fn check_size<P>(&mut self, frame: &Frame<P>, index: usize) -> Result<(), StabilizeError>
    where
        P: Pixel<Subpixel = u8>,
    {
        let got = [frame.width(), frame.height()];
        match self.frame_size {
            None => {
                self.frame_size = Some(got);
                Ok(())
            }
            Some(expected) if expected == got => Ok(()),
            Some(expected) => Err(StabilizeError::FrameSizeMismatch {
                index,
                expected,
                got,
            }),
        }
    }
}
