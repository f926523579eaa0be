//! Whole-sequence (two-pass) stabilization.
//!
//! Pass one measures every transition and builds the cumulative
//! trajectory; the configured smoother then sees the entire path at once.
//! Pass two re-reads the frames and warps frame `k >= 1` by
//! `trajectory[k - 1] - smoothed[k - 1]`. Frame 0 is the reference: it gets
//! zero compensation but still goes through the border policy, so every
//! output frame is treated the same way.

use image::Pixel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SourceError, StabilizeError};
use crate::imaging::{to_gray, Frame};
use crate::motion::MotionDelta;
use crate::pipeline::{MotionPass, Step};
use crate::session::{StabilizedFrame, Stabilizer};
use crate::source::FrameSource;
use crate::trajectory::{Trajectory, TrajectorySmoother};

/// Measurements for one frame transition `k -> k + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionStats {
    /// Measured motion (zero when `estimated` is false).
    pub delta: MotionDelta,
    /// Corners available in frame `k`.
    pub features: usize,
    /// Corners successfully tracked into frame `k + 1`.
    pub tracked: usize,
    /// Correspondences consistent with the fitted motion.
    pub inliers: usize,
    /// `false` when motion could not be measured.
    pub estimated: bool,
}

/// Everything pass one learns about a sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryReport {
    pub frame_count: usize,
    /// `[width, height]` of every frame (zero for an empty sequence).
    pub frame_size: [u32; 2],
    /// One entry per transition (`frame_count - 1` of them).
    pub transitions: Vec<TransitionStats>,
    /// Cumulative sum of the transition deltas.
    pub trajectory: Trajectory,
    /// Smoothed trajectory, same length.
    pub smoothed: Trajectory,
    /// Per frame: the compensation applied in pass two.
    pub compensations: Vec<MotionDelta>,
}

impl TrajectoryReport {
    /// Raw per-transition motion.
    pub fn deltas(&self) -> Vec<MotionDelta> {
        self.transitions.iter().map(|t| t.delta).collect()
    }

    /// Per-transition motion left after stabilization.
    pub fn residual_deltas(&self) -> Vec<MotionDelta> {
        self.smoothed.deltas()
    }

    /// Translation magnitude of each frame's compensation.
    pub fn magnitudes(&self) -> Vec<f64> {
        self.compensations
            .iter()
            .map(MotionDelta::translation_norm)
            .collect()
    }

    /// Mean compensation magnitude, 0 for an empty report.
    pub fn mean_magnitude(&self) -> f64 {
        if self.compensations.is_empty() {
            return 0.0;
        }
        self.magnitudes().iter().sum::<f64>() / self.compensations.len() as f64
    }

    /// Transitions where motion could not be measured.
    pub fn lost_transitions(&self) -> usize {
        self.transitions.iter().filter(|t| !t.estimated).count()
    }
}

/// In-memory result of [`Stabilizer::process_all`].
#[derive(Debug, Clone)]
pub struct BatchOutput<P: Pixel<Subpixel = u8>> {
    /// Stabilized frames, one per input frame, in order.
    pub frames: Vec<Frame<P>>,
    /// Per-frame compensation magnitudes.
    pub magnitudes: Vec<f64>,
    pub report: TrajectoryReport,
}

impl Stabilizer {
    /// Pass one only: measure the sequence and smooth its trajectory.
    ///
    /// Resets the session first; works with either smoothing strategy (the
    /// causal one is simply run over the path in order).
    pub fn analyze<P, S>(&mut self, source: &S) -> Result<TrajectoryReport, StabilizeError>
    where
        P: Pixel<Subpixel = u8>,
        S: FrameSource<P> + ?Sized,
    {
        self.reset();
        let n = source.len();
        let mut pass = MotionPass::new(self.config.session.min_reuse_points);
        let mut transitions = Vec::with_capacity(n.saturating_sub(1));
        let mut frame_size = [0u32; 2];

        for index in 0..n {
            let frame = source
                .frame(index)
                .map_err(|source| StabilizeError::Source { index, source })?;
            let frame: &Frame<P> = &frame;
            self.check_size(frame, index)?;
            frame_size = [frame.width(), frame.height()];

            let (step, counts) = pass.step(to_gray(frame), &self.tracker, &self.estimator);
            let stats = match step {
                Step::Baseline => None,
                Step::Motion(est) => Some(TransitionStats {
                    delta: est.delta,
                    features: counts.features,
                    tracked: counts.tracked,
                    inliers: counts.inliers,
                    estimated: true,
                }),
                Step::Lost => Some(TransitionStats {
                    delta: MotionDelta::ZERO,
                    features: counts.features,
                    tracked: counts.tracked,
                    inliers: 0,
                    estimated: false,
                }),
            };
            if let Some(stats) = stats {
                debug!(
                    index,
                    dx = stats.delta.dx,
                    dy = stats.delta.dy,
                    dtheta = stats.delta.dtheta,
                    "transition measured"
                );
                transitions.push(stats);
            }
        }

        let deltas: Vec<MotionDelta> = transitions.iter().map(|t| t.delta).collect();
        let trajectory = Trajectory::from_deltas(&deltas);
        let smoothed = self.smoother.smooth(&trajectory);

        let mut compensations = Vec::with_capacity(n);
        if n > 0 {
            compensations.push(MotionDelta::ZERO);
        }
        for (raw, smooth) in trajectory.poses().iter().zip(smoothed.poses()) {
            compensations.push(*raw - *smooth);
        }

        // Leave the online state as a fresh session would have it.
        self.reset();

        let report = TrajectoryReport {
            frame_count: n,
            frame_size,
            transitions,
            trajectory,
            smoothed,
            compensations,
        };
        info!(
            frames = n,
            lost = report.lost_transitions(),
            mean_magnitude = report.mean_magnitude(),
            "trajectory analysed"
        );
        Ok(report)
    }

    /// Both passes, handing each stabilized frame to `sink` as soon as it is
    /// ready. Returns the pass-one report.
    pub fn process_all_with<P, S, F>(
        &mut self,
        source: &S,
        mut sink: F,
    ) -> Result<TrajectoryReport, StabilizeError>
    where
        P: Pixel<Subpixel = u8> + 'static,
        S: FrameSource<P> + ?Sized,
        F: FnMut(usize, StabilizedFrame<P>) -> Result<(), SourceError>,
    {
        let report = self.analyze(source)?;
        let n = source.len();
        if n != report.frame_count {
            return Err(StabilizeError::SourceChanged {
                expected: report.frame_count,
                got: n,
            });
        }

        for (index, compensation) in report.compensations.iter().enumerate() {
            let frame = source
                .frame(index)
                .map_err(|source| StabilizeError::Source { index, source })?;
            let frame: &Frame<P> = &frame;
            let got = [frame.width(), frame.height()];
            if got != report.frame_size {
                return Err(StabilizeError::FrameSizeMismatch {
                    index,
                    expected: report.frame_size,
                    got,
                });
            }
            let (out, motion) = self.compensator.compensate(frame, *compensation);
            self.history.push(motion);
            sink(
                index,
                StabilizedFrame {
                    frame: out,
                    motion,
                    compensation: *compensation,
                },
            )
            .map_err(|source| StabilizeError::Sink { index, source })?;
        }
        Ok(report)
    }

    /// Both passes, collecting every output frame in memory.
    pub fn process_all<P, S>(&mut self, source: &S) -> Result<BatchOutput<P>, StabilizeError>
    where
        P: Pixel<Subpixel = u8> + 'static,
        S: FrameSource<P> + ?Sized,
    {
        let mut frames = Vec::with_capacity(source.len());
        let mut magnitudes = Vec::with_capacity(source.len());
        let report = self.process_all_with(source, |_, out| {
            frames.push(out.frame);
            magnitudes.push(out.motion);
            Ok(())
        })?;
        Ok(BatchOutput {
            frames,
            magnitudes,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BorderFix, KernelShape, SmoothingStrategy, StabilizerConfig};
    use crate::features::FeatureTracker;
    use crate::motion::MotionEstimator;
    use crate::test_utils::{rgb_view, textured_canvas};
    use image::{GrayImage, RgbImage};
    use std::borrow::Cow;
    use std::cell::Cell;

    fn windowed_config(radius: usize) -> StabilizerConfig {
        let mut cfg = StabilizerConfig::batch();
        cfg.smoothing.strategy = SmoothingStrategy::Windowed;
        cfg.smoothing.kernel = KernelShape::Gaussian;
        cfg.smoothing.radius = radius;
        cfg
    }

    /// Steady pan of 2 px/frame plus a 4-frame wobble of amplitude 10 px.
    fn shaky_pan(n: usize) -> Vec<RgbImage> {
        let canvas = textured_canvas(330, 180, 21);
        (0..n)
            .map(|k| {
                let t = 2.0 * k as f32 + 10.0 * (k as f32 * std::f32::consts::FRAC_PI_2).sin();
                rgb_view(&canvas, 120.0 - t, 20.0, 192, 144)
            })
            .collect()
    }

    fn std_dev(v: &[f64]) -> f64 {
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        (v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / v.len() as f64).sqrt()
    }

    #[test]
    fn windowed_batch_removes_wobble_and_keeps_the_pan() {
        let frames = shaky_pan(50);
        let mut s = Stabilizer::new(windowed_config(10)).expect("config");
        let out = s.process_all(&frames).expect("batch");

        assert_eq!(out.frames.len(), 50);
        assert_eq!(out.magnitudes.len(), 50);
        let report = &out.report;
        assert_eq!(report.transitions.len(), 49);
        assert_eq!(report.trajectory.len(), 49);
        assert_eq!(report.smoothed.len(), 49);
        assert_eq!(report.compensations.len(), 50);
        assert_eq!(report.lost_transitions(), 0);

        let raw: Vec<f64> = report.deltas().iter().map(|d| d.dx).collect();
        let residual: Vec<f64> = report.residual_deltas().iter().map(|d| d.dx).collect();
        assert!(std_dev(&raw) > 8.0, "raw std {}", std_dev(&raw));
        assert!(
            std_dev(&residual) < 0.3 * std_dev(&raw),
            "residual std {} vs raw {}",
            std_dev(&residual),
            std_dev(&raw)
        );
        let mid = &residual[15..35];
        let slope = mid.iter().sum::<f64>() / mid.len() as f64;
        assert!((slope - 2.0).abs() < 0.3, "slope {slope}");
        for d in report.deltas() {
            assert!(d.dtheta.abs() < 0.01);
        }
    }

    /// Horizontal motion between consecutive frames, measured from pixels.
    fn measured_dx(frames: &[RgbImage], cfg: &StabilizerConfig) -> Vec<f64> {
        let tracker = FeatureTracker::new(cfg.features.clone(), cfg.flow.clone());
        let estimator = MotionEstimator::new(cfg.estimator.clone());
        frames
            .windows(2)
            .map(|pair| {
                let prev = to_gray(&pair[0]);
                let curr = to_gray(&pair[1]);
                let features = tracker.detect(&prev);
                let tracked = tracker.track(&prev, &curr, &features);
                let (p, c) = tracked.valid_pairs(&features);
                let est = estimator.estimate(&p, &c).expect("measurable motion");
                est.delta.dx
            })
            .collect()
    }

    #[test]
    fn stabilized_frames_lose_the_wobble_but_keep_the_pan() {
        let frames = shaky_pan(50);
        for border in [BorderFix::None, BorderFix::Zoom { factor: 1.04 }] {
            let mut cfg = windowed_config(10);
            cfg.border = border;
            let mut s = Stabilizer::new(cfg.clone()).expect("config");
            let out = s.process_all(&frames).expect("batch");

            let raw = measured_dx(&frames, &cfg);
            let steady = measured_dx(&out.frames, &cfg);
            assert!(std_dev(&raw) > 8.0, "raw std {}", std_dev(&raw));
            assert!(
                std_dev(&steady) < 0.3 * std_dev(&raw),
                "{border:?}: output std {} vs raw {}",
                std_dev(&steady),
                std_dev(&raw)
            );
            let mean = steady.iter().sum::<f64>() / steady.len() as f64;
            assert!((mean - 2.0).abs() < 0.35, "{border:?}: mean {mean}");
        }
    }

    #[test]
    fn first_frame_gets_zero_compensation() {
        let frames = shaky_pan(8);
        let mut cfg = windowed_config(3);
        cfg.border = BorderFix::None;
        let mut s = Stabilizer::new(cfg).expect("config");
        let out = s.process_all(&frames).expect("batch");
        assert_eq!(out.report.compensations[0], MotionDelta::ZERO);
        assert_eq!(out.frames[0], frames[0]);
        assert_eq!(out.magnitudes[0], 0.0);
    }

    #[test]
    fn static_sequence_is_reproduced_exactly() {
        let canvas = textured_canvas(240, 180, 22);
        let frame = rgb_view(&canvas, 10.0, 10.0, 160, 120);
        let frames = vec![frame.clone(); 6];
        for strategy in [SmoothingStrategy::Causal, SmoothingStrategy::Windowed] {
            let mut cfg = StabilizerConfig::default();
            cfg.smoothing.strategy = strategy;
            cfg.smoothing.radius = 2;
            cfg.border = BorderFix::Crop { margin: 0.0 };
            let mut s = Stabilizer::new(cfg).expect("config");
            let out = s.process_all(&frames).expect("batch");
            for f in &out.frames {
                assert_eq!(f, &frame);
            }
            assert!(out.magnitudes.iter().all(|m| m.abs() < 1e-9));
        }
    }

    #[test]
    fn causal_strategy_runs_over_the_whole_path() {
        let frames = shaky_pan(12);
        let mut s = Stabilizer::new(StabilizerConfig::default()).expect("config");
        let report = s.analyze(&frames).expect("analyze");
        assert_eq!(report.smoothed.len(), 11);
        assert_eq!(report.frame_size, [192, 144]);
        // The online state is left fresh.
        assert_eq!(s.cumulative_pose(), crate::Pose::ORIGIN);
    }

    #[test]
    fn tiny_sequences() {
        let mut s = Stabilizer::new(windowed_config(5)).expect("config");
        let empty: Vec<RgbImage> = Vec::new();
        let out = s.process_all(&empty).expect("empty");
        assert!(out.frames.is_empty());
        assert_eq!(out.report, TrajectoryReport::default());

        let one = vec![RgbImage::new(20, 20)];
        let out = s.process_all(&one).expect("one");
        assert_eq!(out.frames.len(), 1);
        assert!(out.report.trajectory.is_empty());
        assert_eq!(out.report.compensations, vec![MotionDelta::ZERO]);
    }

    #[test]
    fn mismatched_frame_size_is_reported() {
        let frames = vec![GrayImage::new(32, 32), GrayImage::new(32, 32), GrayImage::new(30, 32)];
        let mut s = Stabilizer::new(windowed_config(2)).expect("config");
        let err = s.process_all(&frames).expect_err("size");
        assert!(matches!(err, StabilizeError::FrameSizeMismatch { index: 2, .. }));
    }

    struct Flaky {
        frames: Vec<GrayImage>,
        fail_at: usize,
    }

    impl FrameSource<image::Luma<u8>> for Flaky {
        fn len(&self) -> usize {
            self.frames.len()
        }

        fn frame(&self, index: usize) -> Result<Cow<'_, GrayImage>, SourceError> {
            if index == self.fail_at {
                return Err("decode failed".into());
            }
            Ok(Cow::Borrowed(&self.frames[index]))
        }
    }

    #[test]
    fn source_errors_carry_the_index() {
        let source = Flaky {
            frames: vec![GrayImage::new(16, 16); 4],
            fail_at: 2,
        };
        let mut s = Stabilizer::new(windowed_config(2)).expect("config");
        let err = s.analyze(&source).expect_err("flaky");
        assert!(matches!(err, StabilizeError::Source { index: 2, .. }));
    }

    struct Shrinking {
        frames: Vec<GrayImage>,
        calls: Cell<usize>,
    }

    impl FrameSource<image::Luma<u8>> for Shrinking {
        fn len(&self) -> usize {
            let calls = self.calls.get();
            self.calls.set(calls + 1);
            if calls == 0 {
                self.frames.len()
            } else {
                self.frames.len() - 1
            }
        }

        fn frame(&self, index: usize) -> Result<Cow<'_, GrayImage>, SourceError> {
            Ok(Cow::Borrowed(&self.frames[index]))
        }
    }

    #[test]
    fn source_that_changes_length_is_refused() {
        let source = Shrinking {
            frames: vec![GrayImage::new(16, 16); 3],
            calls: Cell::new(0),
        };
        let mut s = Stabilizer::new(windowed_config(2)).expect("config");
        let err = s.process_all_with(&source, |_, _| Ok(())).expect_err("changed");
        assert!(matches!(
            err,
            StabilizeError::SourceChanged {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn sink_errors_stop_the_second_pass() {
        let frames = vec![GrayImage::new(16, 16); 3];
        let mut s = Stabilizer::new(windowed_config(2)).expect("config");
        let mut seen = 0;
        let err = s
            .process_all_with(&frames, |index, _| {
                seen += 1;
                if index == 1 {
                    Err("disk full".into())
                } else {
                    Ok(())
                }
            })
            .expect_err("sink");
        assert!(matches!(err, StabilizeError::Sink { index: 1, .. }));
        assert_eq!(seen, 2);
    }

    #[test]
    fn report_serializes() {
        let frames = shaky_pan(4);
        let mut s = Stabilizer::new(windowed_config(2)).expect("config");
        let report = s.analyze(&frames).expect("analyze");
        let json = serde_json::to_string(&report).expect("json");
        let back: TrajectoryReport = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.frame_count, 4);
        assert_eq!(back.transitions.len(), 3);
    }
}
