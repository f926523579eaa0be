use crate::config::{SmoothingConfig, SmoothingStrategy};

use super::{RecursiveSmoother, SmoothingKernel, Trajectory, WindowedSmoother};

/// A strategy turning a cumulative trajectory into a smooth one of the same
/// length.
pub trait TrajectorySmoother {
    /// Smooth a complete trajectory. Always starts from a clean state.
    fn smooth(&mut self, trajectory: &Trajectory) -> Trajectory;

    /// Drop any internal state.
    fn reset(&mut self);

    /// `true` if output `k` depends only on inputs `0..=k`.
    fn is_causal(&self) -> bool;
}

/// The smoother selected by [`SmoothingConfig::strategy`].
#[derive(Debug, Clone)]
pub enum Smoother {
    Recursive(RecursiveSmoother),
    Windowed(WindowedSmoother),
}

impl Smoother {
    pub fn from_config(cfg: &SmoothingConfig) -> Self {
        match cfg.strategy {
            SmoothingStrategy::Causal => {
                Self::Recursive(RecursiveSmoother::new(cfg.noise, cfg.alpha))
            }
            SmoothingStrategy::Windowed => Self::Windowed(WindowedSmoother::new(
                SmoothingKernel::new(cfg.kernel, cfg.radius),
                cfg.double_smoothing,
            )),
        }
    }

    /// The online smoother, when the strategy has one.
    pub fn as_recursive_mut(&mut self) -> Option<&mut RecursiveSmoother> {
        match self {
            Self::Recursive(s) => Some(s),
            Self::Windowed(_) => None,
        }
    }
}

impl TrajectorySmoother for Smoother {
    fn smooth(&mut self, trajectory: &Trajectory) -> Trajectory {
        match self {
            Self::Recursive(s) => s.smooth(trajectory),
            Self::Windowed(s) => s.smooth(trajectory),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Recursive(s) => s.reset(),
            Self::Windowed(s) => s.reset(),
        }
    }

    fn is_causal(&self) -> bool {
        match self {
            Self::Recursive(s) => s.is_causal(),
            Self::Windowed(s) => s.is_causal(),
        }
    }
}
