//! Error types for configuration and session processing.
//!
//! Algorithmic "no result" outcomes (too few correspondences, degenerate
//! geometry, nothing to track) are reported as `Option::None` by the
//! component that hits them and never surface here.

use std::fmt;

/// A configuration value that cannot be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A numeric field lies outside its accepted range.
    OutOfRange {
        /// Dotted path of the offending field, e.g. `smoothing.alpha`.
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// Human-readable accepted range.
        expected: &'static str,
    },
    /// The optical-flow window must be odd so it has a centre pixel.
    EvenFlowWindow {
        /// The rejected window size.
        win_size: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                field,
                value,
                expected,
            } => write!(f, "invalid {}: {} (expected {})", field, value, expected),
            Self::EvenFlowWindow { win_size } => {
                write!(f, "optical-flow window must be odd, got {}", win_size)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Boxed error produced by a [`FrameSource`](crate::FrameSource).
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that stop a stabilization call.
///
/// None of these are raised for transient numeric conditions; those degrade
/// to passing the frame through with zero compensation.
#[derive(Debug)]
pub enum StabilizeError {
    /// The session was built with an invalid configuration.
    Config(ConfigError),
    /// `process_frame` was called while the session is configured with a
    /// smoothing strategy that needs the whole trajectory up front.
    NonCausalSmoothing,
    /// A frame does not have the size of the first frame in the sequence.
    FrameSizeMismatch {
        /// Index of the offending frame within the current sequence.
        index: usize,
        /// Size of the first frame `[width, height]`.
        expected: [u32; 2],
        /// Size of the offending frame `[width, height]`.
        got: [u32; 2],
    },
    /// The frame source failed to produce a frame.
    Source {
        /// Index of the frame being read.
        index: usize,
        /// Underlying failure.
        source: SourceError,
    },
    /// The consumer of stabilized frames failed.
    Sink {
        /// Index of the frame being delivered.
        index: usize,
        /// Underlying failure.
        source: SourceError,
    },
    /// The replayed source reported a different length in the second pass.
    SourceChanged {
        /// Frame count seen in the first pass.
        expected: usize,
        /// Frame count seen in the second pass.
        got: usize,
    },
}

impl fmt::Display for StabilizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {}", e),
            Self::NonCausalSmoothing => write!(
                f,
                "windowed smoothing needs the whole sequence; use process_all or a causal strategy"
            ),
            Self::FrameSizeMismatch {
                index,
                expected,
                got,
            } => write!(
                f,
                "frame {} is {}x{}, expected {}x{}",
                index, got[0], got[1], expected[0], expected[1]
            ),
            Self::Source { index, source } => {
                write!(f, "failed to read frame {}: {}", index, source)
            }
            Self::Sink { index, source } => {
                write!(f, "failed to deliver frame {}: {}", index, source)
            }
            Self::SourceChanged { expected, got } => write!(
                f,
                "frame source changed between passes: {} frames, then {}",
                expected, got
            ),
        }
    }
}

impl std::error::Error for StabilizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Source { source, .. } | Self::Sink { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigError> for StabilizeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
