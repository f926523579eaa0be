//! steadyframe CLI: stabilize image sequences from the command line.

mod sequence;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{imageops, RgbImage};
use serde::Serialize;
use steadyframe::{
    BorderFix, KernelShape, MotionDelta, SmoothingStrategy, Stabilizer, StabilizerConfig,
};

use crate::sequence::ImageSequence;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "steadyframe")]
#[command(about = "Remove camera shake from image sequences (feature tracking + trajectory smoothing)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stabilize a directory of frames into another directory.
    Stabilize(CliStabilizeArgs),

    /// Measure and smooth the camera trajectory; write it as JSON.
    Trajectory(CliTrajectoryArgs),

    /// Print the default configuration as JSON.
    DefaultConfig {
        /// Which preset to print.
        #[arg(long, value_enum, default_value_t = ModeArg::Causal)]
        mode: ModeArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Online: each frame is corrected as it arrives.
    Causal,
    /// Offline: two passes over the whole sequence.
    Batch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KernelArg {
    Box,
    Gaussian,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BorderArg {
    None,
    Crop,
    Zoom,
}

#[derive(Debug, Clone, Args)]
struct CliStabilizeArgs {
    /// Directory of input frames (png/jpg/bmp/tiff, sorted by name).
    #[arg(long)]
    input: PathBuf,

    /// Directory for the stabilized frames (created if missing).
    #[arg(long)]
    output: PathBuf,

    /// Processing mode.
    #[arg(long, value_enum, default_value_t = ModeArg::Batch)]
    mode: ModeArg,

    /// Write original and stabilized frames next to each other.
    #[arg(long)]
    side_by_side: bool,

    /// Path to write a JSON report (trajectory in batch mode, per-frame
    /// corrections in causal mode).
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args)]
struct CliTrajectoryArgs {
    /// Directory of input frames.
    #[arg(long)]
    input: PathBuf,

    /// Path to write the trajectory report (JSON).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    config: CliConfigArgs,
}

/// Configuration file plus per-field overrides.
#[derive(Debug, Clone, Args)]
struct CliConfigArgs {
    /// JSON configuration file; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum corners per frame.
    #[arg(long)]
    max_features: Option<usize>,

    /// RANSAC inlier threshold in pixels.
    #[arg(long)]
    ransac_thresh_px: Option<f64>,

    /// RANSAC seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Windowed smoothing radius in frames.
    #[arg(long)]
    radius: Option<usize>,

    /// Windowed smoothing kernel.
    #[arg(long, value_enum)]
    kernel: Option<KernelArg>,

    /// Smooth only once in windowed mode.
    #[arg(long)]
    no_double_smoothing: bool,

    /// Causal blend weight in [0, 1].
    #[arg(long)]
    alpha: Option<f64>,

    /// Border policy.
    #[arg(long, value_enum)]
    border: Option<BorderArg>,

    /// Crop margin as a fraction of the shorter side (with --border crop).
    #[arg(long, default_value_t = 0.05)]
    crop_margin: f64,

    /// Zoom factor (with --border zoom).
    #[arg(long, default_value_t = 1.04)]
    zoom_factor: f64,
}

impl CliConfigArgs {
    /// Preset for `mode`, then the config file, then the flags.
    fn build(&self, mode: ModeArg) -> CliResult<StabilizerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => preset(mode),
        };

        if let Some(v) = self.max_features {
            config.features.max_features = v;
        }
        if let Some(v) = self.ransac_thresh_px {
            config.estimator.inlier_threshold = v;
        }
        if let Some(v) = self.seed {
            config.estimator.seed = v;
        }
        if let Some(v) = self.radius {
            config.smoothing.radius = v;
        }
        if let Some(k) = self.kernel {
            config.smoothing.kernel = match k {
                KernelArg::Box => KernelShape::Box,
                KernelArg::Gaussian => KernelShape::Gaussian,
            };
        }
        if self.no_double_smoothing {
            config.smoothing.double_smoothing = false;
        }
        if let Some(v) = self.alpha {
            config.smoothing.alpha = v;
        }
        if let Some(b) = self.border {
            config.border = match b {
                BorderArg::None => BorderFix::None,
                BorderArg::Crop => BorderFix::Crop {
                    margin: self.crop_margin,
                },
                BorderArg::Zoom => BorderFix::Zoom {
                    factor: self.zoom_factor,
                },
            };
        }

        if mode == ModeArg::Causal && !config.smoothing.strategy.is_causal() {
            tracing::warn!("causal mode needs causal smoothing; switching strategy");
            config.smoothing.strategy = SmoothingStrategy::Causal;
        }
        config.validate()?;
        Ok(config)
    }
}

fn preset(mode: ModeArg) -> StabilizerConfig {
    match mode {
        ModeArg::Causal => StabilizerConfig::default(),
        ModeArg::Batch => StabilizerConfig::batch(),
    }
}

fn load_config(path: &Path) -> CliResult<StabilizerConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| -> CliError {
        format!("Failed to read config {}: {}", path.display(), e).into()
    })?;
    let config = serde_json::from_str(&text).map_err(|e| -> CliError {
        format!("Invalid config {}: {}", path.display(), e).into()
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stabilize(args) => run_stabilize(&args),
        Commands::Trajectory(args) => run_trajectory(&args),
        Commands::DefaultConfig { mode } => run_default_config(mode),
    }
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config(mode: ModeArg) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&preset(mode))?);
    Ok(())
}

// ── trajectory ─────────────────────────────────────────────────────────

fn run_trajectory(args: &CliTrajectoryArgs) -> CliResult<()> {
    let config = args.config.build(ModeArg::Batch)?;
    let frames = open_sequence(&args.input)?;

    let mut stabilizer = Stabilizer::new(config)?;
    let report = stabilizer.analyze(&frames)?;
    tracing::info!(
        "Trajectory: {} transitions, {} lost, mean correction {:.2}px",
        report.transitions.len(),
        report.lost_transitions(),
        report.mean_magnitude(),
    );

    std::fs::write(&args.out, serde_json::to_string_pretty(&report)?)?;
    tracing::info!("Trajectory written to {}", args.out.display());
    Ok(())
}

// ── stabilize ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CausalRecord {
    index: usize,
    motion: f64,
    compensation: MotionDelta,
}

fn run_stabilize(args: &CliStabilizeArgs) -> CliResult<()> {
    let config = args.config.build(args.mode)?;
    let frames = open_sequence(&args.input)?;
    std::fs::create_dir_all(&args.output)?;

    let mut stabilizer = Stabilizer::new(config)?;
    let width = frame_index_width(frames.paths().len());

    match args.mode {
        ModeArg::Batch => {
            let report = stabilizer.process_all_with(&frames, |index, out| {
                let original = if args.side_by_side {
                    Some(frames.load(index)?)
                } else {
                    None
                };
                write_frame(&args.output, index, width, &out.frame, original.as_ref())
            })?;
            if let Some(path) = &args.report {
                std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
                tracing::info!("Report written to {}", path.display());
            }
            tracing::info!(
                "Stabilized {} frames, mean correction {:.2}px",
                report.frame_count,
                report.mean_magnitude(),
            );
        }
        ModeArg::Causal => {
            let mut records = Vec::with_capacity(frames.paths().len());
            for index in 0..frames.paths().len() {
                let frame = frames.load(index).map_err(|e| e as CliError)?;
                let out = stabilizer.process_frame(&frame)?;
                let original = args.side_by_side.then_some(&frame);
                write_frame(&args.output, index, width, &out.frame, original)
                    .map_err(|e| e as CliError)?;
                records.push(CausalRecord {
                    index,
                    motion: out.motion,
                    compensation: out.compensation,
                });
            }
            if let Some(path) = &args.report {
                std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
                tracing::info!("Report written to {}", path.display());
            }
            tracing::info!(
                "Stabilized {} frames, mean correction over the last {} frames {:.2}px",
                records.len(),
                stabilizer.motion_history().len(),
                stabilizer.mean_motion(),
            );
        }
    }
    Ok(())
}

fn open_sequence(dir: &Path) -> CliResult<ImageSequence> {
    let frames = ImageSequence::open(dir).map_err(|e| -> CliError {
        format!("Failed to list {}: {}", dir.display(), e).into()
    })?;
    if frames.paths().is_empty() {
        return Err(format!("No image files found in {}", dir.display()).into());
    }
    tracing::info!("Found {} frames in {}", frames.paths().len(), dir.display());
    Ok(frames)
}

fn frame_index_width(n: usize) -> usize {
    n.saturating_sub(1).to_string().len().max(6)
}

/// Write `frame` (or `original | frame` when `original` is given) as PNG.
fn write_frame(
    dir: &Path,
    index: usize,
    width: usize,
    frame: &RgbImage,
    original: Option<&RgbImage>,
) -> Result<(), steadyframe::SourceError> {
    let path = dir.join(format!("frame_{:0width$}.png", index, width = width));
    match original {
        Some(original) => {
            let (w, h) = frame.dimensions();
            let mut canvas = RgbImage::new(2 * w, h);
            imageops::replace(&mut canvas, original, 0, 0);
            imageops::replace(&mut canvas, frame, w as i64, 0);
            canvas.save(&path)?;
        }
        None => frame.save(&path)?,
    }
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}
