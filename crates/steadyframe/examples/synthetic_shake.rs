use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::error::Error;
use steadyframe::{Stabilizer, StabilizerConfig};

/// Render a scene of random rectangles, then view it through a jittering
/// camera. Prints raw vs. residual frame-to-frame motion for both modes.
fn main() -> Result<(), Box<dyn Error>> {
    let n_frames: usize = std::env::args()
        .nth(1)
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(60);

    let mut rng = StdRng::seed_from_u64(7);
    let scene = RgbImage::from_fn(520, 380, |x, y| {
        let v = ((x / 13) * 37 + (y / 11) * 91) % 200 + 30;
        Rgb([v as u8, (255 - v) as u8, ((v * 3) % 256) as u8])
    });

    let (w, h) = (320u32, 240u32);
    let mut frames = Vec::with_capacity(n_frames);
    for k in 0..n_frames {
        let ox = (60 + k as i64 + rng.gen_range(-8..=8)).clamp(0, 200);
        let oy = 60 + rng.gen_range(-6..=6);
        frames.push(RgbImage::from_fn(w, h, |x, y| {
            *scene.get_pixel((x as i64 + ox) as u32, (y as i64 + oy) as u32)
        }));
    }

    let mut batch = Stabilizer::new(StabilizerConfig::batch())?;
    let out = batch.process_all(&frames)?;
    let raw: f64 = out.report.deltas().iter().map(|d| d.translation_norm()).sum();
    let residual: f64 = out
        .report
        .residual_deltas()
        .iter()
        .map(|d| d.translation_norm())
        .sum();
    println!(
        "batch:  {} frames, path length {:.1} px -> {:.1} px, mean correction {:.2} px",
        out.frames.len(),
        raw,
        residual,
        out.report.mean_magnitude()
    );

    let mut live = Stabilizer::new(StabilizerConfig::default())?;
    for frame in &frames {
        live.process_frame(frame)?;
    }
    println!(
        "causal: mean correction over the last {} frames {:.2} px",
        live.motion_history().len(),
        live.mean_motion()
    );
    Ok(())
}
