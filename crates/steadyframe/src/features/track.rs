//! Pyramidal Lucas–Kanade tracking, coarse to fine. Window gradients come
//! from the previous frame and are computed once per level.

use image::GrayImage;
use tracing::trace;

use crate::config::FlowConfig;
use crate::imaging::{gray_to_f32, pyr_down, sample_replicate, scharr_gradients, GrayF32};

use super::TrackedSet;

struct Level {
    image: GrayF32,
    grad_x: GrayF32,
    grad_y: GrayF32,
}

/// Gaussian pyramid of `gray`, finest first. Stops early once a level would
/// be smaller than the tracking window.
fn build_pyramid(gray: &GrayImage, max_level: usize, win: u32) -> Vec<GrayF32> {
    let mut levels = vec![gray_to_f32(gray)];
    for _ in 0..max_level {
        let Some(last) = levels.last() else { break };
        let (w, h) = last.dimensions();
        if w.div_ceil(2) < win || h.div_ceil(2) < win {
            break;
        }
        let next = pyr_down(last);
        levels.push(next);
    }
    levels
}

pub(crate) fn track_pyramidal(
    prev: &GrayImage,
    curr: &GrayImage,
    points: &[[f32; 2]],
    cfg: &FlowConfig,
) -> TrackedSet {
    let n = points.len();
    let mut out = TrackedSet {
        points: points.to_vec(),
        valid: vec![false; n],
        errors: vec![0.0; n],
    };
    if n == 0 || prev.dimensions() != curr.dimensions() {
        return out;
    }
    let (w, h) = prev.dimensions();
    let win = cfg.win_size.max(3) as u32;
    if w < 2 || h < 2 {
        return out;
    }

    let prev_levels: Vec<Level> = build_pyramid(prev, cfg.max_level, win)
        .into_iter()
        .map(|image| {
            let (grad_x, grad_y) = scharr_gradients(&image);
            Level {
                image,
                grad_x,
                grad_y,
            }
        })
        .collect();
    let curr_levels = build_pyramid(curr, prev_levels.len() - 1, win);

    for (i, p) in points.iter().enumerate() {
        if let Some((q, err)) = track_point(*p, &prev_levels, &curr_levels, cfg) {
            out.points[i] = q;
            out.valid[i] = true;
            out.errors[i] = err;
        } else {
            trace!(x = p[0], y = p[1], "point lost");
        }
    }
    out
}

/// Track one point through all levels; `None` when lost.
fn track_point(
    p0: [f32; 2],
    prev: &[Level],
    curr: &[GrayF32],
    cfg: &FlowConfig,
) -> Option<([f32; 2], f32)> {
    if !(p0[0].is_finite() && p0[1].is_finite()) {
        return None;
    }
    let half = (cfg.win_size / 2) as i32;
    let area = (cfg.win_size * cfg.win_size) as f32;
    let eps2 = cfg.epsilon * cfg.epsilon;
    let n_levels = prev.len().min(curr.len());

    let mut template = Vec::with_capacity(cfg.win_size * cfg.win_size);
    let mut guess = [0.0f32; 2];
    let mut result = None;

    for lvl in (0..n_levels).rev() {
        let scale = 1.0 / (1u32 << lvl) as f32;
        let p = [p0[0] * scale, p0[1] * scale];
        let level = &prev[lvl];
        let target = &curr[lvl];
        let (lw, lh) = level.image.dimensions();
        let outside = |q: [f32; 2]| {
            q[0] < -(half as f32)
                || q[1] < -(half as f32)
                || q[0] >= lw as f32 + half as f32
                || q[1] >= lh as f32 + half as f32
        };

        if outside(p) {
            if lvl == 0 {
                return None;
            }
            guess = [2.0 * guess[0], 2.0 * guess[1]];
            continue;
        }

        // ── template and structure tensor ──
        template.clear();
        let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -half..=half {
            for wx in -half..=half {
                let sx = p[0] + wx as f32;
                let sy = p[1] + wy as f32;
                let iv = sample_replicate(&level.image, sx, sy);
                let gx = sample_replicate(&level.grad_x, sx, sy);
                let gy = sample_replicate(&level.grad_y, sx, sy);
                a += gx * gx;
                b += gx * gy;
                c += gy * gy;
                template.push((iv, gx, gy));
            }
        }
        let det = a * c - b * b;
        let min_eig = (a + c - ((a - c) * (a - c) + 4.0 * b * b).sqrt()) / (2.0 * area);
        if min_eig < cfg.min_eigen || det < f32::EPSILON {
            if lvl == 0 {
                return None;
            }
            guess = [2.0 * guess[0], 2.0 * guess[1]];
            continue;
        }

        // ── Gauss–Newton iterations ──
        let mut d = [0.0f32; 2];
        let mut prev_delta = [0.0f32; 2];
        let mut lost = false;
        for iter in 0..cfg.max_iters {
            let q = [p[0] + guess[0] + d[0], p[1] + guess[1] + d[1]];
            if outside(q) {
                lost = true;
                break;
            }
            let (mut bx, mut by) = (0.0f32, 0.0f32);
            let mut k = 0;
            for wy in -half..=half {
                for wx in -half..=half {
                    let (iv, gx, gy) = template[k];
                    k += 1;
                    let jv = sample_replicate(target, q[0] + wx as f32, q[1] + wy as f32);
                    let diff = iv - jv;
                    bx += diff * gx;
                    by += diff * gy;
                }
            }
            let delta = [(c * bx - b * by) / det, (a * by - b * bx) / det];
            d[0] += delta[0];
            d[1] += delta[1];
            if delta[0] * delta[0] + delta[1] * delta[1] <= eps2 {
                break;
            }
            if iter > 0
                && (delta[0] + prev_delta[0]).abs() < 0.01
                && (delta[1] + prev_delta[1]).abs() < 0.01
            {
                // Oscillating between two positions: settle in the middle.
                d[0] -= 0.5 * delta[0];
                d[1] -= 0.5 * delta[1];
                break;
            }
            prev_delta = delta;
        }
        if lost && lvl == 0 {
            return None;
        }

        if lvl > 0 {
            guess = [2.0 * (guess[0] + d[0]), 2.0 * (guess[1] + d[1])];
        } else {
            let q = [p[0] + guess[0] + d[0], p[1] + guess[1] + d[1]];
            let mut err = 0.0f32;
            let mut k = 0;
            for wy in -half..=half {
                for wx in -half..=half {
                    let jv = sample_replicate(target, q[0] + wx as f32, q[1] + wy as f32);
                    err += (template[k].0 - jv).abs();
                    k += 1;
                }
            }
            result = Some((q, err / area));
        }
    }

    let (q, err) = result?;
    let (w, h) = prev[0].image.dimensions();
    let inside = q[0].is_finite()
        && q[1].is_finite()
        && q[0] >= 0.0
        && q[1] >= 0.0
        && q[0] <= (w - 1) as f32
        && q[1] <= (h - 1) as f32;
    inside.then_some((q, err))
}
