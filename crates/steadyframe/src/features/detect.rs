//! Shi–Tomasi corner detection with greedy minimum-distance suppression.

use image::GrayImage;
use imageproc::filter::separable_filter_equal;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use crate::config::FeatureConfig;
use crate::imaging::{plane_from_vec, GrayF32};

/// Corners sorted by decreasing response, at most `max_features` of them,
/// pairwise at least `min_distance` apart.
pub(crate) fn good_features(gray: &GrayImage, cfg: &FeatureConfig) -> Vec<[f32; 2]> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 || cfg.max_features == 0 {
        return Vec::new();
    }
    let response = min_eigen_response(gray, cfg.block_size.max(1));
    let max_response = response.iter().copied().fold(0.0f32, f32::max);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = max_response * cfg.quality_level;

    // ── local maxima above threshold ──
    let (wu, hu) = (w as usize, h as usize);
    let mut candidates: Vec<(f32, usize)> = Vec::new();
    for y in 1..hu - 1 {
        for x in 1..wu - 1 {
            let idx = y * wu + x;
            let v = response[idx];
            if v < threshold || v <= 0.0 {
                continue;
            }
            let is_peak = (y - 1..=y + 1)
                .flat_map(|ny| (x - 1..=x + 1).map(move |nx| ny * wu + nx))
                .all(|n| response[n] <= v);
            if is_peak {
                candidates.push((v, idx));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

    // ── greedy spacing ──
    let min_d = cfg.min_distance.max(0.0);
    if min_d < 1.0 {
        return candidates
            .iter()
            .take(cfg.max_features)
            .map(|&(_, idx)| [(idx % wu) as f32, (idx / wu) as f32])
            .collect();
    }

    let cell = min_d;
    let gw = (w as f32 / cell).ceil() as usize + 1;
    let gh = (h as f32 / cell).ceil() as usize + 1;
    let mut grid: Vec<Vec<[f32; 2]>> = vec![Vec::new(); gw * gh];
    let min_d2 = min_d * min_d;
    let mut out = Vec::new();

    for &(_, idx) in &candidates {
        let p = [(idx % wu) as f32, (idx / wu) as f32];
        let cx = (p[0] / cell) as usize;
        let cy = (p[1] / cell) as usize;
        let mut too_close = false;
        'scan: for gy in cy.saturating_sub(1)..=(cy + 1).min(gh - 1) {
            for gx in cx.saturating_sub(1)..=(cx + 1).min(gw - 1) {
                for q in &grid[gy * gw + gx] {
                    let dx = p[0] - q[0];
                    let dy = p[1] - q[1];
                    if dx * dx + dy * dy < min_d2 {
                        too_close = true;
                        break 'scan;
                    }
                }
            }
        }
        if too_close {
            continue;
        }
        grid[cy * gw + cx].push(p);
        out.push(p);
        if out.len() >= cfg.max_features {
            break;
        }
    }
    out
}

/// Smallest eigenvalue of the structure tensor summed over a
/// `block x block` window, per pixel (row-major).
fn min_eigen_response(gray: &GrayImage, block: usize) -> Vec<f32> {
    let (w, h) = gray.dimensions();
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let n = w as usize * h as usize;

    let mut xx = Vec::with_capacity(n);
    let mut xy = Vec::with_capacity(n);
    let mut yy = Vec::with_capacity(n);
    for (a, b) in gx.as_raw().iter().zip(gy.as_raw()) {
        let a = *a as f32;
        let b = *b as f32;
        xx.push(a * a);
        xy.push(a * b);
        yy.push(b * b);
    }
    let ones = vec![1.0f32; block];
    let window_sum = |products: Vec<f32>| -> GrayF32 {
        separable_filter_equal(&plane_from_vec(w, h, products), ones.as_slice())
    };
    let sxx = window_sum(xx);
    let sxy = window_sum(xy);
    let syy = window_sum(yy);

    sxx.as_raw()
        .iter()
        .zip(sxy.as_raw())
        .zip(syy.as_raw())
        .map(|((&a, &b), &c)| {
            let half_trace = 0.5 * (a + c);
            let disc = (0.25 * (a - c) * (a - c) + b * b).sqrt();
            (half_trace - disc).max(0.0)
        })
        .collect()
}
