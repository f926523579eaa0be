//! Synthetic scenes for unit tests: a blurred random checker canvas and
//! viewports into it.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CELL: u32 = 12;

/// Random 12 px cells, Gaussian-blurred (sigma 2) so corners and gradients
/// are smooth enough for sub-pixel tracking.
pub(crate) fn textured_canvas(w: u32, h: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cols = w.div_ceil(CELL) as usize;
    let rows = h.div_ceil(CELL) as usize;
    let cells: Vec<f32> = (0..cols * rows)
        .map(|_| rng.gen_range(30.0f32..225.0))
        .collect();

    let raw = ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(w, h, |x, y| {
        let c = (y / CELL) as usize * cols + (x / CELL) as usize;
        Luma([cells[c] / 255.0])
    });
    let blurred = imageproc::filter::gaussian_blur_f32(&raw, 2.0);
    GrayImage::from_fn(w, h, |x, y| {
        let v = blurred.get_pixel(x, y)[0].clamp(0.0, 1.0);
        Luma([(v * 255.0).round() as u8])
    })
}

fn bilinear(canvas: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = canvas.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let at = |xx: u32, yy: u32| canvas.get_pixel(xx, yy)[0] as f32;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bot = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bot * fy
}

/// `w x h` viewport whose top-left corner sits at `(ox, oy)` on the canvas.
pub(crate) fn shifted_view(canvas: &GrayImage, ox: f32, oy: f32, w: u32, h: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        Luma([bilinear(canvas, x as f32 + ox, y as f32 + oy).round() as u8])
    })
}

/// Colour viewport: the luma texture spread over three channels.
pub(crate) fn rgb_view(canvas: &GrayImage, ox: f32, oy: f32, w: u32, h: u32) -> RgbImage {
    let gray = shifted_view(canvas, ox, oy, w, h);
    RgbImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v / 2 + 60, 255 - v])
    })
}
