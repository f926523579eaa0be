//! Pixel-level primitives shared by tracking and compensation.
//!
//! Frames are `image` buffers with 8-bit channels. Tracking works on `f32`
//! grayscale planes in gray-level units (0..=255).

use image::{GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::filter::filter3x3;
use imageproc::gradients::{HORIZONTAL_SCHARR, VERTICAL_SCHARR};
use nalgebra::Matrix3;

/// A video frame: any 8-bit-per-channel `image` buffer (`RgbImage`,
/// `GrayImage`, `RgbaImage`, ...).
pub type Frame<P> = ImageBuffer<P, Vec<u8>>;

/// Single-channel floating-point plane.
pub(crate) type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Convert a frame of any pixel type to 8-bit luma.
pub fn to_gray<P>(frame: &Frame<P>) -> GrayImage
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = frame.dimensions();
    GrayImage::from_fn(w, h, |x, y| frame.get_pixel(x, y).to_luma())
}

pub(crate) fn gray_to_f32(gray: &GrayImage) -> GrayF32 {
    let (w, h) = gray.dimensions();
    let data = gray.as_raw().iter().map(|&v| v as f32).collect();
    plane_from_vec(w, h, data)
}

pub(crate) fn plane_from_vec(w: u32, h: u32, data: Vec<f32>) -> GrayF32 {
    debug_assert_eq!(data.len(), w as usize * h as usize);
    GrayF32::from_raw(w, h, data).unwrap_or_else(|| GrayF32::new(w, h))
}

/// Reflect-101 border index (`gfedcb|abcdefgh|gfedcba`).
#[inline]
pub(crate) fn reflect101(i: i64, n: i64) -> i64 {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let r = i.rem_euclid(period);
    if r >= n {
        period - r
    } else {
        r
    }
}

/// `[1 4 6 4 1] / 16`, the binomial kernel of the classic image pyramid.
const PYR_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Gaussian downsample by two: binomial blur, then keep even rows and
/// columns.
///
/// Output size is `ceil(w / 2) x ceil(h / 2)`.
pub(crate) fn pyr_down(src: &GrayF32) -> GrayF32 {
    let (w, h) = src.dimensions();
    let blurred = imageproc::filter::separable_filter_equal(src, PYR_KERNEL.as_slice());
    GrayF32::from_fn(w.div_ceil(2), h.div_ceil(2), |x, y| *blurred.get_pixel(2 * x, 2 * y))
}

/// Normalized Scharr derivatives (`d/dx`, `d/dy` in gray levels per pixel).
pub(crate) fn scharr_gradients(src: &GrayF32) -> (GrayF32, GrayF32) {
    let kx = HORIZONTAL_SCHARR.map(|k| k as f32 / 32.0);
    let ky = VERTICAL_SCHARR.map(|k| k as f32 / 32.0);
    let gx: GrayF32 = filter3x3::<_, f32, f32>(src, &kx);
    let gy: GrayF32 = filter3x3::<_, f32, f32>(src, &ky);
    (gx, gy)
}

/// Bilinear sample with replicated borders.
#[inline]
pub(crate) fn sample_replicate(img: &GrayF32, x: f32, y: f32) -> f32 {
    let (w, h) = img.dimensions();
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as usize;
    let y0 = y0 as usize;
    let x1 = (x0 + 1).min(w as usize - 1);
    let y1 = (y0 + 1).min(h as usize - 1);
    let stride = w as usize;
    let raw = img.as_raw();
    let top = raw[y0 * stride + x0] * (1.0 - fx) + raw[y0 * stride + x1] * fx;
    let bot = raw[y1 * stride + x0] * (1.0 - fx) + raw[y1 * stride + x1] * fx;
    top * (1.0 - fy) + bot * fy
}

/// Resample `src` through a destination-to-source map: every output pixel
/// `p` takes the bilinear value of `src` at `map * p` (homogeneous), with
/// reflect-101 borders so no constant-colour margins appear.
pub(crate) fn warp_affine<P>(src: &Frame<P>, map: &Matrix3<f64>) -> Frame<P>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = src.dimensions();
    let mut out: Frame<P> = ImageBuffer::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let (wi, hi) = (w as i64, h as i64);
    let (m00, m01, m02) = (map[(0, 0)], map[(0, 1)], map[(0, 2)]);
    let (m10, m11, m12) = (map[(1, 0)], map[(1, 1)], map[(1, 2)]);
    // Keeps the integer arithmetic below far from overflow for absurd maps.
    const LIMIT: f64 = 1.0e7;

    for (x, y, px) in out.enumerate_pixels_mut() {
        let xf = x as f64;
        let yf = y as f64;
        let sx = m00 * xf + m01 * yf + m02;
        let sy = m10 * xf + m11 * yf + m12;
        let sx = if sx.is_finite() { sx.clamp(-LIMIT, LIMIT) } else { 0.0 };
        let sy = if sy.is_finite() { sy.clamp(-LIMIT, LIMIT) } else { 0.0 };

        let x0f = sx.floor();
        let y0f = sy.floor();
        let fx = (sx - x0f) as f32;
        let fy = (sy - y0f) as f32;
        let x0 = x0f as i64;
        let y0 = y0f as i64;
        let xa = reflect101(x0, wi) as u32;
        let xb = reflect101(x0 + 1, wi) as u32;
        let ya = reflect101(y0, hi) as u32;
        let yb = reflect101(y0 + 1, hi) as u32;

        let p00 = src.get_pixel(xa, ya).channels();
        let p10 = src.get_pixel(xb, ya).channels();
        let p01 = src.get_pixel(xa, yb).channels();
        let p11 = src.get_pixel(xb, yb).channels();
        for (c, ch) in px.channels_mut().iter_mut().enumerate() {
            let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
            let bot = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
            let v = top * (1.0 - fy) + bot * fy;
            *ch = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
