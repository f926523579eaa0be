//! Corrective warp and border repair.
//!
//! A compensation `c = cumulative - smoothed` is applied as a
//! destination-to-source sampling map: output pixel `p` reads the input at
//! `R(c.dtheta) * p + (c.dx, c.dy)`. Scene content therefore moves by
//! `smoothed - cumulative`, i.e. it lands where the smooth path says it
//! should be.

use image::imageops::{self, FilterType};
use image::Pixel;
use nalgebra::Matrix3;

use crate::config::BorderFix;
use crate::imaging::{warp_affine, Frame};
use crate::motion::MotionDelta;

/// Warps frames by a compensation and hides the exposed margins.
#[derive(Debug, Clone, Copy)]
pub struct FrameCompensator {
    border: BorderFix,
}

impl FrameCompensator {
    pub fn new(border: BorderFix) -> Self {
        Self { border }
    }

    /// Destination-to-source map for a `width x height` frame, including the
    /// centred zoom when the border policy asks for one.
    pub fn sampling_map(&self, compensation: MotionDelta, width: u32, height: u32) -> Matrix3<f64> {
        let (s, c) = compensation.dtheta.sin_cos();
        let rigid = Matrix3::new(
            c, -s, compensation.dx, //
            s, c, compensation.dy, //
            0.0, 0.0, 1.0,
        );
        match self.border {
            BorderFix::Zoom { factor } if factor != 1.0 => {
                let cx = (width as f64 - 1.0) * 0.5;
                let cy = (height as f64 - 1.0) * 0.5;
                let inv = 1.0 / factor;
                let unzoom = Matrix3::new(
                    inv, 0.0, cx * (1.0 - inv), //
                    0.0, inv, cy * (1.0 - inv), //
                    0.0, 0.0, 1.0,
                );
                rigid * unzoom
            }
            _ => rigid,
        }
    }

    /// Warp `frame` by `compensation` and apply the border policy.
    ///
    /// Returns the corrected frame (same size and pixel type as the input)
    /// and the translation magnitude of the compensation. A non-finite
    /// compensation is treated as zero.
    pub fn compensate<P>(&self, frame: &Frame<P>, compensation: MotionDelta) -> (Frame<P>, f64)
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        let compensation = if compensation.is_finite() {
            compensation
        } else {
            tracing::warn!(?compensation, "non-finite compensation replaced by zero");
            MotionDelta::ZERO
        };
        let (w, h) = frame.dimensions();
        let map = self.sampling_map(compensation, w, h);
        let warped = if map == Matrix3::identity() {
            frame.clone()
        } else {
            warp_affine(frame, &map)
        };
        let out = match self.border {
            BorderFix::Crop { margin } => crop_and_rescale(&warped, margin),
            BorderFix::None | BorderFix::Zoom { .. } => warped,
        };
        (out, compensation.translation_norm())
    }
}

/// Remove `floor(min(w, h) * margin)` pixels from every edge and scale the
/// rest back to the original size.
fn crop_and_rescale<P>(frame: &Frame<P>, margin: f64) -> Frame<P>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (w, h) = frame.dimensions();
    let m = (w.min(h) as f64 * margin).floor();
    if m.is_nan() || m < 1.0 {
        return frame.clone();
    }
    let m = m as u32;
    if 2 * m >= w || 2 * m >= h {
        return frame.clone();
    }
    let inner = imageops::crop_imm(frame, m, m, w - 2 * m, h - 2 * m).to_image();
    imageops::resize(&inner, w, h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use nalgebra::Vector3;

    fn pattern(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128]))
    }

    #[test]
    fn zero_compensation_without_margin_is_pixel_exact() {
        let frame = pattern(40, 30);
        for border in [BorderFix::None, BorderFix::Crop { margin: 0.0 }, BorderFix::Zoom { factor: 1.0 }] {
            let (out, mag) = FrameCompensator::new(border).compensate(&frame, MotionDelta::ZERO);
            assert_eq!(out, frame, "{border:?}");
            assert_eq!(mag, 0.0);
        }
    }

    #[test]
    fn output_keeps_size_and_magnitude_is_translation_norm() {
        let frame = pattern(64, 48);
        let comp = MotionDelta::new(3.0, -4.0, 0.02);
        for border in [
            BorderFix::None,
            BorderFix::Crop { margin: 0.05 },
            BorderFix::Zoom { factor: 1.04 },
        ] {
            let (out, mag) = FrameCompensator::new(border).compensate(&frame, comp);
            assert_eq!(out.dimensions(), (64, 48));
            assert_abs_diff_eq!(mag, 5.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn content_moves_opposite_to_the_compensation() {
        let mut frame = GrayImage::from_pixel(30, 30, Luma([0]));
        frame.put_pixel(15, 12, Luma([255]));
        let comp = MotionDelta::new(2.0, -3.0, 0.0);
        let (out, _) = FrameCompensator::new(BorderFix::None).compensate(&frame, comp);
        assert_eq!(out.get_pixel(13, 15)[0], 255);
        assert_eq!(out.get_pixel(15, 12)[0], 0);
    }

    #[test]
    fn zoom_keeps_the_centre_fixed() {
        let comp = FrameCompensator::new(BorderFix::Zoom { factor: 1.25 });
        let map = comp.sampling_map(MotionDelta::ZERO, 101, 51);
        let centre = map * Vector3::new(50.0, 25.0, 1.0);
        assert_abs_diff_eq!(centre.x, 50.0, epsilon = 1e-12);
        assert_abs_diff_eq!(centre.y, 25.0, epsilon = 1e-12);
        let corner = map * Vector3::new(0.0, 0.0, 1.0);
        assert_abs_diff_eq!(corner.x, 50.0 - 50.0 / 1.25, epsilon = 1e-12);
    }

    #[test]
    fn crop_margin_is_floored_on_the_short_side() {
        // 0.05 * 30 = 1.5 -> 1 pixel; a constant image stays constant.
        let flat = RgbImage::from_pixel(50, 30, Rgb([10, 20, 30]));
        let out = crop_and_rescale(&flat, 0.05);
        assert_eq!(out.dimensions(), (50, 30));
        assert!(out.pixels().all(|p| *p == Rgb([10, 20, 30])));
        // Too small to remove anything.
        let tiny = pattern(12, 12);
        assert_eq!(crop_and_rescale(&tiny, 0.05), tiny);
    }

    #[test]
    fn non_finite_compensation_passes_through() {
        let frame = pattern(20, 20);
        let comp = MotionDelta::new(f64::NAN, 0.0, 0.0);
        let (out, mag) = FrameCompensator::new(BorderFix::None).compensate(&frame, comp);
        assert_eq!(out, frame);
        assert_eq!(mag, 0.0);
    }
}
