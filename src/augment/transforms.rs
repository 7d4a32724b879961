use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::{s, Array2, ArrayView2};
use rand::Rng;

use crate::augment::augmentation::AugmentationParams;
use crate::error::{Error, Result};

/// One randomly drawn perturbation. Drawn once per synthetic sample and
/// applied to every channel of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Horizontal and vertical shift in pixels.
    pub dx: f32,
    pub dy: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    /// Rotation in degrees, counter-clockwise.
    pub angle: f32,
    /// Top-left corners of the erased squares in output coordinates.
    pub erase: Vec<(usize, usize)>,
}

impl Transform {
    pub fn identity() -> Self {
        Transform { dx: 0.0, dy: 0.0, flip_h: false, flip_v: false, angle: 0.0, erase: Vec::new() }
    }

    /// Draws a transform for an `h` x `w` source image.
    pub fn draw<R: Rng + ?Sized>(params: &AugmentationParams, h: usize, w: usize, rng: &mut R) -> Self {
        let max_dx = params.width_shift * w as f32;
        let max_dy = params.height_shift * h as f32;
        let dx = if max_dx > 0.0 { rng.gen_range(-max_dx..=max_dx) } else { 0.0 };
        let dy = if max_dy > 0.0 { rng.gen_range(-max_dy..=max_dy) } else { 0.0 };
        let flip_h = params.horizontal && rng.gen_bool(0.5);
        let flip_v = params.vertical && rng.gen_bool(0.5);
        let angle = if params.rotation { rng.gen_range(0.0..360.0) } else { 0.0 };

        let size = params.image_size;
        let side = params.mask_size.min(size);
        let erase = (0..params.mask_count)
            .map(|_| (rng.gen_range(0..=size - side), rng.gen_range(0..=size - side)))
            .collect();

        Transform { dx, dy, flip_h, flip_v, angle, erase }
    }

    /// Shift, rotation and flips on one plane. Output keeps the input size;
    /// points sampled outside the image take the nearest edge value.
    pub fn warp(&self, plane: &ArrayView2<f32>) -> Array2<f32> {
        let (h, w) = plane.dim();
        if self.dx == 0.0 && self.dy == 0.0 && self.angle == 0.0 && !self.flip_h && !self.flip_v {
            return plane.to_owned();
        }
        let cx = (w as f32 - 1.0) / 2.0;
        let cy = (h as f32 - 1.0) / 2.0;
        let (sin_a, cos_a) = self.angle.to_radians().sin_cos();

        Array2::from_shape_fn((h, w), |(y, x)| {
            let x = if self.flip_h { w - 1 - x } else { x };
            let y = if self.flip_v { h - 1 - y } else { y };
            // Inverse mapping from output to source
            let px = x as f32 - cx - self.dx;
            let py = y as f32 - cy - self.dy;
            let src_x = cx + px * cos_a + py * sin_a;
            let src_y = cy - px * sin_a + py * cos_a;
            bilinear_nearest(plane, src_y, src_x)
        })
    }

    /// Fills the erased squares of an output plane with `fill`.
    pub fn erase(&self, plane: &mut Array2<f32>, side: usize, fill: f32) {
        let (h, w) = plane.dim();
        for &(top, left) in &self.erase {
            let bottom = (top + side).min(h);
            let right = (left + side).min(w);
            plane.slice_mut(s![top..bottom, left..right]).fill(fill);
        }
    }
}

/// Bilinear interpolation with coordinates clamped to the image ("nearest"
/// fill mode).
fn bilinear_nearest(plane: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = plane.dim();
    let y = y.clamp(0.0, (h - 1) as f32);
    let x = x.clamp(0.0, (w - 1) as f32);
    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let fy = y - y0 as f32;
    let fx = x - x0 as f32;

    plane[[y0, x0]] * (1.0 - fx) * (1.0 - fy)
        + plane[[y0, x1]] * fx * (1.0 - fy)
        + plane[[y1, x0]] * (1.0 - fx) * fy
        + plane[[y1, x1]] * fx * fy
}

/// Brings a plane to `size` x `size`: centre crop when it is large enough,
/// bilinear resize otherwise.
pub fn fit_to_size(plane: &ArrayView2<f32>, size: usize) -> Result<Array2<f32>> {
    let (h, w) = plane.dim();
    if size == 0 {
        return Err(Error::hyperparameter("image_size must be positive"));
    }
    if h >= size && w >= size {
        let top = (h - size) / 2;
        let left = (w - size) / 2;
        return Ok(plane.slice(s![top..top + size, left..left + size]).to_owned());
    }
    resize_plane(plane, size)
}

fn resize_plane(plane: &ArrayView2<f32>, size: usize) -> Result<Array2<f32>> {
    let (h, w) = plane.dim();
    // imageops clamps f32 samples to [0, 1], so resample a rescaled copy.
    let lo = plane.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = plane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = if hi > lo { hi - lo } else { 1.0 };

    let data: Vec<f32> = plane.iter().map(|&v| (v - lo) / span).collect();
    let buf: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(w as u32, h as u32, data)
        .ok_or_else(|| Error::shape(format!("cannot wrap a {h}x{w} plane as an image")))?;
    let resized = imageops::resize(&buf, size as u32, size as u32, FilterType::Triangle);

    Array2::from_shape_vec((size, size), resized.into_raw().into_iter().map(|v| v * span + lo).collect())
        .map_err(|e| Error::shape(format!("resize: {e}")))
}

/// Median of a plane.
pub fn median(plane: &Array2<f32>) -> f32 {
    let mut values: Vec<f32> = plane.iter().copied().collect();
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    *m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(i, j)| (i * w + j) as f32)
    }

    #[test]
    fn horizontal_flip_mirrors_columns() {
        let t = Transform { flip_h: true, ..Transform::identity() };
        let out = t.warp(&ramp(3, 4).view());
        assert_eq!(out[[1, 0]], 7.0);
        assert_eq!(out[[1, 3]], 4.0);
    }

    #[test]
    fn full_turn_is_identity() {
        let t = Transform { angle: 360.0, ..Transform::identity() };
        let img = ramp(5, 5);
        let out = t.warp(&img.view());
        for (a, b) in out.iter().zip(img.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn shift_fills_with_edge_values() {
        let t = Transform { dx: 2.0, ..Transform::identity() };
        let out = t.warp(&ramp(2, 4).view());
        // Columns 0..2 read from x < 0 and repeat column 0.
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[0, 1]], 0.0);
        assert_eq!(out[[0, 3]], 1.0);
    }

    #[test]
    fn fit_crops_or_resizes() {
        let img = ramp(10, 10);
        assert_eq!(fit_to_size(&img.view(), 4).unwrap()[[0, 0]], 33.0);

        let up = fit_to_size(&Array2::from_elem((4, 4), 2500.0f32).view(), 8).unwrap();
        assert_eq!(up.dim(), (8, 8));
        assert!(up.iter().all(|&v| (v - 2500.0).abs() < 1e-2));
    }

    #[test]
    fn erase_writes_fill_value() {
        let t = Transform { erase: vec![(1, 1)], ..Transform::identity() };
        let mut img = ramp(4, 4);
        t.erase(&mut img, 2, -1.0);
        assert_eq!(img[[1, 1]], -1.0);
        assert_eq!(img[[2, 2]], -1.0);
        assert_eq!(img[[3, 3]], 15.0);
    }

    #[test]
    fn median_of_odd_count() {
        assert_eq!(median(&ndarray::array![[3.0f32, 1.0, 2.0]]), 2.0);
    }
}
