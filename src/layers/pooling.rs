use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::tensor::Shape;
use crate::math::{same_padding, SamePadding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolingType {
    Max,
    Average,
    None,
}

impl PoolingType {
    pub const ALL: [PoolingType; 3] = [PoolingType::Max, PoolingType::Average, PoolingType::None];

    pub fn name(&self) -> &'static str {
        match self {
            PoolingType::Max => "max",
            PoolingType::Average => "average",
            PoolingType::None => "none",
        }
    }
}

/// Max or average pooling with "same" padding. Padded positions are ignored:
/// they never win a max and are not counted in an average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool2d {
    pub kind: PoolingType,
    pub pool_size: usize,
    pub stride: usize,

    #[serde(skip)]
    input_dim: (usize, usize, usize, usize),
    #[serde(skip)]
    argmax: Vec<usize>, // flat input index of each output's winner (max pooling)
}

impl Pool2d {
    pub fn new(kind: PoolingType, pool_size: usize, stride: usize) -> Result<Pool2d> {
        if kind == PoolingType::None {
            return Err(Error::build("a pooling layer needs a max or average kind"));
        }
        if pool_size == 0 || stride == 0 {
            return Err(Error::build(format!(
                "pool size and pool stride must be positive, got {pool_size}/{stride}"
            )));
        }
        Ok(Pool2d { kind, pool_size, stride, input_dim: (0, 0, 0, 0), argmax: Vec::new() })
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        let (h, w, c) = input.spatial("pooling")?;
        let pad = same_padding(h, w, self.pool_size, self.stride);
        Ok(Shape::Spatial { height: pad.out_h, width: pad.out_w, channels: c })
    }

    /// Clamped input window [y0, y1) x [x0, x1) for output (oy, ox).
    fn window(&self, pad: &SamePadding, h: usize, w: usize, oy: usize, ox: usize) -> (usize, usize, usize, usize) {
        let y = (oy * self.stride) as isize - pad.pad_top as isize;
        let x = (ox * self.stride) as isize - pad.pad_left as isize;
        let y0 = y.max(0) as usize;
        let x0 = x.max(0) as usize;
        let y1 = ((y + self.pool_size as isize).max(0) as usize).min(h);
        let x1 = ((x + self.pool_size as isize).max(0) as usize).min(w);
        (y0, y1, x0, x1)
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = x.dim();
        let pad = same_padding(h, w, self.pool_size, self.stride);
        let mut out = Array4::<f32>::zeros((n, pad.out_h, pad.out_w, c));
        self.argmax.clear();

        for s in 0..n {
            for oy in 0..pad.out_h {
                for ox in 0..pad.out_w {
                    let (y0, y1, x0, x1) = self.window(&pad, h, w, oy, ox);
                    if y0 >= y1 || x0 >= x1 {
                        return Err(Error::build(format!(
                            "pooling window {}x{} with stride {} falls outside a {h}x{w} input",
                            self.pool_size, self.pool_size, self.stride
                        )));
                    }
                    for ch in 0..c {
                        match self.kind {
                            PoolingType::Max => {
                                let mut best = f32::NEG_INFINITY;
                                let mut best_idx = ((s * h + y0) * w + x0) * c + ch;
                                for iy in y0..y1 {
                                    for ix in x0..x1 {
                                        let v = x[[s, iy, ix, ch]];
                                        if v > best {
                                            best = v;
                                            best_idx = ((s * h + iy) * w + ix) * c + ch;
                                        }
                                    }
                                }
                                out[[s, oy, ox, ch]] = best;
                                self.argmax.push(best_idx);
                            }
                            _ => {
                                let mut sum = 0.0f32;
                                for iy in y0..y1 {
                                    for ix in x0..x1 {
                                        sum += x[[s, iy, ix, ch]];
                                    }
                                }
                                out[[s, oy, ox, ch]] = sum / ((y1 - y0) * (x1 - x0)) as f32;
                            }
                        }
                    }
                }
            }
        }
        self.input_dim = (n, h, w, c);
        Ok(out)
    }

    pub fn backward(&mut self, grad: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = self.input_dim;
        let pad = same_padding(h, w, self.pool_size, self.stride);
        if grad.dim() != (n, pad.out_h, pad.out_w, c) {
            return Err(Error::shape(format!(
                "pooling gradient {:?} does not match the last forward output",
                grad.dim()
            )));
        }
        let mut dx = Array4::<f32>::zeros(self.input_dim);

        match self.kind {
            PoolingType::Max => {
                let flat = dx
                    .as_slice_mut()
                    .ok_or_else(|| Error::training("pooling gradient buffer is not contiguous"))?;
                for (g, &idx) in grad.iter().zip(self.argmax.iter()) {
                    flat[idx] += *g;
                }
            }
            _ => {
                for s in 0..n {
                    for oy in 0..pad.out_h {
                        for ox in 0..pad.out_w {
                            let (y0, y1, x0, x1) = self.window(&pad, h, w, oy, ox);
                            let count = ((y1 - y0) * (x1 - x0)) as f32;
                            for ch in 0..c {
                                let g = grad[[s, oy, ox, ch]] / count;
                                for iy in y0..y1 {
                                    for ix in x0..x1 {
                                        dx[[s, iy, ix, ch]] += g;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Array4<f32> {
        Array4::from_shape_fn((1, 4, 4, 1), |(_, i, j, _)| (i * 4 + j) as f32)
    }

    #[test]
    fn max_pool_picks_window_maximum() {
        let mut pool = Pool2d::new(PoolingType::Max, 2, 2).unwrap();
        let out = pool.forward(ramp()).unwrap();
        assert_eq!(out.dim(), (1, 2, 2, 1));
        assert_eq!(out[[0, 0, 0, 0]], 5.0);
        assert_eq!(out[[0, 1, 1, 0]], 15.0);

        let dx = pool.backward(Array4::ones((1, 2, 2, 1))).unwrap();
        assert_eq!(dx.sum(), 4.0);
        assert_eq!(dx[[0, 1, 1, 0]], 1.0);
        assert_eq!(dx[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn average_pool_excludes_padding() {
        // 3x3 window, stride 2 on 4x4: out 2x2, one padded row/col at the bottom right
        let mut pool = Pool2d::new(PoolingType::Average, 3, 2).unwrap();
        let out = pool.forward(ramp()).unwrap();
        assert_eq!(out.dim(), (1, 2, 2, 1));
        // window rows 2..4, cols 2..4 -> 10, 11, 14, 15
        assert_eq!(out[[0, 1, 1, 0]], 12.5);

        let dx = pool.backward(Array4::ones((1, 2, 2, 1))).unwrap();
        assert!((dx.sum() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn none_kind_is_not_a_layer() {
        assert!(Pool2d::new(PoolingType::None, 3, 2).is_err());
        assert!(Pool2d::new(PoolingType::Max, 3, 0).is_err());
    }
}
