use ndarray::{Array2, Array4, ArrayView4};

/// Output geometry of a "same"-padded sliding window.
///
/// Output size is `ceil(input / stride)`; the padding needed to reach it is
/// split with the smaller half on the top/left edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamePadding {
    pub out_h: usize,
    pub out_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

pub fn same_padding(in_h: usize, in_w: usize, kernel: usize, stride: usize) -> SamePadding {
    let out_h = (in_h + stride - 1) / stride;
    let out_w = (in_w + stride - 1) / stride;
    let pad_h = ((out_h.saturating_sub(1)) * stride + kernel).saturating_sub(in_h);
    let pad_w = ((out_w.saturating_sub(1)) * stride + kernel).saturating_sub(in_w);
    SamePadding { out_h, out_w, pad_top: pad_h / 2, pad_left: pad_w / 2 }
}

/// Unrolls every receptive field of `x` (N, H, W, C) into one row.
///
/// The result has shape (N * out_h * out_w, kernel * kernel * C) with columns
/// ordered (ki, kj, c), matching a kernel of shape (k, k, C, F) reshaped to
/// (k * k * C, F). Padded positions contribute zeros.
pub fn im2col(x: &ArrayView4<f32>, kernel: usize, stride: usize, pad: &SamePadding) -> Array2<f32> {
    let (n, h, w, c) = x.dim();
    let rows = n * pad.out_h * pad.out_w;
    let cols = kernel * kernel * c;
    let mut out = Array2::<f32>::zeros((rows, cols));

    let mut row = 0;
    for s in 0..n {
        for oy in 0..pad.out_h {
            for ox in 0..pad.out_w {
                let mut dst = out.row_mut(row);
                let mut col = 0;
                for ki in 0..kernel {
                    let iy = (oy * stride + ki) as isize - pad.pad_top as isize;
                    for kj in 0..kernel {
                        let ix = (ox * stride + kj) as isize - pad.pad_left as isize;
                        if iy >= 0 && ix >= 0 && (iy as usize) < h && (ix as usize) < w {
                            for ch in 0..c {
                                dst[col + ch] = x[[s, iy as usize, ix as usize, ch]];
                            }
                        }
                        col += c;
                    }
                }
                row += 1;
            }
        }
    }
    out
}

/// Inverse of [`im2col`]: scatters row gradients back onto an (N, H, W, C)
/// input gradient, summing overlapping receptive fields.
pub fn col2im(
    cols: &Array2<f32>,
    input_dim: (usize, usize, usize, usize),
    kernel: usize,
    stride: usize,
    pad: &SamePadding,
) -> Array4<f32> {
    let (n, h, w, c) = input_dim;
    let mut dx = Array4::<f32>::zeros(input_dim);

    let mut row = 0;
    for s in 0..n {
        for oy in 0..pad.out_h {
            for ox in 0..pad.out_w {
                let src = cols.row(row);
                let mut col = 0;
                for ki in 0..kernel {
                    let iy = (oy * stride + ki) as isize - pad.pad_top as isize;
                    for kj in 0..kernel {
                        let ix = (ox * stride + kj) as isize - pad.pad_left as isize;
                        if iy >= 0 && ix >= 0 && (iy as usize) < h && (ix as usize) < w {
                            for ch in 0..c {
                                dx[[s, iy as usize, ix as usize, ch]] += src[col + ch];
                            }
                        }
                        col += c;
                    }
                }
                row += 1;
            }
        }
    }
    dx
}
