use ndarray::{Array4, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Local response normalization across channels (AlexNet constants by
/// default):
///
/// `y_d = x_d / (bias + alpha * sum_{|i - d| <= radius} x_i^2) ^ beta`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalResponseNorm {
    pub depth_radius: usize,
    pub bias: f32,
    pub alpha: f32,
    pub beta: f32,

    #[serde(skip)]
    input: Array4<f32>,
    #[serde(skip)]
    scale: Array4<f32>,
}

impl Default for LocalResponseNorm {
    fn default() -> Self {
        LocalResponseNorm::new(5, 1.0, 1e-4, 0.75)
    }
}

impl LocalResponseNorm {
    pub fn new(depth_radius: usize, bias: f32, alpha: f32, beta: f32) -> Self {
        LocalResponseNorm {
            depth_radius,
            bias,
            alpha,
            beta,
            input: Array4::zeros((0, 0, 0, 0)),
            scale: Array4::zeros((0, 0, 0, 0)),
        }
    }

    fn channel_window(&self, d: usize, channels: usize) -> std::ops::Range<usize> {
        d.saturating_sub(self.depth_radius)..(d + self.depth_radius + 1).min(channels)
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let channels = x.dim().3;
        let mut scale = Array4::<f32>::zeros(x.dim());

        Zip::from(scale.lanes_mut(Axis(3)))
            .and(x.lanes(Axis(3)))
            .for_each(|mut s, xs| {
                for d in 0..channels {
                    let sq: f32 = self.channel_window(d, channels).map(|i| xs[i] * xs[i]).sum();
                    s[d] = self.bias + self.alpha * sq;
                }
            });

        let mut y = x.clone();
        Zip::from(&mut y).and(&scale).for_each(|v, &s| *v *= s.powf(-self.beta));
        self.input = x;
        self.scale = scale;
        Ok(y)
    }

    pub fn backward(&mut self, grad: Array4<f32>) -> Result<Array4<f32>> {
        if grad.dim() != self.input.dim() {
            return Err(Error::shape("LRN gradient does not match the last forward pass"));
        }
        let channels = grad.dim().3;
        let mut dx = Array4::<f32>::zeros(grad.dim());
        let coeff = 2.0 * self.alpha * self.beta;

        Zip::from(dx.lanes_mut(Axis(3)))
            .and(grad.lanes(Axis(3)))
            .and(self.input.lanes(Axis(3)))
            .and(self.scale.lanes(Axis(3)))
            .for_each(|mut dxs, gs, xs, ss| {
                for j in 0..channels {
                    let cross: f32 = self
                        .channel_window(j, channels)
                        .map(|i| gs[i] * xs[i] * ss[i].powf(-self.beta - 1.0))
                        .sum();
                    dxs[j] = gs[j] * ss[j].powf(-self.beta) - coeff * xs[j] * cross;
                }
            });
        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn small_inputs_pass_nearly_unchanged() {
        let mut lrn = LocalResponseNorm::default();
        let x = Array4::from_elem((1, 2, 2, 8), 0.5f32);
        let y = lrn.forward(x).unwrap();
        assert_abs_diff_eq!(y[[0, 0, 0, 0]], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        // Exaggerated alpha so the cross-channel term matters.
        let mut lrn = LocalResponseNorm::new(1, 1.0, 0.5, 0.75);
        let x = Array4::from_shape_fn((1, 1, 2, 4), |(_, _, j, c)| 0.3 + 0.2 * c as f32 - 0.1 * j as f32);
        let w = Array4::from_shape_fn(x.dim(), |(_, _, j, c)| 1.0 + (c + j) as f32 * 0.5);

        let _ = lrn.forward(x.clone()).unwrap();
        let dx = lrn.backward(w.clone()).unwrap();

        let h = 1e-3f32;
        for c in 0..4 {
            let mut xp = x.clone();
            xp[[0, 0, 1, c]] += h;
            let mut xm = x.clone();
            xm[[0, 0, 1, c]] -= h;
            let lp = (lrn.forward(xp).unwrap() * &w).sum();
            let lm = (lrn.forward(xm).unwrap() * &w).sum();
            assert_abs_diff_eq!(dx[[0, 0, 1, c]], (lp - lm) / (2.0 * h), epsilon = 5e-3);
        }
    }
}
