use ndarray::{Array1, Array2, Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::tensor::ParamRef;

const MOMENTUM: f32 = 0.99;
const EPSILON: f32 = 1e-3;

/// Per-channel batch normalization over (N, H, W) of a channels-last batch.
///
/// Training mode normalizes with the batch statistics and updates the moving
/// averages; inference mode uses the moving averages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    pub channels: usize,
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub moving_mean: Array1<f32>,
    pub moving_var: Array1<f32>,

    #[serde(skip)]
    x_hat: Array2<f32>,
    #[serde(skip)]
    inv_std: Array1<f32>,
    #[serde(skip)]
    d_gamma: Array1<f32>,
    #[serde(skip)]
    d_beta: Array1<f32>,
}

impl BatchNorm {
    pub fn new(channels: usize) -> BatchNorm {
        BatchNorm {
            channels,
            gamma: Array1::ones(channels),
            beta: Array1::zeros(channels),
            moving_mean: Array1::zeros(channels),
            moving_var: Array1::ones(channels),
            x_hat: Array2::zeros((0, channels)),
            inv_std: Array1::zeros(channels),
            d_gamma: Array1::zeros(channels),
            d_beta: Array1::zeros(channels),
        }
    }

    pub fn param_count(&self) -> usize {
        // gamma and beta are trained; the moving statistics are not
        4 * self.channels
    }

    pub fn forward(&mut self, x: Array4<f32>, training: bool) -> Result<Array4<f32>> {
        let dim = x.dim();
        if dim.3 != self.channels {
            return Err(Error::shape(format!(
                "batch norm expects {} channels, got {}",
                self.channels, dim.3
            )));
        }
        let rows = x
            .into_shape((dim.0 * dim.1 * dim.2, dim.3))
            .map_err(|e| Error::training(format!("batch norm reshape: {e}")))?;

        let (mean, var) = if training {
            let mean = rows.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(self.channels));
            let var = rows.var_axis(Axis(0), 0.0);
            self.moving_mean = &self.moving_mean * MOMENTUM + &mean * (1.0 - MOMENTUM);
            self.moving_var = &self.moving_var * MOMENTUM + &var * (1.0 - MOMENTUM);
            (mean, var)
        } else {
            (self.moving_mean.clone(), self.moving_var.clone())
        };

        let inv_std = var.mapv(|v| 1.0 / (v + EPSILON).sqrt());
        let x_hat = (rows - &mean) * &inv_std;
        let y = &x_hat * &self.gamma + &self.beta;

        self.x_hat = x_hat;
        self.inv_std = inv_std;
        y.into_shape(dim)
            .map_err(|e| Error::training(format!("batch norm reshape: {e}")))
    }

    pub fn backward(&mut self, grad: Array4<f32>) -> Result<Array4<f32>> {
        let dim = grad.dim();
        let dy = grad
            .into_shape((dim.0 * dim.1 * dim.2, dim.3))
            .map_err(|e| Error::training(format!("batch norm reshape: {e}")))?;
        if dy.dim() != self.x_hat.dim() {
            return Err(Error::shape("batch norm gradient does not match the last forward pass"));
        }
        let m = dy.nrows() as f32;

        self.d_gamma = (&dy * &self.x_hat).sum_axis(Axis(0));
        self.d_beta = dy.sum_axis(Axis(0));

        let dx_hat = &dy * &self.gamma;
        let sum_dx_hat = dx_hat.sum_axis(Axis(0));
        let sum_dx_hat_x_hat = (&dx_hat * &self.x_hat).sum_axis(Axis(0));
        let dx = (dx_hat * m - &sum_dx_hat - &self.x_hat * &sum_dx_hat_x_hat) * &self.inv_std / m;

        dx.into_shape(dim)
            .map_err(|e| Error::training(format!("batch norm reshape: {e}")))
    }

    pub fn params(&mut self) -> Vec<ParamRef<'_>> {
        vec![
            ParamRef { value: self.gamma.view_mut().into_dyn(), grad: self.d_gamma.view().into_dyn() },
            ParamRef { value: self.beta.view_mut().into_dyn(), grad: self.d_beta.view().into_dyn() },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn batch() -> Array4<f32> {
        Array4::from_shape_fn((3, 2, 2, 2), |(n, i, j, c)| (n * 7 + i * 3 + j) as f32 * (c + 1) as f32)
    }

    #[test]
    fn training_output_is_standardized_per_channel() {
        let mut bn = BatchNorm::new(2);
        let y = bn.forward(batch(), true).unwrap();
        for c in 0..2 {
            let ch = y.index_axis(Axis(3), c);
            assert_abs_diff_eq!(ch.mean().unwrap(), 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(ch.var(0.0), 1.0, epsilon = 1e-2);
        }
        // moving averages moved away from their initial values
        assert!(bn.moving_mean[0] > 0.0);
    }

    #[test]
    fn input_gradient_matches_finite_difference() {
        let mut bn = BatchNorm::new(2);
        bn.gamma[1] = 1.5;
        let x = batch();
        // L = sum(y * w) with a fixed non-uniform weighting
        let w = Array4::from_shape_fn(x.dim(), |(n, i, j, c)| ((n + i + 2 * j + c) % 3) as f32 - 1.0);

        let _ = bn.forward(x.clone(), true).unwrap();
        let dx = bn.backward(w.clone()).unwrap();

        let h = 1e-2f32;
        let mut xp = x.clone();
        xp[[1, 0, 1, 1]] += h;
        let mut xm = x.clone();
        xm[[1, 0, 1, 1]] -= h;
        let lp = (BatchNorm { gamma: bn.gamma.clone(), ..BatchNorm::new(2) }.forward(xp, true).unwrap() * &w).sum();
        let lm = (BatchNorm { gamma: bn.gamma.clone(), ..BatchNorm::new(2) }.forward(xm, true).unwrap() * &w).sum();
        assert_abs_diff_eq!(dx[[1, 0, 1, 1]], (lp - lm) / (2.0 * h), epsilon = 1e-2);
    }

    #[test]
    fn inference_uses_moving_statistics() {
        let mut bn = BatchNorm::new(1);
        let x = Array4::from_elem((2, 1, 1, 1), 4.0f32);
        let y = bn.forward(x, false).unwrap();
        // mean 0, var 1 -> y = 4 / sqrt(1 + eps)
        assert_abs_diff_eq!(y[[0, 0, 0, 0]], 4.0 / (1.0f32 + EPSILON).sqrt(), epsilon = 1e-6);
    }
}
