use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::layers::ParamRef;

/// Stochastic gradient descent with momentum, inverse-time learning-rate
/// decay and optional Nesterov momentum.
///
/// `lr_t = lr / (1 + decay * iterations)`, `v = momentum * v - lr_t * g`,
/// then `w += v` (plain) or `w += momentum * v - lr_t * g` (Nesterov).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub decay: f64,
    pub nesterov: bool,
    pub iterations: u64,

    #[serde(skip)]
    velocities: Vec<ArrayD<f32>>,
}

impl Sgd {
    pub fn new(learning_rate: f64, momentum: f64, decay: f64, nesterov: bool) -> Sgd {
        Sgd { learning_rate, momentum, decay, nesterov, iterations: 0, velocities: Vec::new() }
    }

    pub fn current_learning_rate(&self) -> f64 {
        self.learning_rate / (1.0 + self.decay * self.iterations as f64)
    }

    /// Applies one update to every parameter. `params` must list the
    /// network's parameters in the same order on every call.
    pub fn step(&mut self, params: Vec<ParamRef<'_>>) {
        let lr = self.current_learning_rate() as f32;
        let momentum = self.momentum as f32;

        if self.velocities.len() != params.len() {
            self.velocities = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
        }

        for (param, velocity) in params.into_iter().zip(self.velocities.iter_mut()) {
            let ParamRef { mut value, grad } = param;
            if velocity.shape() != value.shape() {
                *velocity = ArrayD::zeros(value.raw_dim());
            }
            if self.nesterov {
                Zip::from(&mut value).and(&grad).and(&mut *velocity).for_each(|w, &g, v| {
                    *v = momentum * *v - lr * g;
                    *w += momentum * *v - lr * g;
                });
            } else {
                Zip::from(&mut value).and(&grad).and(&mut *velocity).for_each(|w, &g, v| {
                    *v = momentum * *v - lr * g;
                    *w += *v;
                });
            }
        }
        self.iterations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn step_once(sgd: &mut Sgd, w: &mut Array1<f32>, g: &Array1<f32>) {
        sgd.step(vec![ParamRef { value: w.view_mut().into_dyn(), grad: g.view().into_dyn() }]);
    }

    #[test]
    fn plain_sgd_moves_against_gradient() {
        let mut sgd = Sgd::new(0.1, 0.0, 0.0, false);
        let mut w = array![1.0f32, -1.0];
        step_once(&mut sgd, &mut w, &array![0.5f32, -0.5]);
        assert_abs_diff_eq!(w[0], 0.95, epsilon = 1e-6);
        assert_abs_diff_eq!(w[1], -0.95, epsilon = 1e-6);
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut sgd = Sgd::new(0.1, 0.9, 0.0, false);
        let mut w = array![0.0f32];
        let g = array![1.0f32];
        step_once(&mut sgd, &mut w, &g); // v = -0.1
        step_once(&mut sgd, &mut w, &g); // v = -0.19
        assert_abs_diff_eq!(w[0], -0.29, epsilon = 1e-6);
    }

    #[test]
    fn nesterov_looks_ahead() {
        let mut sgd = Sgd::new(0.1, 0.9, 0.0, true);
        let mut w = array![0.0f32];
        step_once(&mut sgd, &mut w, &array![1.0f32]);
        // v = -0.1, w += 0.9 * -0.1 - 0.1
        assert_abs_diff_eq!(w[0], -0.19, epsilon = 1e-6);
    }

    #[test]
    fn decay_shrinks_learning_rate() {
        let mut sgd = Sgd::new(1.0, 0.0, 0.5, false);
        let mut w = array![0.0f32];
        step_once(&mut sgd, &mut w, &array![0.0f32]);
        step_once(&mut sgd, &mut w, &array![0.0f32]);
        assert_abs_diff_eq!(sgd.current_learning_rate(), 0.5, epsilon = 1e-12);
    }
}
