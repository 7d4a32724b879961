use ndarray::{Array2, Axis};
use serde::{Serialize, Deserialize};

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    Relu,
    Sigmoid,
    Tanh,
    Softplus,
    Softsign,
    Selu,
    /// Exponential linear unit with alpha = 1.
    Elu,
    Linear,
    /// Softmax is a vector-valued activation; it is applied row-wise by
    /// [`ActivationFunction::apply_rows`]. The element-wise `function()` and
    /// `derivative()` methods are not used for this variant.
    Softmax,
}

impl ActivationFunction {
    /// Activations the hyperparameter search may pick for hidden layers.
    pub const SEARCHABLE: [ActivationFunction; 7] = [
        ActivationFunction::Relu,
        ActivationFunction::Sigmoid,
        ActivationFunction::Tanh,
        ActivationFunction::Softplus,
        ActivationFunction::Softsign,
        ActivationFunction::Selu,
        ActivationFunction::Elu,
    ];

    /// Element-wise activation. `Softmax` falls through as identity; the
    /// full-row softmax happens in `apply_rows`.
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Relu => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Softplus => {
                // log(1 + e^x) without overflow for large x
                if x > 20.0 { x } else { x.exp().ln_1p() }
            }
            ActivationFunction::Softsign => x / (1.0 + x.abs()),
            ActivationFunction::Selu => {
                if x > 0.0 { SELU_SCALE * x } else { SELU_SCALE * SELU_ALPHA * (x.exp() - 1.0) }
            }
            ActivationFunction::Elu => if x > 0.0 { x } else { x.exp() - 1.0 },
            ActivationFunction::Linear | ActivationFunction::Softmax => x,
        }
    }

    /// Element-wise derivative with respect to the pre-activation `x`.
    ///
    /// For `Softmax` the loss hands the layer a gradient that is already
    /// expressed with respect to the logits, so `1.0` passes it through
    /// without applying the Jacobian twice.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::Relu => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Softplus => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::Softsign => {
                let d = 1.0 + x.abs();
                1.0 / (d * d)
            }
            ActivationFunction::Selu => {
                if x > 0.0 { SELU_SCALE } else { SELU_SCALE * SELU_ALPHA * x.exp() }
            }
            ActivationFunction::Elu => if x > 0.0 { 1.0 } else { x.exp() },
            ActivationFunction::Linear | ActivationFunction::Softmax => 1.0,
        }
    }

    /// Applies the activation to a batch of rows (N, features).
    pub fn apply_rows(&self, z: &Array2<f32>) -> Array2<f32> {
        match self {
            ActivationFunction::Softmax => softmax_rows(z),
            _ => z.mapv(|x| self.function(x)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::Relu => "relu",
            ActivationFunction::Sigmoid => "sigmoid",
            ActivationFunction::Tanh => "tanh",
            ActivationFunction::Softplus => "softplus",
            ActivationFunction::Softsign => "softsign",
            ActivationFunction::Selu => "selu",
            ActivationFunction::Elu => "elu",
            ActivationFunction::Linear => "linear",
            ActivationFunction::Softmax => "softmax",
        }
    }

    pub fn from_name(name: &str) -> Option<ActivationFunction> {
        [ActivationFunction::Linear, ActivationFunction::Softmax]
            .into_iter()
            .chain(ActivationFunction::SEARCHABLE)
            .find(|a| a.name() == name)
    }
}

/// Numerically stable row-wise softmax.
pub fn softmax_rows(z: &Array2<f32>) -> Array2<f32> {
    let mut out = z.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}
