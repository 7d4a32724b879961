use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::loss::{CrossEntropyLoss, SquaredHingeLoss};

/// Selects which loss function the training loop uses. Both pair with the
/// Softmax output layer.
///
/// - `CategoricalCrossentropy`: gradient is the combined Softmax+CE gradient
///   (predicted - expected), matching `CrossEntropyLoss::derivative()`.
/// - `SquaredHinge`: hinge on {-1, 1} targets; its gradient carries the
///   softmax Jacobian itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    CategoricalCrossentropy,
    SquaredHinge,
}

impl LossType {
    pub const ALL: [LossType; 2] = [LossType::CategoricalCrossentropy, LossType::SquaredHinge];

    pub fn name(&self) -> &'static str {
        match self {
            LossType::CategoricalCrossentropy => "categorical_crossentropy",
            LossType::SquaredHinge => "squared_hinge",
        }
    }

    /// Mean loss over the batch.
    pub fn loss(&self, predicted: &Array2<f32>, expected: &Array2<f32>) -> f64 {
        match self {
            LossType::CategoricalCrossentropy => CrossEntropyLoss::loss(predicted, expected),
            LossType::SquaredHinge => SquaredHingeLoss::loss(predicted, expected),
        }
    }

    /// Gradient of the mean batch loss w.r.t. the output layer's logits.
    pub fn derivative(&self, predicted: &Array2<f32>, expected: &Array2<f32>) -> Array2<f32> {
        match self {
            LossType::CategoricalCrossentropy => CrossEntropyLoss::derivative(predicted, expected),
            LossType::SquaredHinge => SquaredHingeLoss::derivative(predicted, expected),
        }
    }
}
