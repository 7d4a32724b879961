use ndarray::{Array2, Zip};

/// Categorical cross-entropy loss for use with a Softmax output layer.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// Mean over the batch of `-sum(expected[i] * log(predicted[i] + eps))`.
    ///
    /// `predicted` holds softmax probabilities (N, classes), `expected` the
    /// one-hot targets of the same shape.
    pub fn loss(predicted: &Array2<f32>, expected: &Array2<f32>) -> f64 {
        let n = predicted.nrows().max(1) as f64;
        let mut total = 0.0f64;
        Zip::from(predicted).and(expected).for_each(|&p, &e| {
            total -= e as f64 * (p as f64 + EPS).ln();
        });
        total / n
    }

    /// Gradient of the combined Softmax + cross-entropy w.r.t. the pre-softmax
    /// logits, averaged over the batch:
    ///   dL/dz_i = (predicted[i] - expected[i]) / N
    ///
    /// The Softmax layer's own derivative step is the identity, so the
    /// combined gradient is not applied twice.
    pub fn derivative(predicted: &Array2<f32>, expected: &Array2<f32>) -> Array2<f32> {
        let n = predicted.nrows().max(1) as f32;
        (predicted - expected) / n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn confident_correct_prediction_has_low_loss() {
        let y = array![[1.0f32, 0.0], [0.0, 1.0]];
        let good = array![[0.99f32, 0.01], [0.02, 0.98]];
        let bad = array![[0.2f32, 0.8], [0.7, 0.3]];
        assert!(CrossEntropyLoss::loss(&good, &y) < 0.05);
        assert!(CrossEntropyLoss::loss(&bad, &y) > 1.0);
    }

    #[test]
    fn uniform_prediction_costs_ln_two() {
        let y = array![[1.0f32, 0.0]];
        let p = array![[0.5f32, 0.5]];
        assert_abs_diff_eq!(CrossEntropyLoss::loss(&p, &y), std::f64::consts::LN_2, epsilon = 1e-9);
        assert_eq!(CrossEntropyLoss::derivative(&p, &y), array![[-0.5f32, 0.5]]);
    }
}
