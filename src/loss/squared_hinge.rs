use ndarray::{Array2, Axis, Zip};

/// Squared hinge loss on softmax probabilities.
///
/// Targets are mapped from {0, 1} to {-1, 1}; the per-sample loss is the
/// class mean of `max(1 - t * p, 0)^2`.
pub struct SquaredHingeLoss;

impl SquaredHingeLoss {
    pub fn loss(predicted: &Array2<f32>, expected: &Array2<f32>) -> f64 {
        let n = predicted.nrows().max(1) as f64;
        let k = predicted.ncols().max(1) as f64;
        let mut total = 0.0f64;
        Zip::from(predicted).and(expected).for_each(|&p, &e| {
            let t = 2.0 * e as f64 - 1.0;
            let m = (1.0 - t * p as f64).max(0.0);
            total += m * m;
        });
        total / (n * k)
    }

    /// Gradient w.r.t. the pre-softmax logits. The hinge gradient with
    /// respect to the probabilities is pushed through the softmax Jacobian
    /// here, since the output layer passes gradients through unchanged.
    pub fn derivative(predicted: &Array2<f32>, expected: &Array2<f32>) -> Array2<f32> {
        let n = predicted.nrows().max(1) as f32;
        let k = predicted.ncols().max(1) as f32;

        let mut dp = Array2::<f32>::zeros(predicted.dim());
        Zip::from(&mut dp).and(predicted).and(expected).for_each(|g, &p, &e| {
            let t = 2.0 * e - 1.0;
            let m = (1.0 - t * p).max(0.0);
            *g = -2.0 * m * t / (k * n);
        });

        // dz_j = p_j * (dp_j - sum_k dp_k p_k)
        let dot = (&dp * predicted).sum_axis(Axis(1)).insert_axis(Axis(1));
        (dp - &dot) * predicted
    }
}
