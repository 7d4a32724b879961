use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::TARGET_INDEX;
use crate::error::{Error, Result};
use crate::network::argmax_rows;
use crate::train::epoch_stats::EpochStats;

/// Whether smaller or larger values of a metric are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    /// True when `candidate` beats `incumbent` by more than `min_delta`.
    pub fn improves(self, candidate: f64, incumbent: f64, min_delta: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent - min_delta,
            Direction::Maximize => candidate > incumbent + min_delta,
        }
    }

    pub fn best_of(self, a: f64, b: f64) -> f64 {
        match self {
            Direction::Minimize => a.min(b),
            Direction::Maximize => a.max(b),
        }
    }
}

/// A per-epoch quantity that can be monitored by callbacks or optimized by
/// the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Loss,
    Accuracy,
    F1,
    ValLoss,
    ValAccuracy,
    ValF1,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Loss        => "loss",
            Metric::Accuracy    => "accuracy",
            Metric::F1          => "f1",
            Metric::ValLoss     => "val_loss",
            Metric::ValAccuracy => "val_accuracy",
            Metric::ValF1       => "val_f1",
        }
    }

    pub fn from_name(name: &str) -> Result<Metric> {
        match name {
            "loss"         => Ok(Metric::Loss),
            "accuracy"     => Ok(Metric::Accuracy),
            "f1"           => Ok(Metric::F1),
            "val_loss"     => Ok(Metric::ValLoss),
            "val_accuracy" => Ok(Metric::ValAccuracy),
            "val_f1"       => Ok(Metric::ValF1),
            other => Err(Error::config(format!("unknown metric '{other}'"))),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Metric::Loss | Metric::ValLoss => Direction::Minimize,
            _ => Direction::Maximize,
        }
    }

    pub fn needs_validation(&self) -> bool {
        matches!(self, Metric::ValLoss | Metric::ValAccuracy | Metric::ValF1)
    }

    /// Reads the metric from one epoch's statistics. Validation metrics are
    /// `None` when the fit had no validation data.
    pub fn value(&self, stats: &EpochStats) -> Option<f64> {
        match self {
            Metric::Loss        => Some(stats.train_loss),
            Metric::Accuracy    => Some(stats.train_accuracy),
            Metric::F1          => Some(stats.train_f1),
            Metric::ValLoss     => stats.val_loss,
            Metric::ValAccuracy => stats.val_accuracy,
            Metric::ValF1       => stats.val_f1,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fraction of rows whose argmax matches the one-hot label.
pub fn accuracy(predicted: &Array2<f32>, expected: &Array2<f32>) -> f64 {
    class_accuracy(&argmax_rows(predicted), &argmax_rows(expected))
}

/// Binary F1 of `predicted` against `expected` with the target class as
/// the positive class.
pub fn f1_score(predicted: &Array2<f32>, expected: &Array2<f32>) -> f64 {
    class_f1(&argmax_rows(predicted), &argmax_rows(expected))
}

pub(crate) fn class_accuracy(predicted: &[usize], expected: &[usize]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let correct = predicted.iter().zip(expected).filter(|(p, e)| p == e).count();
    correct as f64 / expected.len() as f64
}

pub(crate) fn class_f1(predicted: &[usize], expected: &[usize]) -> f64 {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&p, &e) in predicted.iter().zip(expected) {
        match (p == TARGET_INDEX, e == TARGET_INDEX) {
            (true, true)  => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            _ => {}
        }
    }
    let denom = 2 * tp + fp + fn_;
    if denom == 0 {
        0.0
    } else {
        2.0 * tp as f64 / denom as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn accuracy_counts_argmax_matches() {
        let p = array![[0.9f32, 0.1], [0.2, 0.8], [0.6, 0.4], [0.3, 0.7]];
        let y = array![[1.0f32, 0.0], [0.0, 1.0], [0.0, 1.0], [1.0, 0.0]];
        assert_abs_diff_eq!(accuracy(&p, &y), 0.5);
    }

    #[test]
    fn f1_uses_target_as_positive() {
        // predicted: T O T O T, expected: T T O O T -> tp 2, fp 1, fn 1
        let f1 = class_f1(&[0, 1, 0, 1, 0], &[0, 0, 1, 1, 0]);
        assert_abs_diff_eq!(f1, 4.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn f1_without_positives_is_zero() {
        assert_eq!(class_f1(&[1, 1], &[1, 1]), 0.0);
    }

    #[test]
    fn metric_names_round_trip_and_polarity() {
        for m in [Metric::Loss, Metric::Accuracy, Metric::F1, Metric::ValLoss, Metric::ValAccuracy, Metric::ValF1] {
            assert_eq!(Metric::from_name(m.name()).unwrap(), m);
        }
        assert_eq!(Metric::ValLoss.direction(), Direction::Minimize);
        assert_eq!(Metric::Accuracy.direction(), Direction::Maximize);
        assert!(Metric::from_name("auc").is_err());
    }

    #[test]
    fn improvement_respects_min_delta() {
        assert!(Direction::Minimize.improves(0.5, 0.6, 0.05));
        assert!(!Direction::Minimize.improves(0.58, 0.6, 0.05));
        assert!(Direction::Maximize.improves(0.7, 0.6, 0.0));
    }
}
