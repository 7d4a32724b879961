use serde::{Deserialize, Serialize};

/// Per-epoch training statistics emitted by [`fit`](crate::train::fit).
///
/// When a `progress_tx` channel is configured in `TrainConfig`, one
/// `EpochStats` value is sent at the end of every completed epoch. Callbacks
/// receive the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Mean training loss over all samples in this epoch.
    pub train_loss: f64,
    /// Training accuracy in [0, 1], from the training-mode predictions.
    pub train_accuracy: f64,
    /// Training F1 with the target class as positive.
    pub train_f1: f64,
    /// Validation loss, if a validation set was provided.
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    pub val_f1: Option<f64>,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
