use std::sync::atomic::Ordering;
use std::time::Instant;

use log::debug;
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::PreparedData;
use crate::error::{Error, Result};
use crate::math::{seeded_rng, RngStream};
use crate::network::{argmax_rows, Network};
use crate::train::callbacks::{CallbackAction, EpochCallback};
use crate::train::epoch_stats::EpochStats;
use crate::train::history::TrainingHistory;
use crate::train::metrics::{accuracy, class_accuracy, class_f1, f1_score};
use crate::train::train_config::TrainConfig;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `network` for `config.epochs` epochs and returns the history of
/// every completed epoch.
///
/// Shuffling and dropout draw from streams seeded by `config.seed`, so two
/// runs with the same seed, network and data follow the same trajectory.
///
/// # Early termination
/// The loop breaks early if:
/// - a callback returns [`CallbackAction::Stop`],
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
///
/// # Errors
/// Empty training data, mismatched validation shapes and a non-finite
/// training loss are reported as errors.
pub fn train_loop(
    network: &mut Network,
    train: &PreparedData,
    validation: Option<&PreparedData>,
    config: &TrainConfig,
    callbacks: &mut [&mut dyn EpochCallback],
) -> Result<TrainingHistory> {
    config.validate()?;
    if train.is_empty() {
        return Err(Error::training("training set is empty"));
    }
    let validation = validation.filter(|v| !v.is_empty());

    let mut shuffle_rng = seeded_rng(config.seed, RngStream::Shuffle);
    let mut dropout_rng = seeded_rng(config.seed, RngStream::Dropout);
    let mut history = TrainingHistory::default();

    for epoch in 1..=config.epochs {
        // Check stop flag at the top of each epoch.
        if stop_requested(config) {
            break;
        }

        let t_start = Instant::now();

        // ── One full pass over the training data ───────────────────────────
        let (train_loss, train_accuracy, train_f1) =
            run_one_epoch(network, train, config.batch_size, &mut shuffle_rng, &mut dropout_rng)?;
        if !train_loss.is_finite() {
            return Err(Error::training(format!("training loss became {train_loss} at epoch {epoch}")));
        }

        // ── Validation ────────────────────────────────────────────────────
        let (val_loss, val_accuracy, val_f1) = match validation {
            Some(v) => {
                let (loss, p) = network.evaluate(&v.x, &v.y)?;
                (Some(loss), Some(accuracy(&p, &v.y)), Some(f1_score(&p, &v.y)))
            }
            None => (None, None, None),
        };

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            train_accuracy,
            train_f1,
            val_loss,
            val_accuracy,
            val_f1,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        debug!(
            "epoch {epoch}/{}: loss {train_loss:.5} acc {train_accuracy:.4} f1 {train_f1:.4} val_loss {} val_acc {} ({} ms)",
            config.epochs,
            fmt_opt(val_loss),
            fmt_opt(val_accuracy),
            stats.elapsed_ms
        );
        history.push(&stats);

        // ── Callbacks and progress ────────────────────────────────────────
        let mut stop = false;
        for cb in callbacks.iter_mut() {
            if cb.on_epoch_end(&stats, network)? == CallbackAction::Stop {
                stop = true;
            }
        }

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                break;
            }
        }

        if stop || stop_requested(config) {
            break;
        }
    }

    Ok(history)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.5}"))
}

/// Runs one full epoch of mini-batch SGD over the training data.
/// Returns the sample-weighted mean loss and the accuracy and F1 of the
/// training-mode predictions.
fn run_one_epoch<R: Rng>(
    network: &mut Network,
    train: &PreparedData,
    batch_size: usize,
    shuffle_rng: &mut R,
    dropout_rng: &mut R,
) -> Result<(f64, f64, f64)> {
    let n = train.len();
    let mut total_loss = 0.0;
    let mut predicted = Vec::with_capacity(n);
    let mut expected = Vec::with_capacity(n);

    // Shuffle sample order each epoch.
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(shuffle_rng);

    for batch in indices.chunks(batch_size) {
        let x = train.x.select(Axis(0), batch);
        let y: Array2<f32> = train.y.select(Axis(0), batch);
        let (loss, p) = network.train_batch(x, &y, dropout_rng)?;
        total_loss += loss * batch.len() as f64;
        predicted.extend(argmax_rows(&p));
        expected.extend(argmax_rows(&y));
    }

    Ok((total_loss / n as f64, class_accuracy(&predicted, &expected), class_f1(&predicted, &expected)))
}
