use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::train::epoch_stats::EpochStats;
use crate::train::metrics::Metric;

/// Per-epoch metrics of one fit. Validation series are present only when
/// the fit had validation data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub f1: Vec<f64>,
    pub val_loss: Option<Vec<f64>>,
    pub val_accuracy: Option<Vec<f64>>,
    pub val_f1: Option<Vec<f64>>,
}

fn push_opt(series: &mut Option<Vec<f64>>, value: Option<f64>) {
    if let Some(v) = value {
        series.get_or_insert_with(Vec::new).push(v);
    }
}

impl TrainingHistory {
    pub fn push(&mut self, stats: &EpochStats) {
        self.loss.push(stats.train_loss);
        self.accuracy.push(stats.train_accuracy);
        self.f1.push(stats.train_f1);
        push_opt(&mut self.val_loss, stats.val_loss);
        push_opt(&mut self.val_accuracy, stats.val_accuracy);
        push_opt(&mut self.val_f1, stats.val_f1);
    }

    /// Completed epochs.
    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    pub fn has_validation(&self) -> bool {
        self.val_loss.is_some()
    }

    /// Per-epoch values of `metric`, if recorded.
    pub fn series(&self, metric: Metric) -> Option<&[f64]> {
        match metric {
            Metric::Loss => Some(&self.loss),
            Metric::Accuracy => Some(&self.accuracy),
            Metric::F1 => Some(&self.f1),
            Metric::ValLoss => self.val_loss.as_deref(),
            Metric::ValAccuracy => self.val_accuracy.as_deref(),
            Metric::ValF1 => self.val_f1.as_deref(),
        }
    }

    /// Value of `metric` after the last completed epoch.
    pub fn final_value(&self, metric: Metric) -> Option<f64> {
        self.series(metric).and_then(|s| s.last().copied())
    }

    /// Writes `{prefix}_acc`, `{prefix}_loss`, `{prefix}_f1` and, with
    /// validation, `{prefix}_val_*` into `dir`, one number per line.
    pub fn write_series(&self, dir: &Path, prefix: &str) -> Result<()> {
        write_column(&dir.join(format!("{prefix}_acc")), &self.accuracy)?;
        write_column(&dir.join(format!("{prefix}_loss")), &self.loss)?;
        write_column(&dir.join(format!("{prefix}_f1")), &self.f1)?;
        for (suffix, series) in [("val_acc", &self.val_accuracy), ("val_loss", &self.val_loss), ("val_f1", &self.val_f1)] {
            if let Some(values) = series {
                write_column(&dir.join(format!("{prefix}_{suffix}")), values)?;
            }
        }
        Ok(())
    }

    /// Reads series written by [`write_series`](Self::write_series). The
    /// training series are required; validation series are optional.
    pub fn read_series(dir: &Path, prefix: &str) -> Result<TrainingHistory> {
        let optional = |suffix: &str| -> Result<Option<Vec<f64>>> {
            let path = dir.join(format!("{prefix}_{suffix}"));
            if path.exists() { read_column(&path).map(Some) } else { Ok(None) }
        };
        Ok(TrainingHistory {
            accuracy: read_column(&dir.join(format!("{prefix}_acc")))?,
            loss: read_column(&dir.join(format!("{prefix}_loss")))?,
            f1: read_column(&dir.join(format!("{prefix}_f1")))?,
            val_accuracy: optional("val_acc")?,
            val_loss: optional("val_loss")?,
            val_f1: optional("val_f1")?,
        })
    }
}

fn write_column(path: &Path, values: &[f64]) -> Result<()> {
    let text: String = values.iter().map(|v| format!("{v}\n")).collect();
    std::fs::write(path, text)?;
    Ok(())
}

fn read_column(path: &Path) -> Result<Vec<f64>> {
    std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            l.parse::<f64>()
                .map_err(|e| Error::config(format!("{}: bad value '{l}': {e}", path.display())))
        })
        .collect()
}
