use std::path::PathBuf;

use log::{debug, info, warn};

use crate::error::Result;
use crate::network::Network;
use crate::train::epoch_stats::EpochStats;
use crate::train::metrics::Metric;

/// What the training loop should do after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Hook invoked at the end of every epoch.
pub trait EpochCallback {
    fn on_epoch_end(&mut self, stats: &EpochStats, network: &Network) -> Result<CallbackAction>;
}

/// Writes the network to `path` whenever the monitored metric improves.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    pub path: PathBuf,
    pub monitor: Metric,
    best: Option<f64>,
    warned: bool,
}

impl ModelCheckpoint {
    pub fn new(path: impl Into<PathBuf>, monitor: Metric) -> Self {
        ModelCheckpoint { path: path.into(), monitor, best: None, warned: false }
    }

    /// `$HOME/checkpoint.json`, or `checkpoint.json` in the working
    /// directory when `HOME` is unset.
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join("checkpoint.json")
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

impl Default for ModelCheckpoint {
    fn default() -> Self {
        ModelCheckpoint::new(ModelCheckpoint::default_path(), Metric::ValAccuracy)
    }
}

impl EpochCallback for ModelCheckpoint {
    fn on_epoch_end(&mut self, stats: &EpochStats, network: &Network) -> Result<CallbackAction> {
        let Some(value) = self.monitor.value(stats) else {
            if !self.warned {
                warn!("checkpoint monitors {} which is not available; skipping", self.monitor);
                self.warned = true;
            }
            return Ok(CallbackAction::Continue);
        };
        let improved = match self.best {
            None => value.is_finite(),
            Some(best) => self.monitor.direction().improves(value, best, 0.0),
        };
        if improved {
            debug!("epoch {}: {} improved to {value:.5}, saving {}", stats.epoch, self.monitor, self.path.display());
            network.save_json(&self.path)?;
            self.best = Some(value);
        }
        Ok(CallbackAction::Continue)
    }
}

/// Stops training once the monitored metric has not improved by more than
/// `min_delta` for `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    pub monitor: Metric,
    pub patience: usize,
    pub min_delta: f64,
    best: Option<f64>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(monitor: Metric, patience: usize, min_delta: f64) -> Self {
        EarlyStopping { monitor, patience, min_delta, best: None, wait: 0 }
    }
}

impl EpochCallback for EarlyStopping {
    fn on_epoch_end(&mut self, stats: &EpochStats, _network: &Network) -> Result<CallbackAction> {
        let Some(value) = self.monitor.value(stats) else {
            return Ok(CallbackAction::Continue);
        };
        // A non-finite value never becomes the best and never improves on it.
        let improved = value.is_finite()
            && self.best.map_or(true, |best| self.monitor.direction().improves(value, best, self.min_delta));
        if improved {
            self.best = Some(value);
            self.wait = 0;
            return Ok(CallbackAction::Continue);
        }
        self.wait += 1;
        if self.wait >= self.patience {
            info!("early stopping at epoch {}: no {} improvement in {} epochs", stats.epoch, self.monitor, self.wait);
            return Ok(CallbackAction::Stop);
        }
        Ok(CallbackAction::Continue)
    }
}
