use log::debug;

use crate::error::Result;
use crate::network::Network;
use crate::search::study::TrialResult;
use crate::train::{CallbackAction, Direction, EpochCallback, EpochStats, Metric};

/// Stops a trial whose intermediate metric is worse than the median of the
/// completed trials at the same epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianPruner {
    /// Never prune before this many trials have completed.
    pub n_startup_trials: usize,
    /// Never prune before this epoch.
    pub n_warmup_steps: usize,
}

impl Default for MedianPruner {
    fn default() -> Self {
        MedianPruner { n_startup_trials: 5, n_warmup_steps: 0 }
    }
}

impl MedianPruner {
    /// `step` is the 1-based epoch whose metric is `value`.
    pub fn should_prune(&self, step: usize, value: f64, completed: &[TrialResult], direction: Direction) -> bool {
        if step <= self.n_warmup_steps {
            return false;
        }
        if !value.is_finite() {
            return true;
        }
        let complete: Vec<&TrialResult> = completed.iter().filter(|t| t.is_complete()).collect();
        if complete.len() < self.n_startup_trials {
            return false;
        }
        let mut at_step: Vec<f64> = complete
            .iter()
            .filter_map(|t| t.intermediate.get(step - 1).copied())
            .filter(|v| v.is_finite())
            .collect();
        if at_step.is_empty() {
            return false;
        }
        at_step.sort_by(f64::total_cmp);
        let mid = at_step.len() / 2;
        let median = if at_step.len() % 2 == 0 { (at_step[mid - 1] + at_step[mid]) / 2.0 } else { at_step[mid] };
        direction.improves(median, value, 0.0)
    }
}

/// Reports the monitored metric to a [`MedianPruner`] after every epoch and
/// stops training when the pruner says so.
pub struct PruningCallback<'a> {
    pruner: MedianPruner,
    completed: &'a [TrialResult],
    monitor: Metric,
    intermediate: Vec<f64>,
    pruned: bool,
}

impl<'a> PruningCallback<'a> {
    pub fn new(pruner: MedianPruner, completed: &'a [TrialResult], monitor: Metric) -> Self {
        PruningCallback { pruner, completed, monitor, intermediate: Vec::new(), pruned: false }
    }

    pub fn intermediate(&self) -> &[f64] {
        &self.intermediate
    }

    pub fn pruned(&self) -> bool {
        self.pruned
    }
}

impl EpochCallback for PruningCallback<'_> {
    fn on_epoch_end(&mut self, stats: &EpochStats, _network: &Network) -> Result<CallbackAction> {
        let Some(value) = self.monitor.value(stats) else {
            return Ok(CallbackAction::Continue);
        };
        if value.is_finite() {
            self.intermediate.push(value);
        }
        if self.pruner.should_prune(stats.epoch, value, self.completed, self.monitor.direction()) {
            debug!("pruning at epoch {} with {} {value:.5}", stats.epoch, self.monitor);
            self.pruned = true;
            return Ok(CallbackAction::Stop);
        }
        Ok(CallbackAction::Continue)
    }
}
