use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::HyperparameterRecord;
use crate::search::sampler::Sampler;
use crate::search::space::{ParamValue, SearchSpace};
use crate::train::{Direction, Metric};

/// How a trial ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrialState {
    Complete,
    Pruned,
    Failed { reason: String },
}

/// One sampled configuration and its outcome. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// 0-based position in the study.
    pub number: usize,
    /// `None` when the sampled values did not form a valid record.
    pub params: Option<HyperparameterRecord>,
    /// The raw sampled values, keyed by parameter name.
    pub values: BTreeMap<String, ParamValue>,
    /// Final metric for complete trials, last reported metric for pruned
    /// ones.
    pub value: Option<f64>,
    /// Metric after each epoch.
    pub intermediate: Vec<f64>,
    pub duration: Duration,
    pub state: TrialState,
}

impl TrialResult {
    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete && self.value.is_some_and(f64::is_finite)
    }
}

/// What an objective reports back for one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub value: f64,
    pub intermediate: Vec<f64>,
    pub pruned: bool,
}

/// Ordered trial history of one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub metric: Metric,
    trials: Vec<TrialResult>,
}

impl Study {
    pub fn new(metric: Metric) -> Self {
        Study { metric, trials: Vec::new() }
    }

    pub fn direction(&self) -> Direction {
        self.metric.direction()
    }

    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    /// Best complete trial; ties go to the lowest trial number.
    pub fn best_trial(&self) -> Option<&TrialResult> {
        let direction = self.direction();
        let mut best: Option<(&TrialResult, f64)> = None;
        for t in self.trials.iter().filter(|t| t.is_complete()) {
            let Some(v) = t.value else { continue };
            match best {
                Some((_, b)) if !direction.improves(v, b, 0.0) => {}
                _ => best = Some((t, v)),
            }
        }
        best.map(|(t, _)| t)
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.value)
    }

    /// Best value over trials `0..=k` for every `k`; `None` until the first
    /// complete trial. Never regresses.
    pub fn best_value_history(&self) -> Vec<Option<f64>> {
        let direction = self.direction();
        let mut best: Option<f64> = None;
        self.trials
            .iter()
            .map(|t| {
                if t.is_complete() {
                    if let Some(v) = t.value {
                        best = Some(best.map_or(v, |b| direction.best_of(b, v)));
                    }
                }
                best
            })
            .collect()
    }

    /// Runs up to `n_trials` trials, one after another. Each trial samples
    /// every parameter of `space`, materializes the record and hands it to
    /// `objective` together with the trials finished so far. Objective
    /// errors mark the trial failed; they never abort the search.
    pub fn optimize<F>(
        &mut self,
        space: &SearchSpace,
        sampler: &mut dyn Sampler,
        n_trials: usize,
        timeout: Option<Duration>,
        mut objective: F,
    ) -> Result<()>
    where
        F: FnMut(&HyperparameterRecord, &[TrialResult]) -> Result<TrialOutcome>,
    {
        space.validate()?;
        let distributions = space.distributions();
        let started = Instant::now();

        for _ in 0..n_trials {
            if timeout.is_some_and(|t| started.elapsed() >= t) {
                info!("search timeout reached after {} trials", self.trials.len());
                break;
            }
            let number = self.trials.len();
            let t_start = Instant::now();

            let values: BTreeMap<String, ParamValue> = distributions
                .iter()
                .map(|(name, dist)| (name.clone(), sampler.sample(name, dist, &self.trials, self.direction())))
                .collect();

            let (params, value, intermediate, state) = match space.build_record(&values) {
                Err(e) => (None, None, Vec::new(), TrialState::Failed { reason: e.to_string() }),
                Ok(record) => match objective(&record, &self.trials) {
                    Err(e) => (Some(record), None, Vec::new(), TrialState::Failed { reason: e.to_string() }),
                    Ok(mut out) => {
                        // Non-finite values do not survive JSON; keep only the finite curve.
                        out.intermediate.retain(|v| v.is_finite());
                        if !out.value.is_finite() {
                            let reason = format!("objective returned {}", out.value);
                            (Some(record), None, out.intermediate, TrialState::Failed { reason })
                        } else if out.pruned {
                            (Some(record), Some(out.value), out.intermediate, TrialState::Pruned)
                        } else {
                            (Some(record), Some(out.value), out.intermediate, TrialState::Complete)
                        }
                    }
                },
            };

            let trial = TrialResult {
                number,
                params,
                values,
                value,
                intermediate,
                duration: t_start.elapsed(),
                state,
            };
            match &trial.state {
                TrialState::Failed { reason } => warn!("trial {number} failed: {reason}"),
                state => {
                    let shown = trial.value.map_or_else(|| "-".to_string(), |v| format!("{v:.5}"));
                    info!("trial {number} {state:?} with {} {shown} in {:.1?}", self.metric, trial.duration);
                }
            }
            self.trials.push(trial);
            if let Some(best) = self.best_trial() {
                info!("best is trial {} with {} {:.5}", best.number, self.metric, best.value.unwrap_or(f64::NAN));
            }
        }
        Ok(())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Study> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    #[cfg(test)]
    pub(crate) fn push_for_test(&mut self, trial: TrialResult) {
        self.trials.push(trial);
    }
}
