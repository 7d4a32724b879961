use std::collections::{BTreeMap, BTreeSet};

use crate::search::space::ParamValue;
use crate::search::study::TrialResult;

/// Numeric parameters with more distinct values than this are grouped into
/// this many equal-count bins.
const MAX_BINS: usize = 8;

/// Share of the objective's variance explained by each parameter.
///
/// Completed trials are grouped by the parameter's value (numeric values
/// into rank bins). The variance of the group means, weighted by group size,
/// divided by the total variance is that parameter's raw importance. Raw
/// scores are normalized to sum to one and returned highest first.
pub fn param_importances(trials: &[TrialResult]) -> Vec<(String, f64)> {
    let complete: Vec<&TrialResult> = trials.iter().filter(|t| t.is_complete()).collect();
    let objective: Vec<f64> = complete.iter().filter_map(|t| t.value).collect();
    if objective.len() < 2 {
        return Vec::new();
    }
    let mean = objective.iter().sum::<f64>() / objective.len() as f64;
    let total_var = objective.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / objective.len() as f64;

    let names: BTreeSet<&String> = complete.iter().flat_map(|t| t.values.keys()).collect();
    let mut scores: Vec<(String, f64)> = names
        .into_iter()
        .map(|name| {
            let observed: Vec<(&ParamValue, f64)> = complete
                .iter()
                .filter_map(|t| Some((t.values.get(name)?, t.value?)))
                .collect();
            let score = if total_var > 0.0 { explained_variance(&observed, mean) / total_var } else { 0.0 };
            (name.clone(), score)
        })
        .collect();

    let sum: f64 = scores.iter().map(|(_, s)| s).sum();
    if sum > 0.0 {
        scores.iter_mut().for_each(|(_, s)| *s /= sum);
    }
    scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scores
}

fn explained_variance(observed: &[(&ParamValue, f64)], mean: f64) -> f64 {
    let groups = group(observed);
    let n = observed.len() as f64;
    groups
        .iter()
        .filter(|g| !g.is_empty())
        .map(|g| {
            let m = g.iter().sum::<f64>() / g.len() as f64;
            g.len() as f64 / n * (m - mean).powi(2)
        })
        .sum()
}

fn group(observed: &[(&ParamValue, f64)]) -> Vec<Vec<f64>> {
    let numeric: Option<Vec<(f64, f64)>> = observed
        .iter()
        .map(|(p, v)| match p {
            ParamValue::Int(_) | ParamValue::Float(_) => p.as_f64().map(|x| (x, *v)),
            _ => None,
        })
        .collect();

    match numeric {
        Some(mut points) if distinct(&points) > MAX_BINS => {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let per_bin = points.len().div_ceil(MAX_BINS);
            points.chunks(per_bin).map(|c| c.iter().map(|(_, v)| *v).collect()).collect()
        }
        _ => {
            let mut by_value: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for (p, v) in observed {
                by_value.entry(p.to_string()).or_default().push(*v);
            }
            by_value.into_values().collect()
        }
    }
}

fn distinct(points: &[(f64, f64)]) -> usize {
    let mut xs: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    xs.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::study::TrialState;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn trial(number: usize, lr: f64, nesterov: bool, value: f64) -> TrialResult {
        TrialResult {
            number,
            params: None,
            values: BTreeMap::from([
                ("lr".to_string(), ParamValue::Float(lr)),
                ("nesterov".to_string(), ParamValue::Bool(nesterov)),
            ]),
            value: Some(value),
            intermediate: vec![value],
            duration: Duration::ZERO,
            state: TrialState::Complete,
        }
    }

    #[test]
    fn parameter_driving_the_objective_ranks_first() {
        // Value depends on lr only; nesterov alternates independently.
        let trials: Vec<TrialResult> =
            (0..20).map(|i| trial(i, i as f64 * 0.01, i % 2 == 0, i as f64 * 0.01)).collect();
        let ranked = param_importances(&trials);
        assert_eq!(ranked[0].0, "lr");
        assert!(ranked[0].1 > 0.9);
        let total: f64 = ranked.iter().map(|(_, s)| s).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn too_few_trials_give_nothing() {
        assert!(param_importances(&[trial(0, 0.1, true, 0.5)]).is_empty());
    }

    #[test]
    fn failed_trials_are_ignored() {
        let mut trials = vec![trial(0, 0.1, true, 1.0), trial(1, 0.2, false, 0.0)];
        trials.push(TrialResult { state: TrialState::Failed { reason: "x".into() }, value: None, ..trial(2, 0.3, true, 0.0) });
        let ranked = param_importances(&trials);
        assert_eq!(ranked.len(), 2);
        // Both parameters split the two trials identically.
        assert_relative_eq!(ranked[0].1, 0.5, epsilon = 1e-12);
    }
}
