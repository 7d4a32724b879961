//! Strategies that propose the next value of each hyperparameter.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::math::init::sample_standard_normal;
use crate::math::{seeded_rng, RngStream};
use crate::search::space::{ParamDistribution, ParamValue};
use crate::search::study::TrialResult;
use crate::train::Direction;

/// Proposes a value for one parameter given the trials so far.
pub trait Sampler {
    fn sample(
        &mut self,
        name: &str,
        distribution: &ParamDistribution,
        history: &[TrialResult],
        direction: Direction,
    ) -> ParamValue;
}

/// Independent uniform draws.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: ChaCha8Rng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        RandomSampler { rng: seeded_rng(seed, RngStream::Sampler) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, _: &str, distribution: &ParamDistribution, _: &[TrialResult], _: Direction) -> ParamValue {
        distribution.sample_uniform(&mut self.rng)
    }
}

/// Univariate tree-structured Parzen estimator.
///
/// Complete trials are split into a "good" set (the best `gamma` fraction,
/// at most `max_good`) and the rest. Each set defines a density over the
/// parameter: a mixture of Gaussians for numeric parameters, smoothed
/// frequencies for categorical ones. Candidates are drawn from the good
/// density and the one maximizing good/bad density ratio (expected
/// improvement) is returned. Until `n_startup_trials` complete trials exist
/// the sampler draws uniformly.
#[derive(Debug, Clone)]
pub struct TpeSampler {
    rng: ChaCha8Rng,
    pub n_startup_trials: usize,
    pub gamma: f64,
    pub max_good: usize,
    pub n_ei_candidates: usize,
    /// Weight of the uniform prior component in each mixture.
    pub prior_weight: f64,
}

impl TpeSampler {
    pub fn new(seed: u64) -> Self {
        TpeSampler {
            rng: seeded_rng(seed, RngStream::Sampler),
            n_startup_trials: 10,
            gamma: 0.1,
            max_good: 25,
            n_ei_candidates: 24,
            prior_weight: 1.0,
        }
    }

    /// Observed (internal value, objective) pairs for `name`, best first.
    fn observations(
        name: &str,
        distribution: &ParamDistribution,
        history: &[TrialResult],
        direction: Direction,
    ) -> Vec<f64> {
        let mut obs: Vec<(f64, f64)> = history
            .iter()
            .filter(|t| t.is_complete())
            .filter_map(|t| {
                let x = distribution.to_internal(t.values.get(name)?)?;
                Some((x, t.value?))
            })
            .collect();
        obs.sort_by(|a, b| match direction {
            Direction::Minimize => a.1.total_cmp(&b.1),
            Direction::Maximize => b.1.total_cmp(&a.1),
        });
        obs.into_iter().map(|(x, _)| x).collect()
    }

    fn n_good(&self, n: usize) -> usize {
        ((self.gamma * n as f64).ceil() as usize).clamp(1, self.max_good)
    }

    fn sample_numeric(&mut self, distribution: &ParamDistribution, good: &[f64], bad: &[f64]) -> ParamValue {
        let (low, high) = distribution.internal_bounds();
        let l = Parzen::fit(good, low, high, self.prior_weight);
        let g = Parzen::fit(bad, low, high, self.prior_weight);

        let mut best = (f64::NEG_INFINITY, l.sample(&mut self.rng));
        for _ in 0..self.n_ei_candidates {
            let x = l.sample(&mut self.rng);
            let score = l.log_pdf(x) - g.log_pdf(x);
            if score > best.0 {
                best = (score, x);
            }
        }
        distribution.from_internal(best.1)
    }

    fn sample_categorical(&mut self, choices: &[ParamValue], good: &[f64], bad: &[f64]) -> ParamValue {
        let weights = |obs: &[f64]| -> Vec<f64> {
            let mut w = vec![self.prior_weight; choices.len()];
            for &x in obs {
                w[x as usize] += 1.0;
            }
            let total: f64 = w.iter().sum();
            w.into_iter().map(|v| v / total).collect()
        };
        let l = weights(good);
        let g = weights(bad);

        let mut best = (f64::NEG_INFINITY, 0usize);
        for _ in 0..self.n_ei_candidates {
            let i = sample_index(&l, &mut self.rng);
            let score = l[i].ln() - g[i].ln();
            if score > best.0 {
                best = (score, i);
            }
        }
        choices[best.1].clone()
    }
}

impl Sampler for TpeSampler {
    fn sample(
        &mut self,
        name: &str,
        distribution: &ParamDistribution,
        history: &[TrialResult],
        direction: Direction,
    ) -> ParamValue {
        let obs = Self::observations(name, distribution, history, direction);
        if obs.len() < self.n_startup_trials {
            return distribution.sample_uniform(&mut self.rng);
        }
        let (good, bad) = obs.split_at(self.n_good(obs.len()));
        match distribution {
            ParamDistribution::Categorical(choices) => self.sample_categorical(choices, good, bad),
            _ => self.sample_numeric(distribution, good, bad),
        }
    }
}

fn sample_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    let mut u = rng.gen::<f64>() * weights.iter().sum::<f64>();
    for (i, &w) in weights.iter().enumerate() {
        if u < w {
            return i;
        }
        u -= w;
    }
    weights.len() - 1
}

/// Gaussian mixture on `[low, high]`: one component per observation plus a
/// wide prior component centred on the range.
#[derive(Debug)]
struct Parzen {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    weights: Vec<f64>,
    low: f64,
    high: f64,
}

impl Parzen {
    fn fit(obs: &[f64], low: f64, high: f64, prior_weight: f64) -> Parzen {
        let range = (high - low).max(f64::EPSILON);
        let mut sorted: Vec<f64> = obs.to_vec();
        sorted.sort_by(f64::total_cmp);

        // Bandwidth: distance to the farther neighbour, clipped.
        let min_sigma = range / (sorted.len() as f64 + 1.0).min(100.0);
        let mut mus = Vec::with_capacity(sorted.len() + 1);
        let mut sigmas = Vec::with_capacity(sorted.len() + 1);
        for (i, &x) in sorted.iter().enumerate() {
            let left = if i == 0 { x - low } else { x - sorted[i - 1] };
            let right = if i + 1 == sorted.len() { high - x } else { sorted[i + 1] - x };
            mus.push(x);
            sigmas.push(left.max(right).clamp(min_sigma, range));
        }
        mus.push(low + range / 2.0);
        sigmas.push(range);

        let mut weights = vec![1.0; sorted.len()];
        weights.push(prior_weight);
        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);

        Parzen { mus, sigmas, weights, low, high }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let i = sample_index(&self.weights, rng);
        // A few rejection rounds, then clamp.
        for _ in 0..16 {
            let x = self.mus[i] + self.sigmas[i] * sample_standard_normal(rng);
            if (self.low..=self.high).contains(&x) {
                return x;
            }
        }
        self.mus[i].clamp(self.low, self.high)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let p: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.weights)
            .map(|((&mu, &sigma), &w)| {
                let z = (x - mu) / sigma;
                w * (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
            })
            .sum();
        p.max(f64::MIN_POSITIVE).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::study::TrialState;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn history(points: &[(f64, f64)]) -> Vec<TrialResult> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| TrialResult {
                number: i,
                params: None,
                values: BTreeMap::from([("x".to_string(), ParamValue::Float(x))]),
                value: Some(y),
                intermediate: vec![y],
                duration: Duration::ZERO,
                state: TrialState::Complete,
            })
            .collect()
    }

    #[test]
    fn random_sampler_is_seeded() {
        let d = ParamDistribution::float(0.0, 1.0);
        let a: Vec<_> = (0..5).map(|_| RandomSampler::new(3).sample("x", &d, &[], Direction::Minimize)).collect();
        assert!(a.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn tpe_concentrates_near_good_region() {
        let d = ParamDistribution::float(0.0, 10.0);
        // Objective (x - 2)^2 observed on a grid.
        let points: Vec<(f64, f64)> = (0..40).map(|i| {
            let x = i as f64 * 0.25;
            (x, (x - 2.0).powi(2))
        }).collect();
        let trials = history(&points);
        let mut tpe = TpeSampler::new(7);
        let draws: Vec<f64> = (0..50)
            .map(|_| match tpe.sample("x", &d, &trials, Direction::Minimize) {
                ParamValue::Float(v) => v,
                other => panic!("{other:?}"),
            })
            .collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 2.0).abs() < 1.5, "mean draw {mean}");
        assert!(draws.iter().all(|v| (0.0..=10.0).contains(v)));
    }

    #[test]
    fn tpe_prefers_winning_category() {
        let d = ParamDistribution::choices(["a", "b", "c"]);
        let trials: Vec<TrialResult> = (0..30)
            .map(|i| {
                let c = ["a", "b", "c"][i % 3];
                TrialResult {
                    number: i,
                    params: None,
                    values: BTreeMap::from([("opt".to_string(), ParamValue::Choice(c.into()))]),
                    value: Some(if c == "b" { 0.9 } else { 0.1 }),
                    intermediate: Vec::new(),
                    duration: Duration::ZERO,
                    state: TrialState::Complete,
                }
            })
            .collect();
        let mut tpe = TpeSampler::new(1);
        let picked = tpe.sample("opt", &d, &trials, Direction::Maximize);
        assert_eq!(picked, ParamValue::Choice("b".into()));
    }

    #[test]
    fn tpe_starts_uniform_and_respects_grid() {
        let d = ParamDistribution::int(12, 512, 12);
        let mut tpe = TpeSampler::new(2);
        for _ in 0..10 {
            let v = tpe.sample("filters", &d, &[], Direction::Minimize);
            assert!(d.contains(&v));
        }
    }
}
