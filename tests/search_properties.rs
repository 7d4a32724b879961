use blob_nn::search::{
    IntRange, RandomSampler, SearchLimits, SearchSpace, Study, TpeSampler, TrialOutcome, TrialState,
};
use blob_nn::{Architecture, Error, Metric};
use proptest::prelude::*;

fn space() -> SearchSpace {
    SearchSpace {
        architecture: Architecture::Depth2,
        opt_model: true,
        opt_aug: true,
        batch_size: IntRange::new(10, 250, 1),
        image_size: IntRange::new(50, 90, 1),
        max_pixel: Some((1000.0, 5000.0)),
        img_num_channels: 1,
        source_size: 100,
        limits: SearchLimits::default(),
    }
}

/// Objective values scripted per trial: `None` fails the trial, the flag
/// prunes it.
fn run(metric: Metric, script: &[(Option<f64>, bool)], tpe: bool) -> Study {
    let mut study = Study::new(metric);
    let mut random = RandomSampler::new(7);
    let mut tpe_sampler = TpeSampler::new(7);
    let sampler: &mut dyn blob_nn::search::Sampler = if tpe { &mut tpe_sampler } else { &mut random };
    let mut step = script.iter();
    study
        .optimize(&space(), sampler, script.len(), None, |_, _| match step.next() {
            Some(&(Some(value), pruned)) => Ok(TrialOutcome { value, intermediate: vec![value], pruned }),
            _ => Err(Error::training("scripted failure")),
        })
        .unwrap();
    study
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn best_never_regresses(
        script in prop::collection::vec((prop::option::weighted(0.8, -10.0f64..10.0), any::<bool>()), 1..20),
        maximize in any::<bool>(),
        tpe in any::<bool>(),
    ) {
        let metric = if maximize { Metric::ValAccuracy } else { Metric::Loss };
        let study = run(metric, &script, tpe);
        prop_assert_eq!(study.trials().len(), script.len());

        let history = study.best_value_history();
        for pair in history.windows(2) {
            match (pair[0], pair[1]) {
                (Some(prev), Some(next)) => {
                    let held = if maximize { next >= prev } else { next <= prev };
                    prop_assert!(held, "best regressed from {} to {}", prev, next);
                }
                (Some(_), None) => prop_assert!(false, "best value disappeared"),
                _ => {}
            }
        }

        // Only complete trials are eligible.
        if let Some(best) = study.best_trial() {
            prop_assert_eq!(&best.state, &TrialState::Complete);
            prop_assert_eq!(best.value, study.best_value());
        }
    }
}

#[test]
fn every_trial_is_recorded_with_its_state() {
    let script = [(Some(1.0), false), (None, false), (Some(0.5), true), (Some(0.25), false)];
    let study = run(Metric::Loss, &script, false);
    let states: Vec<&TrialState> = study.trials().iter().map(|t| &t.state).collect();
    assert_eq!(states[0], &TrialState::Complete);
    assert!(matches!(states[1], TrialState::Failed { .. }));
    assert_eq!(states[2], &TrialState::Pruned);
    assert_eq!(study.best_value(), Some(0.25));
    assert_eq!(study.best_value_history(), vec![Some(1.0), Some(1.0), Some(1.0), Some(0.25)]);
}
