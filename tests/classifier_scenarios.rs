use blob_nn::classifier::SamplerKind;
use blob_nn::data::from_2d;
use blob_nn::search::{IntRange, SearchLimits};
use blob_nn::train::Metric;
use blob_nn::{Classifier, ClassifierConfig, ClassifierState, ImageSample, LabeledDataset, ValidationSet};
use ndarray::Array2;

const SIZE: usize = 80;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Faint extended glow on a flat sky.
fn diffuse(k: usize) -> Array2<f32> {
    let c = (SIZE as f32 - 1.0) / 2.0 + (k % 5) as f32 - 2.0;
    Array2::from_shape_fn((SIZE, SIZE), |(i, j)| {
        let d = (i as f32 - c).powi(2) + (j as f32 - c).powi(2);
        700.0 + 1800.0 * (-d / 300.0).exp()
    })
}

/// Sky with a sparse scatter of point sources.
fn point_sources(k: usize) -> Array2<f32> {
    Array2::from_shape_fn((SIZE, SIZE), |(i, j)| {
        if (i * 31 + j * 17 + k * 7) % 97 == 0 { 2800.0 } else { 700.0 }
    })
}

fn dataset(n: usize) -> LabeledDataset {
    let blob: Vec<ImageSample> = (0..n).map(|k| from_2d(diffuse(k))).collect();
    let other: Vec<ImageSample> = (0..n).map(|k| from_2d(point_sources(k))).collect();
    LabeledDataset::new(blob, other)
}

fn small_search_config() -> ClassifierConfig {
    ClassifierConfig {
        n_iter: 5,
        train_epochs: 2,
        epochs: 1,
        batch_min: 10,
        batch_max: 32,
        metric: Metric::Loss,
        sampler: SamplerKind::Tpe,
        limits: SearchLimits {
            filters: IntRange::new(2, 4, 2),
            dense_neurons: IntRange::new(4, 16, 4),
            max_parameters: 2_000_000,
            ..SearchLimits::default()
        },
        ..Default::default()
    }
}

#[test]
fn base_model_fit_and_single_image_prediction() {
    init_logging();
    let config = ClassifierConfig { optimize: false, epochs: 2, ..Default::default() };
    let mut clf = Classifier::new(config, dataset(50), ValidationSet::default());
    clf.create().unwrap();

    assert_eq!(clf.state(), ClassifierState::Trained);
    assert!(clf.network().is_some());
    let history = clf.history().unwrap();
    assert_eq!(history.loss.len(), 2);
    assert!(history.loss.iter().all(|l| l.is_finite()));

    let prediction = clf.predict_image(diffuse(3), true).unwrap();
    assert!(prediction.label == "DIFFUSE" || prediction.label == "OTHER");
    let p = prediction.probability.unwrap();
    assert!((0.0..=1.0).contains(&p), "probability {p}");

    let unlabeled = clf.predict_image(point_sources(3), false).unwrap();
    assert!(unlabeled.probability.is_none());
}

#[test]
fn search_then_fit_save_and_reload() {
    init_logging();
    let mut clf = Classifier::new(small_search_config(), dataset(50), ValidationSet::default());
    clf.create().unwrap();
    assert_eq!(clf.state(), ClassifierState::Trained);

    let study = clf.study().unwrap();
    assert!(!study.trials().is_empty() && study.trials().len() <= 5);
    let best = study.best_value_history();
    for pair in best.windows(2) {
        if let (Some(prev), Some(next)) = (pair[0], pair[1]) {
            assert!(next <= prev, "best loss regressed from {prev} to {next}");
        }
    }

    let params = clf.best_params().unwrap().to_params();
    for key in ["batch_size", "lr", "momentum", "loss", "filter_1", "dense_neurons_2", "dropout_1"] {
        assert!(params.contains_key(key), "missing {key}");
    }

    let points = clf.optimization_history();
    assert_eq!(points.len(), study.trials().len());
    let importances = clf.param_importances();
    if !importances.is_empty() {
        let total: f64 = importances.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    let dir = tempfile::tempdir().unwrap();
    let saved = clf.save(dir.path(), false).unwrap();
    assert!(saved.join("model.json").exists());
    assert_eq!(clf.state(), ClassifierState::Saved);
    assert!(matches!(clf.save(dir.path(), false), Err(blob_nn::Error::ArtifactExists(_))));
    clf.save(dir.path(), true).unwrap();

    let before = clf.predict_image(diffuse(1), true).unwrap();
    let (mut loaded, report) = Classifier::load(dir.path(), ClassifierConfig::default()).unwrap();
    assert!(report.model && report.best_params && report.trial_history);
    assert_eq!(loaded.state(), ClassifierState::Loaded);
    assert_eq!(loaded.best_params(), clf.best_params());
    let after = loaded.predict_image(diffuse(1), true).unwrap();
    assert_eq!(before.label, after.label);
    assert!((before.probability.unwrap() - after.probability.unwrap()).abs() < 1e-5);
}

#[test]
fn loading_an_empty_directory_reports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (mut clf, report) = Classifier::load(dir.path(), ClassifierConfig::default()).unwrap();
    assert!(report.is_empty());
    assert_eq!(report.to_string(), "nothing");
    assert_eq!(clf.state(), ClassifierState::Uninitialized);
    assert!(matches!(clf.predict_image(diffuse(0), false), Err(blob_nn::Error::ModelNotCreated)));
}
