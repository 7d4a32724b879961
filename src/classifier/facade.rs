use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::augment::prepare_split;
use crate::classifier::config::{ClassifierConfig, SamplerKind};
use crate::classifier::persist::{load_artifacts, save_artifacts, Artifacts, LoadReport};
use crate::classifier::predict::{predict_samples, Prediction};
use crate::data::{from_2d, ImageSample, LabeledDataset, ValidationSet};
use crate::error::{Error, Result};
use crate::network::{build_network, HyperparameterRecord, ModelMetadata, Network};
use crate::search::{
    param_importances, MedianPruner, Objective, RandomSampler, Sampler, Study, TpeSampler,
};
use crate::train::{fit, EpochCallback, Metric, ModelCheckpoint, TrainConfig, TrainingHistory};

/// Lifecycle of a [`Classifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierState {
    Uninitialized,
    /// The base record was chosen without a search.
    BaseBuilt,
    Searching,
    /// A search finished; no final fit yet.
    BestFound,
    Trained,
    Saved,
    Loaded,
}

impl ClassifierState {
    pub fn can_predict(self) -> bool {
        matches!(self, ClassifierState::Trained | ClassifierState::Saved | ClassifierState::Loaded)
    }
}

/// One point of the search history: the trial's value and the best value
/// up to and including it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub trial: usize,
    pub value: Option<f64>,
    pub best: Option<f64>,
}

/// Sequences data preparation, search, final fit, persistence and
/// prediction. Owns only the final artifacts; the configuration never
/// changes after construction.
#[derive(Debug)]
pub struct Classifier {
    config: ClassifierConfig,
    data: LabeledDataset,
    validation: ValidationSet,
    state: ClassifierState,
    network: Option<Network>,
    metadata: Option<ModelMetadata>,
    history: Option<TrainingHistory>,
    best_params: Option<HyperparameterRecord>,
    study: Option<Study>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig, data: LabeledDataset, validation: ValidationSet) -> Self {
        Classifier {
            config,
            data,
            validation,
            state: ClassifierState::Uninitialized,
            network: None,
            metadata: None,
            history: None,
            best_params: None,
            study: None,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }

    pub fn best_params(&self) -> Option<&HyperparameterRecord> {
        self.best_params.as_ref()
    }

    pub fn study(&self) -> Option<&Study> {
        self.study.as_ref()
    }

    /// Trains the base model, or searches and then trains the best record.
    ///
    /// Configuration and data problems fail before any training starts.
    pub fn create(&mut self) -> Result<()> {
        self.config.validate()?;
        self.check_data()?;
        self.network = None;
        self.history = None;

        if !self.config.optimize {
            let record = HyperparameterRecord::base(self.config.architecture()?);
            info!("training base model, {}", record.architecture);
            self.state = ClassifierState::BaseBuilt;
            return self.final_fit(record);
        }

        self.state = ClassifierState::Searching;
        let (best, study) = match self.search() {
            Ok(found) => found,
            Err(e) => {
                self.state = ClassifierState::Uninitialized;
                return Err(e);
            }
        };
        self.best_params = Some(best.clone());
        self.study = Some(study);
        self.state = ClassifierState::BestFound;

        if self.config.epochs == 0 {
            info!("epochs is 0, skipping the final fit");
            return Ok(());
        }
        self.final_fit(best)
    }

    fn check_data(&self) -> Result<()> {
        if self.data.blob.is_empty() || self.data.other.is_empty() {
            return Err(Error::config("both classes need at least one training image"));
        }
        let needs_validation = self.config.metric.needs_validation() && self.config.cv_folds.is_none();
        if self.config.optimize && needs_validation && self.validation.is_empty() {
            return Err(Error::config(format!("metric {} needs validation data", self.config.metric)));
        }
        Ok(())
    }

    fn search(&self) -> Result<(HyperparameterRecord, Study)> {
        let source_size = self.data.blob[0].dim().0;
        let space = self.config.search_space(source_size)?;
        let objective = Objective {
            data: &self.data,
            validation: &self.validation,
            options: self.config.pipeline_options(),
            metric: self.config.metric,
            epochs: self.config.train_epochs,
            patience: self.config.patience,
            cv_folds: self.config.cv_folds,
            seed: self.config.seed,
            pruner: MedianPruner::default(),
            max_parameters: self.config.limits.max_parameters,
        };
        let mut sampler: Box<dyn Sampler> = match self.config.sampler {
            SamplerKind::Tpe => Box::new(TpeSampler::new(self.config.seed)),
            SamplerKind::Random => Box::new(RandomSampler::new(self.config.seed)),
        };

        info!("searching {} trials on {}", self.config.n_iter, self.config.metric);
        let mut study = Study::new(self.config.metric);
        study.optimize(
            &space,
            sampler.as_mut(),
            self.config.n_iter,
            self.config.timeout.map(Duration::from_secs),
            |record, done| objective.evaluate(record, done),
        )?;

        let best = study
            .best_trial()
            .and_then(|t| t.params.clone())
            .ok_or_else(|| Error::search(format!("none of {} trials completed", study.trials().len())))?;
        Ok((best, study))
    }

    /// Trains `record` for the full epoch budget on the same data path the
    /// search used, with every stream re-seeded.
    fn final_fit(&mut self, record: HyperparameterRecord) -> Result<()> {
        let split = prepare_split(
            &self.data,
            &self.validation,
            &record,
            &self.config.pipeline_options(),
            self.config.seed,
        )?;
        let network = build_network(&record, split.train.sample_shape(), self.config.seed)?;

        let mut checkpoint = self.config.checkpoint.clone().map(|p| ModelCheckpoint::new(p, Metric::ValAccuracy));
        let mut callbacks: Vec<&mut dyn EpochCallback> = Vec::new();
        if let Some(c) = checkpoint.as_mut() {
            callbacks.push(c);
        }

        let config = TrainConfig::new(self.config.epochs, record.batch_size, self.config.seed);
        let trained = fit(network, &split.train, split.validation.as_ref(), &config, &mut callbacks)?;

        self.metadata = Some(ModelMetadata {
            description: Some(format!("{}, {} channel(s)", record.architecture, self.config.img_num_channels)),
            output_labels: self.config.labels().to_vec(),
            img_num_channels: self.config.img_num_channels,
            image_size: split.image_size,
            normalize: split.normalization.is_some(),
            pixel_bounds: split.normalization,
        });
        self.network = Some(trained.network);
        self.history = Some(trained.history);
        self.state = ClassifierState::Trained;
        Ok(())
    }

    /// Writes every available artifact to `dir/blob_nn_model` and returns
    /// that path.
    pub fn save(&mut self, dir: impl AsRef<Path>, overwrite: bool) -> Result<PathBuf> {
        let has_model = self.network.is_some();
        if !has_model && self.best_params.is_none() && self.study.is_none() {
            return Err(Error::ModelNotCreated);
        }
        let artifacts = Artifacts {
            model: self.network.clone().map(|n| (n, self.current_metadata())),
            history: self.history.clone(),
            best_params: self.best_params.clone(),
            study: self.study.clone(),
        };
        let path = save_artifacts(dir.as_ref(), overwrite, &artifacts)?;
        if has_model {
            self.state = ClassifierState::Saved;
        }
        Ok(path)
    }

    /// Restores whatever `dir/blob_nn_model` holds. Training data is not
    /// persisted, so the result can predict but not re-create.
    pub fn load(dir: impl AsRef<Path>, config: ClassifierConfig) -> Result<(Classifier, LoadReport)> {
        config.validate()?;
        let (artifacts, report) = load_artifacts(dir.as_ref());
        let mut clf = Classifier::new(config, LabeledDataset::default(), ValidationSet::default());
        clf.history = artifacts.history;
        clf.best_params = artifacts.best_params;
        clf.study = artifacts.study;
        if let Some((network, metadata)) = artifacts.model {
            clf.network = Some(network);
            clf.metadata = Some(metadata);
            clf.state = ClassifierState::Loaded;
        } else if clf.best_params.is_some() {
            clf.state = ClassifierState::BestFound;
        }
        Ok((clf, report))
    }

    /// Metadata of the current network. Artifacts saved without metadata
    /// fall back to the configuration's preparation settings.
    fn current_metadata(&self) -> ModelMetadata {
        match &self.metadata {
            Some(m) if !m.output_labels.is_empty() && m.img_num_channels > 0 => m.clone(),
            _ => ModelMetadata {
                description: None,
                output_labels: self.config.labels().to_vec(),
                img_num_channels: self.config.img_num_channels,
                image_size: None,
                normalize: self.config.normalize,
                pixel_bounds: self.config.normalize.then(|| self.config.pixel_bounds()),
            },
        }
    }

    /// Labels every sample; `return_proba` adds the probability of the
    /// chosen label.
    pub fn predict(&mut self, samples: &[ImageSample], return_proba: bool) -> Result<Vec<Prediction>> {
        if !self.state.can_predict() {
            return Err(Error::ModelNotCreated);
        }
        let metadata = self.current_metadata();
        let network = self.network.as_mut().ok_or(Error::ModelNotCreated)?;
        predict_samples(network, &metadata, samples, return_proba)
    }

    /// Single-channel convenience for one 2-D image.
    pub fn predict_image(&mut self, image: Array2<f32>, return_proba: bool) -> Result<Prediction> {
        self.predict(&[from_2d(image)], return_proba)?
            .pop()
            .ok_or(Error::ModelNotCreated)
    }

    /// Value and running best of every trial, for plotting.
    pub fn optimization_history(&self) -> Vec<HistoryPoint> {
        let Some(study) = &self.study else {
            warn!("no search has been run");
            return Vec::new();
        };
        study
            .trials()
            .iter()
            .zip(study.best_value_history())
            .map(|(t, best)| HistoryPoint { trial: t.number, value: t.value, best })
            .collect()
    }

    pub fn param_importances(&self) -> Vec<(String, f64)> {
        self.study.as_ref().map(|s| param_importances(s.trials())).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchLimits;
    use crate::search::IntRange;

    // 32px keeps every sampled kernel, stride and pool within the feature
    // map: stride 4 leaves 8x8, and pools reach at most 7.
    fn tiny_data() -> LabeledDataset {
        let blob = (0..6).map(|i| from_2d(Array2::from_elem((32, 32), 2000.0 + i as f32))).collect();
        let other = (0..6).map(|i| from_2d(Array2::from_elem((32, 32), 700.0 + i as f32))).collect();
        LabeledDataset::new(blob, other)
    }

    fn small_limits() -> SearchLimits {
        SearchLimits {
            filters: IntRange::new(2, 4, 2),
            dense_neurons: IntRange::new(4, 8, 4),
            max_parameters: 200_000,
            ..SearchLimits::default()
        }
    }

    #[test]
    fn predict_before_create_is_an_error() {
        let mut clf = Classifier::new(ClassifierConfig::default(), tiny_data(), ValidationSet::default());
        let err = clf.predict_image(Array2::zeros((16, 16)), false).unwrap_err();
        assert!(matches!(err, Error::ModelNotCreated));
        assert!(matches!(clf.save(std::env::temp_dir(), false), Err(Error::ModelNotCreated)));
    }

    #[test]
    fn validation_metric_without_validation_fails_early() {
        let config = ClassifierConfig { metric: Metric::ValLoss, ..Default::default() };
        let mut clf = Classifier::new(config, tiny_data(), ValidationSet::default());
        assert!(matches!(clf.create(), Err(Error::InvalidConfig(_))));
        assert_eq!(clf.state(), ClassifierState::Uninitialized);
    }

    #[test]
    fn search_without_final_fit_stops_at_best_found() {
        let config = ClassifierConfig {
            n_iter: 3,
            train_epochs: 1,
            epochs: 0,
            batch_min: 4,
            batch_max: 8,
            sampler: SamplerKind::Random,
            limits: small_limits(),
            ..Default::default()
        };
        let mut clf = Classifier::new(config, tiny_data(), ValidationSet::default());
        clf.create().unwrap();
        assert_eq!(clf.state(), ClassifierState::BestFound);
        assert!(clf.network().is_none());
        assert!(clf.best_params().is_some());
        assert_eq!(clf.optimization_history().len(), 3);
    }
}
