use log::debug;

use crate::augment::{prepare_split, PipelineOptions};
use crate::data::{stratified_folds, ImageSample, LabeledDataset, ValidationSet, OTHER_INDEX, TARGET_INDEX};
use crate::error::{Error, Result};
use crate::network::{build_network, parameter_estimate, HyperparameterRecord};
use crate::search::pruner::{MedianPruner, PruningCallback};
use crate::search::study::{TrialOutcome, TrialResult};
use crate::train::{fit, EarlyStopping, EpochCallback, Metric, TrainConfig};

/// Scores one hyperparameter record: prepare data, build, train for the
/// search budget, read the monitored metric.
#[derive(Debug, Clone)]
pub struct Objective<'a> {
    pub data: &'a LabeledDataset,
    pub validation: &'a ValidationSet,
    pub options: PipelineOptions,
    pub metric: Metric,
    /// Search-phase epoch budget.
    pub epochs: usize,
    /// Early-stopping patience on `metric`.
    pub patience: usize,
    pub cv_folds: Option<usize>,
    pub seed: u64,
    pub pruner: MedianPruner,
    /// Records whose network would exceed this many parameters fail
    /// before allocation.
    pub max_parameters: usize,
}

impl Objective<'_> {
    pub fn evaluate(&self, record: &HyperparameterRecord, completed: &[TrialResult]) -> Result<TrialOutcome> {
        match self.cv_folds {
            Some(k) => self.evaluate_cv(record, k),
            None => self.evaluate_holdout(record, completed),
        }
    }

    fn evaluate_holdout(&self, record: &HyperparameterRecord, completed: &[TrialResult]) -> Result<TrialOutcome> {
        if self.metric.needs_validation() && self.validation.is_empty() {
            return Err(Error::search(format!("metric {} needs validation data", self.metric)));
        }
        let mut pruning = PruningCallback::new(self.pruner, completed, self.metric);
        let value = self.train_once(record, self.data, self.validation, Some(&mut pruning))?;
        let pruned = pruning.pruned();
        let intermediate = pruning.intermediate().to_vec();
        let value = if pruned { intermediate.last().copied().unwrap_or(value) } else { value };
        Ok(TrialOutcome { value, intermediate, pruned })
    }

    /// Mean metric over `k` stratified folds of the training data; each
    /// held-out fold serves as that fold's validation set.
    fn evaluate_cv(&self, record: &HyperparameterRecord, k: usize) -> Result<TrialOutcome> {
        let samples: Vec<&ImageSample> = self.data.blob.iter().chain(&self.data.other).collect();
        let labels: Vec<usize> = std::iter::repeat(TARGET_INDEX)
            .take(self.data.blob.len())
            .chain(std::iter::repeat(OTHER_INDEX).take(self.data.other.len()))
            .collect();
        let folds = stratified_folds(&labels, k, self.seed)?;

        let split = |indices: &[usize], class: usize| -> Vec<ImageSample> {
            indices.iter().filter(|&&i| labels[i] == class).map(|&i| samples[i].clone()).collect()
        };

        let mut values = Vec::with_capacity(folds.len());
        for (i, fold) in folds.iter().enumerate() {
            let train = LabeledDataset::new(split(&fold.train, TARGET_INDEX), split(&fold.train, OTHER_INDEX));
            let held_out = ValidationSet {
                blob: Some(split(&fold.test, TARGET_INDEX)),
                other: Some(split(&fold.test, OTHER_INDEX)),
            };
            let value = self.train_once(record, &train, &held_out, None)?;
            debug!("fold {}/{k}: {} {value:.5}", i + 1, self.metric);
            values.push(value);
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Ok(TrialOutcome { value: mean, intermediate: values, pruned: false })
    }

    fn train_once(
        &self,
        record: &HyperparameterRecord,
        data: &LabeledDataset,
        validation: &ValidationSet,
        pruning: Option<&mut PruningCallback<'_>>,
    ) -> Result<f64> {
        let split = prepare_split(data, validation, record, &self.options, self.seed)?;
        let input = split.train.sample_shape();

        let params = parameter_estimate(record, input)?;
        if params > self.max_parameters {
            return Err(Error::build(format!(
                "network would have {params} parameters, limit is {}",
                self.max_parameters
            )));
        }
        let network = build_network(record, input, self.seed)?;

        let mut early = EarlyStopping::new(self.metric, self.patience.max(1), 0.0);
        let mut callbacks: Vec<&mut dyn EpochCallback> = vec![&mut early];
        if let Some(p) = pruning {
            callbacks.push(p);
        }
        let config = TrainConfig::new(self.epochs, record.batch_size, self.seed);
        let trained = fit(network, &split.train, split.validation.as_ref(), &config, &mut callbacks)?;

        trained
            .history
            .final_value(self.metric)
            .ok_or_else(|| Error::search(format!("training produced no {} value", self.metric)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::from_2d;
    use crate::layers::PoolingType;
    use crate::network::{Architecture, ConvBlock, DenseHead, PixelBounds, Regularization};
    use ndarray::Array2;

    fn dataset(n: usize) -> LabeledDataset {
        let blob = (0..n)
            .map(|i| {
                from_2d(Array2::from_shape_fn((12, 12), |(r, c)| {
                    let d = (r as i32 - 6).abs() + (c as i32 - 6).abs();
                    if d < 4 { 2500.0 } else { 700.0 + i as f32 }
                }))
            })
            .collect();
        let other = (0..n).map(|i| from_2d(Array2::from_elem((12, 12), 800.0 + i as f32))).collect();
        LabeledDataset::new(blob, other)
    }

    fn record() -> HyperparameterRecord {
        let mut r = HyperparameterRecord::base(Architecture::Depth1);
        r.blocks = vec![ConvBlock::new(4, 3, 1).with_pooling(PoolingType::Max, 2, 2)];
        r.regularization = Regularization::None;
        r.dense = DenseHead { neurons: [8, 8], dropout: [0.0, 0.0] };
        r.optimizer.lr = 0.05;
        r.batch_size = 4;
        r
    }

    fn objective<'a>(data: &'a LabeledDataset, validation: &'a ValidationSet, metric: Metric) -> Objective<'a> {
        Objective {
            data,
            validation,
            options: PipelineOptions {
                img_num_channels: 1,
                normalize: true,
                bounds: PixelBounds::uniform(638.0, 3000.0, 1),
                balance_val: true,
            },
            metric,
            epochs: 2,
            patience: 5,
            cv_folds: None,
            seed: 5,
            pruner: MedianPruner::default(),
            max_parameters: 1_000_000,
        }
    }

    #[test]
    fn holdout_reports_final_epoch_metric() {
        let data = dataset(6);
        let validation = ValidationSet::default();
        let out = objective(&data, &validation, Metric::Loss).evaluate(&record(), &[]).unwrap();
        assert!(!out.pruned);
        assert_eq!(out.intermediate.len(), 2);
        assert_eq!(out.value, out.intermediate[1]);
    }

    #[test]
    fn validation_metric_without_validation_data_fails() {
        let data = dataset(4);
        let validation = ValidationSet::default();
        let err = objective(&data, &validation, Metric::ValAccuracy).evaluate(&record(), &[]).unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }

    #[test]
    fn cross_validation_averages_folds() {
        let data = dataset(6);
        let validation = ValidationSet::default();
        let mut obj = objective(&data, &validation, Metric::ValAccuracy);
        obj.cv_folds = Some(3);
        let out = obj.evaluate(&record(), &[]).unwrap();
        assert_eq!(out.intermediate.len(), 3);
        let mean = out.intermediate.iter().sum::<f64>() / 3.0;
        assert!((out.value - mean).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&out.value));
    }

    #[test]
    fn oversized_networks_are_rejected_before_building() {
        let data = dataset(4);
        let validation = ValidationSet::default();
        let mut obj = objective(&data, &validation, Metric::Loss);
        obj.max_parameters = 10;
        let err = obj.evaluate(&record(), &[]).unwrap_err();
        assert!(matches!(err, Error::Build(_)));
    }
}
