use log::info;
use serde::{Deserialize, Serialize};

use crate::data::PreparedData;
use crate::error::Result;
use crate::network::Network;
use crate::train::callbacks::EpochCallback;
use crate::train::history::TrainingHistory;
use crate::train::loop_fn::train_loop;
use crate::train::train_config::TrainConfig;

/// A fitted network together with the history of the fit that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub network: Network,
    pub history: TrainingHistory,
}

/// Fits `network` and hands back ownership together with its history.
pub fn fit(
    mut network: Network,
    train: &PreparedData,
    validation: Option<&PreparedData>,
    config: &TrainConfig,
    callbacks: &mut [&mut dyn EpochCallback],
) -> Result<TrainedModel> {
    info!(
        "training {} samples ({} validation) for {} epochs, batch size {}",
        train.len(),
        validation.map_or(0, PreparedData::len),
        config.epochs,
        config.batch_size
    );
    let history = train_loop(&mut network, train, validation, config, callbacks)?;
    Ok(TrainedModel { network, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{create_training_set, from_2d, ImageSample};
    use crate::error::Error;
    use crate::layers::{PoolingType, Shape};
    use crate::network::{build_network, Architecture, ConvBlock, DenseHead, HyperparameterRecord, Regularization};
    use crate::train::callbacks::{CallbackAction, EarlyStopping};
    use crate::train::epoch_stats::EpochStats;
    use crate::train::metrics::Metric;
    use ndarray::Array2;
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc};

    fn record() -> HyperparameterRecord {
        let mut r = HyperparameterRecord::base(Architecture::Depth1);
        r.blocks = vec![ConvBlock::new(4, 3, 1).with_pooling(PoolingType::Max, 2, 2)];
        r.regularization = Regularization::None;
        r.dense = DenseHead { neurons: [8, 8], dropout: [0.2, 0.2] };
        r.optimizer.lr = 0.05;
        r.batch_size = 4;
        r
    }

    fn data() -> PreparedData {
        let blob: Vec<ImageSample> = (0..6)
            .map(|k| from_2d(Array2::from_shape_fn((8, 8), |(i, j)| {
                let d = (i as f32 - 3.5).powi(2) + (j as f32 - 3.5).powi(2);
                (-d / 6.0).exp() + 0.01 * k as f32
            })))
            .collect();
        let other: Vec<ImageSample> = (0..6)
            .map(|k| from_2d(Array2::from_shape_fn((8, 8), |(i, j)| ((i + j + k) % 2) as f32)))
            .collect();
        create_training_set(&blob, &other, 1, None, 3).unwrap()
    }

    fn net(seed: u64) -> Network {
        build_network(&record(), Shape::Spatial { height: 8, width: 8, channels: 1 }, seed).unwrap()
    }

    #[test]
    fn same_seed_gives_identical_trajectories() {
        let train = data();
        let config = TrainConfig::new(3, 4, 11);
        let a = fit(net(5), &train, None, &config, &mut []).unwrap();
        let b = fit(net(5), &train, None, &config, &mut []).unwrap();
        assert_eq!(a.history.loss, b.history.loss);
        assert_eq!(a.history.len(), 3);
    }

    #[test]
    fn validation_series_follow_validation_data() {
        let train = data();
        let config = TrainConfig::new(2, 4, 1);
        let with = fit(net(1), &train, Some(&train), &config, &mut []).unwrap();
        assert_eq!(with.history.val_accuracy.as_ref().map(Vec::len), Some(2));
        let without = fit(net(1), &train, None, &config, &mut []).unwrap();
        assert!(without.history.val_loss.is_none());
    }

    #[test]
    fn callbacks_can_stop_early() {
        struct StopAfter(usize);
        impl EpochCallback for StopAfter {
            fn on_epoch_end(&mut self, stats: &EpochStats, _: &Network) -> Result<CallbackAction> {
                Ok(if stats.epoch >= self.0 { CallbackAction::Stop } else { CallbackAction::Continue })
            }
        }
        let train = data();
        let mut stop = StopAfter(2);
        let mut early = EarlyStopping::new(Metric::Loss, 100, 0.0);
        let out = fit(net(1), &train, None, &TrainConfig::new(10, 4, 1), &mut [&mut stop, &mut early]).unwrap();
        assert_eq!(out.history.len(), 2);
    }

    #[test]
    fn progress_channel_and_stop_flag() {
        let train = data();
        let (tx, rx) = mpsc::channel();
        let flag = Arc::new(AtomicBool::new(true));
        let mut config = TrainConfig::new(5, 4, 1);
        config.progress_tx = Some(tx);
        config.stop_flag = Some(flag);
        let out = fit(net(1), &train, None, &config, &mut []).unwrap();
        assert!(out.history.is_empty());
        assert!(rx.try_recv().is_err());

        let (tx, rx) = mpsc::channel();
        let mut config = TrainConfig::new(2, 4, 1);
        config.progress_tx = Some(tx);
        fit(net(1), &train, None, &config, &mut []).unwrap();
        let epochs: Vec<usize> = rx.try_iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);
    }

    #[test]
    fn diverging_loss_is_a_training_error() {
        let mut train = data();
        train.x[[0, 2, 2, 0]] = f32::NAN;
        let mut r = record();
        r.blocks = vec![ConvBlock::new(4, 3, 1)];
        r.activation_conv = crate::activation::ActivationFunction::Tanh;
        let network = build_network(&r, Shape::Spatial { height: 8, width: 8, channels: 1 }, 1).unwrap();
        let err = fit(network, &train, None, &TrainConfig::new(5, 4, 1), &mut []).unwrap_err();
        assert!(matches!(err, Error::Training(_)));
    }
}
