use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::augment::PipelineOptions;
use crate::error::{Error, Result};
use crate::network::{Architecture, PixelBounds};
use crate::search::{IntRange, SearchLimits, SearchSpace};
use crate::train::Metric;

/// Which sampler drives the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    #[default]
    Tpe,
    Random,
}

/// Settings for one classifier run. Immutable once handed to a
/// [`Classifier`](crate::classifier::Classifier).
///
/// Every field has a default, so a JSON file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of convolution blocks, 1 to 5.
    pub architecture: usize,
    pub img_num_channels: usize,
    /// Search hyperparameters before the final fit; otherwise train the
    /// base model.
    pub optimize: bool,
    /// Number of search trials.
    pub n_iter: usize,
    pub normalize: bool,
    pub min_pixel: f32,
    pub max_pixel: f32,
    /// Epochs of the final (or base) fit.
    pub epochs: usize,
    /// Epochs of every search trial.
    pub train_epochs: usize,
    /// Early-stopping patience inside search trials.
    pub patience: usize,
    pub opt_model: bool,
    pub opt_aug: bool,
    pub batch_min: usize,
    pub batch_max: usize,
    pub image_size_min: usize,
    pub image_size_max: usize,
    pub balance_val: bool,
    /// Lower end of the searched `max_pixel` range. Setting it searches the
    /// upper normalization bound with the lower bound fixed at 0.
    pub opt_max_min_pix: Option<f32>,
    pub opt_max_max_pix: Option<f32>,
    pub metric: Metric,
    pub cv_folds: Option<usize>,
    pub seed: u64,
    /// Where the final fit writes its best-so-far network, if anywhere.
    pub checkpoint: Option<PathBuf>,
    pub target_label: String,
    pub other_label: String,
    /// Wall-clock limit on starting new trials, in seconds.
    pub timeout: Option<u64>,
    pub sampler: SamplerKind,
    pub limits: SearchLimits,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            architecture: 1,
            img_num_channels: 1,
            optimize: true,
            n_iter: 25,
            normalize: true,
            min_pixel: 638.0,
            max_pixel: 3000.0,
            epochs: 100,
            train_epochs: 25,
            patience: 5,
            opt_model: true,
            opt_aug: false,
            batch_min: 10,
            batch_max: 250,
            image_size_min: 50,
            image_size_max: 90,
            balance_val: true,
            opt_max_min_pix: None,
            opt_max_max_pix: None,
            metric: Metric::Loss,
            cv_folds: None,
            seed: 1909,
            checkpoint: None,
            target_label: "DIFFUSE".to_string(),
            other_label: "OTHER".to_string(),
            timeout: None,
            sampler: SamplerKind::Tpe,
            limits: SearchLimits::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        Architecture::from_depth(self.architecture)?;
        if !(1..=3).contains(&self.img_num_channels) {
            return Err(Error::config(format!(
                "img_num_channels must be 1, 2 or 3, got {}",
                self.img_num_channels
            )));
        }
        if !(self.min_pixel < self.max_pixel) {
            return Err(Error::config(format!(
                "min_pixel {} must be below max_pixel {}",
                self.min_pixel, self.max_pixel
            )));
        }
        if self.batch_min == 0 || self.batch_min > self.batch_max {
            return Err(Error::config(format!("invalid batch size range {}..={}", self.batch_min, self.batch_max)));
        }
        if self.image_size_min == 0 || self.image_size_min > self.image_size_max {
            return Err(Error::config(format!(
                "invalid image size range {}..={}",
                self.image_size_min, self.image_size_max
            )));
        }
        match (self.opt_max_min_pix, self.opt_max_max_pix) {
            (None, None) => {}
            (Some(lo), Some(hi)) if lo > 0.0 && lo < hi => {}
            (lo, hi) => {
                return Err(Error::config(format!(
                    "opt_max_min_pix {lo:?} and opt_max_max_pix {hi:?} must both be set with 0 < min < max"
                )))
            }
        }
        if let Some(k) = self.cv_folds {
            if k < 2 {
                return Err(Error::config(format!("cv_folds must be at least 2, got {k}")));
            }
        }
        if self.optimize && self.n_iter == 0 {
            return Err(Error::config("n_iter must be at least 1 when optimizing"));
        }
        if self.target_label == self.other_label {
            return Err(Error::config("target and other labels must differ"));
        }
        Ok(())
    }

    pub fn architecture(&self) -> Result<Architecture> {
        Architecture::from_depth(self.architecture)
    }

    pub fn pixel_bounds(&self) -> PixelBounds {
        PixelBounds::uniform(self.min_pixel, self.max_pixel, self.img_num_channels)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            img_num_channels: self.img_num_channels,
            normalize: self.normalize,
            bounds: self.pixel_bounds(),
            balance_val: self.balance_val,
        }
    }

    /// Search space for source images of side `source_size`.
    pub fn search_space(&self, source_size: usize) -> Result<SearchSpace> {
        Ok(SearchSpace {
            architecture: self.architecture()?,
            opt_model: self.opt_model,
            opt_aug: self.opt_aug,
            batch_size: IntRange::new(self.batch_min, self.batch_max, 1),
            image_size: IntRange::new(self.image_size_min, self.image_size_max, 1),
            max_pixel: self.opt_max_min_pix.zip(self.opt_max_max_pix).map(|(lo, hi)| (lo as f64, hi as f64)),
            img_num_channels: self.img_num_channels,
            source_size,
            limits: self.limits.clone(),
        })
    }

    /// Output labels in network-unit order.
    pub fn labels(&self) -> [String; 2] {
        [self.target_label.clone(), self.other_label.clone()]
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<ClassifierConfig> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ClassifierConfig::default();
        c.validate().unwrap();
        assert_eq!(c.seed, 1909);
        assert_eq!(c.metric, Metric::Loss);
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let bad = [
            ClassifierConfig { architecture: 6, ..Default::default() },
            ClassifierConfig { img_num_channels: 4, ..Default::default() },
            ClassifierConfig { min_pixel: 3000.0, ..Default::default() },
            ClassifierConfig { batch_min: 300, ..Default::default() },
            ClassifierConfig { opt_max_min_pix: Some(900.0), ..Default::default() },
            ClassifierConfig { cv_folds: Some(1), ..Default::default() },
        ];
        for c in bad {
            assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))), "{c:?}");
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"optimize": false, "epochs": 3, "metric": "val_accuracy"}"#).unwrap();
        let c = ClassifierConfig::load_json(&path).unwrap();
        assert!(!c.optimize);
        assert_eq!(c.epochs, 3);
        assert_eq!(c.metric, Metric::ValAccuracy);
        assert_eq!(c.max_pixel, 3000.0);
    }

    #[test]
    fn searched_max_pixel_reaches_the_space() {
        let c = ClassifierConfig { opt_max_min_pix: Some(1000.0), opt_max_max_pix: Some(2000.0), ..Default::default() };
        let space = c.search_space(80).unwrap();
        assert_eq!(space.max_pixel, Some((1000.0, 2000.0)));
        assert_eq!(space.batch_size, IntRange::new(10, 250, 1));
    }
}
