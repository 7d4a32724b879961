use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::augment::AugmentationParams;
use crate::error::{Error, Result};
use crate::layers::PoolingType;
use crate::loss::LossType;
use crate::network::topology::{Architecture, TopologyStrategy};
use crate::search::ParamValue;

/// One convolution block: conv, then optional pooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvBlock {
    pub filters: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub pooling: PoolingType,
    pub pool_size: usize,
    pub pool_stride: usize,
}

impl ConvBlock {
    pub fn new(filters: usize, kernel_size: usize, stride: usize) -> Self {
        ConvBlock { filters, kernel_size, stride, pooling: PoolingType::None, pool_size: 1, pool_stride: 1 }
    }

    pub fn with_pooling(mut self, pooling: PoolingType, pool_size: usize, pool_stride: usize) -> Self {
        self.pooling = pooling;
        self.pool_size = pool_size;
        self.pool_stride = pool_stride;
        self
    }
}

/// Normalization placed after every convolution block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regularization {
    LocalResponse,
    BatchNorm,
    None,
}

impl Regularization {
    pub const ALL: [Regularization; 3] =
        [Regularization::LocalResponse, Regularization::BatchNorm, Regularization::None];

    pub fn name(&self) -> &'static str {
        match self {
            Regularization::LocalResponse => "local_response",
            Regularization::BatchNorm => "batch_norm",
            Regularization::None => "none",
        }
    }
}

/// The two hidden dense layers of the classification head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseHead {
    pub neurons: [usize; 2],
    pub dropout: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdParams {
    pub lr: f64,
    pub momentum: f64,
    pub decay: f64,
    pub nesterov: bool,
}

/// Per-channel clipping bounds used by normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl PixelBounds {
    /// The same bounds for every channel.
    pub fn uniform(min: f32, max: f32, channels: usize) -> Self {
        PixelBounds { min: vec![min; channels], max: vec![max; channels] }
    }

    pub fn channels(&self) -> usize {
        self.min.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.min.len() != self.max.len() || self.min.is_empty() {
            return Err(Error::hyperparameter(format!(
                "pixel bounds need one min and one max per channel, got {} and {}",
                self.min.len(),
                self.max.len()
            )));
        }
        for (c, (lo, hi)) in self.min.iter().zip(&self.max).enumerate() {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(Error::hyperparameter(format!(
                    "channel {c}: min_pixel {lo} must be below max_pixel {hi}"
                )));
            }
        }
        Ok(())
    }
}

/// Everything needed to build and train one network.
///
/// A record fully determines topology and training configuration: the
/// builder reads every field and applies no defaults of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterRecord {
    pub architecture: Architecture,
    pub blocks: Vec<ConvBlock>,
    pub regularization: Regularization,
    pub dense: DenseHead,
    pub optimizer: SgdParams,
    pub loss: LossType,
    pub activation_conv: ActivationFunction,
    pub activation_dense: ActivationFunction,
    pub batch_size: usize,
    #[serde(default)]
    pub augmentation: Option<AugmentationParams>,
    #[serde(default)]
    pub pixel_bounds: Option<PixelBounds>,
}

impl HyperparameterRecord {
    /// The fixed base model for `architecture`: AlexNet-style blocks, SGD
    /// with lr 1e-4 and momentum 0.9, cross-entropy, relu/tanh, a 4096/4096
    /// head with dropout 0.5 and batch normalization.
    pub fn base(architecture: Architecture) -> Self {
        HyperparameterRecord {
            architecture,
            blocks: architecture.default_blocks(),
            regularization: Regularization::BatchNorm,
            dense: DenseHead { neurons: [4096, 4096], dropout: [0.5, 0.5] },
            optimizer: SgdParams { lr: 1e-4, momentum: 0.9, decay: 0.0, nesterov: false },
            loss: LossType::CategoricalCrossentropy,
            activation_conv: ActivationFunction::Relu,
            activation_dense: ActivationFunction::Tanh,
            batch_size: 32,
            augmentation: None,
            pixel_bounds: None,
        }
    }

    /// Range and choice checks. Run on construction by the search space and
    /// again by the builder.
    pub fn validate(&self) -> Result<()> {
        let depth = self.architecture.depth();
        if self.blocks.len() != depth {
            return Err(Error::hyperparameter(format!(
                "{} expects {depth} convolution blocks, got {}",
                self.architecture,
                self.blocks.len()
            )));
        }
        for (i, b) in self.blocks.iter().enumerate() {
            let n = i + 1;
            if b.filters == 0 || b.kernel_size == 0 || b.stride == 0 {
                return Err(Error::hyperparameter(format!(
                    "block {n}: filters, kernel size and stride must be positive"
                )));
            }
            if b.pooling != PoolingType::None && (b.pool_size == 0 || b.pool_stride == 0) {
                return Err(Error::hyperparameter(format!(
                    "block {n}: pool size and pool stride must be positive"
                )));
            }
        }
        for (i, (&n, &d)) in self.dense.neurons.iter().zip(&self.dense.dropout).enumerate() {
            if n == 0 {
                return Err(Error::hyperparameter(format!("dense layer {} has no neurons", i + 1)));
            }
            if !(0.0..1.0).contains(&d) {
                return Err(Error::hyperparameter(format!(
                    "dropout {} must be in [0, 1), got {d}",
                    i + 1
                )));
            }
        }
        let opt = &self.optimizer;
        if !(opt.lr.is_finite() && opt.lr > 0.0) {
            return Err(Error::hyperparameter(format!("learning rate must be positive, got {}", opt.lr)));
        }
        if !(0.0..=1.0).contains(&opt.momentum) {
            return Err(Error::hyperparameter(format!("momentum must be in [0, 1], got {}", opt.momentum)));
        }
        if !(opt.decay.is_finite() && opt.decay >= 0.0) {
            return Err(Error::hyperparameter(format!("decay must be non-negative, got {}", opt.decay)));
        }
        if self.batch_size == 0 {
            return Err(Error::hyperparameter("batch size must be at least 1"));
        }
        if matches!(self.activation_conv, ActivationFunction::Softmax)
            || matches!(self.activation_dense, ActivationFunction::Softmax)
        {
            return Err(Error::hyperparameter("softmax is reserved for the output layer"));
        }
        if let Some(aug) = &self.augmentation {
            aug.validate()?;
        }
        if let Some(bounds) = &self.pixel_bounds {
            bounds.validate()?;
        }
        Ok(())
    }

    /// Flattens the record into named values for the trial history.
    pub fn to_params(&self) -> BTreeMap<String, ParamValue> {
        let mut p = BTreeMap::new();
        p.insert("architecture".into(), ParamValue::Int(self.architecture.depth() as i64));
        p.insert("batch_size".into(), ParamValue::Int(self.batch_size as i64));
        p.insert("lr".into(), ParamValue::Float(self.optimizer.lr));
        p.insert("momentum".into(), ParamValue::Float(self.optimizer.momentum));
        p.insert("decay".into(), ParamValue::Float(self.optimizer.decay));
        p.insert("nesterov".into(), ParamValue::Bool(self.optimizer.nesterov));
        p.insert("loss".into(), ParamValue::Choice(self.loss.name().into()));
        p.insert("activation_conv".into(), ParamValue::Choice(self.activation_conv.name().into()));
        p.insert("activation_dense".into(), ParamValue::Choice(self.activation_dense.name().into()));
        p.insert("regularization".into(), ParamValue::Choice(self.regularization.name().into()));

        for (i, b) in self.blocks.iter().enumerate() {
            let n = i + 1;
            p.insert(format!("filter_{n}"), ParamValue::Int(b.filters as i64));
            p.insert(format!("filter_size_{n}"), ParamValue::Int(b.kernel_size as i64));
            p.insert(format!("strides_{n}"), ParamValue::Int(b.stride as i64));
            p.insert(format!("pooling_{n}"), ParamValue::Choice(b.pooling.name().into()));
            p.insert(format!("pool_size_{n}"), ParamValue::Int(b.pool_size as i64));
            p.insert(format!("pool_stride_{n}"), ParamValue::Int(b.pool_stride as i64));
        }
        for i in 0..2 {
            p.insert(format!("dense_neurons_{}", i + 1), ParamValue::Int(self.dense.neurons[i] as i64));
            p.insert(format!("dropout_{}", i + 1), ParamValue::Float(self.dense.dropout[i] as f64));
        }

        if let Some(aug) = &self.augmentation {
            p.insert("batch".into(), ParamValue::Int(aug.batch as i64));
            p.insert("width_shift".into(), ParamValue::Float(aug.width_shift as f64));
            p.insert("height_shift".into(), ParamValue::Float(aug.height_shift as f64));
            p.insert("horizontal".into(), ParamValue::Bool(aug.horizontal));
            p.insert("vertical".into(), ParamValue::Bool(aug.vertical));
            p.insert("rotation".into(), ParamValue::Bool(aug.rotation));
            p.insert("image_size".into(), ParamValue::Int(aug.image_size as i64));
            p.insert("mask_count".into(), ParamValue::Int(aug.mask_count as i64));
            p.insert("mask_size".into(), ParamValue::Int(aug.mask_size as i64));
        }
        if let Some(bounds) = &self.pixel_bounds {
            for (c, max) in bounds.max.iter().enumerate() {
                p.insert(format!("max_pixel_{}", c + 1), ParamValue::Float(*max as f64));
            }
        }
        p
    }

    /// Serializes the record to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a record from a JSON file written by `save_json` and
    /// validates it.
    pub fn load_json(path: impl AsRef<Path>) -> Result<HyperparameterRecord> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let record: HyperparameterRecord = serde_json::from_reader(reader)?;
        record.validate()?;
        Ok(record)
    }
}
