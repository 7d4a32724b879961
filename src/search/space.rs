//! The declared search space: which hyperparameters are sampled, their
//! ranges, and how a set of sampled values becomes a
//! [`HyperparameterRecord`].

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::augment::AugmentationParams;
use crate::error::{Error, Result};
use crate::layers::PoolingType;
use crate::loss::LossType;
use crate::network::{Architecture, HyperparameterRecord, PixelBounds, Regularization, TopologyStrategy};

/// One sampled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Choice(String),
}

impl ParamValue {
    /// Numeric view used by importance estimation; `None` for choices.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Choice(_) => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Choice(s) => f.write_str(s),
        }
    }
}

/// Allowed values of one hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamDistribution {
    /// `low, low + step, …` up to `high` inclusive.
    Int { low: i64, high: i64, step: i64 },
    Float { low: f64, high: f64, log: bool },
    Categorical(Vec<ParamValue>),
}

impl ParamDistribution {
    pub fn int(low: i64, high: i64, step: i64) -> Self {
        ParamDistribution::Int { low, high, step: step.max(1) }
    }

    pub fn float(low: f64, high: f64) -> Self {
        ParamDistribution::Float { low, high, log: false }
    }

    pub fn log_float(low: f64, high: f64) -> Self {
        ParamDistribution::Float { low, high, log: true }
    }

    pub fn boolean() -> Self {
        ParamDistribution::Categorical(vec![ParamValue::Bool(true), ParamValue::Bool(false)])
    }

    pub fn choices<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        ParamDistribution::Categorical(names.into_iter().map(|n| ParamValue::Choice(n.to_string())).collect())
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let ok = match self {
            ParamDistribution::Int { low, high, step } => low <= high && *step > 0,
            ParamDistribution::Float { low, high, log } => {
                low.is_finite() && high.is_finite() && low <= high && (!log || *low > 0.0)
            }
            ParamDistribution::Categorical(c) => !c.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::config(format!("invalid search range for '{name}': {self:?}")))
        }
    }

    /// Largest grid value not above `high`.
    fn int_top(low: i64, high: i64, step: i64) -> i64 {
        low + (high - low) / step * step
    }

    /// Uniform draw over the allowed values.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            ParamDistribution::Int { low, high, step } => {
                let slots = (high - low) / step;
                ParamValue::Int(low + rng.gen_range(0..=slots) * step)
            }
            ParamDistribution::Float { .. } => {
                let (lo, hi) = self.internal_bounds();
                let u = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
                self.from_internal(u)
            }
            ParamDistribution::Categorical(c) => c[rng.gen_range(0..c.len())].clone(),
        }
    }

    /// Bounds of the continuous representation used by the TPE sampler.
    pub fn internal_bounds(&self) -> (f64, f64) {
        match self {
            ParamDistribution::Int { low, high, step } => {
                // Half a step of slack so the end points are as likely as the rest.
                let half = *step as f64 / 2.0;
                (*low as f64 - half, Self::int_top(*low, *high, *step) as f64 + half)
            }
            ParamDistribution::Float { low, high, log: true } => (low.ln(), high.ln()),
            ParamDistribution::Float { low, high, .. } => (*low, *high),
            ParamDistribution::Categorical(c) => (0.0, c.len() as f64 - 1.0),
        }
    }

    /// Continuous representation of `value`; category index for choices.
    pub fn to_internal(&self, value: &ParamValue) -> Option<f64> {
        match (self, value) {
            (ParamDistribution::Int { .. }, ParamValue::Int(i)) => Some(*i as f64),
            (ParamDistribution::Float { log: true, .. }, ParamValue::Float(f)) if *f > 0.0 => Some(f.ln()),
            (ParamDistribution::Float { log: false, .. }, ParamValue::Float(f)) => Some(*f),
            (ParamDistribution::Categorical(c), v) => c.iter().position(|x| x == v).map(|i| i as f64),
            _ => None,
        }
    }

    /// Inverse of [`to_internal`](Self::to_internal), snapped to the grid
    /// and clamped into range.
    pub fn from_internal(&self, x: f64) -> ParamValue {
        match self {
            ParamDistribution::Int { low, high, step } => {
                let top = Self::int_top(*low, *high, *step);
                let k = ((x - *low as f64) / *step as f64).round() as i64;
                ParamValue::Int((low + k * step).clamp(*low, top))
            }
            ParamDistribution::Float { low, high, log } => {
                let v = if *log { x.exp() } else { x };
                ParamValue::Float(v.clamp(*low, *high))
            }
            ParamDistribution::Categorical(c) => {
                let i = (x.round().max(0.0) as usize).min(c.len() - 1);
                c[i].clone()
            }
        }
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParamDistribution::Int { low, high, step }, ParamValue::Int(i)) => {
                i >= low && i <= high && (i - low) % step == 0
            }
            (ParamDistribution::Float { low, high, .. }, ParamValue::Float(f)) => f >= low && f <= high,
            (ParamDistribution::Categorical(c), v) => c.contains(v),
            _ => false,
        }
    }
}

/// Inclusive integer range with a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub low: usize,
    pub high: usize,
    pub step: usize,
}

impl IntRange {
    pub const fn new(low: usize, high: usize, step: usize) -> Self {
        IntRange { low, high, step }
    }

    fn distribution(&self) -> ParamDistribution {
        ParamDistribution::int(self.low as i64, self.high as i64, self.step as i64)
    }
}

/// Ranges of the architecture and augmentation parameters plus a cap on
/// network size. The defaults are the standard search ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    pub filters: IntRange,
    pub dense_neurons: IntRange,
    pub augmentation_batch: IntRange,
    /// Maximum shift in pixels of the source image.
    pub max_shift: usize,
    pub mask_count: IntRange,
    pub mask_size: IntRange,
    /// Trials whose network would exceed this many parameters fail before
    /// any weight is allocated.
    pub max_parameters: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            filters: IntRange::new(12, 512, 12),
            dense_neurons: IntRange::new(128, 4096, 128),
            augmentation_batch: IntRange::new(1, 250, 1),
            max_shift: 25,
            mask_count: IntRange::new(0, 3, 1),
            mask_size: IntRange::new(4, 16, 1),
            max_parameters: 100_000_000,
        }
    }
}

/// Everything the search driver needs to sample and materialize records.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    pub architecture: Architecture,
    /// Sample optimizer, loss, activations and per-block topology.
    pub opt_model: bool,
    /// Sample augmentation parameters.
    pub opt_aug: bool,
    pub batch_size: IntRange,
    pub image_size: IntRange,
    /// Range of the searched upper normalization bound, if any.
    pub max_pixel: Option<(f64, f64)>,
    pub img_num_channels: usize,
    /// Side length of the source images, used to turn shifts into fractions.
    pub source_size: usize,
    pub limits: SearchLimits,
}

impl SearchSpace {
    /// Names and distributions of every sampled parameter, in sampling
    /// order.
    pub fn distributions(&self) -> Vec<(String, ParamDistribution)> {
        let mut d: Vec<(String, ParamDistribution)> = Vec::new();
        let mut add = |name: String, dist: ParamDistribution| d.push((name, dist));

        if self.opt_model {
            add("batch_size".into(), self.batch_size.distribution());
            add("lr".into(), ParamDistribution::log_float(1e-6, 0.1));
            add("momentum".into(), ParamDistribution::float(0.0, 1.0));
            add("decay".into(), ParamDistribution::float(0.0, 0.1));
            add("nesterov".into(), ParamDistribution::boolean());
            add("loss".into(), ParamDistribution::choices(LossType::ALL.iter().map(LossType::name)));
            let acts = || ParamDistribution::choices(ActivationFunction::SEARCHABLE.iter().map(ActivationFunction::name));
            add("activation_conv".into(), acts());
            add("activation_dense".into(), acts());
            add("regularization".into(), ParamDistribution::choices(Regularization::ALL.iter().map(Regularization::name)));

            for n in 1..=self.architecture.depth() {
                add(format!("filter_{n}"), self.limits.filters.distribution());
                add(format!("filter_size_{n}"), ParamDistribution::int(1, 11, 2));
                add(format!("strides_{n}"), ParamDistribution::int(1, if n == 1 { 4 } else { 2 }, 1));
                add(format!("pooling_{n}"), ParamDistribution::choices(PoolingType::ALL.iter().map(PoolingType::name)));
                add(format!("pool_size_{n}"), ParamDistribution::int(1, 7, 2));
                add(format!("pool_stride_{n}"), ParamDistribution::int(1, 4, 1));
            }
            for n in 1..=2 {
                add(format!("dense_neurons_{n}"), self.limits.dense_neurons.distribution());
                add(format!("dropout_{n}"), ParamDistribution::float(0.0, 0.5));
            }
        }

        if self.opt_aug {
            add("batch".into(), self.limits.augmentation_batch.distribution());
            // A shift never exceeds the source image.
            let max_shift = self.limits.max_shift.min(self.source_size);
            add("shift".into(), ParamDistribution::int(0, max_shift as i64, 1));
            add("horizontal".into(), ParamDistribution::boolean());
            add("vertical".into(), ParamDistribution::boolean());
            add("rotation".into(), ParamDistribution::boolean());
            add("image_size".into(), self.image_size.distribution());
            add("mask_count".into(), self.limits.mask_count.distribution());
            add("mask_size".into(), self.limits.mask_size.distribution());
        }

        if let Some((lo, hi)) = self.max_pixel {
            add("max_pixel".into(), ParamDistribution::float(lo, hi));
        }
        d
    }

    pub fn validate(&self) -> Result<()> {
        for (name, dist) in self.distributions() {
            dist.validate(&name)?;
        }
        if self.opt_aug && self.image_size.low == 0 {
            return Err(Error::config("image_size_min must be positive"));
        }
        if self.opt_aug && self.limits.mask_size.high > self.image_size.low {
            return Err(Error::config(format!(
                "mask size may reach {} but image_size_min is {}",
                self.limits.mask_size.high, self.image_size.low
            )));
        }
        Ok(())
    }

    /// Materializes sampled `values` into a validated record. Parameters
    /// that are not searched keep their base-model values.
    pub fn build_record(&self, values: &BTreeMap<String, ParamValue>) -> Result<HyperparameterRecord> {
        let v = Values(values);
        let mut record = HyperparameterRecord::base(self.architecture);

        if self.opt_model {
            record.batch_size = v.int("batch_size")?;
            record.optimizer.lr = v.float("lr")?;
            record.optimizer.momentum = v.float("momentum")?;
            record.optimizer.decay = v.float("decay")?;
            record.optimizer.nesterov = v.boolean("nesterov")?;
            record.loss = v.pick("loss", &LossType::ALL, LossType::name)?;
            record.activation_conv = v.pick("activation_conv", &ActivationFunction::SEARCHABLE, ActivationFunction::name)?;
            record.activation_dense =
                v.pick("activation_dense", &ActivationFunction::SEARCHABLE, ActivationFunction::name)?;
            record.regularization = v.pick("regularization", &Regularization::ALL, Regularization::name)?;

            for (i, block) in record.blocks.iter_mut().enumerate() {
                let n = i + 1;
                block.filters = v.int(&format!("filter_{n}"))?;
                block.kernel_size = v.int(&format!("filter_size_{n}"))?;
                block.stride = v.int(&format!("strides_{n}"))?;
                block.pooling = v.pick(&format!("pooling_{n}"), &PoolingType::ALL, PoolingType::name)?;
                block.pool_size = v.int(&format!("pool_size_{n}"))?;
                block.pool_stride = v.int(&format!("pool_stride_{n}"))?;
            }
            for i in 0..2 {
                record.dense.neurons[i] = v.int(&format!("dense_neurons_{}", i + 1))?;
                record.dense.dropout[i] = v.float(&format!("dropout_{}", i + 1))? as f32;
            }
        }

        if self.opt_aug {
            let image_size: usize = v.int("image_size")?;
            let shift = v.int::<usize>("shift")? as f32 / self.source_size.max(1) as f32;
            record.augmentation = Some(AugmentationParams {
                batch: v.int("batch")?,
                width_shift: shift,
                height_shift: shift,
                horizontal: v.boolean("horizontal")?,
                vertical: v.boolean("vertical")?,
                rotation: v.boolean("rotation")?,
                image_size,
                mask_count: v.int("mask_count")?,
                mask_size: v.int("mask_size")?,
            });
        }

        if self.max_pixel.is_some() {
            let max = v.float("max_pixel")? as f32;
            record.pixel_bounds = Some(PixelBounds::uniform(0.0, max, self.img_num_channels));
        }

        record.validate()?;
        Ok(record)
    }
}

/// Typed lookups into a sampled value map.
struct Values<'a>(&'a BTreeMap<String, ParamValue>);

impl Values<'_> {
    fn get(&self, name: &str) -> Result<&ParamValue> {
        self.0
            .get(name)
            .ok_or_else(|| Error::search(format!("no value sampled for '{name}'")))
    }

    fn int<T: TryFrom<i64>>(&self, name: &str) -> Result<T> {
        match self.get(name)? {
            ParamValue::Int(i) => {
                T::try_from(*i).map_err(|_| Error::hyperparameter(format!("'{name}' is out of range: {i}")))
            }
            other => Err(Error::search(format!("'{name}' should be an integer, got {other}"))),
        }
    }

    fn float(&self, name: &str) -> Result<f64> {
        match self.get(name)? {
            ParamValue::Float(f) => Ok(*f),
            ParamValue::Int(i) => Ok(*i as f64),
            other => Err(Error::search(format!("'{name}' should be a number, got {other}"))),
        }
    }

    fn boolean(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            ParamValue::Bool(b) => Ok(*b),
            other => Err(Error::search(format!("'{name}' should be a flag, got {other}"))),
        }
    }

    fn pick<T: Copy>(&self, name: &str, all: &[T], label: impl Fn(&T) -> &'static str) -> Result<T> {
        let ParamValue::Choice(choice) = self.get(name)? else {
            return Err(Error::search(format!("'{name}' should be a choice")));
        };
        all.iter()
            .copied()
            .find(|t| label(t) == choice)
            .ok_or_else(|| Error::search(format!("'{choice}' is not a valid {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{seeded_rng, RngStream};

    fn space(opt_model: bool, opt_aug: bool) -> SearchSpace {
        SearchSpace {
            architecture: Architecture::Depth2,
            opt_model,
            opt_aug,
            batch_size: IntRange::new(10, 250, 1),
            image_size: IntRange::new(50, 90, 1),
            max_pixel: None,
            img_num_channels: 1,
            source_size: 100,
            limits: SearchLimits::default(),
        }
    }

    fn sample_all(space: &SearchSpace, seed: u64) -> BTreeMap<String, ParamValue> {
        let mut rng = seeded_rng(seed, RngStream::Sampler);
        space
            .distributions()
            .into_iter()
            .map(|(name, dist)| {
                let v = dist.sample_uniform(&mut rng);
                assert!(dist.contains(&v), "{name}: {v:?} outside {dist:?}");
                (name, v)
            })
            .collect()
    }

    #[test]
    fn full_space_materializes_valid_records() {
        let s = space(true, true);
        for seed in 0..20 {
            let record = s.build_record(&sample_all(&s, seed)).unwrap();
            assert_eq!(record.blocks.len(), 2);
            assert!(record.blocks.iter().all(|b| b.filters % 12 == 0 && b.kernel_size % 2 == 1));
            let aug = record.augmentation.unwrap();
            assert!((50..=90).contains(&aug.image_size));
            assert!(aug.width_shift <= 0.25);
        }
    }

    #[test]
    fn augmentation_only_keeps_base_model() {
        let s = space(false, true);
        let record = s.build_record(&sample_all(&s, 3)).unwrap();
        let base = HyperparameterRecord::base(Architecture::Depth2);
        assert_eq!(record.blocks, base.blocks);
        assert_eq!(record.optimizer, base.optimizer);
        assert!(record.augmentation.is_some());
        assert!(!s.distributions().iter().any(|(n, _)| n == "lr"));
    }

    #[test]
    fn augmentation_values_are_recorded_as_sampled() {
        let mut s = space(false, true);
        s.source_size = 10;
        assert!(s.distributions().iter().any(|(n, d)| n == "shift" && *d == ParamDistribution::int(0, 10, 1)));

        let mut values = sample_all(&s, 5);
        values.insert("shift".into(), ParamValue::Int(10));
        values.insert("mask_count".into(), ParamValue::Int(1));
        values.insert("mask_size".into(), ParamValue::Int(12));
        values.insert("image_size".into(), ParamValue::Int(60));
        let aug = s.build_record(&values).unwrap().augmentation.unwrap();
        assert_eq!(aug.width_shift, 1.0);
        assert_eq!(aug.mask_size, 12);

        // An erasing mask larger than the output image is rejected, not shrunk.
        values.insert("image_size".into(), ParamValue::Int(8));
        assert!(matches!(s.build_record(&values), Err(Error::InvalidHyperparameter(_))));
    }

    #[test]
    fn mask_sizes_beyond_the_smallest_image_are_a_config_error() {
        let mut s = space(false, true);
        s.image_size = IntRange::new(12, 40, 1);
        assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
        s.image_size = IntRange::new(16, 40, 1);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn searched_max_pixel_sets_bounds_from_zero() {
        let mut s = space(false, false);
        s.max_pixel = Some((1000.0, 2000.0));
        s.img_num_channels = 2;
        let mut values = BTreeMap::new();
        values.insert("max_pixel".to_string(), ParamValue::Float(1500.0));
        let bounds = s.build_record(&values).unwrap().pixel_bounds.unwrap();
        assert_eq!(bounds, PixelBounds::uniform(0.0, 1500.0, 2));
    }

    #[test]
    fn missing_or_mistyped_values_are_errors() {
        let s = space(true, false);
        assert!(matches!(s.build_record(&BTreeMap::new()), Err(Error::Search(_))));
        let mut values = sample_all(&s, 1);
        values.insert("loss".into(), ParamValue::Choice("hinge".into()));
        assert!(s.build_record(&values).is_err());
    }

    #[test]
    fn internal_representation_round_trips_on_grid() {
        let d = ParamDistribution::int(12, 512, 12);
        assert_eq!(d.internal_bounds(), (6.0, 510.0));
        assert_eq!(d.from_internal(d.to_internal(&ParamValue::Int(48)).unwrap()), ParamValue::Int(48));
        assert_eq!(d.from_internal(1e9), ParamValue::Int(504));

        let lr = ParamDistribution::log_float(1e-6, 0.1);
        let x = lr.to_internal(&ParamValue::Float(1e-3)).unwrap();
        match lr.from_internal(x) {
            ParamValue::Float(v) => assert!((v - 1e-3).abs() < 1e-12),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn param_values_deserialize_untagged() {
        let v: Vec<ParamValue> = serde_json::from_str(r#"[true, 3, 0.5, "relu"]"#).unwrap();
        assert_eq!(
            v,
            vec![ParamValue::Bool(true), ParamValue::Int(3), ParamValue::Float(0.5), ParamValue::Choice("relu".into())]
        );
    }
}
