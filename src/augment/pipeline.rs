use log::debug;

use crate::augment::augmentation::{resize_sample, Augmenter};
use crate::data::{create_training_set, create_validation_set, ImageSample, LabeledDataset, PreparedData, ValidationSet};
use crate::error::Result;
use crate::math::{seeded_rng, RngStream};
use crate::network::spec::{HyperparameterRecord, PixelBounds};

/// Settings that stay fixed across trials.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub img_num_channels: usize,
    pub normalize: bool,
    /// Bounds used when the record carries none.
    pub bounds: PixelBounds,
    /// Trim the other class to the augmented blob count.
    pub balance_val: bool,
}

/// Tensors for one fit plus the transform that produced them, so new images
/// can be prepared identically.
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    pub train: PreparedData,
    pub validation: Option<PreparedData>,
    pub normalization: Option<PixelBounds>,
    pub image_size: Option<usize>,
}

/// Normalization bounds in effect for `record`. Searched pixel bounds force
/// normalization on.
pub fn effective_normalization(record: &HyperparameterRecord, options: &PipelineOptions) -> Option<PixelBounds> {
    match &record.pixel_bounds {
        Some(bounds) => Some(bounds.clone()),
        None if options.normalize => Some(options.bounds.clone()),
        None => None,
    }
}

fn resize_all(images: &[ImageSample], size: usize) -> Result<Vec<ImageSample>> {
    images.iter().map(|s| resize_sample(s, size)).collect()
}

/// Builds the training and validation tensors for `record`. Used by every
/// search trial and by the final fit so both see the same data path.
///
/// With augmentation the blob class is expanded `batch` times, the other
/// class is optionally trimmed to match and every remaining image
/// (validation included) is brought to the augmented image size.
pub fn prepare_split(
    data: &LabeledDataset,
    validation: &ValidationSet,
    record: &HyperparameterRecord,
    options: &PipelineOptions,
    seed: u64,
) -> Result<PreparedSplit> {
    let normalization = effective_normalization(record, options);

    let (train, val, image_size) = match &record.augmentation {
        Some(params) => {
            let augmenter = Augmenter::new(params.clone())?;
            let mut rng = seeded_rng(seed, RngStream::Augment);
            let blob = augmenter.augment(&data.blob, &mut rng)?;

            let other_count = if options.balance_val { blob.len().min(data.other.len()) } else { data.other.len() };
            let other = resize_all(&data.other[..other_count], params.image_size)?;

            let val = ValidationSet {
                blob: validation.blob.as_deref().map(|v| resize_all(v, params.image_size)).transpose()?,
                other: validation.other.as_deref().map(|v| resize_all(v, params.image_size)).transpose()?,
            };
            debug!(
                "augmented {} blob images into {} at {}px; {} other images",
                data.blob.len(),
                blob.len(),
                params.image_size,
                other.len()
            );
            let train = create_training_set(&blob, &other, options.img_num_channels, normalization.as_ref(), seed)?;
            (train, create_validation_set(&val, options.img_num_channels, normalization.as_ref())?, Some(params.image_size))
        }
        None => {
            let train =
                create_training_set(&data.blob, &data.other, options.img_num_channels, normalization.as_ref(), seed)?;
            (train, create_validation_set(validation, options.img_num_channels, normalization.as_ref())?, None)
        }
    };

    Ok(PreparedSplit { train, validation: val, normalization, image_size })
}
