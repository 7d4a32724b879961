//! On-the-fly data augmentation for one class of images.
//!
//! Every synthetic sample is produced by a single [`Transform`] shared by all
//! of its channels, so multi-band images stay co-registered after shifting,
//! flipping, rotating, cropping and erasing.

use ndarray::{Array2, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::augment::transforms::{fit_to_size, median, Transform};
use crate::data::{stack_channels, ImageSample};
use crate::error::{Error, Result};

/// Sampled augmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationParams {
    /// Synthetic samples generated per source image.
    pub batch: usize,
    /// Maximum shift as a fraction of the width.
    pub width_shift: f32,
    /// Maximum shift as a fraction of the height.
    pub height_shift: f32,
    pub horizontal: bool,
    pub vertical: bool,
    pub rotation: bool,
    /// Side length of the output images.
    pub image_size: usize,
    /// Number of random erase squares (0 disables erasing).
    #[serde(default)]
    pub mask_count: usize,
    #[serde(default)]
    pub mask_size: usize,
}

impl Default for AugmentationParams {
    fn default() -> Self {
        AugmentationParams {
            batch: 10,
            width_shift: 0.0,
            height_shift: 0.0,
            horizontal: true,
            vertical: true,
            rotation: true,
            image_size: 50,
            mask_count: 0,
            mask_size: 0,
        }
    }
}

impl AugmentationParams {
    pub fn validate(&self) -> Result<()> {
        if self.batch == 0 {
            return Err(Error::hyperparameter("augmentation batch must be at least 1"));
        }
        if self.image_size == 0 {
            return Err(Error::hyperparameter("augmentation image_size must be positive"));
        }
        for (name, v) in [("width_shift", self.width_shift), ("height_shift", self.height_shift)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::hyperparameter(format!("{name} must be in [0, 1], got {v}")));
            }
        }
        if self.mask_count > 0 && (self.mask_size == 0 || self.mask_size > self.image_size) {
            return Err(Error::hyperparameter(format!(
                "mask_size {} must be in [1, image_size {}] when erasing",
                self.mask_size, self.image_size
            )));
        }
        Ok(())
    }
}

/// Applies random augmentations to whole classes.
#[derive(Debug, Clone)]
pub struct Augmenter {
    params: AugmentationParams,
}

impl Augmenter {
    pub fn new(params: AugmentationParams) -> Result<Self> {
        params.validate()?;
        Ok(Augmenter { params })
    }

    pub fn params(&self) -> &AugmentationParams {
        &self.params
    }

    /// `batch` synthetic samples per input image, in input order. Repeated
    /// calls with the same generator state continue its stream, so they
    /// return different images.
    pub fn augment<R: Rng + ?Sized>(&self, images: &[ImageSample], rng: &mut R) -> Result<Vec<ImageSample>> {
        let mut out = Vec::with_capacity(images.len() * self.params.batch);
        for image in images {
            for _ in 0..self.params.batch {
                out.push(self.augment_one(image, rng)?);
            }
        }
        Ok(out)
    }

    /// Augments one to three separately stored channel collections. Entry
    /// `i` of every collection is treated as one sample.
    pub fn augment_channels<R: Rng + ?Sized>(
        &self,
        channels: &[&[Array2<f32>]],
        rng: &mut R,
    ) -> Result<Vec<ImageSample>> {
        if channels.is_empty() || channels.len() > 3 {
            return Err(Error::config(format!("between one and three channels are supported, got {}", channels.len())));
        }
        let n = channels[0].len();
        if channels.iter().any(|c| c.len() != n) {
            return Err(Error::shape("every channel collection must hold the same number of images"));
        }
        let samples = (0..n)
            .map(|i| {
                let planes: Vec<Array2<f32>> = channels.iter().map(|c| c[i].clone()).collect();
                stack_channels(&planes)
            })
            .collect::<Result<Vec<_>>>()?;
        self.augment(&samples, rng)
    }

    fn augment_one<R: Rng + ?Sized>(&self, image: &ImageSample, rng: &mut R) -> Result<ImageSample> {
        let (h, w, c) = image.dim();
        let size = self.params.image_size;
        let transform = Transform::draw(&self.params, h, w, rng);

        let mut out = Array3::<f32>::zeros((size, size, c));
        for (ch, plane) in image.axis_iter(Axis(2)).enumerate() {
            let warped = transform.warp(&plane);
            let mut fitted = fit_to_size(&warped.view(), size)?;
            if !transform.erase.is_empty() {
                let fill = median(&fitted);
                transform.erase(&mut fitted, self.params.mask_size, fill);
            }
            out.index_axis_mut(Axis(2), ch).assign(&fitted);
        }
        Ok(out)
    }
}

/// Crops or resizes every channel of `sample` to `size` x `size`.
pub fn resize_sample(sample: &ImageSample, size: usize) -> Result<ImageSample> {
    let (h, w, c) = sample.dim();
    if h == size && w == size {
        return Ok(sample.clone());
    }
    let mut out = Array3::<f32>::zeros((size, size, c));
    for (ch, plane) in sample.axis_iter(Axis(2)).enumerate() {
        out.index_axis_mut(Axis(2), ch).assign(&fit_to_size(&plane, size)?);
    }
    Ok(out)
}
