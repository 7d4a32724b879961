use log::debug;
use ndarray::{s, Array2, Array4, Axis};
use rand::seq::SliceRandom;

use crate::data::sample::{ImageSample, ValidationSet, OTHER_INDEX, TARGET_INDEX};
use crate::error::{Error, Result};
use crate::layers::Shape;
use crate::math::{seeded_rng, RngStream};
use crate::network::spec::PixelBounds;
use crate::network::NUM_CLASSES;

/// Stacked samples and one-hot labels ready for the trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    /// (N, H, W, C)
    pub x: Array4<f32>,
    /// (N, 2)
    pub y: Array2<f32>,
}

impl PreparedData {
    pub fn len(&self) -> usize {
        self.x.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape of one sample, the network's input shape.
    pub fn sample_shape(&self) -> Shape {
        let (_, height, width, channels) = self.x.dim();
        Shape::Spatial { height, width, channels }
    }

    /// Class index of every sample.
    pub fn labels(&self) -> Vec<usize> {
        crate::network::argmax_rows(&self.y)
    }

    /// Copies the rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> PreparedData {
        PreparedData { x: self.x.select(Axis(0), indices), y: self.y.select(Axis(0), indices) }
    }

    pub fn concat(&self, other: &PreparedData) -> Result<PreparedData> {
        let x = ndarray::concatenate(Axis(0), &[self.x.view(), other.x.view()])
            .map_err(|e| Error::shape(format!("cannot combine sets: {e}")))?;
        let y = ndarray::concatenate(Axis(0), &[self.y.view(), other.y.view()])
            .map_err(|e| Error::shape(format!("cannot combine labels: {e}")))?;
        Ok(PreparedData { x, y })
    }
}

/// Per-channel min-max scaling: values are clipped to [min, max] at source,
/// rescaled linearly and clipped again to [0, 1]. Non-finite pixels map to 0.
pub fn normalize_sample(sample: &mut ImageSample, bounds: &PixelBounds) -> Result<()> {
    let channels = sample.dim().2;
    if bounds.channels() != channels {
        return Err(Error::shape(format!(
            "pixel bounds cover {} channels but the sample has {channels}",
            bounds.channels()
        )));
    }
    for (c, mut plane) in sample.axis_iter_mut(Axis(2)).enumerate() {
        let (lo, hi) = (bounds.min[c], bounds.max[c]);
        let span = hi - lo;
        plane.mapv_inplace(|v| {
            if !v.is_finite() {
                return 0.0;
            }
            ((v.clamp(lo, hi) - lo) / span).clamp(0.0, 1.0)
        });
    }
    Ok(())
}

/// Stacks one class into (N, H, W, C) with every sample labelled `label`.
pub fn process_class(
    images: &[ImageSample],
    label: usize,
    img_num_channels: usize,
    normalization: Option<&PixelBounds>,
) -> Result<PreparedData> {
    if label >= NUM_CLASSES {
        return Err(Error::config(format!("label must be 0 or 1, got {label}")));
    }
    let first = images.first().ok_or_else(|| Error::shape("a class needs at least one image"))?;
    let (h, w, c) = first.dim();
    if c != img_num_channels {
        return Err(Error::shape(format!(
            "img_num_channels is {img_num_channels} but images have {c} channels"
        )));
    }

    let mut x = Array4::<f32>::zeros((images.len(), h, w, c));
    for (i, img) in images.iter().enumerate() {
        if img.dim() != (h, w, c) {
            return Err(Error::shape(format!(
                "image {i} has shape {:?}, expected {:?}",
                img.dim(),
                (h, w, c)
            )));
        }
        match normalization {
            Some(bounds) => {
                let mut sample = img.clone();
                normalize_sample(&mut sample, bounds)?;
                x.slice_mut(s![i, .., .., ..]).assign(&sample);
            }
            None => x.slice_mut(s![i, .., .., ..]).assign(img),
        }
    }

    let mut y = Array2::<f32>::zeros((images.len(), NUM_CLASSES));
    y.column_mut(label).fill(1.0);
    Ok(PreparedData { x, y })
}

/// Combines both classes into one shuffled training tensor. The two classes
/// must share spatial dimensions and channel count.
pub fn create_training_set(
    blob: &[ImageSample],
    other: &[ImageSample],
    img_num_channels: usize,
    normalization: Option<&PixelBounds>,
    seed: u64,
) -> Result<PreparedData> {
    if let (Some(a), Some(b)) = (blob.first(), other.first()) {
        if a.dim() != b.dim() {
            return Err(Error::shape(format!(
                "blob images are {:?} but other images are {:?}",
                a.dim(),
                b.dim()
            )));
        }
    }
    let positive = process_class(blob, TARGET_INDEX, img_num_channels, normalization)?;
    let negative = process_class(other, OTHER_INDEX, img_num_channels, normalization)?;
    let combined = positive.concat(&negative)?;

    let mut order: Vec<usize> = (0..combined.len()).collect();
    order.shuffle(&mut seeded_rng(seed, RngStream::Shuffle));
    debug!("training set: {} blob + {} other samples", blob.len(), other.len());
    Ok(combined.select(&order))
}

/// Prepares the held-out set with the same transform as the training data.
/// Returns `None` when neither class was supplied.
pub fn create_validation_set(
    validation: &ValidationSet,
    img_num_channels: usize,
    normalization: Option<&PixelBounds>,
) -> Result<Option<PreparedData>> {
    let blob = match &validation.blob {
        Some(images) if !images.is_empty() => {
            Some(process_class(images, TARGET_INDEX, img_num_channels, normalization)?)
        }
        _ => None,
    };
    let other = match &validation.other {
        Some(images) if !images.is_empty() => {
            Some(process_class(images, OTHER_INDEX, img_num_channels, normalization)?)
        }
        _ => None,
    };
    match (blob, other) {
        (Some(a), Some(b)) => Ok(Some(a.concat(&b)?)),
        (a, b) => Ok(a.or(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::from_2d;
    use proptest::prelude::*;

    fn class(n: usize, value: f32, size: usize) -> Vec<ImageSample> {
        (0..n).map(|i| from_2d(Array2::from_elem((size, size), value + i as f32))).collect()
    }

    #[test]
    fn training_set_is_shuffled_and_one_hot() {
        let data = create_training_set(&class(5, 0.0, 4), &class(5, 100.0, 4), 1, None, 1909).unwrap();
        assert_eq!(data.x.dim(), (10, 4, 4, 1));
        assert_eq!(data.y.dim(), (10, 2));
        for (i, label) in data.labels().into_iter().enumerate() {
            let pixel = data.x[[i, 0, 0, 0]];
            assert_eq!(label, if pixel < 100.0 { 0 } else { 1 });
            assert_eq!(data.y.row(i).sum(), 1.0);
        }
        // Not simply blob-then-other.
        assert_ne!(data.labels(), vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn same_seed_same_order() {
        let a = create_training_set(&class(6, 0.0, 2), &class(6, 50.0, 2), 1, None, 3).unwrap();
        let b = create_training_set(&class(6, 0.0, 2), &class(6, 50.0, 2), 1, None, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn class_shape_mismatch_fails_fast() {
        let err = create_training_set(&class(2, 0.0, 4), &class(2, 0.0, 5), 1, None, 0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn validation_labels_follow_their_class() {
        let validation = ValidationSet { blob: None, other: Some(class(3, 10.0, 4)) };
        let val = create_validation_set(&validation, 1, None).unwrap().unwrap();
        assert_eq!(val.labels(), vec![1, 1, 1]);

        let validation = ValidationSet { blob: Some(class(2, 0.0, 4)), other: Some(class(1, 0.0, 4)) };
        let val = create_validation_set(&validation, 1, None).unwrap().unwrap();
        assert_eq!(val.labels(), vec![0, 0, 1]);

        assert!(create_validation_set(&ValidationSet::default(), 1, None).unwrap().is_none());
    }

    #[test]
    fn normalization_maps_bounds_to_unit_interval() {
        let mut s = from_2d(ndarray::array![[638.0f32, 1819.0], [3000.0, 5000.0]]);
        normalize_sample(&mut s, &PixelBounds::uniform(638.0, 3000.0, 1)).unwrap();
        assert_eq!(s[[0, 0, 0]], 0.0);
        assert!((s[[0, 1, 0]] - 0.5).abs() < 1e-6);
        assert_eq!(s[[1, 0, 0]], 1.0);
        assert_eq!(s[[1, 1, 0]], 1.0);
    }

    proptest! {
        #[test]
        fn normalized_values_stay_in_unit_interval(
            pixels in proptest::collection::vec(-1e7f32..1e7, 16),
            lo in -1e4f32..1e4,
            width in 1e-2f32..1e5,
        ) {
            let mut s = ImageSample::from_shape_vec((4, 4, 1), pixels).unwrap();
            normalize_sample(&mut s, &PixelBounds::uniform(lo, lo + width, 1)).unwrap();
            prop_assert!(s.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }
}
