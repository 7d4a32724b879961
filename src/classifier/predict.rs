use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};

use crate::augment::resize_sample;
use crate::data::{process_class, ImageSample, TARGET_INDEX};
use crate::error::{Error, Result};
use crate::network::{argmax_rows, ModelMetadata, Network};

/// Class decision for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label`, when requested.
    pub probability: Option<f64>,
}

/// Brings new samples to the size and scale the network was trained on.
pub fn prepare_input(samples: &[ImageSample], metadata: &ModelMetadata) -> Result<Array4<f32>> {
    if samples.is_empty() {
        return Err(Error::shape("nothing to predict"));
    }
    let resized: Vec<ImageSample> = match metadata.image_size {
        Some(size) => samples.iter().map(|s| resize_sample(s, size)).collect::<Result<_>>()?,
        None => samples.to_vec(),
    };
    let bounds = if metadata.normalize { metadata.pixel_bounds.as_ref() } else { None };
    // The label column is discarded.
    Ok(process_class(&resized, TARGET_INDEX, metadata.img_num_channels, bounds)?.x)
}

/// Maps each probability row to its most likely label.
pub fn label_predictions(proba: &Array2<f32>, labels: &[String], return_proba: bool) -> Result<Vec<Prediction>> {
    if proba.ncols() != labels.len() {
        return Err(Error::shape(format!(
            "network has {} outputs but {} labels are known",
            proba.ncols(),
            labels.len()
        )));
    }
    Ok(argmax_rows(proba)
        .into_iter()
        .enumerate()
        .map(|(row, class)| Prediction {
            label: labels[class].clone(),
            probability: return_proba.then(|| proba[[row, class]] as f64),
        })
        .collect())
}

/// Prepares `samples`, runs the network and labels the result.
pub fn predict_samples(
    network: &mut Network,
    metadata: &ModelMetadata,
    samples: &[ImageSample],
    return_proba: bool,
) -> Result<Vec<Prediction>> {
    let x = prepare_input(samples, metadata)?;
    let proba = network.predict_proba(&x)?;
    label_predictions(&proba, &metadata.output_labels, return_proba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::from_2d;
    use crate::network::PixelBounds;
    use ndarray::array;

    fn metadata(image_size: Option<usize>) -> ModelMetadata {
        ModelMetadata {
            description: None,
            output_labels: vec!["DIFFUSE".into(), "OTHER".into()],
            img_num_channels: 1,
            image_size,
            normalize: true,
            pixel_bounds: Some(PixelBounds::uniform(0.0, 100.0, 1)),
        }
    }

    #[test]
    fn input_is_cropped_and_scaled() {
        let sample = from_2d(Array2::from_elem((10, 10), 250.0));
        let x = prepare_input(&[sample], &metadata(Some(6))).unwrap();
        assert_eq!(x.dim(), (1, 6, 6, 1));
        assert!(x.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let sample = ImageSample::zeros((4, 4, 3));
        assert!(matches!(prepare_input(&[sample], &metadata(None)), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn labels_follow_the_larger_probability() {
        let proba = array![[0.8f32, 0.2], [0.3, 0.7]];
        let labels = metadata(None).output_labels;
        let out = label_predictions(&proba, &labels, true).unwrap();
        assert_eq!(out[0].label, "DIFFUSE");
        assert_eq!(out[1].label, "OTHER");
        assert!((out[1].probability.unwrap() - 0.7).abs() < 1e-6);
        assert!(label_predictions(&proba, &labels, false).unwrap()[0].probability.is_none());
    }
}
