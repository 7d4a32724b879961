use ndarray::{Array2, Array3, Axis};

use crate::error::{Error, Result};

/// One object's imagery as (H, W, C).
pub type ImageSample = Array3<f32>;

/// One-hot column of the target ("blob"/diffuse) class.
pub const TARGET_INDEX: usize = 0;
/// One-hot column of the "other" class.
pub const OTHER_INDEX: usize = 1;

/// Promotes a single-channel 2-D image to (H, W, 1).
pub fn from_2d(image: Array2<f32>) -> ImageSample {
    image.insert_axis(Axis(2))
}

/// Stacks co-registered 2-D channels into one (H, W, C) sample.
pub fn stack_channels(channels: &[Array2<f32>]) -> Result<ImageSample> {
    let first = channels
        .first()
        .ok_or_else(|| Error::shape("cannot stack zero channels"))?;
    let (h, w) = first.dim();
    if let Some(bad) = channels.iter().find(|c| c.dim() != (h, w)) {
        return Err(Error::shape(format!(
            "channel of shape {:?} does not match {:?}",
            bad.dim(),
            (h, w)
        )));
    }
    Ok(Array3::from_shape_fn((h, w, channels.len()), |(i, j, c)| channels[c][[i, j]]))
}

/// The two training classes. Order matters: `blob` carries label 0.
#[derive(Debug, Clone, Default)]
pub struct LabeledDataset {
    pub blob: Vec<ImageSample>,
    pub other: Vec<ImageSample>,
}

impl LabeledDataset {
    pub fn new(blob: Vec<ImageSample>, other: Vec<ImageSample>) -> Self {
        LabeledDataset { blob, other }
    }

    pub fn len(&self) -> usize {
        self.blob.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caller-supplied held-out images. Either class may be absent; labels are
/// assigned from which field a sample sits in, never inferred.
#[derive(Debug, Clone, Default)]
pub struct ValidationSet {
    pub blob: Option<Vec<ImageSample>>,
    pub other: Option<Vec<ImageSample>>,
}

impl ValidationSet {
    pub fn is_empty(&self) -> bool {
        self.blob.as_ref().map_or(true, Vec::is_empty) && self.other.as_ref().map_or(true, Vec::is_empty)
    }
}

/// Crops the central `size` x `size` window of a sample.
pub fn center_crop(sample: &ImageSample, size: usize) -> Result<ImageSample> {
    let (h, w, _) = sample.dim();
    if size == 0 || size > h || size > w {
        return Err(Error::shape(format!("cannot crop {size}x{size} from a {h}x{w} image")));
    }
    let top = (h - size) / 2;
    let left = (w - size) / 2;
    Ok(sample
        .slice(ndarray::s![top..top + size, left..left + size, ..])
        .to_owned())
}
