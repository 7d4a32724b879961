use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::spec::PixelBounds;

/// Annotations stored next to a saved network so new images can be
/// prepared exactly like the training set.
///
/// All fields default so older artifacts deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    #[serde(default)]
    pub description: Option<String>,
    /// Class labels in output-unit order: target first, then other.
    #[serde(default)]
    pub output_labels: Vec<String>,
    #[serde(default)]
    pub img_num_channels: usize,
    /// Side length the network was trained on.
    #[serde(default)]
    pub image_size: Option<usize>,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default)]
    pub pixel_bounds: Option<PixelBounds>,
}

impl ModelMetadata {
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<ModelMetadata> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}
