pub mod augmentation;
pub mod pipeline;
pub mod transforms;

pub use augmentation::{resize_sample, AugmentationParams, Augmenter};
pub use pipeline::{effective_normalization, prepare_split, PipelineOptions, PreparedSplit};
pub use transforms::Transform;
