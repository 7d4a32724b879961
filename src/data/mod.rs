pub mod folds;
pub mod sample;
pub mod loader;
pub mod prepare;

pub use folds::{stratified_folds, Fold};
pub use sample::{
    center_crop, from_2d, stack_channels, ImageSample, LabeledDataset, ValidationSet, OTHER_INDEX, TARGET_INDEX,
};
pub use loader::{load_dir, load_image};
pub use prepare::{create_training_set, create_validation_set, normalize_sample, process_class, PreparedData};
