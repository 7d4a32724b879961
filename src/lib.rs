pub mod activation;
pub mod augment;
pub mod catalog;
pub mod classifier;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod math;
pub mod network;
pub mod optim;
pub mod search;
pub mod train;

// Convenience re-exports
pub use catalog::{create_catalog, Catalog, CatalogConfig};
pub use classifier::{Classifier, ClassifierConfig, ClassifierState, LoadReport, Prediction};
pub use data::{ImageSample, LabeledDataset, ValidationSet};
pub use error::{Error, Result};
pub use network::{build_network, Architecture, HyperparameterRecord, ModelMetadata, Network};
pub use search::{Study, TrialResult, TrialState};
pub use train::{fit, Metric, TrainConfig, TrainingHistory};
