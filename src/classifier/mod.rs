pub mod config;
pub mod facade;
pub mod persist;
pub mod predict;

pub use config::{ClassifierConfig, SamplerKind};
pub use facade::{Classifier, ClassifierState, HistoryPoint};
pub use persist::{LoadReport, MODEL_DIR};
pub use predict::{label_predictions, predict_samples, prepare_input, Prediction};
