pub mod builder;
pub mod metadata;
pub mod network;
pub mod spec;
pub mod topology;

pub use builder::{build_network, parameter_estimate, MIN_BATCH_NORM_BATCH, NUM_CLASSES};
pub use metadata::ModelMetadata;
pub use network::{argmax_rows, Network};
pub use spec::{ConvBlock, DenseHead, HyperparameterRecord, PixelBounds, Regularization, SgdParams};
pub use topology::{Architecture, TopologyStrategy};
