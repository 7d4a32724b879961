//! Photometry catalog used to produce auxiliary features for each object.

pub mod aperture;
pub mod catalog;
pub mod detection;
pub mod morphology;

pub use aperture::{measure, ApertureMeasurement, ApertureRadii};
pub use catalog::{create_catalog, Catalog, CatalogConfig, CatalogEntry};
pub use detection::{detect_sources, label_components, sigma_clipped_stats, ClippedStats};
pub use morphology::{morphology, Morphology};
