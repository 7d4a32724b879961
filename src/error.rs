//! Error types for the blob-nn crate.

use thiserror::Error;

/// Top-level error type for data preparation, model building, training,
/// search and catalog operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("Network build error: {0}")]
    Build(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("The model has not been created, run create() or load() first")]
    ModelNotCreated,

    #[error("Invalid aperture: {0}")]
    InvalidAperture(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Artifact directory already exists: {0} (set overwrite to replace it)")]
    ArtifactExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn hyperparameter(msg: impl Into<String>) -> Self {
        Self::InvalidHyperparameter(msg.into())
    }

    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn aperture(msg: impl Into<String>) -> Self {
        Self::InvalidAperture(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
