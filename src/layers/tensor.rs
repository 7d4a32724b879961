use ndarray::{Array2, Array4, ArrayViewD, ArrayViewMutD};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Batch of activations flowing between layers.
///
/// Convolution blocks exchange (N, H, W, C) tensors; everything after the
/// flatten layer exchanges (N, features) matrices.
#[derive(Debug, Clone)]
pub enum Tensor {
    Spatial(Array4<f32>),
    Flat(Array2<f32>),
}

impl Tensor {
    pub fn into_spatial(self, layer: &str) -> Result<Array4<f32>> {
        match self {
            Tensor::Spatial(x) => Ok(x),
            Tensor::Flat(x) => Err(Error::build(format!(
                "{layer} expects a (N, H, W, C) input but received a flat {:?} batch",
                x.dim()
            ))),
        }
    }

    pub fn into_flat(self, layer: &str) -> Result<Array2<f32>> {
        match self {
            Tensor::Flat(x) => Ok(x),
            Tensor::Spatial(x) => Err(Error::build(format!(
                "{layer} expects a flat (N, features) input but received a spatial {:?} batch",
                x.dim()
            ))),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Tensor::Spatial(x) => {
                let (_, h, w, c) = x.dim();
                Shape::Spatial { height: h, width: w, channels: c }
            }
            Tensor::Flat(x) => Shape::Flat(x.dim().1),
        }
    }
}

/// Per-sample shape of a layer's input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Spatial { height: usize, width: usize, channels: usize },
    Flat(usize),
}

impl Shape {
    pub fn size(&self) -> usize {
        match *self {
            Shape::Spatial { height, width, channels } => height * width * channels,
            Shape::Flat(n) => n,
        }
    }

    pub fn spatial(&self, layer: &str) -> Result<(usize, usize, usize)> {
        match *self {
            Shape::Spatial { height, width, channels } => Ok((height, width, channels)),
            Shape::Flat(n) => Err(Error::build(format!(
                "{layer} cannot follow a flat layer of width {n}"
            ))),
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Spatial { height, width, channels } => write!(f, "({height}, {width}, {channels})"),
            Shape::Flat(n) => write!(f, "({n})"),
        }
    }
}

/// A trainable parameter together with the gradient from the last backward
/// pass, both viewed as dynamic-dimensional arrays for the optimizer.
pub struct ParamRef<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
}
