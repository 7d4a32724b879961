pub mod batch_norm;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod lrn;
pub mod pooling;
pub mod tensor;

pub use batch_norm::BatchNorm;
pub use conv2d::Conv2d;
pub use dense::{Dense, Flatten};
pub use dropout::Dropout;
pub use lrn::LocalResponseNorm;
pub use pooling::{Pool2d, PoolingType};
pub use tensor::{ParamRef, Shape, Tensor};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One stage of a network. Serialized with its weights; forward caches are
/// rebuilt on the next forward pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "snake_case")]
pub enum Layer {
    Conv2d(Conv2d),
    Pool2d(Pool2d),
    BatchNorm(BatchNorm),
    LocalResponseNorm(LocalResponseNorm),
    Flatten(Flatten),
    Dense(Dense),
    Dropout(Dropout),
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Conv2d(_) => "conv2d",
            Layer::Pool2d(p) => match p.kind {
                PoolingType::Average => "average_pooling2d",
                _ => "max_pooling2d",
            },
            Layer::BatchNorm(_) => "batch_normalization",
            Layer::LocalResponseNorm(_) => "local_response_normalization",
            Layer::Flatten(_) => "flatten",
            Layer::Dense(_) => "dense",
            Layer::Dropout(_) => "dropout",
        }
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        match self {
            Layer::Conv2d(l) => l.output_shape(input),
            Layer::Pool2d(l) => l.output_shape(input),
            Layer::BatchNorm(l) => {
                let (_, _, c) = input.spatial("batch_normalization")?;
                if c != l.channels {
                    return Err(crate::error::Error::build(format!(
                        "batch normalization over {} channels placed after {c} channels",
                        l.channels
                    )));
                }
                Ok(input)
            }
            Layer::LocalResponseNorm(_) => {
                input.spatial("local_response_normalization")?;
                Ok(input)
            }
            Layer::Flatten(_) => Ok(Shape::Flat(input.size())),
            Layer::Dense(l) => match input {
                Shape::Flat(n) if n == l.input_size => Ok(Shape::Flat(l.size)),
                other => Err(crate::error::Error::build(format!(
                    "dense layer expects {} flat features, got {other}",
                    l.input_size
                ))),
            },
            Layer::Dropout(_) => Ok(input),
        }
    }

    pub fn param_count(&self) -> usize {
        match self {
            Layer::Conv2d(l) => l.param_count(),
            Layer::BatchNorm(l) => l.param_count(),
            Layer::Dense(l) => l.param_count(),
            _ => 0,
        }
    }

    /// Runs the layer on a batch. `training` enables dropout masks and
    /// batch statistics; `rng` is only drawn from by dropout.
    pub fn forward<R: Rng + ?Sized>(&mut self, x: Tensor, training: bool, rng: &mut R) -> Result<Tensor> {
        Ok(match self {
            Layer::Conv2d(l) => Tensor::Spatial(l.forward(x.into_spatial("conv2d")?)?),
            Layer::Pool2d(l) => Tensor::Spatial(l.forward(x.into_spatial("pooling")?)?),
            Layer::BatchNorm(l) => Tensor::Spatial(l.forward(x.into_spatial("batch_normalization")?, training)?),
            Layer::LocalResponseNorm(l) => {
                Tensor::Spatial(l.forward(x.into_spatial("local_response_normalization")?)?)
            }
            Layer::Flatten(l) => Tensor::Flat(l.forward(x.into_spatial("flatten")?)?),
            Layer::Dense(l) => Tensor::Flat(l.forward(x.into_flat("dense")?)?),
            Layer::Dropout(l) => Tensor::Flat(l.forward(x.into_flat("dropout")?, training, rng)),
        })
    }

    /// Propagates dL/d(output) to dL/d(input), storing parameter gradients.
    pub fn backward(&mut self, grad: Tensor) -> Result<Tensor> {
        Ok(match self {
            Layer::Conv2d(l) => Tensor::Spatial(l.backward(grad.into_spatial("conv2d")?)?),
            Layer::Pool2d(l) => Tensor::Spatial(l.backward(grad.into_spatial("pooling")?)?),
            Layer::BatchNorm(l) => Tensor::Spatial(l.backward(grad.into_spatial("batch_normalization")?)?),
            Layer::LocalResponseNorm(l) => {
                Tensor::Spatial(l.backward(grad.into_spatial("local_response_normalization")?)?)
            }
            Layer::Flatten(l) => Tensor::Spatial(l.backward(grad.into_flat("flatten")?)?),
            Layer::Dense(l) => Tensor::Flat(l.backward(grad.into_flat("dense")?)?),
            Layer::Dropout(l) => Tensor::Flat(l.backward(grad.into_flat("dropout")?)),
        })
    }

    /// Trainable parameters in a stable order, paired with their gradients.
    pub fn params(&mut self) -> Vec<ParamRef<'_>> {
        match self {
            Layer::Conv2d(l) => l.params(),
            Layer::BatchNorm(l) => l.params(),
            Layer::Dense(l) => l.params(),
            _ => Vec::new(),
        }
    }
}
