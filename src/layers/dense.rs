use ndarray::{Array1, Array2, Axis, Ix2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::tensor::ParamRef;
use crate::math::Initializer;

/// Fully connected layer over a batch of rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub size: usize,
    pub input_size: usize,
    pub weights: Array2<f32>, // (input_size, size)
    pub biases: Array1<f32>,
    pub activator: ActivationFunction,

    #[serde(skip)]
    inputs: Array2<f32>,
    #[serde(skip)]
    pre_neurons: Array2<f32>, // pre-activation values (z = xW + b) needed for correct derivative
    #[serde(skip)]
    d_weights: Array2<f32>,
    #[serde(skip)]
    d_biases: Array1<f32>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Result<Dense> {
        if size == 0 || input_size == 0 {
            return Err(Error::build(format!("dense layer {input_size} -> {size} has a zero dimension")));
        }
        let weights = Initializer::truncated_normal()
            .init(&[input_size, size], input_size, rng)
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::build(format!("dense weights: {e}")))?;

        Ok(Dense {
            size,
            input_size,
            d_weights: Array2::zeros(weights.dim()),
            weights,
            biases: Array1::zeros(size),
            d_biases: Array1::zeros(size),
            activator: activation,
            inputs: Array2::zeros((0, input_size)),
            pre_neurons: Array2::zeros((0, size)),
        })
    }

    pub fn param_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    pub fn forward(&mut self, x: Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.input_size {
            return Err(Error::shape(format!(
                "dense layer expects {} features, got {}",
                self.input_size,
                x.ncols()
            )));
        }
        let z = x.dot(&self.weights) + &self.biases;
        let a = self.activator.apply_rows(&z);
        self.pre_neurons = z;
        self.inputs = x;
        Ok(a)
    }

    /// `grad` is dL/da for this layer (error in activation space). Stores the
    /// weight and bias gradients and returns dL/dx.
    pub fn backward(&mut self, grad: Array2<f32>) -> Result<Array2<f32>> {
        if grad.dim() != self.pre_neurons.dim() {
            return Err(Error::shape("dense gradient does not match the last forward pass"));
        }
        // Element-wise (Hadamard) product: delta = error * act'(z)
        let mut delta = grad;
        delta.zip_mut_with(&self.pre_neurons, |g, &z| *g *= self.activator.derivative(z));

        self.d_weights = self.inputs.t().dot(&delta);
        self.d_biases = delta.sum_axis(Axis(0));
        Ok(delta.dot(&self.weights.t()))
    }

    pub fn params(&mut self) -> Vec<ParamRef<'_>> {
        vec![
            ParamRef { value: self.weights.view_mut().into_dyn(), grad: self.d_weights.view().into_dyn() },
            ParamRef { value: self.biases.view_mut().into_dyn(), grad: self.d_biases.view().into_dyn() },
        ]
    }
}

/// Collapses (N, H, W, C) into (N, H * W * C).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flatten {
    #[serde(skip)]
    input_dim: (usize, usize, usize, usize),
}

impl Flatten {
    pub fn forward(&mut self, x: ndarray::Array4<f32>) -> Result<Array2<f32>> {
        let dim = x.dim();
        self.input_dim = dim;
        let x = x.as_standard_layout().into_owned();
        x.into_shape((dim.0, dim.1 * dim.2 * dim.3))
            .map_err(|e| Error::training(format!("flatten: {e}")))
    }

    pub fn backward(&mut self, grad: Array2<f32>) -> Result<ndarray::Array4<f32>> {
        grad.into_shape(self.input_dim)
            .map_err(|e| Error::training(format!("flatten backward: {e}")))
    }
}
