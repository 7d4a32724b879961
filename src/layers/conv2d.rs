use ndarray::{Array1, Array2, Array4, Axis, Ix4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::tensor::{ParamRef, Shape};
use crate::math::{col2im, im2col, same_padding, Initializer};

/// 2-D convolution with "same" padding over (N, H, W, C) batches.
///
/// The kernel is stored as (k, k, C_in, filters) and applied as a single
/// matrix product against the im2col expansion of the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub filters: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub in_channels: usize,
    pub activator: ActivationFunction,
    pub kernel: Array4<f32>,
    pub bias: Array1<f32>,

    #[serde(skip)]
    cols: Array2<f32>,
    #[serde(skip)]
    pre_neurons: Array4<f32>, // z before activation, needed for the derivative
    #[serde(skip)]
    input_dim: (usize, usize, usize, usize),
    #[serde(skip)]
    d_kernel: Array4<f32>,
    #[serde(skip)]
    d_bias: Array1<f32>,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        filters: usize,
        kernel_size: usize,
        stride: usize,
        in_channels: usize,
        activator: ActivationFunction,
        rng: &mut R,
    ) -> Result<Conv2d> {
        if filters == 0 || kernel_size == 0 || stride == 0 {
            return Err(Error::build(format!(
                "conv2d needs positive filters/kernel/stride, got {filters}/{kernel_size}/{stride}"
            )));
        }
        let fan_in = kernel_size * kernel_size * in_channels;
        let kernel = Initializer::variance_scaling()
            .init(&[kernel_size, kernel_size, in_channels, filters], fan_in, rng)
            .into_dimensionality::<Ix4>()
            .map_err(|e| Error::build(format!("conv2d kernel: {e}")))?;

        Ok(Conv2d {
            filters,
            kernel_size,
            stride,
            in_channels,
            activator,
            d_kernel: Array4::zeros(kernel.dim()),
            kernel,
            bias: Array1::zeros(filters),
            d_bias: Array1::zeros(filters),
            cols: Array2::zeros((0, 0)),
            pre_neurons: Array4::zeros((0, 0, 0, 0)),
            input_dim: (0, 0, 0, 0),
        })
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        let (h, w, c) = input.spatial("conv2d")?;
        if c != self.in_channels {
            return Err(Error::build(format!(
                "conv2d expects {} input channels, got {c}",
                self.in_channels
            )));
        }
        let pad = same_padding(h, w, self.kernel_size, self.stride);
        Ok(Shape::Spatial { height: pad.out_h, width: pad.out_w, channels: self.filters })
    }

    pub fn param_count(&self) -> usize {
        self.kernel.len() + self.bias.len()
    }

    fn kernel_matrix_dims(&self) -> (usize, usize) {
        (self.kernel_size * self.kernel_size * self.in_channels, self.filters)
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = x.dim();
        if c != self.in_channels {
            return Err(Error::shape(format!(
                "conv2d expects {} channels, got {c}",
                self.in_channels
            )));
        }
        let pad = same_padding(h, w, self.kernel_size, self.stride);
        let cols = im2col(&x.view(), self.kernel_size, self.stride, &pad);
        let k2 = self
            .kernel
            .view()
            .into_shape(self.kernel_matrix_dims())
            .map_err(|e| Error::training(format!("conv2d kernel reshape: {e}")))?;

        let z = cols.dot(&k2) + &self.bias;
        let z = z
            .into_shape((n, pad.out_h, pad.out_w, self.filters))
            .map_err(|e| Error::training(format!("conv2d output reshape: {e}")))?;
        let a = z.mapv(|v| self.activator.function(v));

        self.cols = cols;
        self.pre_neurons = z;
        self.input_dim = (n, h, w, c);
        Ok(a)
    }

    /// Takes dL/da for this layer's output, stores kernel and bias gradients
    /// and returns dL/dx.
    pub fn backward(&mut self, grad: Array4<f32>) -> Result<Array4<f32>> {
        let (n, oh, ow, f) = grad.dim();
        let mut delta = grad;
        delta.zip_mut_with(&self.pre_neurons, |g, &z| *g *= self.activator.derivative(z));
        let delta = delta
            .into_shape((n * oh * ow, f))
            .map_err(|e| Error::training(format!("conv2d delta reshape: {e}")))?;

        let dk = self.cols.t().dot(&delta);
        self.d_kernel = dk
            .into_shape(self.kernel.dim())
            .map_err(|e| Error::training(format!("conv2d gradient reshape: {e}")))?;
        self.d_bias = delta.sum_axis(Axis(0));

        let k2 = self
            .kernel
            .view()
            .into_shape(self.kernel_matrix_dims())
            .map_err(|e| Error::training(format!("conv2d kernel reshape: {e}")))?;
        let dcols = delta.dot(&k2.t());
        let (_, h, w, _) = self.input_dim;
        let pad = same_padding(h, w, self.kernel_size, self.stride);
        Ok(col2im(&dcols, self.input_dim, self.kernel_size, self.stride, &pad))
    }

    pub fn params(&mut self) -> Vec<ParamRef<'_>> {
        vec![
            ParamRef { value: self.kernel.view_mut().into_dyn(), grad: self.d_kernel.view().into_dyn() },
            ParamRef { value: self.bias.view_mut().into_dyn(), grad: self.d_bias.view().into_dyn() },
        ]
    }
}
