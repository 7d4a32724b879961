use std::fmt::Write as _;
use std::path::Path;

use ndarray::{s, Array2, Array4, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::{Layer, Shape, Tensor};
use crate::loss::LossType;
use crate::math::{seeded_rng, RngStream};
use crate::optim::Sgd;

/// Samples per forward pass when predicting outside of training.
const PREDICT_CHUNK: usize = 64;

/// A compiled network: layers, the loss it trains against and its optimizer
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub input_shape: Shape,
    pub layers: Vec<Layer>,
    pub loss: LossType,
    pub optimizer: Sgd,
}

impl Network {
    pub fn output_shape(&self) -> Result<Shape> {
        self.layers
            .iter()
            .try_fold(self.input_shape, |shape, layer| layer.output_shape(shape))
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::param_count).sum()
    }

    fn check_input(&self, x: &Array4<f32>) -> Result<()> {
        let (_, h, w, c) = x.dim();
        let got = Shape::Spatial { height: h, width: w, channels: c };
        if got != self.input_shape {
            return Err(Error::shape(format!(
                "network expects samples of shape {} but received {got}",
                self.input_shape
            )));
        }
        Ok(())
    }

    /// Forward pass; stores activations in each layer for backprop.
    pub fn forward<R: Rng + ?Sized>(&mut self, x: Array4<f32>, training: bool, rng: &mut R) -> Result<Array2<f32>> {
        self.check_input(&x)?;
        let mut current = Tensor::Spatial(x);
        for layer in &mut self.layers {
            current = layer.forward(current, training, rng)?;
        }
        current.into_flat("network output")
    }

    /// Backward pass from the gradient w.r.t. the output layer's logits.
    pub fn backward(&mut self, grad: Array2<f32>) -> Result<()> {
        let mut current = Tensor::Flat(grad);
        for layer in self.layers.iter_mut().rev() {
            current = layer.backward(current)?;
        }
        Ok(())
    }

    /// One optimization step on a mini-batch. Returns the batch loss and the
    /// training-mode predictions it was computed from.
    pub fn train_batch<R: Rng + ?Sized>(
        &mut self,
        x: Array4<f32>,
        y: &Array2<f32>,
        rng: &mut R,
    ) -> Result<(f64, Array2<f32>)> {
        let predicted = self.forward(x, true, rng)?;
        if predicted.dim() != y.dim() {
            return Err(Error::shape(format!(
                "labels {:?} do not match predictions {:?}",
                y.dim(),
                predicted.dim()
            )));
        }
        let loss = self.loss.loss(&predicted, y);
        let grad = self.loss.derivative(&predicted, y);
        self.backward(grad)?;

        let params = self.layers.iter_mut().flat_map(Layer::params).collect();
        self.optimizer.step(params);
        Ok((loss, predicted))
    }

    /// Class probabilities in inference mode (dropout off, batch-norm moving
    /// statistics), evaluated in chunks.
    pub fn predict_proba(&mut self, x: &Array4<f32>) -> Result<Array2<f32>> {
        self.check_input(x)?;
        let n = x.dim().0;
        let mut out = Array2::<f32>::zeros((n, 0));
        // Inference draws nothing from the rng.
        let mut rng = seeded_rng(0, RngStream::Dropout);
        let mut start = 0;
        while start < n {
            let end = (start + PREDICT_CHUNK).min(n);
            let chunk = x.slice(s![start..end, .., .., ..]).to_owned();
            let p = self.forward(chunk, false, &mut rng)?;
            if out.ncols() == 0 {
                out = Array2::zeros((n, p.ncols()));
            }
            out.slice_mut(s![start..end, ..]).assign(&p);
            start = end;
        }
        Ok(out)
    }

    /// Mean loss over a labelled set in inference mode, with the predictions.
    pub fn evaluate(&mut self, x: &Array4<f32>, y: &Array2<f32>) -> Result<(f64, Array2<f32>)> {
        let p = self.predict_proba(x)?;
        if p.dim() != y.dim() {
            return Err(Error::shape(format!("labels {:?} do not match predictions {:?}", y.dim(), p.dim())));
        }
        Ok((self.loss.loss(&p, y), p))
    }

    /// One line per layer with its output shape and parameter count.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<32}{:<20}{:>12}", "Layer", "Output shape", "Params");
        let _ = writeln!(out, "{}", "=".repeat(64));
        let mut shape = self.input_shape;
        let _ = writeln!(out, "{:<32}{:<20}{:>12}", "input", shape.to_string(), 0);
        for (i, layer) in self.layers.iter().enumerate() {
            let shown = match layer.output_shape(shape) {
                Ok(next) => {
                    shape = next;
                    next.to_string()
                }
                Err(_) => "?".to_string(),
            };
            let name = format!("{}_{}", layer.name(), i);
            let _ = writeln!(out, "{:<32}{:<20}{:>12}", name, shown, layer.param_count());
        }
        let _ = writeln!(out, "{}", "=".repeat(64));
        let _ = writeln!(out, "Total params: {}", self.parameter_count());
        out
    }

    /// Serializes the network weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a network from a JSON file previously written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Network> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let network: Network = serde_json::from_reader(reader)?;
        network.output_shape()?;
        Ok(network)
    }
}

/// Index of the largest entry of each row.
pub fn argmax_rows(p: &Array2<f32>) -> Vec<usize> {
    p.axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
                .0
        })
        .collect()
}
