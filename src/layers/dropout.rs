use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Inverted dropout: in training mode each unit is zeroed with probability
/// `rate` and survivors are scaled by `1 / (1 - rate)`, so inference is the
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,

    #[serde(skip)]
    mask: Option<Array2<f32>>,
}

impl Dropout {
    pub fn new(rate: f32) -> Result<Dropout> {
        if !(0.0..1.0).contains(&rate) {
            return Err(Error::build(format!("dropout rate must be in [0, 1), got {rate}")));
        }
        Ok(Dropout { rate, mask: None })
    }

    pub fn forward<R: Rng + ?Sized>(&mut self, x: Array2<f32>, training: bool, rng: &mut R) -> Array2<f32> {
        if !training || self.rate == 0.0 {
            self.mask = None;
            return x;
        }
        let keep = 1.0 - self.rate;
        let mask = Array2::from_shape_simple_fn(x.dim(), || {
            if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 }
        });
        let y = &x * &mask;
        self.mask = Some(mask);
        y
    }

    pub fn backward(&mut self, grad: Array2<f32>) -> Array2<f32> {
        match &self.mask {
            Some(mask) => grad * mask,
            None => grad,
        }
    }
}
