use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Weight initialization schemes.
///
/// The builder uses a fixed pairing: `VarianceScaling` for convolution
/// kernels and `TruncatedNormal` for dense layers. Neither is searched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Initializer {
    /// Uniform on [-limit, limit] with limit = sqrt(3 * scale / fan_in).
    VarianceScaling { scale: f64 },
    /// N(mean, stddev) with samples further than two standard deviations
    /// from the mean redrawn.
    TruncatedNormal { mean: f64, stddev: f64 },
    Zeros,
    Ones,
}

impl Initializer {
    /// Variance scaling with scale 1.0, fan-in mode, uniform distribution.
    pub fn variance_scaling() -> Self {
        Initializer::VarianceScaling { scale: 1.0 }
    }

    /// Truncated normal with the conventional mean 0.0 and stddev 0.05.
    pub fn truncated_normal() -> Self {
        Initializer::TruncatedNormal { mean: 0.0, stddev: 0.05 }
    }

    /// Fills a fresh array of `shape`. `fan_in` is the number of input
    /// connections of one output unit.
    pub fn init<R: Rng + ?Sized>(&self, shape: &[usize], fan_in: usize, rng: &mut R) -> ArrayD<f32> {
        let len: usize = shape.iter().product();
        let data: Vec<f32> = match *self {
            Initializer::VarianceScaling { scale } => {
                let limit = (3.0 * scale / fan_in.max(1) as f64).sqrt();
                (0..len).map(|_| rng.gen_range(-limit..=limit) as f32).collect()
            }
            Initializer::TruncatedNormal { mean, stddev } => {
                (0..len).map(|_| {
                    loop {
                        let z = sample_standard_normal(rng);
                        if z.abs() <= 2.0 {
                            break (mean + z * stddev) as f32;
                        }
                    }
                }).collect()
            }
            Initializer::Zeros => vec![0.0; len],
            Initializer::Ones => vec![1.0; len],
        };
        // Length matches the product of `shape` by construction.
        ArrayD::from_shape_vec(IxDyn(shape), data).unwrap_or_else(|_| ArrayD::zeros(IxDyn(shape)))
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
pub fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Both uniforms drawn on (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
