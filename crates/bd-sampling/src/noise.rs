//! Noise injection around a parameter vector.

use bd_types::{validation_error, BdResult, SamplingError};
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Perturbs a parameter vector into several noisy copies.
pub trait NoiseModel: Send + Sync {
    /// Return `count` perturbed copies of `x`.
    fn add_noise(&self, x: &[f64], count: usize, rng: &mut StdRng) -> Result<Vec<Vec<f64>>, SamplingError>;
}

/// Independent Gaussian noise per dimension (diagonal covariance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNoiseModel {
    variance: Vec<f64>,
}

impl GaussianNoiseModel {
    pub fn new(variance: Vec<f64>) -> BdResult<Self> {
        if let Some(bad) = variance.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(validation_error!("noise variance must be finite and non-negative, got {}", bad));
        }
        Ok(Self { variance })
    }

    pub fn variance(&self) -> &[f64] {
        &self.variance
    }

    pub fn dimension(&self) -> usize {
        self.variance.len()
    }
}

impl NoiseModel for GaussianNoiseModel {
    fn add_noise(&self, x: &[f64], count: usize, rng: &mut StdRng) -> Result<Vec<Vec<f64>>, SamplingError> {
        if x.len() != self.variance.len() {
            return Err(SamplingError::DimensionMismatch {
                expected: self.variance.len(),
                actual: x.len(),
            });
        }

        let scales: Vec<f64> = self.variance.iter().map(|v| v.sqrt()).collect();
        Ok((0..count)
            .map(|_| {
                x.iter()
                    .zip(&scales)
                    .map(|(&mean, &scale)| {
                        let z: f64 = StandardNormal.sample(&mut *rng);
                        mean + scale * z
                    })
                    .collect()
            })
            .collect())
    }
}
