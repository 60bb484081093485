//! Sampler drawing parameter vectors from a Gaussian around a fixed centre.

use async_trait::async_trait;
use bd_types::{BdResult, Sample, SamplingError};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::noise::{GaussianNoiseModel, NoiseModel};
use crate::sampler::{SampleFactory, Sampler};

/// Draws `count` noisy copies of `mean` and turns each into a sample.
#[derive(Debug)]
pub struct GaussianSampler {
    name: String,
    factory: SampleFactory,
    mean: Vec<f64>,
    noise: GaussianNoiseModel,
    rng: Mutex<StdRng>,
}

impl GaussianSampler {
    pub fn new(factory: SampleFactory, mean: Vec<f64>, variance: Vec<f64>) -> BdResult<Self> {
        Self::build(factory, mean, variance, StdRng::from_os_rng())
    }

    pub fn with_seed(factory: SampleFactory, mean: Vec<f64>, variance: Vec<f64>, seed: u64) -> BdResult<Self> {
        Self::build(factory, mean, variance, StdRng::seed_from_u64(seed))
    }

    fn build(factory: SampleFactory, mean: Vec<f64>, variance: Vec<f64>, rng: StdRng) -> BdResult<Self> {
        if mean.len() != factory.dimension() {
            return Err(SamplingError::DimensionMismatch {
                expected: factory.dimension(),
                actual: mean.len(),
            }
            .into());
        }
        let noise = GaussianNoiseModel::new(variance)?;
        if noise.dimension() != mean.len() {
            return Err(SamplingError::DimensionMismatch {
                expected: mean.len(),
                actual: noise.dimension(),
            }
            .into());
        }
        Ok(Self {
            name: format!("gaussian[{}]", factory.attribute_names().join(",")),
            factory,
            mean,
            noise,
            rng: Mutex::new(rng),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }
}

#[async_trait]
impl Sampler for GaussianSampler {
    async fn get_samples(&self, count: usize) -> BdResult<Vec<Sample>> {
        let points = {
            let mut rng = self.rng.lock();
            self.noise.add_noise(&self.mean, count, &mut rng)?
        };
        debug!("{} drew {} points", self.name, points.len());

        let samples = points
            .iter()
            .map(|p| self.factory.make_sample(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
