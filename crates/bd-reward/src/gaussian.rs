//! Gaussian-process surrogate reward model.
//!
//! Nearby arms are assumed to behave more alike than distant ones; the prior
//! covariance over per-arm means (`prec0 * K0`) encodes that smoothness.
//! Updates only buffer metric values. Inference runs lazily at the start of
//! [`RewardModel::sample_posterior`], and each posterior `(mean, scale)` draw
//! is turned into the probability that the arm beats the best valid metric
//! seen so far.

use bd_types::{BdError, BdResult, EvaluatedSample, ModelError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::engine::{ChainSettings, GpPrior, MetropolisEngine, PosteriorEngine};
use crate::model::{check_arm, RewardModel};
use crate::stats::{cholesky, cholesky_inverse, normal_sf};

fn default_sample_burn() -> usize {
    100
}

fn default_sample_thin() -> usize {
    3
}

fn default_sample_tune() -> usize {
    1500
}

/// Prior and chain configuration for [`GaussianProcessModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianProcessConfig {
    /// Smoothness kernel `K0` (square, one row per arm).
    pub kernel: Vec<Vec<f64>>,
    /// Prior reward means, one per arm.
    pub m0: Vec<f64>,
    /// Multiplier applied to `kernel` to form the prior covariance.
    pub prec0: f64,
    /// Gamma shape for per-arm noise scale.
    pub gamma_alpha: f64,
    /// Gamma rate for per-arm noise scale.
    pub gamma_beta: f64,
    #[serde(default = "default_sample_burn")]
    pub sample_burn: usize,
    #[serde(default = "default_sample_thin")]
    pub sample_thin: usize,
    #[serde(default = "default_sample_tune")]
    pub sample_tune: usize,
    /// Wall-clock cap on one inference pass.
    #[serde(default)]
    pub inference_timeout_ms: Option<u64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl GaussianProcessConfig {
    pub fn new(kernel: Vec<Vec<f64>>, gamma_alpha: f64, gamma_beta: f64, m0: Vec<f64>, prec0: f64) -> Self {
        Self {
            kernel,
            m0,
            prec0,
            gamma_alpha,
            gamma_beta,
            sample_burn: default_sample_burn(),
            sample_thin: default_sample_thin(),
            sample_tune: default_sample_tune(),
            inference_timeout_ms: None,
            seed: None,
        }
    }

    pub fn with_chain(mut self, burn: usize, thin: usize, tune: usize) -> Self {
        self.sample_burn = burn;
        self.sample_thin = thin;
        self.sample_tune = tune;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn chain_settings(&self) -> ChainSettings {
        ChainSettings {
            burn: self.sample_burn,
            thin: self.sample_thin,
            tune: self.sample_tune,
            timeout: self.inference_timeout_ms.map(Duration::from_millis),
        }
    }

    fn prior(&self) -> Result<GpPrior, ModelError> {
        let n = self.m0.len();
        let invalid = |message: String| ModelError::InvalidPrior { message };

        if n == 0 {
            return Err(invalid("m0 must cover at least one arm".to_string()));
        }
        if self.kernel.len() != n || self.kernel.iter().any(|row| row.len() != n) {
            return Err(invalid(format!("kernel must be {n}x{n}")));
        }
        if !(self.prec0 > 0.0 && self.prec0.is_finite()) {
            return Err(invalid(format!("prec0 must be positive, got {}", self.prec0)));
        }
        if !(self.gamma_alpha > 0.0 && self.gamma_beta > 0.0) {
            return Err(invalid(format!(
                "Gamma parameters must be positive, got ({}, {})",
                self.gamma_alpha, self.gamma_beta
            )));
        }
        if self.sample_thin == 0 {
            return Err(invalid("sample_thin must be at least 1".to_string()));
        }

        let kernel = Array2::from_shape_fn((n, n), |(i, j)| self.prec0 * self.kernel[i][j]);
        let l = cholesky(&kernel)
            .ok_or_else(|| invalid("prior covariance is not positive definite".to_string()))?;

        Ok(GpPrior {
            m0: self.m0.clone(),
            precision: cholesky_inverse(&l),
            kernel,
            gamma_alpha: self.gamma_alpha,
            gamma_beta: self.gamma_beta,
        })
    }
}

/// Gaussian-process surrogate with lazily batched posterior inference.
pub struct GaussianProcessModel {
    prior: GpPrior,
    settings: ChainSettings,
    engine: Box<dyn PosteriorEngine>,
    observations: Vec<Vec<f64>>,
    current_maxima: f64,
    pending: usize,
}

impl GaussianProcessModel {
    /// Build a model driven by the built-in Metropolis engine.
    pub fn new(config: GaussianProcessConfig) -> BdResult<Self> {
        let engine = match config.seed {
            Some(seed) => MetropolisEngine::with_seed(seed),
            None => MetropolisEngine::new(),
        };
        Self::with_engine(config, Box::new(engine))
    }

    /// Build a model driven by a caller-supplied posterior engine.
    pub fn with_engine(config: GaussianProcessConfig, engine: Box<dyn PosteriorEngine>) -> BdResult<Self> {
        let prior = config.prior()?;
        let size = prior.size();
        info!(
            "Creating Gaussian-process reward model over {} arms (burn={}, thin={}, tune={})",
            size, config.sample_burn, config.sample_thin, config.sample_tune
        );
        Ok(Self {
            prior,
            settings: config.chain_settings(),
            engine,
            observations: vec![Vec::new(); size],
            current_maxima: f64::NEG_INFINITY,
            pending: 0,
        })
    }

    /// Best metric among valid outcomes folded so far (`-inf` before any).
    pub fn current_maxima(&self) -> f64 {
        self.current_maxima
    }

    /// Buffered metric values for one arm.
    pub fn observations(&self, index: usize) -> &[f64] {
        self.observations.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Observations buffered since the last successful inference pass.
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl RewardModel for GaussianProcessModel {
    fn size(&self) -> usize {
        self.prior.size()
    }

    fn update_evaluated(&mut self, outcomes: &[EvaluatedSample], index: usize) -> BdResult<()> {
        check_arm(index, self.size())?;

        let best_valid = outcomes
            .iter()
            .filter(|o| o.is_valid())
            .map(EvaluatedSample::metric)
            .fold(f64::NEG_INFINITY, f64::max);

        self.pending += outcomes.len();
        self.observations[index].extend(outcomes.iter().map(EvaluatedSample::metric));
        if best_valid > self.current_maxima {
            debug!("Current maxima advanced to {} (arm {})", best_valid, index);
            self.current_maxima = best_valid;
        }
        Ok(())
    }

    fn sample_posterior(&mut self, count: usize) -> BdResult<Array2<f64>> {
        let size = self.size();
        if count == 0 {
            return Ok(Array2::zeros((0, size)));
        }

        let draws = self
            .engine
            .infer(&self.prior, &self.observations, &self.settings, count)
            .map_err(ModelError::from)?;
        if draws.len() != count {
            return Err(BdError::Internal(format!(
                "posterior engine returned {} draws, requested {}",
                draws.len(),
                count
            )));
        }
        if let Some(draw) = draws
            .iter()
            .find(|d| d.mean.len() != size || d.scale.len() != size)
        {
            return Err(BdError::Internal(format!(
                "posterior draw covers {} means and {} scales, expected {}",
                draw.mean.len(),
                draw.scale.len(),
                size
            )));
        }
        self.pending = 0;

        let threshold = self.current_maxima;
        Ok(Array2::from_shape_fn((count, size), |(row, arm)| {
            let draw = &draws[row];
            normal_sf(threshold, draw.mean[arm], draw.scale[arm])
        }))
    }

    fn name(&self) -> &str {
        "gaussian_process"
    }
}

impl fmt::Debug for GaussianProcessModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaussianProcessModel")
            .field("prior", &self.prior)
            .field("settings", &self.settings)
            .field("current_maxima", &self.current_maxima)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
