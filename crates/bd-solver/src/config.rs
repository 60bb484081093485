//! Run configuration for the Thompson sampling loop.

use bd_types::{config_error, BdResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique solver run identifier.
pub type RunId = Uuid;

/// Top-level configuration for one `solve` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub id: RunId,
    pub name: String,

    /// Number of rounds to run.
    pub num_rounds: usize,

    /// Posterior draws (and therefore pulls) per round.
    pub samples_per_round: usize,

    /// How many per-arm sampler calls may run at once.
    pub max_concurrency: usize,

    /// Extra posterior attempts per round after a recoverable inference failure.
    pub inference_retries: usize,
}

impl SolverConfig {
    pub fn new(name: impl Into<String>, num_rounds: usize, samples_per_round: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            num_rounds,
            samples_per_round,
            max_concurrency: 4,
            inference_retries: 1,
        }
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_inference_retries(mut self, n: usize) -> Self {
        self.inference_retries = n;
        self
    }

    /// Total pulls the run will spend.
    pub fn budget(&self) -> usize {
        self.num_rounds * self.samples_per_round
    }

    pub fn validate(&self) -> BdResult<()> {
        if self.max_concurrency == 0 {
            return Err(config_error!("max_concurrency must be at least 1"));
        }
        if self.num_rounds.checked_mul(self.samples_per_round).is_none() {
            return Err(config_error!(
                "budget of {} rounds x {} samples overflows",
                self.num_rounds,
                self.samples_per_round
            ));
        }
        Ok(())
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::new("thompson", 10, 10)
    }
}
