//! Beta-Bernoulli model under a monotone ordering constraint.
//!
//! Arms are assumed ordered by a physical quantity that can only make success
//! less likely as the index grows (e.g. tighter timing targets). Every draw is
//! therefore non-increasing across arm index. Draws are produced by sequential
//! truncated inverse-CDF sampling: each arm is bounded above by the arm before
//! it (already resampled in this pass) and below by the arm after it (from the
//! previous pass, or 0). Because the lower bound lags by one pass, the whole
//! sweep is repeated `max_iter` times before the values are taken.

use bd_types::{BdResult, EvaluatedSample, ModelError, Sample};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::binomial::BetaCounts;
use crate::model::RewardModel;
use crate::stats::truncated_beta_inverse;

/// Monotone non-increasing Beta posteriors, scaled by fixed per-arm rewards.
#[derive(Debug, Clone)]
pub struct ConstrainedRewardModel {
    counts: BetaCounts,
    reward_values: Vec<f64>,
    max_iter: usize,
    rng: StdRng,
}

impl ConstrainedRewardModel {
    /// Create a model with an entropy-seeded generator.
    pub fn new(size: usize, reward_values: Vec<f64>, max_iter: usize) -> BdResult<Self> {
        Self::build(size, reward_values, max_iter, StdRng::from_os_rng())
    }

    /// Create a model with a fixed seed (reproducible draws).
    pub fn with_seed(
        size: usize,
        reward_values: Vec<f64>,
        max_iter: usize,
        seed: u64,
    ) -> BdResult<Self> {
        Self::build(size, reward_values, max_iter, StdRng::seed_from_u64(seed))
    }

    fn build(size: usize, reward_values: Vec<f64>, max_iter: usize, rng: StdRng) -> BdResult<Self> {
        if reward_values.len() != size {
            return Err(ModelError::InvalidPrior {
                message: format!(
                    "reward_values has {} entries for {} arms",
                    reward_values.len(),
                    size
                ),
            }
            .into());
        }
        if max_iter == 0 {
            return Err(ModelError::InvalidPrior {
                message: "max_iter must be at least 1".to_string(),
            }
            .into());
        }
        Ok(Self {
            counts: BetaCounts::new(size),
            reward_values,
            max_iter,
            rng,
        })
    }

    pub fn counts(&self) -> &BetaCounts {
        &self.counts
    }

    pub fn reward_values(&self) -> &[f64] {
        &self.reward_values
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// One unscaled, non-increasing draw across all arms.
    fn truncated_draw(&mut self) -> Vec<f64> {
        let size = self.counts.size();
        let (a, b) = (self.counts.a(), self.counts.b());
        let mut draw = vec![f64::NAN; size];

        for _ in 0..self.max_iter {
            for i in 0..size {
                let upper = if i == 0 { 1.0 } else { draw[i - 1] };
                let lower = match draw.get(i + 1) {
                    Some(v) if !v.is_nan() => *v,
                    _ => 0.0,
                };
                let u: f64 = self.rng.random();
                draw[i] = truncated_beta_inverse(a[i], b[i], lower, upper, u);
            }
        }

        draw
    }
}

impl RewardModel for ConstrainedRewardModel {
    fn size(&self) -> usize {
        self.counts.size()
    }

    fn update(&mut self, samples: &[Sample], index: usize) -> BdResult<()> {
        self.counts.fold(samples, index)
    }

    fn update_evaluated(&mut self, outcomes: &[EvaluatedSample], index: usize) -> BdResult<()> {
        self.counts.fold_evaluated(outcomes, index)
    }

    fn sample_posterior(&mut self, count: usize) -> BdResult<Array2<f64>> {
        let mut out = Array2::<f64>::zeros((count, self.size()));
        for mut row in out.rows_mut() {
            let draw = self.truncated_draw();
            for ((dst, value), scale) in row.iter_mut().zip(draw).zip(&self.reward_values) {
                *dst = value * scale;
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "constrained"
    }
}
