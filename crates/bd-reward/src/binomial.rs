//! Beta-Bernoulli reward model: one independent Beta posterior per arm over
//! the probability that an evaluation is valid.

use bd_types::{BdResult, EvaluatedSample, ModelError, Sample};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};
use tracing::debug;

use crate::model::{check_arm, RewardModel};

/// Per-arm Beta pseudo-counts, starting from the uniform Beta(1, 1) prior.
///
/// `a[i] + b[i] - 2` is always the number of outcomes folded into arm `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct BetaCounts {
    a: Vec<f64>,
    b: Vec<f64>,
}

impl BetaCounts {
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![1.0; size],
            b: vec![1.0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.a.len()
    }

    /// Pseudo-count of valid outcomes plus one, per arm.
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Pseudo-count of invalid outcomes plus one, per arm.
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Total outcomes folded into arm `index`.
    pub fn evaluations(&self, index: usize) -> u64 {
        (self.a[index] + self.b[index] - 2.0).round() as u64
    }

    /// Fold a batch into one arm. Validity is evaluated for the whole batch
    /// before any count changes, so a failing predicate leaves the counts intact.
    pub fn fold(&mut self, samples: &[Sample], index: usize) -> BdResult<()> {
        check_arm(index, self.size())?;

        let mut valid = 0usize;
        for sample in samples {
            if sample.is_valid()? {
                valid += 1;
            }
        }
        self.add(index, valid, samples.len() - valid);
        Ok(())
    }

    /// Fold a batch whose validity has already been evaluated.
    pub fn fold_evaluated(&mut self, outcomes: &[EvaluatedSample], index: usize) -> BdResult<()> {
        check_arm(index, self.size())?;
        let valid = outcomes.iter().filter(|o| o.is_valid()).count();
        self.add(index, valid, outcomes.len() - valid);
        Ok(())
    }

    fn add(&mut self, index: usize, valid: usize, invalid: usize) {
        self.a[index] += valid as f64;
        self.b[index] += invalid as f64;
        debug!(
            "Arm {} folded {} valid / {} invalid outcomes",
            index, valid, invalid
        );
    }

    fn distributions(&self) -> Result<Vec<Beta<f64>>, ModelError> {
        self.a
            .iter()
            .zip(&self.b)
            .map(|(&a, &b)| {
                Beta::new(a, b).map_err(|e| ModelError::InvalidPrior {
                    message: format!("Beta({a}, {b}): {e}"),
                })
            })
            .collect()
    }
}

/// Independent Beta posteriors per arm, sampled jointly as a Beta vector.
#[derive(Debug, Clone)]
pub struct BinomialRewardModel {
    counts: BetaCounts,
    rng: StdRng,
}

impl BinomialRewardModel {
    /// Create a model with an entropy-seeded generator.
    pub fn new(size: usize) -> Self {
        Self {
            counts: BetaCounts::new(size),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Create a model with a fixed seed (reproducible draws).
    pub fn with_seed(size: usize, seed: u64) -> Self {
        Self {
            counts: BetaCounts::new(size),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn counts(&self) -> &BetaCounts {
        &self.counts
    }
}

impl RewardModel for BinomialRewardModel {
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
        let dists = self.counts.distributions()?;
        let rng = &mut self.rng;
        Ok(Array2::from_shape_fn((count, dists.len()), |(_, arm)| {
            dists[arm].sample(&mut *rng)
        }))
    }

    fn name(&self) -> &str {
        "binomial"
    }
}
