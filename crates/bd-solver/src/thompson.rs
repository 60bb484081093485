//! Thompson sampling over a pluggable reward model.
//!
//! Each round draws `samples_per_round` rows from the model's posterior, gives
//! one pull to the best arm of every row, fetches that many outcomes per arm,
//! folds them back into the model and updates the incumbent. Rounds are
//! strictly sequential.

use async_trait::async_trait;
use bd_reward::RewardModel;
use bd_sampling::{Sampler, SamplerSet};
use bd_types::{config_error, BdError, BdResult, Sample, SolverError};
use chrono::Utc;
use ndarray::{Array2, ArrayView1};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SolverConfig;
use crate::report::{RoundSummary, SolveReport};

/// A budget-bounded search strategy.
#[async_trait]
pub trait Algorithm: Send + Sync {
    /// Run to completion, consuming the model. The model must cover exactly
    /// as many arms as the algorithm has samplers.
    async fn solve(&self, model: Box<dyn RewardModel>) -> BdResult<SolveReport>;

    /// Human-readable algorithm name.
    fn name(&self) -> &str;
}

/// Index of the largest value; lowest index on ties, NaN never wins.
pub fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NAN;
    for (i, &v) in row.iter().enumerate() {
        if v > best_value || (best_value.is_nan() && !v.is_nan()) {
            best = i;
            best_value = v;
        }
    }
    best
}

/// Per-arm pull counts for one round of posterior draws.
pub fn tally(draws: &Array2<f64>) -> Vec<usize> {
    let mut counts = vec![0; draws.ncols()];
    for row in draws.rows() {
        counts[argmax(row)] += 1;
    }
    counts
}

#[derive(Debug)]
pub struct ThompsonSampling {
    samplers: SamplerSet,
    config: SolverConfig,
}

impl ThompsonSampling {
    /// Drive the given sampler set with `config`.
    ///
    /// The set keeps the concurrency bound it was built with;
    /// `config.max_concurrency` only applies through [`Self::from_samplers`].
    pub fn new(samplers: SamplerSet, config: SolverConfig) -> Self {
        if samplers.max_concurrency() != config.max_concurrency {
            debug!(
                "Sampler set bound {} overrides configured max_concurrency {}",
                samplers.max_concurrency(),
                config.max_concurrency
            );
        }
        Self { samplers, config }
    }

    /// Build the sampler set from one sampler per arm, bounded by
    /// `config.max_concurrency`.
    pub fn from_samplers(samplers: Vec<Arc<dyn Sampler>>, config: SolverConfig) -> Self {
        let set = SamplerSet::new(samplers, config.max_concurrency);
        Self::new(set, config)
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn num_arms(&self) -> usize {
        self.samplers.len()
    }

    /// Concurrency bound actually applied when collecting outcomes.
    pub fn max_concurrency(&self) -> usize {
        self.samplers.max_concurrency()
    }

    /// Convenience wrapper around [`Algorithm::solve`] for a concrete model.
    pub async fn run<M>(&self, model: M) -> BdResult<SolveReport>
    where
        M: RewardModel + 'static,
    {
        self.solve(Box::new(model)).await
    }

    /// Posterior draw off the async workers, retrying recoverable failures.
    async fn draw_posterior(
        &self,
        mut model: Box<dyn RewardModel>,
        round: usize,
    ) -> BdResult<(Box<dyn RewardModel>, Array2<f64>)> {
        let count = self.config.samples_per_round;
        let mut attempt = 0;

        loop {
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = model.sample_posterior(count);
                (model, result)
            })
            .await
            .map_err(|e| BdError::Internal(format!("posterior worker failed: {e}")))?;
            model = returned;

            match result {
                Ok(draws) => return Ok((model, draws)),
                Err(e) if e.is_recoverable() && attempt < self.config.inference_retries => {
                    attempt += 1;
                    warn!(
                        "Round {} posterior draw failed ({}), retry {}/{}",
                        round, e, attempt, self.config.inference_retries
                    );
                }
                Err(e) => {
                    return Err(SolverError::RoundFailed {
                        round,
                        source: Box::new(e),
                    }
                    .into())
                }
            }
        }
    }

    fn check_shape(&self, draws: &Array2<f64>) -> BdResult<()> {
        let expected = (self.config.samples_per_round, self.num_arms());
        if draws.dim() != expected {
            let (rows, cols) = draws.dim();
            return Err(SolverError::ShapeMismatch {
                rows,
                cols,
                expected_rows: expected.0,
                expected_cols: expected.1,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Algorithm for ThompsonSampling {
    async fn solve(&self, mut model: Box<dyn RewardModel>) -> BdResult<SolveReport> {
        self.config.validate()?;
        let num_arms = self.num_arms();
        if num_arms == 0 {
            return Err(config_error!("solver needs at least one arm"));
        }
        if model.size() != num_arms {
            return Err(SolverError::SizeMismatch {
                model_size: model.size(),
                num_arms,
            }
            .into());
        }

        let mut report = SolveReport::new(self.config.id, model.name(), num_arms);
        info!(
            "Starting Thompson sampling run '{}' ({}): {} arms, {} rounds x {} samples, model={}",
            self.config.name,
            self.config.id,
            num_arms,
            self.config.num_rounds,
            self.config.samples_per_round,
            model.name()
        );

        for round in 0..self.config.num_rounds {
            let started_at = Utc::now();

            let (returned, draws) = self.draw_posterior(model, round).await?;
            model = returned;
            self.check_shape(&draws)?;

            let tallies = tally(&draws);
            debug!("Round {} tallies: {:?}", round, tallies);
            report.record_pulls(&tallies);

            let batches = self.samplers.get_samples(&tallies).await?;

            // Each outcome is evaluated once; the model and incumbent share the verdicts.
            let evaluated = batches
                .iter()
                .map(|batch| {
                    batch
                        .iter()
                        .map(Sample::evaluate)
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?;

            for (arm, outcomes) in evaluated.iter().enumerate() {
                model.update_evaluated(outcomes, arm)?;
            }

            let mut valid_outcomes = 0;
            for outcome in evaluated.iter().flatten() {
                if !outcome.is_valid() {
                    continue;
                }
                valid_outcomes += 1;
                let metric = outcome.metric();
                let sample = outcome.sample();
                if metric.is_nan() {
                    warn!("Sample {} is valid but reported a NaN metric", sample.id());
                    continue;
                }
                if report.update_best(sample, metric) {
                    info!(
                        "Round {}: new incumbent {} with metric {}",
                        round,
                        sample.id(),
                        metric
                    );
                }
            }

            report.rounds.push(RoundSummary {
                round,
                tallies,
                valid_outcomes,
                incumbent_metric: report.best_metric,
                started_at,
                finished_at: Utc::now(),
            });
        }

        report.mark_finished();
        match report.best_metric {
            Some(metric) => info!(
                "Run '{}' finished after {} pulls, best metric {}",
                self.config.name,
                report.total_pulls(),
                metric
            ),
            None => info!(
                "Run '{}' finished after {} pulls without a feasible solution",
                self.config.name,
                report.total_pulls()
            ),
        }
        Ok(report)
    }

    fn name(&self) -> &str {
        "thompson_sampling"
    }
}
