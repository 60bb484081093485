//! The reward model capability and its closed set of variants.

use bd_types::{config_error, BdResult, EvaluatedSample, ModelError, Sample};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::binomial::BinomialRewardModel;
use crate::constrained::ConstrainedRewardModel;
use crate::gaussian::{GaussianProcessConfig, GaussianProcessModel};

/// Posterior belief over each arm's reward.
///
/// `size` is fixed at construction and must equal the number of arms used by
/// the sampler set and the solver.
pub trait RewardModel: Send {
    /// Number of arms.
    fn size(&self) -> usize;

    /// Fold a batch of already-evaluated outcomes into the posterior of
    /// exactly one arm. An empty batch is a no-op.
    fn update_evaluated(&mut self, outcomes: &[EvaluatedSample], index: usize) -> BdResult<()>;

    /// Evaluate each outcome once, then fold the batch into arm `index`.
    fn update(&mut self, samples: &[Sample], index: usize) -> BdResult<()> {
        let outcomes = samples
            .iter()
            .map(Sample::evaluate)
            .collect::<Result<Vec<_>, _>>()?;
        self.update_evaluated(&outcomes, index)
    }

    /// Draw a `(count, size)` matrix: one row per posterior draw, one column
    /// per arm.
    fn sample_posterior(&mut self, count: usize) -> BdResult<Array2<f64>>;

    /// Human-readable model name.
    fn name(&self) -> &str;
}

pub(crate) fn check_arm(index: usize, size: usize) -> Result<(), ModelError> {
    if index >= size {
        return Err(ModelError::ArmOutOfRange { index, size });
    }
    Ok(())
}

/// Every reward model the solver knows how to drive.
#[derive(Debug)]
pub enum RewardModelKind {
    Binomial(BinomialRewardModel),
    Constrained(ConstrainedRewardModel),
    GaussianProcess(GaussianProcessModel),
}

impl RewardModel for RewardModelKind {
    fn size(&self) -> usize {
        match self {
            Self::Binomial(m) => m.size(),
            Self::Constrained(m) => m.size(),
            Self::GaussianProcess(m) => m.size(),
        }
    }

    fn update(&mut self, samples: &[Sample], index: usize) -> BdResult<()> {
        match self {
            Self::Binomial(m) => m.update(samples, index),
            Self::Constrained(m) => m.update(samples, index),
            Self::GaussianProcess(m) => m.update(samples, index),
        }
    }

    fn update_evaluated(&mut self, outcomes: &[EvaluatedSample], index: usize) -> BdResult<()> {
        match self {
            Self::Binomial(m) => m.update_evaluated(outcomes, index),
            Self::Constrained(m) => m.update_evaluated(outcomes, index),
            Self::GaussianProcess(m) => m.update_evaluated(outcomes, index),
        }
    }

    fn sample_posterior(&mut self, count: usize) -> BdResult<Array2<f64>> {
        match self {
            Self::Binomial(m) => m.sample_posterior(count),
            Self::Constrained(m) => m.sample_posterior(count),
            Self::GaussianProcess(m) => m.sample_posterior(count),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Binomial(m) => m.name(),
            Self::Constrained(m) => m.name(),
            Self::GaussianProcess(m) => m.name(),
        }
    }
}

impl From<BinomialRewardModel> for RewardModelKind {
    fn from(m: BinomialRewardModel) -> Self {
        Self::Binomial(m)
    }
}

impl From<ConstrainedRewardModel> for RewardModelKind {
    fn from(m: ConstrainedRewardModel) -> Self {
        Self::Constrained(m)
    }
}

impl From<GaussianProcessModel> for RewardModelKind {
    fn from(m: GaussianProcessModel) -> Self {
        Self::GaussianProcess(m)
    }
}

fn default_max_iter() -> usize {
    5
}

/// Declarative reward model selection, e.g. loaded from a run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardModelConfig {
    Binomial {
        size: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    Constrained {
        size: usize,
        /// Per-arm scaling applied to every draw.
        reward_values: Vec<f64>,
        /// Refinement passes per draw.
        #[serde(default = "default_max_iter")]
        max_iter: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    GaussianProcess(GaussianProcessConfig),
}

impl RewardModelConfig {
    /// Number of arms the configured model will cover.
    pub fn size(&self) -> usize {
        match self {
            Self::Binomial { size, .. } | Self::Constrained { size, .. } => *size,
            Self::GaussianProcess(cfg) => cfg.m0.len(),
        }
    }

    /// Validate the configuration and construct a fresh model.
    pub fn build(&self) -> BdResult<RewardModelKind> {
        if self.size() == 0 {
            return Err(config_error!("reward model needs at least one arm"));
        }

        let model: RewardModelKind = match self {
            Self::Binomial { size, seed } => match seed {
                Some(seed) => BinomialRewardModel::with_seed(*size, *seed),
                None => BinomialRewardModel::new(*size),
            }
            .into(),
            Self::Constrained {
                size,
                reward_values,
                max_iter,
                seed,
            } => {
                if reward_values.len() != *size {
                    return Err(config_error!(
                        "reward_values has {} entries, expected {}",
                        reward_values.len(),
                        size
                    ));
                }
                let model = match seed {
                    Some(seed) => ConstrainedRewardModel::with_seed(
                        *size,
                        reward_values.clone(),
                        *max_iter,
                        *seed,
                    ),
                    None => ConstrainedRewardModel::new(*size, reward_values.clone(), *max_iter),
                };
                model?.into()
            }
            Self::GaussianProcess(cfg) => GaussianProcessModel::new(cfg.clone())?.into(),
        };

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builds_each_variant() {
        let binomial = RewardModelConfig::Binomial {
            size: 3,
            seed: Some(1),
        };
        let model = binomial.build().unwrap();
        assert_eq!(model.size(), 3);
        assert_eq!(model.name(), "binomial");

        let constrained = RewardModelConfig::Constrained {
            size: 2,
            reward_values: vec![1.0, 0.5],
            max_iter: 3,
            seed: Some(1),
        };
        assert_eq!(constrained.build().unwrap().name(), "constrained");

        let gp = RewardModelConfig::GaussianProcess(GaussianProcessConfig::new(
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            1.0,
            5.0,
            vec![0.0, 0.0],
            5.0,
        ));
        let model = gp.build().unwrap();
        assert_eq!(model.size(), 2);
        assert_eq!(model.name(), "gaussian_process");
    }

    #[test]
    fn config_rejects_mismatched_reward_values() {
        let cfg = RewardModelConfig::Constrained {
            size: 3,
            reward_values: vec![1.0],
            max_iter: 5,
            seed: None,
        };
        assert!(cfg.build().is_err());
    }

    #[test]
    fn config_rejects_zero_arms() {
        let cfg = RewardModelConfig::Binomial {
            size: 0,
            seed: None,
        };
        assert!(cfg.build().is_err());
    }

    #[test]
    fn config_deserializes_from_tagged_json() {
        let cfg: RewardModelConfig = serde_json::from_str(
            r#"{"kind": "constrained", "size": 2, "reward_values": [2.0, 1.0]}"#,
        )
        .unwrap();
        assert_eq!(
            cfg,
            RewardModelConfig::Constrained {
                size: 2,
                reward_values: vec![2.0, 1.0],
                max_iter: 5,
                seed: None,
            }
        );

        let gp: RewardModelConfig = serde_json::from_str(
            r#"{"kind": "gaussian_process", "kernel": [[1.0]], "m0": [0.0],
                "prec0": 2.0, "gamma_alpha": 1.0, "gamma_beta": 5.0}"#,
        )
        .unwrap();
        assert_eq!(gp.size(), 1);
    }

    #[test]
    fn out_of_range_check() {
        assert!(check_arm(0, 1).is_ok());
        assert!(matches!(
            check_arm(1, 1),
            Err(ModelError::ArmOutOfRange { index: 1, size: 1 })
        ));
    }
}
