//! Bandolier reward models
//!
//! Posterior beliefs over per-arm rewards. Every model implements
//! [`RewardModel`]: fold a batch of outcomes into one arm, then draw a
//! `(count, size)` matrix of plausible rewards for Thompson Sampling.

pub mod binomial;
pub mod constrained;
pub mod engine;
pub mod gaussian;
pub mod model;
pub mod stats;

pub use binomial::{BetaCounts, BinomialRewardModel};
pub use constrained::ConstrainedRewardModel;
pub use engine::{ChainSettings, GpPrior, MetropolisEngine, PosteriorDraw, PosteriorEngine};
pub use gaussian::{GaussianProcessConfig, GaussianProcessModel};
pub use model::{RewardModel, RewardModelConfig, RewardModelKind};
