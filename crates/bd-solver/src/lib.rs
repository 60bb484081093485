//! # bd-solver
//!
//! Thompson sampling control loop for Bandolier.
//!
//! A run spends a fixed budget of `num_rounds x samples_per_round` pulls
//! across a set of arms. Every round the reward model's posterior decides
//! where the pulls go, the sampler set produces the outcomes, and the best
//! valid outcome seen so far is kept as the incumbent.

mod config;
mod report;
mod thompson;

pub use config::{RunId, SolverConfig};
pub use report::{RoundSummary, SolveReport};
pub use thompson::{argmax, tally, Algorithm, ThompsonSampling};
