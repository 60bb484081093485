//! Posterior engines for the Gaussian-process surrogate.
//!
//! The joint model is
//!
//! ```text
//!   mu      ~ MvNormal(m0, K)
//!   sigma_i ~ Gamma(alpha, beta)          (rate parameterisation)
//!   x_ik    ~ Normal(mu_i, sigma_i)       for every buffered observation
//! ```
//!
//! An engine turns the buffered observations into `count` draws of
//! `(mu, sigma)` from the posterior. [`MetropolisEngine`] does this with a
//! component-wise random-walk Metropolis chain; tests substitute a fixed engine.

use bd_types::InferenceError;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::time::{Duration, Instant};
use tracing::debug;

/// Target acceptance rate for single-coordinate random-walk proposals.
const TARGET_ACCEPTANCE: f64 = 0.44;
/// Sweeps per step-size adaptation window during tuning.
const ADAPT_WINDOW: usize = 50;

/// Prior of the joint (mean, scale) model, with the covariance pre-factored.
#[derive(Debug, Clone)]
pub struct GpPrior {
    pub m0: Vec<f64>,
    /// Prior covariance over per-arm means.
    pub kernel: Array2<f64>,
    /// Inverse of `kernel`.
    pub precision: Array2<f64>,
    pub gamma_alpha: f64,
    pub gamma_beta: f64,
}

impl GpPrior {
    pub fn size(&self) -> usize {
        self.m0.len()
    }
}

/// Chain length controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    /// Kept sweeps discarded at the start of the chain.
    pub burn: usize,
    /// Keep every `thin`-th sweep after burn-in.
    pub thin: usize,
    /// Warm-up sweeps used to adapt step sizes; never kept.
    pub tune: usize,
    pub timeout: Option<Duration>,
}

impl ChainSettings {
    /// Sweeps needed for `count` kept draws.
    pub fn total_sweeps(&self, count: usize) -> usize {
        self.tune + self.burn + self.thin * count
    }
}

/// One posterior draw of per-arm mean and noise scale.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorDraw {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Approximate posterior inference over the joint model.
pub trait PosteriorEngine: Send {
    /// Return exactly `count` draws, or fail without side effects on the caller.
    fn infer(
        &mut self,
        prior: &GpPrior,
        observations: &[Vec<f64>],
        settings: &ChainSettings,
        count: usize,
    ) -> Result<Vec<PosteriorDraw>, InferenceError>;
}

/// Component-wise random-walk Metropolis over `(mu, ln sigma)`.
///
/// Step sizes adapt per coordinate during the tuning phase and are frozen
/// afterwards. The deadline is checked after every sweep.
#[derive(Debug, Clone)]
pub struct MetropolisEngine {
    rng: StdRng,
}

impl MetropolisEngine {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for MetropolisEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain state and the pieces of the log density it needs incrementally.
struct Chain<'a> {
    prior: &'a GpPrior,
    observations: &'a [Vec<f64>],
    mu: Vec<f64>,
    log_sigma: Vec<f64>,
}

impl<'a> Chain<'a> {
    fn new(prior: &'a GpPrior, observations: &'a [Vec<f64>]) -> Self {
        let n = prior.size();
        Self {
            prior,
            observations,
            mu: prior.m0.clone(),
            log_sigma: vec![(prior.gamma_alpha / prior.gamma_beta).ln(); n],
        }
    }

    fn data(&self, arm: usize) -> &[f64] {
        self.observations.get(arm).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Log likelihood of arm `arm`'s observations at `(mu, ln sigma)`.
    fn arm_log_likelihood(&self, arm: usize, mu: f64, log_sigma: f64) -> f64 {
        let data = self.data(arm);
        let inv_var = (-2.0 * log_sigma).exp();
        let sq: f64 = data.iter().map(|x| (x - mu).powi(2)).sum();
        -(data.len() as f64) * log_sigma - 0.5 * sq * inv_var
    }

    /// Gamma(alpha, beta) log prior on sigma, including the ln-transform Jacobian.
    fn log_scale_prior(&self, log_sigma: f64) -> f64 {
        self.prior.gamma_alpha * log_sigma - self.prior.gamma_beta * log_sigma.exp()
    }

    /// Change in the MvNormal log prior when `mu[arm]` moves by `delta`.
    fn mean_prior_delta(&self, arm: usize, delta: f64) -> f64 {
        let p = &self.prior.precision;
        let pd: f64 = (0..self.mu.len())
            .map(|k| p[[arm, k]] * (self.mu[k] - self.prior.m0[k]))
            .sum();
        -(delta * pd + 0.5 * delta * delta * p[[arm, arm]])
    }

    /// Metropolis step on `mu[arm]`; returns whether it was accepted.
    fn step_mean(&mut self, arm: usize, step: f64, rng: &mut StdRng) -> Result<bool, InferenceError> {
        let z: f64 = rng.sample(StandardNormal);
        let delta = step * z;
        let current = self.mu[arm];
        let ls = self.log_sigma[arm];
        let log_ratio = self.mean_prior_delta(arm, delta)
            + self.arm_log_likelihood(arm, current + delta, ls)
            - self.arm_log_likelihood(arm, current, ls);
        self.accept(log_ratio, rng).map(|accepted| {
            if accepted {
                self.mu[arm] = current + delta;
            }
            accepted
        })
    }

    /// Metropolis step on `ln sigma[arm]`; returns whether it was accepted.
    fn step_scale(&mut self, arm: usize, step: f64, rng: &mut StdRng) -> Result<bool, InferenceError> {
        let z: f64 = rng.sample(StandardNormal);
        let current = self.log_sigma[arm];
        let proposed = current + step * z;
        let mu = self.mu[arm];
        let log_ratio = self.log_scale_prior(proposed) + self.arm_log_likelihood(arm, mu, proposed)
            - self.log_scale_prior(current)
            - self.arm_log_likelihood(arm, mu, current);
        self.accept(log_ratio, rng).map(|accepted| {
            if accepted {
                self.log_sigma[arm] = proposed;
            }
            accepted
        })
    }

    fn accept(&self, log_ratio: f64, rng: &mut StdRng) -> Result<bool, InferenceError> {
        if log_ratio.is_nan() {
            return Err(InferenceError::NonFinite {
                message: format!("log acceptance ratio is NaN at mu={:?}", self.mu),
            });
        }
        if log_ratio >= 0.0 {
            return Ok(true);
        }
        let u: f64 = rng.random();
        Ok(u.ln() < log_ratio)
    }

    fn snapshot(&self) -> PosteriorDraw {
        PosteriorDraw {
            mean: self.mu.clone(),
            scale: self.log_sigma.iter().map(|ls| ls.exp()).collect(),
        }
    }
}

impl PosteriorEngine for MetropolisEngine {
    fn infer(
        &mut self,
        prior: &GpPrior,
        observations: &[Vec<f64>],
        settings: &ChainSettings,
        count: usize,
    ) -> Result<Vec<PosteriorDraw>, InferenceError> {
        let n = prior.size();
        let thin = settings.thin.max(1);
        let requested = settings.tune + settings.burn + thin * count;
        let started = Instant::now();

        let mut chain = Chain::new(prior, observations);
        let mut mean_steps: Vec<f64> = (0..n).map(|i| prior.kernel[[i, i]].sqrt() * 0.5).collect();
        let mut scale_steps = vec![0.5; n];
        let mut mean_accepts = vec![0usize; n];
        let mut scale_accepts = vec![0usize; n];
        let mut kept_accepts = 0usize;
        let mut draws = Vec::with_capacity(count);

        for sweep in 0..requested {
            for arm in 0..n {
                if chain.step_mean(arm, mean_steps[arm], &mut self.rng)? {
                    mean_accepts[arm] += 1;
                    kept_accepts += usize::from(sweep >= settings.tune);
                }
                if chain.step_scale(arm, scale_steps[arm], &mut self.rng)? {
                    scale_accepts[arm] += 1;
                }
            }

            if sweep < settings.tune && (sweep + 1) % ADAPT_WINDOW == 0 {
                let window = ((sweep + 1) / ADAPT_WINDOW) as f64;
                let adjust = (1.0 / window.sqrt()).min(0.5);
                adapt(&mut mean_steps, &mut mean_accepts, adjust);
                adapt(&mut scale_steps, &mut scale_accepts, adjust);
            }

            if sweep >= settings.tune {
                let kept = sweep - settings.tune;
                if kept >= settings.burn && (kept - settings.burn) % thin == 0 {
                    draws.push(chain.snapshot());
                }
            }

            if let Some(limit) = settings.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit && sweep + 1 < requested {
                    return Err(InferenceError::Timeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                        completed: sweep + 1,
                        requested,
                    });
                }
            }
        }

        let post_tune = (requested - settings.tune).max(1) * n.max(1);
        debug!(
            "Metropolis chain finished {} sweeps over {} arms in {:?} (mean acceptance {:.2})",
            requested,
            n,
            started.elapsed(),
            kept_accepts as f64 / post_tune as f64
        );

        Ok(draws)
    }
}

/// Nudge each step size toward the target acceptance rate and reset the window.
fn adapt(steps: &mut [f64], accepts: &mut [usize], adjust: f64) {
    for (step, hits) in steps.iter_mut().zip(accepts.iter_mut()) {
        let rate = *hits as f64 / ADAPT_WINDOW as f64;
        let factor = if rate > TARGET_ACCEPTANCE {
            adjust.exp()
        } else {
            (-adjust).exp()
        };
        *step *= factor;
        *hits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{cholesky, cholesky_inverse};
    use ndarray::array;

    fn prior(kernel: Array2<f64>, m0: Vec<f64>) -> GpPrior {
        let l = cholesky(&kernel).unwrap();
        GpPrior {
            m0,
            precision: cholesky_inverse(&l),
            kernel,
            gamma_alpha: 2.0,
            gamma_beta: 2.0,
        }
    }

    fn settings(burn: usize, thin: usize, tune: usize) -> ChainSettings {
        ChainSettings {
            burn,
            thin,
            tune,
            timeout: None,
        }
    }

    #[test]
    fn returns_exactly_count_draws() {
        let p = prior(array![[1.0, 0.0], [0.0, 1.0]], vec![0.0, 0.0]);
        let mut engine = MetropolisEngine::with_seed(1);
        let draws = engine
            .infer(&p, &[vec![], vec![]], &settings(10, 3, 20), 7)
            .unwrap();
        assert_eq!(draws.len(), 7);
        for d in &draws {
            assert_eq!(d.mean.len(), 2);
            assert!(d.scale.iter().all(|&s| s > 0.0 && s.is_finite()));
        }
    }

    #[test]
    fn zero_count_yields_no_draws() {
        let p = prior(array![[1.0]], vec![0.0]);
        let mut engine = MetropolisEngine::with_seed(1);
        let draws = engine.infer(&p, &[], &settings(5, 2, 5), 0).unwrap();
        assert!(draws.is_empty());
    }

    #[test]
    fn posterior_mean_follows_the_data() {
        let p = prior(array![[25.0, 0.0], [0.0, 25.0]], vec![0.0, 0.0]);
        let data = vec![vec![4.0, 4.2, 3.8, 4.1, 3.9, 4.0], vec![-3.0, -3.1, -2.9, -3.0]];
        let mut engine = MetropolisEngine::with_seed(42);
        let draws = engine.infer(&p, &data, &settings(200, 2, 600), 300).unwrap();

        let mean0: f64 = draws.iter().map(|d| d.mean[0]).sum::<f64>() / draws.len() as f64;
        let mean1: f64 = draws.iter().map(|d| d.mean[1]).sum::<f64>() / draws.len() as f64;
        assert!((mean0 - 4.0).abs() < 0.5, "mean0={mean0}");
        assert!((mean1 + 3.0).abs() < 0.5, "mean1={mean1}");
    }

    #[test]
    fn zero_timeout_stops_the_chain() {
        let p = prior(array![[1.0]], vec![0.0]);
        let mut engine = MetropolisEngine::with_seed(3);
        let cfg = ChainSettings {
            timeout: Some(Duration::ZERO),
            ..settings(100, 3, 1500)
        };
        match engine.infer(&p, &[vec![1.0]], &cfg, 10) {
            Err(InferenceError::Timeout {
                completed,
                requested,
                ..
            }) => {
                assert!(completed < requested);
                assert_eq!(requested, cfg.total_sweeps(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
