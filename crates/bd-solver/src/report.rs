//! Incumbent tracking and per-round run reporting.

use bd_types::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RunId;

/// What happened in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: usize,
    /// Pulls assigned to each arm this round.
    pub tallies: Vec<usize>,
    /// Valid outcomes observed across all arms this round.
    pub valid_outcomes: usize,
    /// Incumbent metric after the round, if any valid outcome has been seen.
    pub incumbent_metric: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of a `solve` run.
///
/// `best` is `None` when the budget ran out without a single valid outcome.
/// That is a normal terminal result, not an error.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub run_id: RunId,
    pub model: String,
    pub best: Option<Sample>,
    pub best_metric: Option<f64>,
    /// Cumulative pulls per arm.
    pub pull_counts: Vec<u64>,
    pub rounds: Vec<RoundSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SolveReport {
    pub fn new(run_id: RunId, model: impl Into<String>, num_arms: usize) -> Self {
        Self {
            run_id,
            model: model.into(),
            best: None,
            best_metric: None,
            pull_counts: vec![0; num_arms],
            rounds: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Offer a valid outcome with its already-evaluated metric.
    ///
    /// Replaces the incumbent when there is none or `metric` is strictly
    /// greater; ties keep the earlier outcome. Returns whether it replaced.
    pub fn update_best(&mut self, sample: &Sample, metric: f64) -> bool {
        if metric.is_nan() {
            return false;
        }
        let improves = match self.best_metric {
            None => true,
            Some(current) => metric > current,
        };
        if improves {
            self.best = Some(sample.clone());
            self.best_metric = Some(metric);
        }
        improves
    }

    pub fn record_pulls(&mut self, tallies: &[usize]) {
        for (total, &n) in self.pull_counts.iter_mut().zip(tallies) {
            *total += n as u64;
        }
    }

    pub fn mark_finished(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn total_pulls(&self) -> u64 {
        self.pull_counts.iter().sum()
    }

    pub fn is_feasible(&self) -> bool {
        self.best.is_some()
    }

    /// Hand the winning outcome to the caller.
    pub fn into_best(self) -> Option<Sample> {
        self.best
    }
}
