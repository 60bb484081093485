//! Evaluation outcomes: one evaluated configuration plus its lazily computed
//! metric and validity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::errors::EvaluationError;

/// Unique sample identifier, assigned at construction.
pub type SampleId = Uuid;

/// A single attribute value of an evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Parameter name to value. Opaque to the reward models and the solver.
pub type Attributes = HashMap<String, ParameterValue>;

/// Quality metric and validity predicate bound to a sample's attributes.
///
/// Implementations must be pure functions of the attributes, but nothing
/// memoizes them: every call on [`Sample`] re-invokes the evaluator.
pub trait Evaluator: Send + Sync {
    fn metric(&self, attributes: &Attributes) -> anyhow::Result<f64>;

    fn is_valid(&self, attributes: &Attributes) -> anyhow::Result<bool>;
}

/// [`Evaluator`] built from a pair of closures.
pub struct FnEvaluator<M, V> {
    metric: M,
    valid: V,
}

impl<M, V> FnEvaluator<M, V>
where
    M: Fn(&Attributes) -> anyhow::Result<f64> + Send + Sync,
    V: Fn(&Attributes) -> anyhow::Result<bool> + Send + Sync,
{
    pub fn new(metric: M, valid: V) -> Self {
        Self { metric, valid }
    }
}

impl<M, V> Evaluator for FnEvaluator<M, V>
where
    M: Fn(&Attributes) -> anyhow::Result<f64> + Send + Sync,
    V: Fn(&Attributes) -> anyhow::Result<bool> + Send + Sync,
{
    fn metric(&self, attributes: &Attributes) -> anyhow::Result<f64> {
        (self.metric)(attributes)
    }

    fn is_valid(&self, attributes: &Attributes) -> anyhow::Result<bool> {
        (self.valid)(attributes)
    }
}

/// Wrap infallible closures into a shareable evaluator.
pub fn evaluator_fn<M, V>(metric: M, valid: V) -> Arc<dyn Evaluator>
where
    M: Fn(&Attributes) -> f64 + Send + Sync + 'static,
    V: Fn(&Attributes) -> bool + Send + Sync + 'static,
{
    Arc::new(FnEvaluator::new(
        move |attrs: &Attributes| Ok(metric(attrs)),
        move |attrs: &Attributes| Ok(valid(attrs)),
    ))
}

/// One evaluated configuration.
///
/// Cloning is cheap and keeps the same id; the evaluator is shared.
#[derive(Clone)]
pub struct Sample {
    id: SampleId,
    attributes: Attributes,
    evaluator: Arc<dyn Evaluator>,
}

impl Sample {
    pub fn new(attributes: Attributes, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            id: Uuid::new_v4(),
            attributes,
            evaluator,
        }
    }

    pub fn id(&self) -> SampleId {
        self.id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Evaluate the quality metric. Not cached: call once and keep the value.
    pub fn get_metric(&self) -> Result<f64, EvaluationError> {
        self.evaluator.metric(&self.attributes).map_err(|source| {
            error!("Metric evaluation failed for sample {}: {}", self.id, source);
            EvaluationError::MetricFailed {
                sample_id: self.id,
                source,
            }
        })
    }

    /// Evaluate the validity predicate. Not cached: call once and keep the value.
    pub fn is_valid(&self) -> Result<bool, EvaluationError> {
        self.evaluator.is_valid(&self.attributes).map_err(|source| {
            error!("Validity check failed for sample {}: {}", self.id, source);
            EvaluationError::ValidityFailed {
                sample_id: self.id,
                source,
            }
        })
    }

    /// Evaluate validity and metric exactly once each and keep the verdicts.
    pub fn evaluate(&self) -> Result<EvaluatedSample, EvaluationError> {
        let valid = self.is_valid()?;
        let metric = self.get_metric()?;
        Ok(EvaluatedSample {
            sample: self.clone(),
            metric,
            valid,
        })
    }
}

/// A sample together with its once-evaluated metric and validity.
#[derive(Debug, Clone)]
pub struct EvaluatedSample {
    sample: Sample,
    metric: f64,
    valid: bool,
}

impl EvaluatedSample {
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn metric(&self) -> f64 {
        self.metric
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn into_sample(self) -> Sample {
        self.sample
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn attrs(pairs: &[(&str, f64)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ParameterValue::Float(*v)))
            .collect()
    }

    #[test]
    fn metric_and_validity_read_attributes() {
        let evaluator = evaluator_fn(
            |a| a.values().filter_map(ParameterValue::as_f64).sum(),
            |a| a.get("slack").and_then(ParameterValue::as_f64).unwrap_or(0.0) > 0.0,
        );
        let sample = Sample::new(attrs(&[("slack", 0.5), ("area", 2.0)]), evaluator);

        assert_eq!(sample.get_metric().unwrap(), 2.5);
        assert!(sample.is_valid().unwrap());
    }

    #[test]
    fn each_sample_gets_a_fresh_id() {
        let evaluator = evaluator_fn(|_| 0.0, |_| true);
        let a = Sample::new(Attributes::new(), evaluator.clone());
        let b = Sample::new(Attributes::new(), evaluator);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn evaluation_is_not_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let evaluator = evaluator_fn(
            move |_| counter.fetch_add(1, Ordering::SeqCst) as f64,
            |_| true,
        );
        let sample = Sample::new(Attributes::new(), evaluator);

        assert_eq!(sample.get_metric().unwrap(), 0.0);
        assert_eq!(sample.get_metric().unwrap(), 1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn metric_failure_is_distinguishable() {
        let evaluator = Arc::new(FnEvaluator::new(
            |_: &Attributes| Err(anyhow::anyhow!("timing report missing")),
            |_: &Attributes| Ok(true),
        ));
        let sample = Sample::new(Attributes::new(), evaluator);

        match sample.get_metric() {
            Err(EvaluationError::MetricFailed { sample_id, source }) => {
                assert_eq!(sample_id, sample.id());
                assert!(source.to_string().contains("timing report missing"));
            }
            other => panic!("expected MetricFailed, got {other:?}"),
        }
        assert!(sample.is_valid().unwrap());
    }

    #[test]
    fn validity_failure_is_distinguishable() {
        let evaluator = Arc::new(FnEvaluator::new(
            |_: &Attributes| Ok(1.0),
            |_: &Attributes| Err(anyhow::anyhow!("constraint file unreadable")),
        ));
        let sample = Sample::new(Attributes::new(), evaluator);

        assert!(matches!(
            sample.is_valid(),
            Err(EvaluationError::ValidityFailed { .. })
        ));
    }

    #[test]
    fn evaluate_calls_each_function_once() {
        let metric_calls = Arc::new(AtomicUsize::new(0));
        let valid_calls = Arc::new(AtomicUsize::new(0));
        let (m, v) = (metric_calls.clone(), valid_calls.clone());
        let evaluator = evaluator_fn(
            move |_| {
                m.fetch_add(1, Ordering::SeqCst);
                3.0
            },
            // Flips on every call; the first verdict is the one kept.
            move |_| v.fetch_add(1, Ordering::SeqCst) % 2 == 1,
        );
        let sample = Sample::new(Attributes::new(), evaluator);

        let evaluated = sample.evaluate().unwrap();
        assert!(!evaluated.is_valid());
        assert_eq!(evaluated.metric(), 3.0);
        assert_eq!(evaluated.sample().id(), sample.id());
        assert_eq!(metric_calls.load(Ordering::SeqCst), 1);
        assert_eq!(valid_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parameter_value_display_and_numeric_view() {
        assert_eq!(ParameterValue::Int(7).to_string(), "7");
        assert_eq!(ParameterValue::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(ParameterValue::Json(serde_json::json!("x")).as_f64(), None);
        let json = serde_json::to_string(&ParameterValue::Float(1.5)).unwrap();
        assert_eq!(json, "1.5");
    }
}
