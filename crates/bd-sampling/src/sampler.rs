//! Sampler capability and the per-arm sampler set.

use async_trait::async_trait;
use bd_types::{Attributes, BdResult, Evaluator, ParameterValue, Sample, SamplingError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Source of evaluation outcomes for one arm.
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Produce exactly `count` samples. `count == 0` must yield an empty batch.
    async fn get_samples(&self, count: usize) -> BdResult<Vec<Sample>>;

    /// Human-readable sampler name.
    fn name(&self) -> &str;
}

/// Turns raw parameter vectors into samples bound to one evaluator.
#[derive(Clone)]
pub struct SampleFactory {
    attribute_names: Vec<String>,
    constants: Attributes,
    evaluator: Arc<dyn Evaluator>,
}

impl SampleFactory {
    pub fn new<I, S>(attribute_names: I, evaluator: Arc<dyn Evaluator>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attribute_names: attribute_names.into_iter().map(Into::into).collect(),
            constants: Attributes::new(),
            evaluator,
        }
    }

    /// Attributes copied verbatim into every sample.
    pub fn with_constants(mut self, constants: Attributes) -> Self {
        self.constants = constants;
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn constants(&self) -> &Attributes {
        &self.constants
    }

    /// Number of free parameters a value vector must supply.
    pub fn dimension(&self) -> usize {
        self.attribute_names.len()
    }

    /// Zip `values` with the attribute names and merge in the constants.
    pub fn make_sample(&self, values: &[f64]) -> Result<Sample, SamplingError> {
        if values.len() != self.attribute_names.len() {
            return Err(SamplingError::DimensionMismatch {
                expected: self.attribute_names.len(),
                actual: values.len(),
            });
        }

        let mut attributes: Attributes = self
            .attribute_names
            .iter()
            .cloned()
            .zip(values.iter().map(|&v| ParameterValue::Float(v)))
            .collect();
        attributes.extend(self.constants.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Sample::new(attributes, self.evaluator.clone()))
    }
}

impl fmt::Debug for SampleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleFactory")
            .field("attribute_names", &self.attribute_names)
            .field("constants", &self.constants)
            .finish_non_exhaustive()
    }
}

/// One sampler per arm, queried concurrently with a bounded worker count.
///
/// [`SamplerSet::get_samples`] is a hard barrier: it returns only after every
/// arm's batch has arrived, or fails as a whole.
#[derive(Clone)]
pub struct SamplerSet {
    samplers: Vec<Arc<dyn Sampler>>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl SamplerSet {
    /// `max_concurrency` of zero is treated as one.
    pub fn new(samplers: Vec<Arc<dyn Sampler>>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            samplers,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    /// Number of arms.
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn samplers(&self) -> &[Arc<dyn Sampler>] {
        &self.samplers
    }

    /// Fetch `counts[i]` samples from arm `i`'s sampler, for every arm.
    pub async fn get_samples(&self, counts: &[usize]) -> BdResult<Vec<Vec<Sample>>> {
        if counts.len() != self.samplers.len() {
            return Err(SamplingError::CountMismatch {
                expected: self.samplers.len(),
                actual: counts.len(),
            }
            .into());
        }

        let mut batches: Vec<Vec<Sample>> = vec![Vec::new(); counts.len()];
        let mut tasks = JoinSet::new();
        let mut arms = HashMap::new();

        for (arm, (&count, sampler)) in counts.iter().zip(&self.samplers).enumerate() {
            if count == 0 {
                continue;
            }
            let sampler = sampler.clone();
            let permits = self.permits.clone();
            let handle = tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| SamplingError::WorkerFailed {
                        arm,
                        message: e.to_string(),
                    })?;
                debug!("Sampler {} ({}) drawing {} samples", arm, sampler.name(), count);
                sampler.get_samples(count).await
            });
            arms.insert(handle.id(), arm);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    let arm = arms.get(&e.id()).copied().unwrap_or_default();
                    error!("Sampler worker for arm {} did not complete: {}", arm, e);
                    return Err(SamplingError::WorkerFailed {
                        arm,
                        message: e.to_string(),
                    }
                    .into());
                }
            };
            let arm = arms.get(&id).copied().unwrap_or_default();
            let batch = result?;
            if batch.len() != counts[arm] {
                return Err(SamplingError::BatchLengthMismatch {
                    arm,
                    requested: counts[arm],
                    actual: batch.len(),
                }
                .into());
            }
            batches[arm] = batch;
        }

        Ok(batches)
    }
}

impl fmt::Debug for SamplerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.samplers.iter().map(|s| s.name()).collect();
        f.debug_struct("SamplerSet")
            .field("samplers", &names)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bd_types::{evaluator_fn, BdError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns `count` copies of a fixed point and records each call.
    struct FixedSampler {
        factory: SampleFactory,
        point: Vec<f64>,
        calls: AtomicUsize,
    }

    impl FixedSampler {
        fn new(metric: f64) -> Self {
            Self {
                factory: SampleFactory::new(["x"], evaluator_fn(move |_| metric, |_| true)),
                point: vec![metric],
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Sampler for FixedSampler {
        async fn get_samples(&self, count: usize) -> BdResult<Vec<Sample>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (0..count)
                .map(|_| self.factory.make_sample(&self.point).map_err(BdError::from))
                .collect()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Tracks how many calls overlap.
    struct SlowSampler {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Sampler for SlowSampler {
        async fn get_samples(&self, count: usize) -> BdResult<Vec<Sample>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let factory = SampleFactory::new(Vec::<String>::new(), evaluator_fn(|_| 0.0, |_| true));
            (0..count)
                .map(|_| factory.make_sample(&[]).map_err(BdError::from))
                .collect()
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct ShortSampler;

    #[async_trait]
    impl Sampler for ShortSampler {
        async fn get_samples(&self, _count: usize) -> BdResult<Vec<Sample>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    struct PanickingSampler;

    #[async_trait]
    impl Sampler for PanickingSampler {
        async fn get_samples(&self, _count: usize) -> BdResult<Vec<Sample>> {
            panic!("sampler exploded")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[test]
    fn make_sample_merges_constants() {
        let factory = SampleFactory::new(
            ["random_name0", "random_name1"],
            evaluator_fn(
                |attrs| attrs.values().filter_map(ParameterValue::as_f64).sum(),
                |_| true,
            ),
        )
        .with_constant("constant1", 1i64);

        let sample = factory.make_sample(&[0.25, 0.5]).unwrap();
        assert_eq!(sample.attributes().len(), 3);
        assert_eq!(sample.attributes()["constant1"], ParameterValue::Int(1));
        assert!((sample.get_metric().unwrap() - 1.75).abs() < 1e-12);
    }

    #[test]
    fn make_sample_rejects_wrong_dimension() {
        let factory = SampleFactory::new(["a", "b"], evaluator_fn(|_| 0.0, |_| true));
        assert!(matches!(
            factory.make_sample(&[1.0]),
            Err(SamplingError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn batches_follow_requested_counts() {
        let zero = Arc::new(FixedSampler::new(0.0));
        let one = Arc::new(FixedSampler::new(1.0));
        let set = SamplerSet::new(vec![zero.clone() as Arc<dyn Sampler>, one.clone()], 4);

        let batches = set.get_samples(&[5, 9]).await.unwrap();
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![5, 9]);
        assert!(batches[0].iter().all(|s| s.get_metric().unwrap() == 0.0));
        assert!(batches[1].iter().all(|s| s.get_metric().unwrap() == 1.0));
    }

    #[tokio::test]
    async fn zero_count_skips_the_sampler() {
        let zero = Arc::new(FixedSampler::new(0.0));
        let one = Arc::new(FixedSampler::new(1.0));
        let set = SamplerSet::new(vec![zero.clone() as Arc<dyn Sampler>, one.clone()], 2);

        let batches = set.get_samples(&[0, 3]).await.unwrap();
        assert!(batches[0].is_empty());
        assert_eq!(batches[1].len(), 3);
        assert_eq!(zero.calls.load(Ordering::SeqCst), 0);
        assert_eq!(one.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn count_length_must_match_arms() {
        let set = SamplerSet::new(vec![Arc::new(FixedSampler::new(0.0)) as Arc<dyn Sampler>], 1);
        let err = set.get_samples(&[1, 1]).await.unwrap_err();
        assert!(matches!(
            err,
            BdError::Sampling(SamplingError::CountMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn short_batch_is_rejected() {
        let set = SamplerSet::new(vec![Arc::new(ShortSampler) as Arc<dyn Sampler>], 1);
        let err = set.get_samples(&[2]).await.unwrap_err();
        assert!(matches!(
            err,
            BdError::Sampling(SamplingError::BatchLengthMismatch {
                arm: 0,
                requested: 2,
                actual: 0
            })
        ));
    }

    #[tokio::test]
    async fn panicking_worker_fails_the_call() {
        let set = SamplerSet::new(
            vec![
                Arc::new(FixedSampler::new(0.0)) as Arc<dyn Sampler>,
                Arc::new(PanickingSampler),
            ],
            2,
        );
        let err = set.get_samples(&[1, 1]).await.unwrap_err();
        assert!(matches!(
            err,
            BdError::Sampling(SamplingError::WorkerFailed { arm: 1, .. })
        ));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let samplers: Vec<Arc<dyn Sampler>> = (0..6)
            .map(|_| {
                Arc::new(SlowSampler {
                    active: active.clone(),
                    peak: peak.clone(),
                }) as Arc<dyn Sampler>
            })
            .collect();
        let set = SamplerSet::new(samplers, 2);

        let batches = set.get_samples(&[1; 6]).await.unwrap();
        assert_eq!(batches.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }
}
