use thiserror::Error;
use uuid::Uuid;

/// Main error type for the Bandolier system
#[derive(Error, Debug)]
pub enum BdError {
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Reward model error: {0}")]
    Model(#[from] ModelError),

    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl BdError {
    /// Whether a caller may retry the failed operation without rebuilding state.
    ///
    /// Only posterior inference failures qualify; the model keeps its buffered
    /// observations when inference gives up.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BdError::Model(ModelError::Inference(_)))
    }
}

/// Failures raised while evaluating a sample's metric or validity predicate.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Metric evaluation failed for sample {sample_id}: {source}")]
    MetricFailed {
        sample_id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error("Validity check failed for sample {sample_id}: {source}")]
    ValidityFailed {
        sample_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
}

impl EvaluationError {
    pub fn sample_id(&self) -> Uuid {
        match self {
            Self::MetricFailed { sample_id, .. } | Self::ValidityFailed { sample_id, .. } => {
                *sample_id
            }
        }
    }
}

/// Reward model errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Arm index {index} out of range for model of size {size}")]
    ArmOutOfRange { index: usize, size: usize },

    #[error("Invalid prior: {message}")]
    InvalidPrior { message: String },

    #[error("Posterior inference failed: {0}")]
    Inference(#[from] InferenceError),
}

/// Deferred posterior inference errors (Gaussian-process surrogate)
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Inference timed out after {elapsed_ms} ms ({completed} of {requested} sweeps)")]
    Timeout {
        elapsed_ms: u64,
        completed: usize,
        requested: usize,
    },

    #[error("Chain produced a non-finite state: {message}")]
    NonFinite { message: String },
}

/// Sampler collaborator errors
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Expected {expected} per-arm counts, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Sampler for arm {arm} returned {actual} samples, requested {requested}")]
    BatchLengthMismatch {
        arm: usize,
        requested: usize,
        actual: usize,
    },

    #[error("Dimension mismatch: expected vector of dim {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Sampler worker for arm {arm} failed: {message}")]
    WorkerFailed { arm: usize, message: String },
}

/// Thompson sampling loop errors
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Reward model size {model_size} does not match {num_arms} arms")]
    SizeMismatch { model_size: usize, num_arms: usize },

    #[error("Posterior matrix has shape ({rows}, {cols}), expected ({expected_rows}, {expected_cols})")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("Round {round} failed: {source}")]
    RoundFailed {
        round: usize,
        #[source]
        source: Box<BdError>,
    },
}

/// Result type alias for Bandolier operations
pub type BdResult<T> = Result<T, BdError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BdError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BdError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SamplingError::BatchLengthMismatch {
            arm: 2,
            requested: 5,
            actual: 3,
        };

        assert!(error.to_string().contains("arm 2"));
        assert!(error.to_string().contains("5"));
        assert!(error.to_string().contains("3"));
    }

    #[test]
    fn test_error_conversion() {
        let model_error = ModelError::ArmOutOfRange { index: 4, size: 2 };
        let bd_error: BdError = model_error.into();

        match bd_error {
            BdError::Model(ModelError::ArmOutOfRange { index: 4, size: 2 }) => (),
            other => panic!("Expected Model error, got {other:?}"),
        }
    }

    #[test]
    fn only_inference_failures_are_recoverable() {
        let timeout: BdError = ModelError::from(InferenceError::Timeout {
            elapsed_ms: 10,
            completed: 1,
            requested: 100,
        })
        .into();
        assert!(timeout.is_recoverable());

        let mismatch: BdError = SolverError::SizeMismatch {
            model_size: 2,
            num_arms: 3,
        }
        .into();
        assert!(!mismatch.is_recoverable());
    }

    #[test]
    fn evaluation_error_keeps_cause() {
        let id = Uuid::new_v4();
        let err = EvaluationError::MetricFailed {
            sample_id: id,
            source: anyhow::anyhow!("simulator crashed"),
        };
        assert_eq!(err.sample_id(), id);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("simulator crashed"));
    }

    #[test]
    fn test_macros() {
        let err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(err, BdError::Validation(_)));
        let err = config_error!("Missing required field: {}", "kernel");
        assert!(err.to_string().contains("kernel"));
    }
}
