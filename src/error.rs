//! Error types reported by the engine.

use std::any::Any;

/// Convenience alias for results of an evolution step.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while validating an engine configuration.
///
/// These are only produced by [`EngineBuilder::build`](crate::EngineBuilder::build)
/// and the executor constructors, never during evolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The population must hold at least one individual.
    #[error("population size must be greater than zero (received {0})")]
    InvalidPopulationSize(usize),
    /// A fraction was outside `[0, 1]` or not finite.
    #[error("{name} must be within [0, 1] (received {value})")]
    InvalidFraction {
        /// Name of the offending setting.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// An explicit offspring or survivor size exceeds the population size.
    #[error("{name} of {size} exceeds the population size of {population_size}")]
    SizeExceedsPopulation {
        /// Name of the offending setting.
        name: &'static str,
        /// Requested size.
        size: usize,
        /// Configured population size.
        population_size: usize,
    },
    /// A concurrency limit of zero was requested.
    #[error("max concurrency must be at least one")]
    InvalidConcurrency,
    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// The Tokio runtime could not be created.
    #[error("failed to initialize Tokio runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Errors that abort a single evolution step.
///
/// A failed step leaves the engine untouched; later steps are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Generations are counted from one.
    #[error("generation must be at least one (received {0})")]
    InvalidGeneration(u64),
    /// A stage produced a population of the wrong size.
    #[error("expected {expected} individuals, but got {found} after {stage}")]
    PopulationSizeMismatch {
        /// Stage that broke the size invariant.
        stage: &'static str,
        /// Required number of individuals.
        expected: usize,
        /// Number of individuals produced.
        found: usize,
    },
    /// A batch evaluator returned the wrong number of scores.
    #[error("expected {expected} fitness values, but got {found}; check the genotype evaluator")]
    EvaluationCountMismatch {
        /// Number of genotypes submitted.
        expected: usize,
        /// Number of scores returned.
        found: usize,
    },
    /// A user-supplied collaborator panicked inside a task.
    #[error("task panicked: {message}")]
    TaskPanicked {
        /// Panic payload rendered as text.
        message: String,
    },
    /// The executor dropped a task before it ran.
    #[error("task was dropped by the executor before completing")]
    TaskCanceled,
}

impl EngineError {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::TaskPanicked { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_rendered() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(
            EngineError::from_panic(payload.as_ref()),
            EngineError::TaskPanicked {
                message: "boom".to_owned()
            }
        );
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert!(EngineError::from_panic(payload.as_ref())
            .to_string()
            .contains("bang"));
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert!(matches!(
            EngineError::from_panic(payload.as_ref()),
            EngineError::TaskPanicked { .. }
        ));
    }

    #[test]
    fn size_mismatch_names_the_stage() {
        let err = EngineError::PopulationSizeMismatch {
            stage: "evaluation",
            expected: 10,
            found: 9,
        };
        assert_eq!(
            err.to_string(),
            "expected 10 individuals, but got 9 after evaluation"
        );
    }
}
