//! Asynchronous fitness evaluation on a Tokio runtime.
//!
//! [`AsyncEvaluator`] bridges [`AsyncFitness`] implementations with the
//! synchronous generation step: it spawns one Tokio task per unscored
//! individual, bounded by a maximum number of in-flight tasks, and blocks
//! until every score has arrived.

use super::{splice, Evaluator};
use crate::core::Population;
use crate::error::{ConfigError, EngineError, EngineResult};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;
use tokio::runtime::{Builder, Runtime};
use tokio::task::{JoinError, JoinHandle};
use tracing::trace;

/// Fitness function that is awaited, e.g. because it calls a remote service.
#[async_trait]
pub trait AsyncFitness<G, C>: Send + Sync {
    /// Scores `genotype`.
    async fn fitness(&self, genotype: &G) -> C;
}

/// Evaluates [`AsyncFitness`] problems in parallel Tokio tasks.
///
/// The evaluator owns its runtime; calling it from inside another Tokio
/// runtime panics, as [`Runtime::block_on`] does.
pub struct AsyncEvaluator<P, G, C> {
    problem: Arc<P>,
    runtime: Runtime,
    max_tasks: usize,
    _marker: PhantomData<fn(&G) -> C>,
}

impl<P, G, C> AsyncEvaluator<P, G, C>
where
    P: AsyncFitness<G, C> + 'static,
    G: Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Creates an evaluator whose concurrency matches the available
    /// parallelism of the machine.
    ///
    /// # Errors
    /// Returns [`ConfigError::Runtime`] when the Tokio runtime cannot be
    /// initialized.
    pub fn new(problem: P) -> Result<Self, ConfigError> {
        let parallelism = thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_max_concurrency(problem, parallelism)
    }

    /// Creates an evaluator running at most `max_tasks` tasks at once.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidConcurrency`] when `max_tasks` is zero or
    /// [`ConfigError::Runtime`] if the Tokio runtime fails to initialize.
    pub fn with_max_concurrency(problem: P, max_tasks: usize) -> Result<Self, ConfigError> {
        if max_tasks == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        let runtime = Builder::new_multi_thread().enable_all().build()?;
        Ok(Self {
            problem: Arc::new(problem),
            runtime,
            max_tasks,
            _marker: PhantomData,
        })
    }

    /// Maximum number of in-flight tasks.
    #[must_use]
    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    async fn evaluate_batch(&self, population: &Population<G, C>) -> EngineResult<Vec<C>> {
        let mut pending: Vec<JoinHandle<(usize, C)>> = Vec::new();
        let mut scores: Vec<Option<C>> = Vec::new();
        for pt in population.iter().filter(|pt| !pt.is_evaluated()) {
            let idx = scores.len();
            scores.push(None);
            let problem = Arc::clone(&self.problem);
            let pt = pt.clone();
            pending.push(tokio::spawn(async move {
                let score = problem.fitness(pt.genotype()).await;
                (idx, score)
            }));
            if pending.len() >= self.max_tasks {
                Self::resolve_handles(&mut pending, &mut scores).await?;
            }
        }
        Self::resolve_handles(&mut pending, &mut scores).await?;
        scores
            .into_iter()
            .map(|score| score.ok_or(EngineError::TaskCanceled))
            .collect()
    }

    async fn resolve_handles(
        pending: &mut Vec<JoinHandle<(usize, C)>>,
        scores: &mut [Option<C>],
    ) -> EngineResult<()> {
        while let Some(handle) = pending.pop() {
            match handle.await {
                Ok((idx, score)) => scores[idx] = Some(score),
                Err(err) => {
                    // Cancel the rest of the batch.
                    for handle in pending.drain(..) {
                        handle.abort();
                    }
                    return Err(join_error(err));
                }
            }
        }
        Ok(())
    }
}

fn join_error(err: JoinError) -> EngineError {
    if err.is_panic() {
        EngineError::from_panic(err.into_panic().as_ref())
    } else {
        EngineError::TaskCanceled
    }
}

impl<P, G, C> Evaluator<G, C> for AsyncEvaluator<P, G, C>
where
    P: AsyncFitness<G, C> + 'static,
    G: Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    fn evaluate(&self, population: &Population<G, C>) -> EngineResult<Population<G, C>> {
        if population.unevaluated() == 0 {
            return Ok(population.clone());
        }
        trace!(
            unevaluated = population.unevaluated(),
            max_tasks = self.max_tasks,
            "evaluating population on tokio"
        );
        let scores = self.runtime.block_on(self.evaluate_batch(population))?;
        Ok(splice(population, scores))
    }
}
