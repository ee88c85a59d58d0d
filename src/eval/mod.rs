//! Fitness evaluation strategies.
//!
//! An [`Evaluator`] turns a partially scored population into a fully scored
//! one of the same length and order. Already scored individuals pass through
//! untouched. [`ConcurrentEvaluator`] scores each remaining individual as its
//! own job on an [`Executor`]; [`BatchEvaluator`] hands all remaining
//! genotypes to a user-supplied [`GenotypeEvaluator`] in one call; and
//! [`AsyncEvaluator`] drives an [`AsyncFitness`] problem on Tokio.

mod asynchronous;

pub use asynchronous::{AsyncEvaluator, AsyncFitness};

use crate::core::{Fitness, Phenotype, Population};
use crate::error::{EngineError, EngineResult};
use crate::exec::{self, Executor};
use futures::executor::block_on;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::trace;

/// Scores every unscored individual of a population.
///
/// The returned population must have the same length as the input and keep
/// every individual at its position.
pub trait Evaluator<G, C>: Send + Sync {
    /// Returns `population` with every individual scored.
    ///
    /// # Errors
    /// Implementations report task failures and result count mismatches as
    /// [`EngineError`].
    fn evaluate(&self, population: &Population<G, C>) -> EngineResult<Population<G, C>>;
}

impl<G, C, T: Evaluator<G, C> + ?Sized> Evaluator<G, C> for Box<T> {
    fn evaluate(&self, population: &Population<G, C>) -> EngineResult<Population<G, C>> {
        (**self).evaluate(population)
    }
}

impl<G, C, T: Evaluator<G, C> + ?Sized> Evaluator<G, C> for Arc<T> {
    fn evaluate(&self, population: &Population<G, C>) -> EngineResult<Population<G, C>> {
        (**self).evaluate(population)
    }
}

/// Default evaluator: one job per unscored individual on an [`Executor`].
///
/// # Examples
/// ```
/// use jeans_engine::eval::{ConcurrentEvaluator, Evaluator};
/// use jeans_engine::exec::InlineExecutor;
/// use jeans_engine::{Fitness, Phenotype, Population};
/// use std::sync::Arc;
///
/// let fitness = Fitness::new(|x: &u32| x * 2);
/// let population: Population<u32, u32> =
///     (1..4).map(|x| Phenotype::new(x, 1, fitness.clone())).collect();
/// let evaluator = ConcurrentEvaluator::new(Arc::new(InlineExecutor));
/// let scored = evaluator.evaluate(&population).unwrap();
/// assert_eq!(scored[2].fitness(), Some(&6));
/// ```
#[derive(Clone)]
pub struct ConcurrentEvaluator {
    executor: Arc<dyn Executor>,
}

impl ConcurrentEvaluator {
    /// Creates an evaluator dispatching to `executor`.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

impl std::fmt::Debug for ConcurrentEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentEvaluator").finish_non_exhaustive()
    }
}

impl<G, C> Evaluator<G, C> for ConcurrentEvaluator
where
    G: Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    fn evaluate(&self, population: &Population<G, C>) -> EngineResult<Population<G, C>> {
        let pending: Vec<_> = population
            .iter()
            .filter(|pt| !pt.is_evaluated())
            .map(|pt| {
                let pt = pt.clone();
                exec::spawn(self.executor.as_ref(), move || {
                    pt.binding().eval(pt.genotype())
                })
            })
            .collect();
        if pending.is_empty() {
            return Ok(population.clone());
        }
        trace!(unevaluated = pending.len(), "dispatching fitness jobs");
        let scores = block_on(try_join_all(pending))?;
        Ok(splice(population, scores))
    }
}

/// Scores a whole set of genotypes at once, e.g. with one external call.
///
/// The returned vector must hold one score per genotype, in order. Any
/// matching closure is a genotype evaluator.
pub trait GenotypeEvaluator<G, C>: Send + Sync {
    /// Scores `genotypes`; `fitness` is the binding of the population.
    fn evaluate(&self, genotypes: &[&G], fitness: &Fitness<G, C>) -> Vec<C>;
}

impl<G, C, F> GenotypeEvaluator<G, C> for F
where
    F: Fn(&[&G], &Fitness<G, C>) -> Vec<C> + Send + Sync,
{
    fn evaluate(&self, genotypes: &[&G], fitness: &Fitness<G, C>) -> Vec<C> {
        self(genotypes, fitness)
    }
}

/// Evaluator that scores all unscored individuals with one
/// [`GenotypeEvaluator`] call.
///
/// # Examples
/// ```
/// use jeans_engine::eval::{BatchEvaluator, Evaluator};
/// use jeans_engine::{Fitness, Phenotype, Population};
///
/// let fitness = Fitness::new(|x: &i32| *x);
/// let population: Population<i32, i32> = vec![
///     Phenotype::new(3, 1, fitness.clone()).evaluate(),
///     Phenotype::new(5, 1, fitness.clone()),
/// ]
/// .into();
/// let evaluator = BatchEvaluator::new(|genotypes: &[&i32], _: &Fitness<i32, i32>| -> Vec<i32> {
///     genotypes.iter().map(|x| **x * 100).collect()
/// });
/// let scored = evaluator.evaluate(&population).unwrap();
/// assert_eq!(scored[0].fitness(), Some(&3));
/// assert_eq!(scored[1].fitness(), Some(&500));
/// ```
#[derive(Debug, Clone)]
pub struct BatchEvaluator<E> {
    inner: E,
}

impl<E> BatchEvaluator<E> {
    /// Wraps a genotype evaluator.
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<G, C, E> Evaluator<G, C> for BatchEvaluator<E>
where
    E: GenotypeEvaluator<G, C>,
    G: Send + Sync,
    C: Clone + Send + Sync,
{
    fn evaluate(&self, population: &Population<G, C>) -> EngineResult<Population<G, C>> {
        let unevaluated: Vec<&Phenotype<G, C>> =
            population.iter().filter(|pt| !pt.is_evaluated()).collect();
        let Some(first) = unevaluated.first() else {
            return Ok(population.clone());
        };
        let genotypes: Vec<&G> = unevaluated.iter().map(|pt| pt.genotype()).collect();
        trace!(unevaluated = genotypes.len(), "evaluating genotype batch");
        let scores = self.inner.evaluate(&genotypes, first.binding());
        if scores.len() != genotypes.len() {
            return Err(EngineError::EvaluationCountMismatch {
                expected: genotypes.len(),
                found: scores.len(),
            });
        }
        Ok(splice(population, scores))
    }
}

/// Assigns `scores`, in order, to the unscored individuals of `population`.
pub(crate) fn splice<G, C: Clone>(
    population: &Population<G, C>,
    scores: Vec<C>,
) -> Population<G, C> {
    let mut scores = scores.into_iter();
    population
        .iter()
        .map(|pt| {
            if pt.is_evaluated() {
                return pt.clone();
            }
            match scores.next() {
                Some(score) => pt.with_fitness(score),
                None => pt.clone(),
            }
        })
        .collect()
}
