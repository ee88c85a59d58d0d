//! The generation step.
//!
//! [`Engine::evolve`] turns one population into the next:
//!
//! 1. the input is evaluated on the calling thread,
//! 2. offspring and survivors are selected concurrently,
//! 3. the offspring are altered and then filtered while the survivors are
//!    filtered,
//! 4. both halves are combined, survivors first, and evaluated again.
//!
//! Stages 2 and 3 run as tasks on the configured [`Executor`] and are chained
//! as futures; the calling thread only blocks on the final join. An engine is
//! immutable and may run any number of steps at the same time.

mod builder;
mod filter;

pub use builder::EngineBuilder;
pub use filter::{FilterOutcome, PhenotypeFactory, PopulationFilter};

use crate::core::{
    EvolutionDurations, EvolutionResult, EvolutionStart, Fitness, Optimize, Phenotype, Population,
};
use crate::error::{EngineError, EngineResult};
use crate::eval::Evaluator;
use crate::exec::{Clock, Executor, Timed, TimedExecutor, Timer};
use crate::ops::{Alterer, AltererResult, GenotypeFactory, Selector, Validator};
use futures::executor::block_on;
use futures::future::try_join;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, debug_span, error, trace};

/// Post-processing applied to every step result.
pub type Mapper<G, C> = dyn Fn(EvolutionResult<G, C>) -> EvolutionResult<G, C> + Send + Sync;

/// Numeric settings of an engine.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineParams {
    /// Individuals per generation.
    pub population_size: usize,
    /// Offspring per generation.
    pub offspring_count: usize,
    /// Survivors per generation.
    pub survivors_count: usize,
    /// Age above which individuals are replaced.
    pub maximal_phenotype_age: u64,
    /// Optimization direction.
    pub optimize: Optimize,
    /// Maximum attempts for creating a valid individual.
    pub individual_creation_retries: usize,
}

/// Evolution engine performing one generation step per call.
///
/// # Examples
/// ```
/// use jeans_engine::exec::InlineExecutor;
/// use jeans_engine::Engine;
/// use rand::Rng;
///
/// let engine = Engine::builder(
///     |x: &f64| -(x - 3.0).powi(2),
///     || rand::thread_rng().gen_range(-10.0_f64..10.0),
/// )
/// .population_size(20)
/// .executor(InlineExecutor)
/// .build()
/// .unwrap();
///
/// let mut start = engine.evolution_start_from_genotypes(Vec::new(), 1);
/// for _ in 0..5 {
///     let result = engine.evolve_start(&start).unwrap();
///     assert_eq!(result.population.len(), 20);
///     start = result.next_start();
/// }
/// assert_eq!(start.generation(), 6);
/// ```
pub struct Engine<G, C> {
    fitness: Fitness<G, C>,
    genotype_factory: Arc<dyn GenotypeFactory<G>>,
    offspring_selector: Arc<dyn Selector<G, C>>,
    survivors_selector: Arc<dyn Selector<G, C>>,
    alterer: Arc<dyn Alterer<G, C>>,
    validator: Arc<Validator<G, C>>,
    optimize: Optimize,
    offspring_count: usize,
    survivors_count: usize,
    executor: TimedExecutor,
    evaluator: Arc<dyn Evaluator<G, C>>,
    filter: Arc<PopulationFilter<G, C>>,
    mapper: Arc<Mapper<G, C>>,
}

/// Timings and counts collected by the offspring half of a step.
struct OffspringStages<G, C> {
    selection: Duration,
    alter: Duration,
    alter_count: usize,
    filter: Timed<FilterOutcome<G, C>>,
}

/// Timings and counts collected by the survivor half of a step.
struct SurvivorStages<G, C> {
    selection: Duration,
    filter: Timed<FilterOutcome<G, C>>,
}

impl<G, C> Engine<G, C>
where
    G: Send + Sync + 'static,
    C: PartialOrd + Clone + Send + Sync + 'static,
{
    /// Creates a builder from the fitness function and the genotype source.
    pub fn builder<F, GF>(fitness_function: F, genotype_factory: GF) -> EngineBuilder<G, C>
    where
        F: Fn(&G) -> C + Send + Sync + 'static,
        GF: GenotypeFactory<G> + 'static,
    {
        EngineBuilder::new(Arc::new(fitness_function), Arc::new(genotype_factory))
    }

    /// Returns a builder carrying every setting of this engine.
    ///
    /// Engines built from it share this engine's fitness binding, so
    /// individuals move between them without being rescored.
    #[must_use]
    pub fn to_builder(&self) -> EngineBuilder<G, C> {
        EngineBuilder::from_engine(self)
    }
}

impl<G, C> Engine<G, C>
where
    G: Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Performs one generation step.
    ///
    /// `population` must hold exactly [`Self::population_size`] individuals;
    /// use [`Self::evolution_start`] to pad a smaller or foreign population.
    /// The input is not modified. The call blocks until the step completes.
    ///
    /// # Errors
    /// Fails with [`EngineError::InvalidGeneration`] for generation zero,
    /// [`EngineError::PopulationSizeMismatch`] when a stage produces the
    /// wrong number of individuals and with [`EngineError::TaskPanicked`]
    /// when a collaborator panics. A failed step has no effect on the engine.
    pub fn evolve(
        &self,
        population: &Population<G, C>,
        generation: u64,
    ) -> EngineResult<EvolutionResult<G, C>> {
        if generation == 0 {
            return Err(EngineError::InvalidGeneration(generation));
        }
        let span = debug_span!("evolve", generation);
        let _enter = span.enter();

        let clock: &dyn Clock = self.executor.clock().as_ref();
        let timer = Timer::start(clock);
        check_size("input", self.population_size(), population.len())?;

        let initial = Timed::measure(clock, || self.evaluator.evaluate(population));
        let evaluated = Arc::new(initial.result?);
        check_size("evaluation", population.len(), evaluated.len())?;
        trace!(elapsed = ?initial.duration, "population evaluated");

        let offspring = self.offspring_pipeline(&evaluated, generation);
        let survivors = self.survivor_pipeline(&evaluated, generation);
        let (offspring, survivors) = block_on(try_join(offspring, survivors))?;

        let kill_count = offspring.filter.result.kill_count + survivors.filter.result.kill_count;
        let invalid_count =
            offspring.filter.result.invalid_count + survivors.filter.result.invalid_count;
        let combined = survivors
            .filter
            .result
            .population
            .append(offspring.filter.result.population);
        check_size("combination", self.population_size(), combined.len())?;

        let last = Timed::measure(clock, || self.evaluator.evaluate(&combined));
        let next = last.result?;
        check_size("evaluation", combined.len(), next.len())?;

        let durations = EvolutionDurations {
            offspring_selection: offspring.selection,
            survivors_selection: survivors.selection,
            offspring_alter: offspring.alter,
            offspring_filter: offspring.filter.duration,
            survivor_filter: survivors.filter.duration,
            evaluation: initial.duration + last.duration,
            evolve: timer.stop(),
        };
        debug!(
            kill_count,
            invalid_count,
            alter_count = offspring.alter_count,
            elapsed = ?durations.evolve,
            "generation evolved"
        );
        let result = EvolutionResult {
            optimize: self.optimize,
            population: next,
            generation,
            durations,
            kill_count,
            invalid_count,
            alter_count: offspring.alter_count,
        };
        Ok((self.mapper)(result))
    }

    /// Performs one generation step on `start`.
    ///
    /// # Errors
    /// See [`Self::evolve`].
    pub fn evolve_start(
        &self,
        start: &EvolutionStart<G, C>,
    ) -> EngineResult<EvolutionResult<G, C>> {
        self.evolve(start.population(), start.generation())
    }

    /// Prepares `start` for this engine.
    ///
    /// Individuals bound to another fitness function are rebound to this
    /// engine's and lose their score. The population is then padded with new
    /// individuals of the start generation, or truncated, to the configured
    /// size.
    #[must_use]
    pub fn evolution_start(&self, start: EvolutionStart<G, C>) -> EvolutionStart<G, C> {
        let (population, generation) = start.into_parts();
        let factory = self.filter.factory();
        let population = population
            .into_iter()
            .map(|pt| {
                if pt.binding().same_as(&self.fitness) {
                    pt
                } else {
                    pt.rebind(&self.fitness)
                }
            })
            .chain(std::iter::repeat_with(|| factory.new_phenotype(generation)))
            .take(self.population_size())
            .collect();
        EvolutionStart::new(population, generation)
    }

    /// Wraps `genotypes` as unscored individuals of `generation` and prepares
    /// them with [`Self::evolution_start`].
    #[must_use]
    pub fn evolution_start_from_genotypes<I>(
        &self,
        genotypes: I,
        generation: u64,
    ) -> EvolutionStart<G, C>
    where
        I: IntoIterator<Item = G>,
    {
        let population = genotypes
            .into_iter()
            .map(|genotype| Phenotype::new(genotype, generation, self.fitness.clone()))
            .collect();
        self.evolution_start(EvolutionStart::new(population, generation))
    }

    async fn offspring_pipeline(
        &self,
        evaluated: &Arc<Population<G, C>>,
        generation: u64,
    ) -> EngineResult<OffspringStages<G, C>> {
        let count = self.offspring_count;
        let selected = self
            .select(Arc::clone(&self.offspring_selector), evaluated, count)
            .await?;
        check_size("offspring selection", count, selected.result.len())?;
        trace!(elapsed = ?selected.duration, "offspring selected");

        let alterer = Arc::clone(&self.alterer);
        let altered = self
            .executor
            .spawn(move || alterer.alter(selected.result, generation))
            .await?;
        let AltererResult {
            population,
            alterations,
        } = altered.result;
        check_size("alteration", count, population.len())?;
        trace!(alterations, elapsed = ?altered.duration, "offspring altered");

        let filter = Arc::clone(&self.filter);
        let filtered = self
            .executor
            .spawn(move || filter.filter(population, generation))
            .await?;
        trace!(elapsed = ?filtered.duration, "offspring filtered");
        Ok(OffspringStages {
            selection: selected.duration,
            alter: altered.duration,
            alter_count: alterations,
            filter: filtered,
        })
    }

    async fn survivor_pipeline(
        &self,
        evaluated: &Arc<Population<G, C>>,
        generation: u64,
    ) -> EngineResult<SurvivorStages<G, C>> {
        let count = self.survivors_count;
        let selected = self
            .select(Arc::clone(&self.survivors_selector), evaluated, count)
            .await?;
        check_size("survivor selection", count, selected.result.len())?;
        trace!(elapsed = ?selected.duration, "survivors selected");

        let filter = Arc::clone(&self.filter);
        let filtered = self
            .executor
            .spawn(move || filter.filter(selected.result, generation))
            .await?;
        trace!(elapsed = ?filtered.duration, "survivors filtered");
        Ok(SurvivorStages {
            selection: selected.duration,
            filter: filtered,
        })
    }

    async fn select(
        &self,
        selector: Arc<dyn Selector<G, C>>,
        population: &Arc<Population<G, C>>,
        count: usize,
    ) -> EngineResult<Timed<Population<G, C>>> {
        if count == 0 {
            return Ok(Timed {
                result: Population::empty(),
                duration: Duration::ZERO,
            });
        }
        let population = Arc::clone(population);
        let optimize = self.optimize;
        self.executor
            .spawn(move || selector.select(&population, count, optimize))
            .await
    }
}

impl<G, C> Engine<G, C> {
    /// Individuals per generation.
    #[must_use]
    pub fn population_size(&self) -> usize {
        self.offspring_count + self.survivors_count
    }

    /// Offspring per generation.
    #[must_use]
    pub fn offspring_count(&self) -> usize {
        self.offspring_count
    }

    /// Survivors per generation.
    #[must_use]
    pub fn survivors_count(&self) -> usize {
        self.survivors_count
    }

    /// Age above which individuals are replaced.
    #[must_use]
    pub fn maximal_phenotype_age(&self) -> u64 {
        self.filter.maximal_age()
    }

    /// Optimization direction.
    #[must_use]
    pub fn optimize(&self) -> Optimize {
        self.optimize
    }

    /// Maximum attempts for creating a valid individual.
    #[must_use]
    pub fn individual_creation_retries(&self) -> usize {
        self.filter.factory().retries()
    }

    /// The fitness binding new individuals are created with.
    #[must_use]
    pub fn fitness(&self) -> &Fitness<G, C> {
        &self.fitness
    }

    /// The clock stage durations are measured with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.executor.clock()
    }

    /// The executor the step stages run on.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        self.executor.executor()
    }

    /// Snapshot of the numeric settings.
    #[must_use]
    pub fn params(&self) -> EngineParams {
        EngineParams {
            population_size: self.population_size(),
            offspring_count: self.offspring_count,
            survivors_count: self.survivors_count,
            maximal_phenotype_age: self.maximal_phenotype_age(),
            optimize: self.optimize,
            individual_creation_retries: self.individual_creation_retries(),
        }
    }
}

impl<G, C> fmt::Debug for Engine<G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("params", &self.params())
            .finish_non_exhaustive()
    }
}

fn check_size(stage: &'static str, expected: usize, found: usize) -> EngineResult<()> {
    if expected == found {
        return Ok(());
    }
    error!(stage, expected, found, "population size invariant violated");
    Err(EngineError::PopulationSizeMismatch {
        stage,
        expected,
        found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{InlineExecutor, RayonExecutor};
    use crate::ops::IdentityAlterer;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Takes the first `count` individuals.
    struct Head;

    impl Selector<u32, u32> for Head {
        fn select(
            &self,
            population: &Population<u32, u32>,
            count: usize,
            _: Optimize,
        ) -> Population<u32, u32> {
            population.iter().take(count).cloned().collect()
        }
    }

    /// Takes the last `count` individuals.
    struct Tail;

    impl Selector<u32, u32> for Tail {
        fn select(
            &self,
            population: &Population<u32, u32>,
            count: usize,
            _: Optimize,
        ) -> Population<u32, u32> {
            let skip = population.len() - count;
            population.iter().skip(skip).cloned().collect()
        }
    }

    /// Returns one individual too few.
    struct Short;

    impl Selector<u32, u32> for Short {
        fn select(
            &self,
            population: &Population<u32, u32>,
            count: usize,
            _: Optimize,
        ) -> Population<u32, u32> {
            population.iter().take(count - 1).cloned().collect()
        }
    }

    /// Scores the population but loses its first individual.
    struct Shrinking;

    impl Evaluator<u32, u32> for Shrinking {
        fn evaluate(
            &self,
            population: &Population<u32, u32>,
        ) -> EngineResult<Population<u32, u32>> {
            Ok(population.iter().skip(1).map(Phenotype::evaluate).collect())
        }
    }

    /// Drops the first offspring.
    struct DropOne;

    impl Alterer<u32, u32> for DropOne {
        fn alter(&self, population: Population<u32, u32>, _: u64) -> AltererResult<u32, u32> {
            AltererResult::new(population.into_iter().skip(1).collect(), 0)
        }
    }

    /// Advances by one millisecond on every reading.
    #[derive(Default)]
    struct SteppingClock(AtomicU64);

    impl Clock for SteppingClock {
        fn now(&self) -> Duration {
            Duration::from_millis(self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn engine() -> EngineBuilder<u32, u32> {
        Engine::builder(|x: &u32| x * 2, || 1000_u32)
            .population_size(10)
            .offspring_size(6)
            .survivors_selector(Head)
            .offspring_selector(Tail)
            .alterer(IdentityAlterer)
            .maximal_phenotype_age(100)
            .executor(InlineExecutor)
    }

    fn population(engine: &Engine<u32, u32>) -> Population<u32, u32> {
        engine
            .evolution_start_from_genotypes(0..10, 1)
            .population()
            .clone()
    }

    #[test]
    fn identity_step_preserves_population() {
        let engine = engine().build().unwrap();
        let input = population(&engine);
        let result = engine.evolve(&input, 1).unwrap();
        let genotypes: Vec<u32> = result.population.iter().map(|pt| *pt.genotype()).collect();
        assert_eq!(genotypes, (0..10).collect::<Vec<_>>());
        assert!(result.population.iter().all(Phenotype::is_evaluated));
        assert_eq!(result.kill_count, 0);
        assert_eq!(result.invalid_count, 0);
        assert_eq!(result.alter_count, 0);
        assert_eq!(result.generation, 1);
        assert!(input.iter().all(|pt| !pt.is_evaluated()));
    }

    #[test]
    fn durations_come_from_the_configured_clock() {
        let engine = engine().clock(SteppingClock::default()).build().unwrap();
        let result = engine.evolve(&population(&engine), 1).unwrap();
        let durations = result.durations;
        assert_eq!(durations.offspring_selection, Duration::from_millis(1));
        assert_eq!(durations.survivors_selection, Duration::from_millis(1));
        assert_eq!(durations.offspring_alter, Duration::from_millis(1));
        assert_eq!(durations.offspring_filter, Duration::from_millis(1));
        assert_eq!(durations.survivor_filter, Duration::from_millis(1));
        assert_eq!(durations.evaluation, Duration::from_millis(2));
        assert!(durations.evolve >= durations.evaluation);
    }

    #[test]
    fn generation_zero_is_rejected() {
        let engine = engine().build().unwrap();
        assert_eq!(
            engine.evolve(&population(&engine), 0).unwrap_err(),
            EngineError::InvalidGeneration(0)
        );
    }

    #[test]
    fn wrong_input_size_is_rejected() {
        let engine = engine().build().unwrap();
        let input: Population<u32, u32> = population(&engine).into_iter().take(9).collect();
        assert_eq!(
            engine.evolve(&input, 1).unwrap_err(),
            EngineError::PopulationSizeMismatch {
                stage: "input",
                expected: 10,
                found: 9
            }
        );
    }

    #[test]
    fn short_selection_fails_the_step() {
        let engine = engine().survivors_selector(Short).build().unwrap();
        assert!(matches!(
            engine.evolve(&population(&engine), 1),
            Err(EngineError::PopulationSizeMismatch {
                stage: "survivor selection",
                ..
            })
        ));
    }

    #[test]
    fn shrinking_evaluator_fails_the_step() {
        let engine = engine().evaluator(Shrinking).build().unwrap();
        assert_eq!(
            engine.evolve(&population(&engine), 1).unwrap_err(),
            EngineError::PopulationSizeMismatch {
                stage: "evaluation",
                expected: 10,
                found: 9,
            }
        );
    }

    #[test]
    fn shrinking_alterer_fails_the_step() {
        let engine = engine().alterer(DropOne).build().unwrap();
        assert_eq!(
            engine.evolve(&population(&engine), 1).unwrap_err(),
            EngineError::PopulationSizeMismatch {
                stage: "alteration",
                expected: 6,
                found: 5,
            }
        );
    }

    #[test]
    fn zero_count_skips_the_selector() {
        let engine = engine()
            .offspring_size(0)
            .offspring_selector(Short)
            .build()
            .unwrap();
        let result = engine.evolve(&population(&engine), 1).unwrap();
        assert_eq!(result.population.len(), 10);
        assert_eq!(result.durations.offspring_selection, Duration::ZERO);
    }

    #[test]
    fn aged_individuals_are_replaced() {
        let engine = engine().maximal_phenotype_age(2).build().unwrap();
        let input = population(&engine);
        let result = engine.evolve(&input, 4).unwrap();
        assert_eq!(result.kill_count, 10);
        assert!(result.population.iter().all(|pt| pt.generation() == 4));
        assert!(result.population.iter().all(|pt| pt.genotype() == &1000));
    }

    #[test]
    fn invalid_individuals_are_replaced() {
        let engine = engine().genotype_validator(|x: &u32| x % 2 == 0).build().unwrap();
        let result = engine.evolve(&population(&engine), 1).unwrap();
        assert_eq!(result.invalid_count, 5);
        assert_eq!(result.kill_count, 0);
        assert!(result
            .population
            .iter()
            .all(|pt| pt.genotype() % 2 == 0 && pt.is_evaluated()));
    }

    #[test]
    fn already_scored_individuals_are_not_rescored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = engine()
            .fitness_function(move |x: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                *x
            })
            .build()
            .unwrap();
        let input: Population<u32, u32> =
            population(&engine).iter().map(Phenotype::evaluate).collect();
        assert_eq!(calls.swap(0, Ordering::SeqCst), 10);
        engine.evolve(&input, 1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mapper_transforms_the_result() {
        let engine = engine()
            .mapping(|mut result: EvolutionResult<u32, u32>| {
                result.alter_count = 42;
                result
            })
            .build()
            .unwrap();
        assert_eq!(engine.evolve(&population(&engine), 1).unwrap().alter_count, 42);
    }

    #[test]
    fn steps_run_on_a_thread_pool() {
        let engine = engine()
            .executor(RayonExecutor::with_threads(2).unwrap())
            .build()
            .unwrap();
        let mut start = engine.evolution_start_from_genotypes(0..10, 1);
        for _ in 0..3 {
            let result = engine.evolve_start(&start).unwrap();
            assert_eq!(result.population.len(), 10);
            start = result.next_start();
        }
        assert_eq!(start.generation(), 4);
    }

    #[test]
    fn evolution_start_pads_and_rebinds() {
        let engine = engine().build().unwrap();
        let foreign = Fitness::new(|x: &u32| *x + 1);
        let start = EvolutionStart::new(
            vec![Phenotype::new(5, 2, foreign).evaluate()].into(),
            3,
        );
        let prepared = engine.evolution_start(start);
        assert_eq!(prepared.generation(), 3);
        assert_eq!(prepared.population().len(), 10);
        let first = &prepared.population()[0];
        assert_eq!(first.genotype(), &5);
        assert_eq!(first.generation(), 2);
        assert!(!first.is_evaluated());
        assert!(prepared
            .population()
            .iter()
            .all(|pt| pt.binding().same_as(engine.fitness())));
        assert!(prepared.population().iter().skip(1).all(|pt| pt.generation() == 3));
    }

    #[test]
    fn evolution_start_truncates() {
        let engine = engine().build().unwrap();
        let prepared = engine.evolution_start_from_genotypes(0..25, 1);
        assert_eq!(prepared.population().len(), 10);
        assert_eq!(prepared.population()[9].genotype(), &9);
    }
}
