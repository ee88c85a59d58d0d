use super::filter::{PhenotypeFactory, PopulationFilter};
use super::{Engine, Mapper};
use crate::core::{EvolutionResult, Fitness, FitnessFn, Optimize, Phenotype, ScalerFn};
use crate::error::ConfigError;
use crate::eval::{BatchEvaluator, ConcurrentEvaluator, Evaluator, GenotypeEvaluator};
use crate::exec::{Clock, Executor, MonotonicClock, RayonExecutor, TimedExecutor};
use crate::ops::{
    Alterer, CompositeAlterer, GenotypeFactory, IdentityAlterer, Selector, TournamentSelector,
    Validator,
};
use std::fmt;
use std::sync::Arc;

const DEFAULT_POPULATION_SIZE: usize = 50;
const DEFAULT_OFFSPRING_FRACTION: f64 = 0.6;
const DEFAULT_MAXIMAL_PHENOTYPE_AGE: u64 = 70;
const DEFAULT_CREATION_RETRIES: usize = 10;

/// How the population is split between offspring and survivors.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Split {
    OffspringFraction(f64),
    SurvivorsFraction(f64),
    OffspringSize(usize),
    SurvivorsSize(usize),
}

impl Split {
    /// Resolves the split into `(offspring, survivors)` counts.
    fn resolve(self, population_size: usize) -> Result<(usize, usize), ConfigError> {
        let offspring = match self {
            Self::OffspringFraction(value) => {
                rounded_share(check_fraction("offspring fraction", value)?, population_size)
            }
            Self::SurvivorsFraction(value) => {
                let survivors = check_fraction("survivors fraction", value)?;
                rounded_share(1.0 - survivors, population_size)
            }
            Self::OffspringSize(size) => check_size("offspring size", size, population_size)?,
            Self::SurvivorsSize(size) => {
                population_size - check_size("survivors size", size, population_size)?
            }
        };
        Ok((offspring, population_size - offspring))
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidFraction { name, value })
    }
}

fn check_size(
    name: &'static str,
    size: usize,
    population_size: usize,
) -> Result<usize, ConfigError> {
    if size <= population_size {
        Ok(size)
    } else {
        Err(ConfigError::SizeExceedsPopulation {
            name,
            size,
            population_size,
        })
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn rounded_share(fraction: f64, population_size: usize) -> usize {
    ((fraction * population_size as f64).round() as usize).min(population_size)
}

/// Builder returned by [`Engine::builder`].
///
/// Every collaborator has a default, so only the fitness function and the
/// genotype source are required. Settings are validated by
/// [`EngineBuilder::build`].
///
/// # Examples
/// ```
/// use jeans_engine::exec::InlineExecutor;
/// use jeans_engine::Engine;
///
/// let engine = Engine::builder(|x: &i64| -x.abs(), || 3_i64)
///     .population_size(10)
///     .offspring_fraction(0.4)
///     .executor(InlineExecutor)
///     .build()
///     .unwrap();
/// assert_eq!(engine.offspring_count(), 4);
/// assert_eq!(engine.survivors_count(), 6);
/// ```
pub struct EngineBuilder<G, C> {
    fitness_function: Arc<FitnessFn<G, C>>,
    fitness_scaler: Arc<ScalerFn<C>>,
    genotype_factory: Arc<dyn GenotypeFactory<G>>,
    offspring_selector: Arc<dyn Selector<G, C>>,
    survivors_selector: Arc<dyn Selector<G, C>>,
    alterer: Arc<dyn Alterer<G, C>>,
    validator: Arc<Validator<G, C>>,
    optimize: Optimize,
    split: Split,
    population_size: usize,
    maximal_phenotype_age: u64,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    evaluator: Option<Arc<dyn Evaluator<G, C>>>,
    individual_creation_retries: usize,
    mapper: Arc<Mapper<G, C>>,
}

impl<G, C> EngineBuilder<G, C>
where
    G: Send + Sync + 'static,
    C: PartialOrd + Clone + Send + Sync + 'static,
{
    pub(super) fn new(
        fitness_function: Arc<FitnessFn<G, C>>,
        genotype_factory: Arc<dyn GenotypeFactory<G>>,
    ) -> Self {
        Self {
            fitness_function,
            fitness_scaler: Arc::new(|score: C| score),
            genotype_factory,
            offspring_selector: Arc::new(TournamentSelector::default()),
            survivors_selector: Arc::new(TournamentSelector::default()),
            alterer: Arc::new(IdentityAlterer),
            validator: Arc::new(|_: &Phenotype<G, C>| true),
            optimize: Optimize::Maximum,
            split: Split::OffspringFraction(DEFAULT_OFFSPRING_FRACTION),
            population_size: DEFAULT_POPULATION_SIZE,
            maximal_phenotype_age: DEFAULT_MAXIMAL_PHENOTYPE_AGE,
            executor: Arc::new(RayonExecutor::global()),
            clock: Arc::new(MonotonicClock::new()),
            evaluator: None,
            individual_creation_retries: DEFAULT_CREATION_RETRIES,
            mapper: Arc::new(|result: EvolutionResult<G, C>| result),
        }
    }

    pub(super) fn from_engine(engine: &Engine<G, C>) -> Self {
        Self {
            fitness_function: Arc::clone(engine.fitness.function()),
            fitness_scaler: Arc::clone(engine.fitness.scaler()),
            genotype_factory: Arc::clone(&engine.genotype_factory),
            offspring_selector: Arc::clone(&engine.offspring_selector),
            survivors_selector: Arc::clone(&engine.survivors_selector),
            alterer: Arc::clone(&engine.alterer),
            validator: Arc::clone(&engine.validator),
            optimize: engine.optimize,
            split: Split::OffspringSize(engine.offspring_count),
            population_size: engine.population_size(),
            maximal_phenotype_age: engine.filter.maximal_age(),
            executor: Arc::clone(engine.executor.executor()),
            clock: Arc::clone(engine.executor.clock()),
            evaluator: Some(Arc::clone(&engine.evaluator)),
            individual_creation_retries: engine.filter.factory().retries(),
            mapper: Arc::clone(&engine.mapper),
        }
    }

    /// Replaces the fitness function.
    #[must_use]
    pub fn fitness_function<F>(mut self, function: F) -> Self
    where
        F: Fn(&G) -> C + Send + Sync + 'static,
    {
        self.fitness_function = Arc::new(function);
        self
    }

    /// Applies `scaler` to every raw fitness value.
    #[must_use]
    pub fn fitness_scaler<S>(mut self, scaler: S) -> Self
    where
        S: Fn(C) -> C + Send + Sync + 'static,
    {
        self.fitness_scaler = Arc::new(scaler);
        self
    }

    /// Replaces the source of new genotypes.
    #[must_use]
    pub fn genotype_factory(mut self, factory: impl GenotypeFactory<G> + 'static) -> Self {
        self.genotype_factory = Arc::new(factory);
        self
    }

    /// Replaces the selector choosing the parents of the offspring.
    #[must_use]
    pub fn offspring_selector(mut self, selector: impl Selector<G, C> + 'static) -> Self {
        self.offspring_selector = Arc::new(selector);
        self
    }

    /// Replaces the selector choosing the survivors.
    #[must_use]
    pub fn survivors_selector(mut self, selector: impl Selector<G, C> + 'static) -> Self {
        self.survivors_selector = Arc::new(selector);
        self
    }

    /// Uses the same selector for offspring and survivors.
    #[must_use]
    pub fn selector(mut self, selector: impl Selector<G, C> + 'static) -> Self {
        let selector: Arc<dyn Selector<G, C>> = Arc::new(selector);
        self.offspring_selector = Arc::clone(&selector);
        self.survivors_selector = selector;
        self
    }

    /// Replaces the alterer applied to the offspring.
    #[must_use]
    pub fn alterer(mut self, alterer: impl Alterer<G, C> + 'static) -> Self {
        self.alterer = Arc::new(alterer);
        self
    }

    /// Applies `alterers` one after the other.
    #[must_use]
    pub fn alterers(mut self, alterers: Vec<Arc<dyn Alterer<G, C>>>) -> Self {
        self.alterer = Arc::new(CompositeAlterer::new(alterers));
        self
    }

    /// Replaces the predicate deciding whether an individual is valid.
    #[must_use]
    pub fn phenotype_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&Phenotype<G, C>) -> bool + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    /// Validates individuals by their genotype only.
    #[must_use]
    pub fn genotype_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&G) -> bool + Send + Sync + 'static,
    {
        self.validator = Arc::new(move |pt: &Phenotype<G, C>| validator(pt.genotype()));
        self
    }

    /// Sets the optimization direction.
    #[must_use]
    pub fn optimize(mut self, optimize: Optimize) -> Self {
        self.optimize = optimize;
        self
    }

    /// Maximizes the fitness.
    #[must_use]
    pub fn maximizing(self) -> Self {
        self.optimize(Optimize::Maximum)
    }

    /// Minimizes the fitness.
    #[must_use]
    pub fn minimizing(self) -> Self {
        self.optimize(Optimize::Minimum)
    }

    /// Share of each new population produced as offspring, within `[0, 1]`.
    #[must_use]
    pub fn offspring_fraction(mut self, fraction: f64) -> Self {
        self.split = Split::OffspringFraction(fraction);
        self
    }

    /// Share of each new population kept as survivors, within `[0, 1]`.
    #[must_use]
    pub fn survivors_fraction(mut self, fraction: f64) -> Self {
        self.split = Split::SurvivorsFraction(fraction);
        self
    }

    /// Exact number of offspring per generation.
    #[must_use]
    pub fn offspring_size(mut self, size: usize) -> Self {
        self.split = Split::OffspringSize(size);
        self
    }

    /// Exact number of survivors per generation.
    #[must_use]
    pub fn survivors_size(mut self, size: usize) -> Self {
        self.split = Split::SurvivorsSize(size);
        self
    }

    /// Number of individuals per generation.
    #[must_use]
    pub fn population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    /// Age above which individuals are replaced.
    #[must_use]
    pub fn maximal_phenotype_age(mut self, age: u64) -> Self {
        self.maximal_phenotype_age = age;
        self
    }

    /// Runs the step stages on `executor`.
    #[must_use]
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Measures stage durations with `clock`.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the fitness evaluation strategy.
    #[must_use]
    pub fn evaluator(mut self, evaluator: impl Evaluator<G, C> + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Scores all unscored genotypes of a generation with one call.
    #[must_use]
    pub fn genotype_evaluator(self, evaluator: impl GenotypeEvaluator<G, C> + 'static) -> Self {
        self.evaluator(BatchEvaluator::new(evaluator))
    }

    /// Maximum attempts for creating a valid individual.
    #[must_use]
    pub fn individual_creation_retries(mut self, retries: usize) -> Self {
        self.individual_creation_retries = retries;
        self
    }

    /// Transforms every step result before it is returned.
    #[must_use]
    pub fn mapping<M>(mut self, mapper: M) -> Self
    where
        M: Fn(EvolutionResult<G, C>) -> EvolutionResult<G, C> + Send + Sync + 'static,
    {
        self.mapper = Arc::new(mapper);
        self
    }

    /// Validates the settings and creates the engine.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the population size is zero, a fraction is
    /// outside `[0, 1]`, or an explicit size exceeds the population size.
    pub fn build(self) -> Result<Engine<G, C>, ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::InvalidPopulationSize(0));
        }
        let (offspring_count, survivors_count) = self.split.resolve(self.population_size)?;
        let fitness = Fitness::from_parts(self.fitness_function, self.fitness_scaler);
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(ConcurrentEvaluator::new(Arc::clone(&self.executor))));
        let factory = PhenotypeFactory::new(
            Arc::clone(&self.genotype_factory),
            fitness.clone(),
            Arc::clone(&self.validator),
            self.individual_creation_retries,
        );
        Ok(Engine {
            fitness,
            genotype_factory: self.genotype_factory,
            offspring_selector: self.offspring_selector,
            survivors_selector: self.survivors_selector,
            alterer: self.alterer,
            validator: self.validator,
            optimize: self.optimize,
            offspring_count,
            survivors_count,
            executor: TimedExecutor::new(self.executor, self.clock),
            evaluator,
            filter: Arc::new(PopulationFilter::new(factory, self.maximal_phenotype_age)),
            mapper: self.mapper,
        })
    }
}

impl<G, C> fmt::Debug for EngineBuilder<G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("optimize", &self.optimize)
            .field("split", &self.split)
            .field("population_size", &self.population_size)
            .field("maximal_phenotype_age", &self.maximal_phenotype_age)
            .field("individual_creation_retries", &self.individual_creation_retries)
            .finish_non_exhaustive()
    }
}
