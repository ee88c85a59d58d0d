//! Replacement of invalid and over-aged individuals.

use crate::core::{Fitness, Phenotype, Population};
use crate::ops::{GenotypeFactory, Validator};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Creates fresh, unscored individuals from the genotype source.
///
/// Creation is retried while the validator rejects the result, up to
/// `retries` attempts in total. When the bound is reached the last attempt is
/// returned as is, valid or not, so a validator that rejects everything can
/// never stall a step. Returning an invalid last attempt is logged at debug
/// level. With `retries` of zero or one the validator is never consulted.
///
/// # Examples
/// ```
/// use jeans_engine::engine::PhenotypeFactory;
/// use jeans_engine::Fitness;
/// use std::sync::Arc;
///
/// let factory = PhenotypeFactory::new(
///     Arc::new(|| 7_u32),
///     Fitness::new(|x: &u32| *x),
///     Arc::new(|pt: &jeans_engine::Phenotype<u32, u32>| *pt.genotype() > 5),
///     10,
/// );
/// let phenotype = factory.new_phenotype(3);
/// assert_eq!(phenotype.generation(), 3);
/// assert!(!phenotype.is_evaluated());
/// ```
pub struct PhenotypeFactory<G, C> {
    genotype_factory: Arc<dyn GenotypeFactory<G>>,
    fitness: Fitness<G, C>,
    validator: Arc<Validator<G, C>>,
    retries: usize,
}

impl<G, C> PhenotypeFactory<G, C> {
    /// Creates a factory.
    pub fn new(
        genotype_factory: Arc<dyn GenotypeFactory<G>>,
        fitness: Fitness<G, C>,
        validator: Arc<Validator<G, C>>,
        retries: usize,
    ) -> Self {
        Self {
            genotype_factory,
            fitness,
            validator,
            retries,
        }
    }

    /// Maximum number of creation attempts.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Returns a new individual tagged with `generation`.
    pub fn new_phenotype(&self, generation: u64) -> Phenotype<G, C> {
        match self.attempt(generation) {
            Ok(phenotype) => phenotype,
            Err(phenotype) => {
                debug!(
                    attempts = self.retries,
                    "creation retry bound reached, keeping invalid last attempt"
                );
                phenotype
            }
        }
    }

    /// Runs the retry loop. `Err` carries the last attempt when every
    /// attempt was rejected.
    fn attempt(&self, generation: u64) -> Result<Phenotype<G, C>, Phenotype<G, C>> {
        let mut phenotype = self.create(generation);
        let mut attempts = 1;
        while attempts < self.retries && !(self.validator)(&phenotype) {
            phenotype = self.create(generation);
            attempts += 1;
        }
        if self.retries > 1 && attempts == self.retries && !(self.validator)(&phenotype) {
            Err(phenotype)
        } else {
            Ok(phenotype)
        }
    }

    fn create(&self, generation: u64) -> Phenotype<G, C> {
        Phenotype::new(
            self.genotype_factory.new_instance(),
            generation,
            self.fitness.clone(),
        )
    }
}

impl<G, C> fmt::Debug for PhenotypeFactory<G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhenotypeFactory")
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// Filtered population together with the replacement counts.
#[derive(Debug, Clone)]
pub struct FilterOutcome<G, C> {
    /// Population with every rejected individual replaced in place.
    pub population: Population<G, C>,
    /// Individuals replaced for exceeding the maximal age.
    pub kill_count: usize,
    /// Individuals replaced for failing validation.
    pub invalid_count: usize,
}

/// Replaces invalid and over-aged individuals with fresh ones.
///
/// Validity is checked first, so an individual that is both invalid and too
/// old counts as invalid. Each replacement is created independently.
pub struct PopulationFilter<G, C> {
    factory: PhenotypeFactory<G, C>,
    maximal_age: u64,
}

impl<G, C> PopulationFilter<G, C> {
    /// Creates a filter using `factory` for replacements.
    pub fn new(factory: PhenotypeFactory<G, C>, maximal_age: u64) -> Self {
        Self {
            factory,
            maximal_age,
        }
    }

    /// The factory replacements are drawn from.
    #[must_use]
    pub fn factory(&self) -> &PhenotypeFactory<G, C> {
        &self.factory
    }

    /// Maximal age an individual may reach before it is replaced.
    #[must_use]
    pub fn maximal_age(&self) -> u64 {
        self.maximal_age
    }

    /// Filters `population` for `generation`; the length is preserved.
    pub fn filter(&self, population: Population<G, C>, generation: u64) -> FilterOutcome<G, C> {
        let mut kill_count = 0;
        let mut invalid_count = 0;
        let population = population
            .into_iter()
            .map(|pt| {
                if !(self.factory.validator)(&pt) {
                    invalid_count += 1;
                    self.factory.new_phenotype(generation)
                } else if pt.age(generation) > self.maximal_age {
                    kill_count += 1;
                    self.factory.new_phenotype(generation)
                } else {
                    pt
                }
            })
            .collect();
        trace!(kill_count, invalid_count, "population filtered");
        FilterOutcome {
            population,
            kill_count,
            invalid_count,
        }
    }
}

impl<G, C> fmt::Debug for PopulationFilter<G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulationFilter")
            .field("factory", &self.factory)
            .field("maximal_age", &self.maximal_age)
            .finish()
    }
}
