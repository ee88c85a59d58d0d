//! Inputs and outputs of a single generation step.

use super::{Optimize, Phenotype, Population};
use std::time::Duration;

/// The unit of work for one evolution step: a population and its generation.
///
/// # Examples
/// ```
/// use jeans_engine::{EvolutionStart, Population};
/// let start: EvolutionStart<u8, u8> = EvolutionStart::new(Population::empty(), 1);
/// assert_eq!(start.generation(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct EvolutionStart<G, C> {
    population: Population<G, C>,
    generation: u64,
}

impl<G, C> EvolutionStart<G, C> {
    /// Creates a new step input.
    #[must_use]
    pub fn new(population: Population<G, C>, generation: u64) -> Self {
        Self {
            population,
            generation,
        }
    }

    /// Returns the population the step starts from.
    #[must_use]
    pub fn population(&self) -> &Population<G, C> {
        &self.population
    }

    /// Returns the generation counter.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Splits the input into its parts.
    #[must_use]
    pub fn into_parts(self) -> (Population<G, C>, u64) {
        (self.population, self.generation)
    }
}

/// Wall-clock time spent in each stage of one generation step.
///
/// `evaluation` covers both fitness evaluations of the step and `evolve`
/// covers the step as a whole.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvolutionDurations {
    /// Offspring selection.
    pub offspring_selection: Duration,
    /// Survivor selection.
    pub survivors_selection: Duration,
    /// Alteration of the selected offspring.
    pub offspring_alter: Duration,
    /// Filtering of the altered offspring.
    pub offspring_filter: Duration,
    /// Filtering of the selected survivors.
    pub survivor_filter: Duration,
    /// Initial and final fitness evaluation combined.
    pub evaluation: Duration,
    /// The whole step.
    pub evolve: Duration,
}

impl EvolutionDurations {
    /// Adds the durations of `other` field by field.
    ///
    /// # Examples
    /// ```
    /// use jeans_engine::EvolutionDurations;
    /// use std::time::Duration;
    /// let step = EvolutionDurations { evolve: Duration::from_millis(5), ..Default::default() };
    /// assert_eq!(step.plus(&step).evolve, Duration::from_millis(10));
    /// ```
    #[must_use]
    pub fn plus(&self, other: &Self) -> Self {
        Self {
            offspring_selection: self.offspring_selection + other.offspring_selection,
            survivors_selection: self.survivors_selection + other.survivors_selection,
            offspring_alter: self.offspring_alter + other.offspring_alter,
            offspring_filter: self.offspring_filter + other.offspring_filter,
            survivor_filter: self.survivor_filter + other.survivor_filter,
            evaluation: self.evaluation + other.evaluation,
            evolve: self.evolve + other.evolve,
        }
    }
}

/// Outcome of one generation step.
///
/// The result is owned by the caller; the engine keeps nothing from it.
#[derive(Debug, Clone)]
pub struct EvolutionResult<G, C> {
    /// Optimization direction the step ran with.
    pub optimize: Optimize,
    /// The evaluated population of the next generation.
    pub population: Population<G, C>,
    /// Generation counter of the step.
    pub generation: u64,
    /// Time spent in each stage.
    pub durations: EvolutionDurations,
    /// Individuals replaced for exceeding the maximal age.
    pub kill_count: usize,
    /// Individuals replaced for failing validation.
    pub invalid_count: usize,
    /// Structural changes reported by the alterer.
    pub alter_count: usize,
}

impl<G, C> EvolutionResult<G, C> {
    /// Returns the evaluated population.
    #[must_use]
    pub fn population(&self) -> &Population<G, C> {
        &self.population
    }

    /// Consumes the result and returns the input of the following step.
    #[must_use]
    pub fn next_start(self) -> EvolutionStart<G, C> {
        EvolutionStart::new(self.population, self.generation.saturating_add(1))
    }
}

impl<G, C: PartialOrd> EvolutionResult<G, C> {
    /// Best individual of the population according to [`Self::optimize`].
    #[must_use]
    pub fn best_phenotype(&self) -> Option<&Phenotype<G, C>> {
        self.population.best(self.optimize)
    }

    /// Worst individual of the population according to [`Self::optimize`].
    #[must_use]
    pub fn worst_phenotype(&self) -> Option<&Phenotype<G, C>> {
        self.population.worst(self.optimize)
    }

    /// Fitness of [`Self::best_phenotype`].
    #[must_use]
    pub fn best_fitness(&self) -> Option<&C> {
        self.best_phenotype().and_then(Phenotype::fitness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fitness;

    fn result(optimize: Optimize) -> EvolutionResult<i32, i32> {
        let fitness = Fitness::new(|x: &i32| *x);
        let population = [3, -1, 7]
            .into_iter()
            .map(|x| Phenotype::new(x, 1, fitness.clone()).evaluate())
            .collect();
        EvolutionResult {
            optimize,
            population,
            generation: 4,
            durations: EvolutionDurations::default(),
            kill_count: 0,
            invalid_count: 0,
            alter_count: 0,
        }
    }

    #[test]
    fn best_and_worst_follow_direction() {
        let maximum = result(Optimize::Maximum);
        assert_eq!(maximum.best_fitness(), Some(&7));
        assert_eq!(maximum.worst_phenotype().unwrap().genotype(), &-1);
        let minimum = result(Optimize::Minimum);
        assert_eq!(minimum.best_fitness(), Some(&-1));
        assert_eq!(minimum.worst_phenotype().unwrap().genotype(), &7);
    }

    #[test]
    fn next_start_advances_generation() {
        let start = result(Optimize::Maximum).next_start();
        assert_eq!(start.generation(), 5);
        assert_eq!(start.population().len(), 3);
    }
}
