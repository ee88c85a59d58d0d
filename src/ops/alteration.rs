//! Alterer abstractions for recombining and mutating offspring.

use crate::core::Population;
use std::sync::Arc;

/// Population produced by an [`Alterer`] together with the number of
/// individuals it structurally changed.
#[derive(Debug, Clone)]
pub struct AltererResult<G, C> {
    /// The altered population; it has the same length as the input.
    pub population: Population<G, C>,
    /// Number of alterations performed.
    pub alterations: usize,
}

impl<G, C> AltererResult<G, C> {
    /// Creates an alterer result.
    #[must_use]
    pub fn new(population: Population<G, C>, alterations: usize) -> Self {
        Self {
            population,
            alterations,
        }
    }
}

/// Applies crossover or mutation to a batch of selected offspring.
///
/// Changed individuals should be created through
/// [`Phenotype::new_instance`](crate::Phenotype::new_instance) with the
/// generation passed to [`Alterer::alter`], so they are unscored and aged
/// from the current step.
///
/// # Examples
/// ```
/// use jeans_engine::ops::{Alterer, AltererResult};
/// use jeans_engine::{Fitness, Phenotype, Population};
///
/// struct Increment;
///
/// impl Alterer<i32, i32> for Increment {
///     fn alter(
///         &self,
///         population: Population<i32, i32>,
///         generation: u64,
///     ) -> AltererResult<i32, i32> {
///         let count = population.len();
///         let altered = population
///             .iter()
///             .map(|pt| pt.new_instance(pt.genotype() + 1, generation))
///             .collect();
///         AltererResult::new(altered, count)
///     }
/// }
///
/// let fitness = Fitness::new(|x: &i32| *x);
/// let population: Population<i32, i32> = vec![Phenotype::new(1, 1, fitness)].into();
/// let result = Increment.alter(population, 2);
/// assert_eq!(result.population[0].genotype(), &2);
/// assert_eq!(result.alterations, 1);
/// ```
pub trait Alterer<G, C>: Send + Sync {
    /// Alters `population` during `generation`.
    fn alter(&self, population: Population<G, C>, generation: u64) -> AltererResult<G, C>;
}

impl<G, C, T: Alterer<G, C> + ?Sized> Alterer<G, C> for &T {
    fn alter(&self, population: Population<G, C>, generation: u64) -> AltererResult<G, C> {
        (**self).alter(population, generation)
    }
}

impl<G, C, T: Alterer<G, C> + ?Sized> Alterer<G, C> for Box<T> {
    fn alter(&self, population: Population<G, C>, generation: u64) -> AltererResult<G, C> {
        (**self).alter(population, generation)
    }
}

impl<G, C, T: Alterer<G, C> + ?Sized> Alterer<G, C> for Arc<T> {
    fn alter(&self, population: Population<G, C>, generation: u64) -> AltererResult<G, C> {
        (**self).alter(population, generation)
    }
}

/// Alterer that returns its input untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityAlterer;

impl<G, C> Alterer<G, C> for IdentityAlterer {
    fn alter(&self, population: Population<G, C>, _generation: u64) -> AltererResult<G, C> {
        AltererResult::new(population, 0)
    }
}

/// Applies several alterers in order, summing their alteration counts.
pub struct CompositeAlterer<G, C> {
    alterers: Vec<Arc<dyn Alterer<G, C>>>,
}

impl<G, C> CompositeAlterer<G, C> {
    /// Creates a composite from the provided alterers.
    #[must_use]
    pub fn new(alterers: Vec<Arc<dyn Alterer<G, C>>>) -> Self {
        Self { alterers }
    }

    /// Appends an alterer that runs after the current ones.
    #[must_use]
    pub fn then(mut self, alterer: impl Alterer<G, C> + 'static) -> Self {
        self.alterers.push(Arc::new(alterer));
        self
    }

    /// Number of chained alterers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alterers.len()
    }

    /// Indicates whether the chain is empty and therefore the identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alterers.is_empty()
    }
}

impl<G, C> Alterer<G, C> for CompositeAlterer<G, C> {
    fn alter(&self, population: Population<G, C>, generation: u64) -> AltererResult<G, C> {
        self.alterers.iter().fold(
            AltererResult::new(population, 0),
            |acc, alterer| {
                let step = alterer.alter(acc.population, generation);
                AltererResult::new(step.population, acc.alterations + step.alterations)
            },
        )
    }
}
