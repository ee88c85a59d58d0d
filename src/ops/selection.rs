//! Selector abstractions used to pick offspring and survivors.

use crate::core::{Optimize, Phenotype, Population};
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

/// Picks `count` individuals from an evaluated population.
///
/// Implementations may select the same individual more than once and must
/// return exactly `count` individuals for a non-empty population.
///
/// # Examples
/// ```
/// use jeans_engine::ops::Selector;
/// use jeans_engine::{Fitness, Optimize, Phenotype, Population};
///
/// struct Head;
///
/// impl Selector<u32, u32> for Head {
///     fn select(
///         &self,
///         population: &Population<u32, u32>,
///         count: usize,
///         _: Optimize,
///     ) -> Population<u32, u32> {
///         population.iter().take(count).cloned().collect()
///     }
/// }
///
/// let fitness = Fitness::new(|x: &u32| *x);
/// let population: Population<u32, u32> =
///     (0..5).map(|x| Phenotype::new(x, 1, fitness.clone())).collect();
/// let selected = Head.select(&population, 2, Optimize::Maximum);
/// assert_eq!(selected.len(), 2);
/// ```
pub trait Selector<G, C>: Send + Sync {
    /// Selects `count` individuals from `population`.
    fn select(
        &self,
        population: &Population<G, C>,
        count: usize,
        optimize: Optimize,
    ) -> Population<G, C>;
}

impl<G, C, T: Selector<G, C> + ?Sized> Selector<G, C> for &T {
    fn select(
        &self,
        population: &Population<G, C>,
        count: usize,
        optimize: Optimize,
    ) -> Population<G, C> {
        (**self).select(population, count, optimize)
    }
}

impl<G, C, T: Selector<G, C> + ?Sized> Selector<G, C> for Box<T> {
    fn select(
        &self,
        population: &Population<G, C>,
        count: usize,
        optimize: Optimize,
    ) -> Population<G, C> {
        (**self).select(population, count, optimize)
    }
}

impl<G, C, T: Selector<G, C> + ?Sized> Selector<G, C> for Arc<T> {
    fn select(
        &self,
        population: &Population<G, C>,
        count: usize,
        optimize: Optimize,
    ) -> Population<G, C> {
        (**self).select(population, count, optimize)
    }
}

/// Tournament selection: each pick is the best of `size` uniformly drawn
/// individuals. Unscored individuals lose against scored ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TournamentSelector {
    size: usize,
}

impl TournamentSelector {
    /// Creates a tournament selector; a size of zero is raised to one.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    /// Returns the tournament size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Default for TournamentSelector {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<G, C> Selector<G, C> for TournamentSelector
where
    G: Send + Sync,
    C: PartialOrd + Clone + Send + Sync,
{
    fn select(
        &self,
        population: &Population<G, C>,
        count: usize,
        optimize: Optimize,
    ) -> Population<G, C> {
        if population.is_empty() {
            return Population::empty();
        }
        let mut rng = rand::thread_rng();
        let individuals = population.individuals();
        (0..count)
            .map(|_| {
                let mut best = &individuals[rng.gen_range(0..individuals.len())];
                for _ in 1..self.size {
                    let challenger = &individuals[rng.gen_range(0..individuals.len())];
                    if beats(challenger, best, optimize) {
                        best = challenger;
                    }
                }
                best.clone()
            })
            .collect()
    }
}

fn beats<G, C: PartialOrd>(
    challenger: &Phenotype<G, C>,
    current: &Phenotype<G, C>,
    optimize: Optimize,
) -> bool {
    match (challenger.fitness(), current.fitness()) {
        (Some(a), Some(b)) => optimize.compare(a, b) == Ordering::Greater,
        (Some(_), None) => true,
        _ => false,
    }
}
