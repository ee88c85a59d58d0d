//! Core value types shared by the engine and its collaborators.
//!
//! Every type in this module is immutable once built. A [`Phenotype`] pairs a
//! genotype with the generation it was created in and the [`Fitness`] binding
//! used to score it; a [`Population`] is the ordered collection one generation
//! step consumes and produces.

mod evolution;

pub use evolution::{EvolutionDurations, EvolutionResult, EvolutionStart};

use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// Fitness function signature accepted by the engine.
pub type FitnessFn<G, C> = dyn Fn(&G) -> C + Send + Sync;

/// Fitness scaler signature, applied to the raw score.
pub type ScalerFn<C> = dyn Fn(C) -> C + Send + Sync;

/// Identity of the fitness function and scaler a phenotype is scored with.
///
/// Two bindings are the same only when both the function and the scaler are
/// the same shared instances; cloning a binding keeps its identity.
///
/// # Examples
/// ```
/// use jeans_engine::Fitness;
/// let fitness = Fitness::new(|genes: &Vec<f64>| genes.iter().sum::<f64>());
/// assert_eq!(fitness.eval(&vec![1.0, 2.0]), 3.0);
/// assert!(fitness.same_as(&fitness.clone()));
/// ```
pub struct Fitness<G, C> {
    function: Arc<FitnessFn<G, C>>,
    scaler: Arc<ScalerFn<C>>,
}

impl<G, C> Fitness<G, C>
where
    G: 'static,
    C: 'static,
{
    /// Binds a fitness function with the identity scaler.
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&G) -> C + Send + Sync + 'static,
    {
        Self {
            function: Arc::new(function),
            scaler: Arc::new(|score: C| score),
        }
    }

    /// Returns a new binding that applies `scaler` to every raw score.
    ///
    /// # Examples
    /// ```
    /// use jeans_engine::Fitness;
    /// let fitness = Fitness::new(|x: &i32| *x).with_scaler(|score| score * 10);
    /// assert_eq!(fitness.eval(&4), 40);
    /// ```
    #[must_use]
    pub fn with_scaler<S>(self, scaler: S) -> Self
    where
        S: Fn(C) -> C + Send + Sync + 'static,
    {
        Self {
            function: self.function,
            scaler: Arc::new(scaler),
        }
    }
}

impl<G, C> Fitness<G, C> {
    /// Builds a binding from already shared parts, keeping their identity.
    #[must_use]
    pub fn from_parts(function: Arc<FitnessFn<G, C>>, scaler: Arc<ScalerFn<C>>) -> Self {
        Self { function, scaler }
    }

    /// Returns the shared fitness function.
    #[must_use]
    pub fn function(&self) -> &Arc<FitnessFn<G, C>> {
        &self.function
    }

    /// Returns the shared fitness scaler.
    #[must_use]
    pub fn scaler(&self) -> &Arc<ScalerFn<C>> {
        &self.scaler
    }

    /// Computes the scaled score of `genotype`.
    pub fn eval(&self, genotype: &G) -> C {
        (self.scaler)((self.function)(genotype))
    }

    /// Indicates whether both bindings share the same function and scaler.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.function, &other.function) && Arc::ptr_eq(&self.scaler, &other.scaler)
    }
}

impl<G, C> Clone for Fitness<G, C> {
    fn clone(&self) -> Self {
        Self {
            function: Arc::clone(&self.function),
            scaler: Arc::clone(&self.scaler),
        }
    }
}

impl<G, C> fmt::Debug for Fitness<G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fitness")
            .field("function", &Arc::as_ptr(&self.function))
            .finish_non_exhaustive()
    }
}

/// A candidate solution together with its creation generation and score.
///
/// The genotype is shared, so cloning a phenotype (as selection with
/// replacement does) never copies genes. The fitness, when present, was
/// computed by the recorded [`Fitness`] binding.
///
/// # Examples
/// ```
/// use jeans_engine::{Fitness, Phenotype};
/// let fitness = Fitness::new(|genes: &Vec<f64>| genes[0]);
/// let phenotype = Phenotype::new(vec![2.5], 3, fitness);
/// assert!(!phenotype.is_evaluated());
/// assert_eq!(phenotype.age(10), 7);
/// assert_eq!(phenotype.evaluate().fitness(), Some(&2.5));
/// ```
pub struct Phenotype<G, C> {
    genotype: Arc<G>,
    generation: u64,
    fitness: Option<C>,
    binding: Fitness<G, C>,
}

impl<G, C> Phenotype<G, C> {
    /// Creates an unscored phenotype.
    #[must_use]
    pub fn new(genotype: G, generation: u64, binding: Fitness<G, C>) -> Self {
        Self {
            genotype: Arc::new(genotype),
            generation,
            fitness: None,
            binding,
        }
    }

    /// Returns the genotype.
    #[must_use]
    pub fn genotype(&self) -> &G {
        &self.genotype
    }

    /// Returns the generation the phenotype was created in.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Age relative to `current`; phenotypes from the future have age zero.
    #[must_use]
    pub fn age(&self, current: u64) -> u64 {
        current.saturating_sub(self.generation)
    }

    /// Returns the fitness, if it was computed.
    #[must_use]
    pub fn fitness(&self) -> Option<&C> {
        self.fitness.as_ref()
    }

    /// Indicates whether the phenotype carries a fitness value.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Returns the fitness binding.
    #[must_use]
    pub fn binding(&self) -> &Fitness<G, C> {
        &self.binding
    }

    /// Indicates whether both phenotypes are the same instance: same shared
    /// genotype and same creation generation.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.genotype, &other.genotype) && self.generation == other.generation
    }

    /// Creates an unscored phenotype for `genotype` with the same binding.
    ///
    /// Alterers use this to wrap the genotypes they produce.
    #[must_use]
    pub fn new_instance(&self, genotype: G, generation: u64) -> Self {
        Self::new(genotype, generation, self.binding.clone())
    }

    /// Re-tags the phenotype with `binding`, dropping any fitness computed
    /// under the previous one. The genotype and generation are kept.
    #[must_use]
    pub fn rebind(&self, binding: &Fitness<G, C>) -> Self {
        Self {
            genotype: Arc::clone(&self.genotype),
            generation: self.generation,
            fitness: None,
            binding: binding.clone(),
        }
    }
}

impl<G, C: Clone> Phenotype<G, C> {
    /// Returns a copy carrying the provided fitness.
    #[must_use]
    pub fn with_fitness(&self, fitness: C) -> Self {
        Self {
            genotype: Arc::clone(&self.genotype),
            generation: self.generation,
            fitness: Some(fitness),
            binding: self.binding.clone(),
        }
    }

    /// Returns a scored phenotype, computing the fitness only when absent.
    #[must_use]
    pub fn evaluate(&self) -> Self {
        match self.fitness {
            Some(_) => self.clone(),
            None => self.with_fitness(self.binding.eval(&self.genotype)),
        }
    }
}

impl<G, C: Clone> Clone for Phenotype<G, C> {
    fn clone(&self) -> Self {
        Self {
            genotype: Arc::clone(&self.genotype),
            generation: self.generation,
            fitness: self.fitness.clone(),
            binding: self.binding.clone(),
        }
    }
}

impl<G: fmt::Debug, C: fmt::Debug> fmt::Debug for Phenotype<G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phenotype")
            .field("genotype", &self.genotype)
            .field("generation", &self.generation)
            .field("fitness", &self.fitness)
            .finish()
    }
}

/// Phenotypes compare by genotype, generation and fitness; the binding is
/// not part of equality.
impl<G: PartialEq, C: PartialEq> PartialEq for Phenotype<G, C> {
    fn eq(&self, other: &Self) -> bool {
        self.genotype == other.genotype
            && self.generation == other.generation
            && self.fitness == other.fitness
    }
}

/// Direction of the optimization.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Optimize {
    /// Lower scores are better.
    Minimum,
    /// Higher scores are better.
    #[default]
    Maximum,
}

impl Optimize {
    /// Orders `a` relative to `b` so that [`Ordering::Greater`] means `a` is
    /// the better score. Incomparable scores are treated as equal.
    ///
    /// # Examples
    /// ```
    /// use jeans_engine::Optimize;
    /// use std::cmp::Ordering;
    /// assert_eq!(Optimize::Minimum.compare(&1.0, &2.0), Ordering::Greater);
    /// assert_eq!(Optimize::Maximum.compare(&1.0, &2.0), Ordering::Less);
    /// ```
    pub fn compare<C: PartialOrd>(self, a: &C, b: &C) -> Ordering {
        let natural = a.partial_cmp(b).unwrap_or(Ordering::Equal);
        match self {
            Self::Maximum => natural,
            Self::Minimum => natural.reverse(),
        }
    }

    /// Returns the better of both scores, preferring `a` on ties.
    pub fn best<'a, C: PartialOrd>(self, a: &'a C, b: &'a C) -> &'a C {
        if self.compare(b, a) == Ordering::Greater {
            b
        } else {
            a
        }
    }

    /// Returns the worse of both scores, preferring `a` on ties.
    pub fn worst<'a, C: PartialOrd>(self, a: &'a C, b: &'a C) -> &'a C {
        if self.compare(b, a) == Ordering::Less {
            b
        } else {
            a
        }
    }
}

/// Ordered collection of [`Phenotype`] values for one generation.
///
/// # Examples
/// ```
/// use jeans_engine::{Fitness, Phenotype, Population};
/// let fitness = Fitness::new(|x: &u32| *x);
/// let population: Population<u32, u32> =
///     (0..3).map(|x| Phenotype::new(x, 1, fitness.clone())).collect();
/// assert_eq!(population.len(), 3);
/// assert_eq!(population[2].genotype(), &2);
/// ```
pub struct Population<G, C> {
    individuals: Vec<Phenotype<G, C>>,
}

impl<G, C> Population<G, C> {
    /// Creates an empty population.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            individuals: Vec::new(),
        }
    }

    /// Returns the number of individuals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    /// Indicates whether the population is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Adds an individual at the end.
    pub fn push(&mut self, individual: Phenotype<G, C>) {
        self.individuals.push(individual);
    }

    /// Returns the individual at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Phenotype<G, C>> {
        self.individuals.get(index)
    }

    /// Returns an iterator over the individuals.
    pub fn iter(&self) -> std::slice::Iter<'_, Phenotype<G, C>> {
        self.individuals.iter()
    }

    /// Returns the underlying individuals.
    #[must_use]
    pub fn individuals(&self) -> &[Phenotype<G, C>] {
        &self.individuals
    }

    /// Consumes the population, returning its individuals.
    #[must_use]
    pub fn into_vec(self) -> Vec<Phenotype<G, C>> {
        self.individuals
    }

    /// Concatenates `other` after `self`.
    #[must_use]
    pub fn append(mut self, other: Self) -> Self {
        self.individuals.extend(other.individuals);
        self
    }

    /// Number of individuals that carry no fitness yet.
    #[must_use]
    pub fn unevaluated(&self) -> usize {
        self.individuals.iter().filter(|pt| !pt.is_evaluated()).count()
    }
}

impl<G, C: PartialOrd> Population<G, C> {
    /// Returns the best scored individual; unscored ones are ignored.
    #[must_use]
    pub fn best(&self, optimize: Optimize) -> Option<&Phenotype<G, C>> {
        self.extreme(optimize, Ordering::Greater)
    }

    /// Returns the worst scored individual; unscored ones are ignored.
    #[must_use]
    pub fn worst(&self, optimize: Optimize) -> Option<&Phenotype<G, C>> {
        self.extreme(optimize, Ordering::Less)
    }

    fn extreme(&self, optimize: Optimize, wanted: Ordering) -> Option<&Phenotype<G, C>> {
        let mut scored = self
            .individuals
            .iter()
            .filter_map(|pt| pt.fitness().map(|fitness| (pt, fitness)));
        let (mut current, mut current_fitness) = scored.next()?;
        for (pt, fitness) in scored {
            if optimize.compare(fitness, current_fitness) == wanted {
                current = pt;
                current_fitness = fitness;
            }
        }
        Some(current)
    }
}

impl<G, C: Clone> Clone for Population<G, C> {
    fn clone(&self) -> Self {
        Self {
            individuals: self.individuals.clone(),
        }
    }
}

impl<G: fmt::Debug, C: fmt::Debug> fmt::Debug for Population<G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.individuals.iter()).finish()
    }
}

impl<G: PartialEq, C: PartialEq> PartialEq for Population<G, C> {
    fn eq(&self, other: &Self) -> bool {
        self.individuals == other.individuals
    }
}

impl<G, C> Default for Population<G, C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<G, C> From<Vec<Phenotype<G, C>>> for Population<G, C> {
    fn from(individuals: Vec<Phenotype<G, C>>) -> Self {
        Self { individuals }
    }
}

impl<G, C> FromIterator<Phenotype<G, C>> for Population<G, C> {
    fn from_iter<I: IntoIterator<Item = Phenotype<G, C>>>(iter: I) -> Self {
        Self {
            individuals: iter.into_iter().collect(),
        }
    }
}

impl<G, C> IntoIterator for Population<G, C> {
    type Item = Phenotype<G, C>;
    type IntoIter = std::vec::IntoIter<Phenotype<G, C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.individuals.into_iter()
    }
}

impl<'a, G, C> IntoIterator for &'a Population<G, C> {
    type Item = &'a Phenotype<G, C>;
    type IntoIter = std::slice::Iter<'a, Phenotype<G, C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.individuals.iter()
    }
}

impl<G, C> Index<usize> for Population<G, C> {
    type Output = Phenotype<G, C>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.individuals[index]
    }
}
