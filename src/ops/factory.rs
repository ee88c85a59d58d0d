//! Genotype sources and validity predicates.

use crate::core::Phenotype;

/// Produces fresh genotypes of arbitrary quality.
///
/// Any `Fn() -> G` closure is a factory.
///
/// # Examples
/// ```
/// use jeans_engine::ops::GenotypeFactory;
/// use rand::Rng;
///
/// let factory = || rand::thread_rng().gen_range(0..10_u32);
/// assert!(factory.new_instance() < 10);
/// ```
pub trait GenotypeFactory<G>: Send + Sync {
    /// Creates a new genotype.
    fn new_instance(&self) -> G;
}

impl<G, F> GenotypeFactory<G> for F
where
    F: Fn() -> G + Send + Sync,
{
    fn new_instance(&self) -> G {
        self()
    }
}

/// Validity predicate applied to phenotypes.
pub type Validator<G, C> = dyn Fn(&Phenotype<G, C>) -> bool + Send + Sync;
