#![warn(missing_docs)]

//! A generation-step engine for genetic algorithms.
//!
//! An [`Engine`] turns one evaluated population into the next by selecting
//! offspring and survivors, altering the offspring, replacing invalid and
//! over-aged individuals, and scoring the result. The independent stages of a
//! step run concurrently on a caller-supplied [`exec::Executor`], while the
//! call itself stays synchronous.
//!
//! Genotypes, selection strategies and alteration operators are supplied by
//! the caller through the traits in [`ops`].
//!
//! ```
//! use jeans_engine::exec::InlineExecutor;
//! use jeans_engine::{Engine, Optimize};
//! use rand::Rng;
//!
//! let engine = Engine::builder(
//!     |x: &f64| x.powi(2),
//!     || rand::thread_rng().gen_range(-1.0_f64..1.0),
//! )
//! .optimize(Optimize::Minimum)
//! .population_size(16)
//! .executor(InlineExecutor)
//! .build()
//! .unwrap();
//!
//! let start = engine.evolution_start_from_genotypes(Vec::new(), 1);
//! let result = engine.evolve_start(&start).unwrap();
//! assert_eq!(result.population.len(), 16);
//! assert!(result.best_fitness().is_some());
//! ```

pub mod core;
pub mod engine;
pub mod error;
pub mod eval;
pub mod exec;
pub mod ops;

pub use crate::core::{
    EvolutionDurations, EvolutionResult, EvolutionStart, Fitness, Optimize, Phenotype, Population,
};
pub use crate::engine::{Engine, EngineBuilder, EngineParams};
pub use crate::error::{ConfigError, EngineError, EngineResult};
