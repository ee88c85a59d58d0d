//! Collaborator abstractions consumed by the engine.
//!
//! The engine only sees these narrow traits. Each sub-module focuses on one
//! aspect of the evolution step so implementations can stay lightweight and
//! single-purpose.

pub mod alteration;
pub mod factory;
pub mod selection;

pub use alteration::{Alterer, AltererResult, CompositeAlterer, IdentityAlterer};
pub use factory::{GenotypeFactory, Validator};
pub use selection::{Selector, TournamentSelector};
