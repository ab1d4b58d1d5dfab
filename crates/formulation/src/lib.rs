//! Formulation of neural networks as algebraic constraint blocks.
//!
//! A [`NetworkBlockBuilder`] turns a [`netform_core::NetworkDefinition`] into
//! a [`NetworkBlock`] under one of two strategies:
//!
//! - [`Strategy::FullSpace`] adds a bounded variable and an equality
//!   constraint for every pre-activation and activation value.
//! - [`Strategy::ReducedSpace`] adds no intermediate variables and instead
//!   expresses each output as one nested expression of the inputs.
//!
//! Activations are looked up by tag in an [`ActivationRegistry`], which hosts
//! can extend with their own formulations.

mod activation;
mod block;
mod bounds;
mod builder;
mod config;
mod error;
mod layers;
mod network_block;

pub use activation::{
    ActivationBuilder, ActivationContext, ActivationRegistry, ConstraintFn, ExpressionFn,
    RegistryError,
};
pub use block::{Assignment, Block, BlockError, Constraint, Variable, Violation};
pub use bounds::{BoundError, BoundTable, propagate};
pub use builder::{BuilderState, NetworkBlockBuilder, formulate};
pub use config::{Config, ConfigError, Strategy};
pub use error::FormulationError;
pub use network_block::NetworkBlock;
