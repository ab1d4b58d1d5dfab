//! Data model for embedding trained neural networks in optimization models.
//!
//! This crate defines what a network *is*, independent of how it is
//! formulated:
//!
//! - [`NetworkDefinition`] — a validated DAG of layers with input bounds and
//!   an optional boundary [`Scaling`]
//! - [`Layer`] — the closed set of layer kinds ([`InputLayer`],
//!   [`DenseLayer`], [`ConvLayer`]) and their index arithmetic
//! - [`Expr`] — symbolic expressions over block variables, shared by
//!   reference between layers
//! - [`Interval`] and [`Shape`] — bounds and tensor dimensions
//!
//! Formulation into constraints lives in `netform-formulation`.

mod error;
pub mod expr;
mod interval;
pub mod layer;
mod network;
pub mod scaling;
mod shape;

pub use error::StructuralError;
pub use expr::{Expr, Linear, UnaryOp, VarId};
pub use interval::{Interval, IntervalError};
pub use layer::{ConvLayer, DenseLayer, IndexMapper, InputLayer, LINEAR, Layer, LayerKind};
pub use network::{LayerId, NetworkDefinition};
pub use scaling::{OffsetScaling, Scaling, ScalingError};
pub use shape::Shape;
