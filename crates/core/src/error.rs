use thiserror::Error;

use crate::{LayerId, Shape};

/// An invalid graph or shape configuration, detected before any solving.
///
/// Structural errors are always fatal: nothing is repaired, and no
/// partially built network or block is left behind.
///
/// This enum is marked `#[non_exhaustive]` and may include additional variants
/// in future releases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StructuralError {
    #[error("layer {0} is not registered")]
    UnknownLayer(LayerId),

    #[error("edge {producer} -> {consumer} would create a cycle")]
    Cycle { producer: LayerId, consumer: LayerId },

    #[error("edge {producer} -> {consumer} already exists")]
    DuplicateEdge { producer: LayerId, consumer: LayerId },

    #[error("input layer {0} cannot have predecessors")]
    EdgeIntoInput(LayerId),

    #[error("layer {consumer} expects input shape {expected} but {producer} produces {found}")]
    ShapeMismatch {
        producer: LayerId,
        consumer: LayerId,
        expected: Shape,
        found: Shape,
    },

    #[error("weights of shape {weights:?} do not map input {input} to output {output}")]
    WeightShape {
        weights: Vec<usize>,
        input: Shape,
        output: Shape,
    },

    #[error("expected {expected} biases, found {found}")]
    BiasLength { expected: usize, found: usize },

    #[error("layer weights must be finite")]
    NonFiniteWeight,

    #[error("strides must be positive")]
    InvalidStride,

    #[error("expected a shape of rank {expected}, found {found}")]
    Rank { expected: usize, found: Shape },

    #[error("index mapper cannot reshape {from} into {to}")]
    IndexMapper { from: Shape, to: Shape },

    #[error("network has no layers")]
    Empty,

    #[error("network must have exactly one layer without predecessors, found {0:?}")]
    MultipleSources(Vec<LayerId>),

    #[error("network must have exactly one layer without successors, found {0:?}")]
    MultipleSinks(Vec<LayerId>),

    #[error("layer {0} has no predecessors but is not an input layer")]
    SourceNotInput(LayerId),

    #[error("layer {layer} requires exactly one predecessor, found {found}")]
    PredecessorCount { layer: LayerId, found: usize },

    #[error("scaling covers {found} {boundary} entries but the network has {expected}")]
    ScalingLength {
        boundary: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("input bound given for index {index} of an input with {size} entries")]
    InputBoundIndex { index: usize, size: usize },

    #[error("cannot {operation} while the block is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}
