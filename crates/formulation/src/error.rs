use netform_core::{LayerId, LayerKind, StructuralError};
use thiserror::Error;

use crate::{BlockError, BoundError, RegistryError, Strategy};

/// Errors that can occur while formulating a network.
///
/// A failed formulation leaves no variables or constraints behind.
///
/// This enum is marked `#[non_exhaustive]` and may include additional variants
/// in future releases.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum FormulationError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("no {strategy} formulation for {kind} layer {layer} with activation `{activation}`")]
    UnsupportedLayer {
        layer: LayerId,
        kind: LayerKind,
        activation: String,
        strategy: Strategy,
    },

    #[error("cannot bound `{name}`: {source}")]
    BoundPropagation {
        name: String,
        #[source]
        source: BoundError,
    },

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl FormulationError {
    pub(crate) fn bounds(name: &str) -> impl FnOnce(BoundError) -> Self + '_ {
        move |source| Self::BoundPropagation {
            name: name.to_owned(),
            source,
        }
    }
}
