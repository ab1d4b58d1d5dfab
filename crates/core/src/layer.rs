//! Layer types of a feed-forward network.
//!
//! The set of layer kinds is closed: [`Layer`] is an enum, and code that
//! formulates layers matches on it exhaustively. Each weighted layer knows
//! which of its predecessor's outputs feed each of its own outputs, which is
//! the only index arithmetic the formulation needs.

mod conv;
mod dense;
mod input;
mod mapper;

use std::fmt;

pub use conv::ConvLayer;
pub use dense::DenseLayer;
pub use input::InputLayer;
pub use mapper::IndexMapper;

use crate::{Shape, StructuralError};

/// Activation tag of layers that apply no nonlinearity.
pub const LINEAR: &str = "linear";

fn default_activation() -> String {
    LINEAR.to_owned()
}

/// A node of a network definition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-derive", serde(tag = "type", rename_all = "snake_case"))]
pub enum Layer {
    Input(InputLayer),
    Dense(DenseLayer),
    Conv2d(ConvLayer),
}

/// The kind of a [`Layer`], without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Input,
    Dense,
    Conv2d,
}

impl Layer {
    #[must_use]
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Input(_) => LayerKind::Input,
            Self::Dense(_) => LayerKind::Dense,
            Self::Conv2d(_) => LayerKind::Conv2d,
        }
    }

    /// The shape this layer reads, before any index mapping.
    #[must_use]
    pub fn input_size(&self) -> &Shape {
        match self {
            Self::Input(layer) => layer.size(),
            Self::Dense(layer) => layer.input_size(),
            Self::Conv2d(layer) => layer.input_size(),
        }
    }

    #[must_use]
    pub fn output_size(&self) -> &Shape {
        match self {
            Self::Input(layer) => layer.size(),
            Self::Dense(layer) => layer.output_size(),
            Self::Conv2d(layer) => layer.output_size(),
        }
    }

    /// The activation tag, or `None` for the input layer.
    #[must_use]
    pub fn activation(&self) -> Option<&str> {
        match self {
            Self::Input(_) => None,
            Self::Dense(layer) => Some(layer.activation()),
            Self::Conv2d(layer) => Some(layer.activation()),
        }
    }

    #[must_use]
    pub fn input_index_mapper(&self) -> Option<&IndexMapper> {
        match self {
            Self::Input(_) => None,
            Self::Dense(layer) => layer.input_index_mapper(),
            Self::Conv2d(layer) => layer.input_index_mapper(),
        }
    }

    /// The output shape a predecessor must have to feed this layer.
    #[must_use]
    pub fn expected_predecessor_shape(&self) -> &Shape {
        self.input_index_mapper()
            .map_or_else(|| self.input_size(), IndexMapper::input_shape)
    }

    /// Returns the `(weight, predecessor index)` pairs feeding an output.
    ///
    /// Indexes are expressed in the predecessor's output shape, with any index
    /// mapper already applied. The input layer has no connections.
    ///
    /// Returns `None` if `output_index` does not fit the layer, or if the index
    /// mapper cannot place a connection in the predecessor's shape.
    #[must_use]
    pub fn predecessor_connections(
        &self,
        output_index: &[usize],
    ) -> Option<Vec<(f64, Vec<usize>)>> {
        self.output_size().offset(output_index)?;
        let connections = match self {
            Self::Input(_) => return Some(Vec::new()),
            Self::Dense(layer) => layer.connections(output_index),
            Self::Conv2d(layer) => match *output_index {
                [channel, row, col] => layer.kernel_with_input_indexes(channel, row, col),
                _ => return None,
            },
        };

        match self.input_index_mapper() {
            None => Some(connections),
            Some(mapper) => connections
                .into_iter()
                .map(|(w, index)| mapper.predecessor_index(&index).map(|i| (w, i)))
                .collect(),
        }
    }

    /// The constant term of an output, zero for the input layer.
    #[must_use]
    pub fn bias(&self, output_index: &[usize]) -> f64 {
        match self {
            Self::Input(_) => 0.0,
            Self::Dense(layer) => layer.bias(output_index),
            Self::Conv2d(layer) => output_index.first().map_or(0.0, |&c| layer.bias(c)),
        }
    }

    /// Checks that the declared shapes agree with the layer's parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`StructuralError`] describing the first violation.
    pub fn validate(&self) -> Result<(), StructuralError> {
        match self {
            Self::Input(_) => Ok(()),
            Self::Dense(layer) => layer.validate(),
            Self::Conv2d(layer) => layer.validate(),
        }
    }
}

impl From<InputLayer> for Layer {
    fn from(layer: InputLayer) -> Self {
        Self::Input(layer)
    }
}

impl From<DenseLayer> for Layer {
    fn from(layer: DenseLayer) -> Self {
        Self::Dense(layer)
    }
}

impl From<ConvLayer> for Layer {
    fn from(layer: ConvLayer) -> Self {
        Self::Conv2d(layer)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Dense => "dense",
            Self::Conv2d => "conv2d",
        })
    }
}

fn check_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> Result<(), StructuralError> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(StructuralError::NonFiniteWeight)
    }
}

fn check_mapper(mapper: Option<&IndexMapper>, input_size: &Shape) -> Result<(), StructuralError> {
    let Some(mapper) = mapper else {
        return Ok(());
    };
    mapper.validate()?;
    if mapper.output_shape() == input_size {
        Ok(())
    } else {
        Err(StructuralError::IndexMapper {
            from: mapper.output_shape().clone(),
            to: input_size.clone(),
        })
    }
}
