//! Formulation of individual layers.
//!
//! Every layer produces a [`LayerBlock`]: one `zhat` and one `z` expression
//! per output, in row-major order over the layer's output shape. Weighted
//! layers read their single predecessor's `z` through
//! [`Layer::predecessor_connections`], so dense and convolutional layers share
//! one driver per strategy.

pub(crate) mod full_space;
pub(crate) mod reduced_space;

use std::collections::BTreeMap;

use netform_core::{Expr, Interval, Layer, LayerId, Shape, StructuralError, VarId};

use crate::{Block, FormulationError, Strategy};

/// The expressions standing for a layer's pre-activation and activation
/// values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayerBlock {
    pub(crate) zhat: Vec<Expr>,
    pub(crate) z: Vec<Expr>,
}

/// An already formulated layer feeding the layer being formulated.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Predecessor<'a> {
    pub(crate) id: LayerId,
    pub(crate) shape: &'a Shape,
    pub(crate) block: &'a LayerBlock,
}

impl Predecessor<'_> {
    fn z(&self, index: &[usize]) -> Option<&Expr> {
        self.shape.offset(index).and_then(|i| self.block.z.get(i))
    }
}

/// Adds one variable per input entry, bounded by the scaled input bounds.
///
/// The input layer has no activation, so `zhat` and `z` coincide. Returns the
/// new variables along with the layer block.
pub(crate) fn input_layer(
    block: &mut Block,
    layer: &Layer,
    scaled_input_bounds: &BTreeMap<usize, Interval>,
) -> (Vec<VarId>, LayerBlock) {
    let vars: Vec<_> = (0..layer.output_size().size())
        .map(|i| {
            let bounds = scaled_input_bounds.get(&i).copied();
            block.add_variable(format!("scaled_inputs[{i}]"), bounds)
        })
        .collect();

    let z: Vec<_> = vars.iter().copied().map(Expr::var).collect();
    (vars, LayerBlock { zhat: z.clone(), z })
}

/// Builds `sum_j w[j] * z_prev[j] + b` for every output of a weighted layer.
pub(crate) fn weighted_sums(
    id: LayerId,
    layer: &Layer,
    predecessor: &Predecessor<'_>,
) -> Result<Vec<Expr>, FormulationError> {
    let mismatch = || StructuralError::ShapeMismatch {
        producer: predecessor.id,
        consumer: id,
        expected: layer.expected_predecessor_shape().clone(),
        found: predecessor.shape.clone(),
    };

    layer
        .output_size()
        .indexes()
        .map(|index| {
            let terms = layer
                .predecessor_connections(&index)
                .ok_or_else(mismatch)?
                .into_iter()
                .map(|(weight, input)| {
                    predecessor
                        .z(&input)
                        .map(|z| (weight, z.clone()))
                        .ok_or_else(mismatch)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::linear(terms, layer.bias(&index)))
        })
        .collect()
}

/// Names an output entry of a layer, as in `layer[2].zhat[0,1,1]`.
pub(crate) fn entry_name(id: LayerId, part: &str, index: &[usize]) -> String {
    let index: Vec<_> = index.iter().map(ToString::to_string).collect();
    format!("layer[{}].{part}[{}]", id.index(), index.join(","))
}

pub(crate) fn unsupported(id: LayerId, layer: &Layer, strategy: Strategy) -> FormulationError {
    FormulationError::UnsupportedLayer {
        layer: id,
        kind: layer.kind(),
        activation: layer.activation().unwrap_or_default().to_owned(),
        strategy,
    }
}
