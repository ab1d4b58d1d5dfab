use netform_core::{Layer, LayerId};

use crate::{
    ActivationBuilder, FormulationError, Strategy,
    layers::{LayerBlock, Predecessor, unsupported, weighted_sums},
};

/// Formulates a dense layer as expressions of its predecessor, without adding
/// variables or constraints.
pub(crate) fn dense_layer(
    id: LayerId,
    layer: &Layer,
    predecessor: &Predecessor<'_>,
    activation: &ActivationBuilder,
) -> Result<LayerBlock, FormulationError> {
    let zhat = weighted_sums(id, layer, predecessor)?;
    let z = zhat
        .iter()
        .map(|zhat| activation.reduced_space(zhat))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| unsupported(id, layer, Strategy::ReducedSpace))?;

    Ok(LayerBlock { zhat, z })
}
