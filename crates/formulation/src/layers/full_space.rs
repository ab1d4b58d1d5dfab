use netform_core::{Expr, Layer, LayerId};
use tracing::trace;

use crate::{
    ActivationBuilder, Block, FormulationError,
    activation::ActivationContext,
    bounds::propagate,
    layers::{LayerBlock, Predecessor, entry_name, weighted_sums},
};

/// Formulates a dense or convolutional layer with explicit variables.
///
/// Each output gets a variable `zhat` bounded by the propagated bounds of its
/// weighted sum and the constraint `zhat == sum`, after which the activation
/// builder formulates `z` from `zhat`.
pub(crate) fn weighted_layer(
    block: &mut Block,
    id: LayerId,
    layer: &Layer,
    predecessor: &Predecessor<'_>,
    activation: &ActivationBuilder,
    bound_margin: f64,
) -> Result<LayerBlock, FormulationError> {
    let sums = weighted_sums(id, layer, predecessor)?;
    let mut zhat = Vec::with_capacity(sums.len());
    let mut z = Vec::with_capacity(sums.len());

    for (index, sum) in layer.output_size().indexes().zip(sums) {
        let name = entry_name(id, "zhat", &index);
        let bounds = propagate(&sum, &*block)
            .map_err(FormulationError::bounds(&name))?
            .widen(bound_margin);
        trace!(%name, %bounds, "bounded pre-activation");

        let var = block.add_variable(&name, Some(bounds));
        block.add_constraint(format!("{name}.sum"), var, sum)?;
        let pre_activation = Expr::var(var);

        let context = ActivationContext {
            name: &entry_name(id, "z", &index),
            zhat: &pre_activation,
            bound_margin,
        };
        z.push(activation.full_space(block, &context)?);
        zhat.push(pre_activation);
    }

    Ok(LayerBlock { zhat, z })
}
