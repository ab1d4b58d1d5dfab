use netform_core::{Expr, LayerId, VarId};

use crate::{Assignment, Block, BlockError, Strategy, layers::LayerBlock};

/// A formulated network with its boundary exposed.
///
/// The block holds every variable and constraint of the formulation. A host
/// model connects to the network only through [`inputs`](Self::inputs) and
/// [`outputs`](Self::outputs), which are in external units.
#[derive(Debug, Clone)]
pub struct NetworkBlock {
    block: Block,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
    layers: Vec<Option<LayerBlock>>,
    strategy: Strategy,
}

impl NetworkBlock {
    pub(crate) fn new(
        block: Block,
        inputs: Vec<VarId>,
        outputs: Vec<VarId>,
        layers: Vec<Option<LayerBlock>>,
        strategy: Strategy,
    ) -> Self {
        Self {
            block,
            inputs,
            outputs,
            layers,
            strategy,
        }
    }

    /// The external input variables, in flat input order.
    #[must_use]
    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    /// The external output variables, in flat output order.
    #[must_use]
    pub fn outputs(&self) -> &[VarId] {
        &self.outputs
    }

    #[must_use]
    pub fn block(&self) -> &Block {
        &self.block
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The pre-activation expressions of a layer, in row-major order.
    ///
    /// In full-space these are bare variables. In reduced-space they are
    /// expressions of the scaled inputs.
    #[must_use]
    pub fn layer_pre_activations(&self, id: LayerId) -> Option<&[Expr]> {
        self.layer(id).map(|layer| layer.zhat.as_slice())
    }

    /// The activation expressions of a layer, in row-major order.
    #[must_use]
    pub fn layer_outputs(&self, id: LayerId) -> Option<&[Expr]> {
        self.layer(id).map(|layer| layer.z.as_slice())
    }

    fn layer(&self, id: LayerId) -> Option<&LayerBlock> {
        self.layers.get(id.index()).and_then(Option::as_ref)
    }

    /// Fixes the external inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of values differs from the number of
    /// inputs.
    pub fn fix_inputs(&mut self, values: &[f64]) -> Result<(), BlockError> {
        self.check_inputs(values)?;
        for (&var, &value) in self.inputs.iter().zip(values) {
            self.block.fix(var, value)?;
        }
        Ok(())
    }

    /// Computes every variable of the block from external input values.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of values differs from the number of
    /// inputs.
    pub fn forward(&self, inputs: &[f64]) -> Result<Assignment, BlockError> {
        self.check_inputs(inputs)?;
        let fixed: Vec<_> = self.inputs.iter().copied().zip(inputs.iter().copied()).collect();
        self.block.forward(&fixed)
    }

    /// Computes the external outputs from external input values.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of values differs from the number of
    /// inputs.
    pub fn evaluate(&self, inputs: &[f64]) -> Result<Vec<f64>, BlockError> {
        let assignment = self.forward(inputs)?;
        Ok(self.outputs.iter().map(|&var| assignment.value(var)).collect())
    }

    fn check_inputs(&self, values: &[f64]) -> Result<(), BlockError> {
        if values.len() == self.inputs.len() {
            Ok(())
        } else {
            Err(BlockError::ValueCount {
                expected: self.inputs.len(),
                found: values.len(),
            })
        }
    }
}
