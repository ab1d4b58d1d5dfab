//! Staged construction of a [`NetworkBlock`].

use std::fmt;

use netform_core::{
    Expr, LINEAR, Layer, LayerId, LayerKind, NetworkDefinition, StructuralError, VarId,
};
use tracing::{debug, info, trace};

use crate::{
    ActivationBuilder, ActivationRegistry, Block, Config, FormulationError, NetworkBlock, Strategy,
    bounds::propagate,
    layers::{LayerBlock, Predecessor, full_space, input_layer, reduced_space, unsupported},
};

/// The lifecycle stage of a [`NetworkBlockBuilder`].
///
/// Stages only move forward:
/// `Empty -> LayersRegistered -> Formulated -> Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderState {
    Empty,
    LayersRegistered,
    Formulated,
    Finalized,
}

impl BuilderState {
    fn name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::LayersRegistered => "layers registered",
            Self::Formulated => "formulated",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
enum Stage {
    Open,
    Formulated(Formulation),
    Finalized(NetworkBlock),
}

/// The result of a successful `build`.
#[derive(Debug)]
struct Formulation {
    block: Block,
    layers: Vec<Option<LayerBlock>>,
    scaled_inputs: Vec<VarId>,
    output: LayerId,
}

/// Builds a network block in stages.
///
/// Layers and edges are registered first. [`build`](Self::build) validates
/// the whole graph and formulates every layer in topological order, and
/// [`expose_boundary`](Self::expose_boundary) adds the external input and
/// output variables. Each stage runs once; an operation attempted in the
/// wrong stage fails with [`StructuralError::InvalidState`].
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
///
/// use ndarray::{arr1, arr2};
/// use netform_core::{DenseLayer, InputLayer, Interval, NetworkDefinition};
/// use netform_formulation::{Config, NetworkBlockBuilder};
///
/// let bounds = BTreeMap::from([(0, Interval::new(-1.0, 1.0).unwrap())]);
/// let definition = NetworkDefinition::new(bounds, None);
/// let mut builder = NetworkBlockBuilder::new(definition, Config::default());
///
/// let input = builder.add_layer(InputLayer::new([1])).unwrap();
/// let dense = builder
///     .add_layer(DenseLayer::new([1], [1], arr2(&[[2.0]]), arr1(&[1.0]), "relu").unwrap())
///     .unwrap();
/// builder.add_edge(input, dense).unwrap();
///
/// builder.build().unwrap();
/// builder.expose_boundary().unwrap();
/// let network = builder.into_block().unwrap();
///
/// assert_eq!(network.evaluate(&[0.5]).unwrap(), vec![2.0]);
/// ```
#[derive(Debug)]
pub struct NetworkBlockBuilder {
    definition: NetworkDefinition,
    config: Config,
    activations: ActivationRegistry,
    stage: Stage,
}

impl NetworkBlockBuilder {
    /// Creates a builder for a definition, which may already hold layers.
    #[must_use]
    pub fn new(definition: NetworkDefinition, config: Config) -> Self {
        Self {
            definition,
            config,
            activations: ActivationRegistry::default(),
            stage: Stage::Open,
        }
    }

    /// Replaces the activation registry.
    #[must_use]
    pub fn with_activations(self, activations: ActivationRegistry) -> Self {
        Self {
            activations,
            ..self
        }
    }

    #[must_use]
    pub fn state(&self) -> BuilderState {
        match self.stage {
            Stage::Open if self.definition.is_empty() => BuilderState::Empty,
            Stage::Open => BuilderState::LayersRegistered,
            Stage::Formulated(_) => BuilderState::Formulated,
            Stage::Finalized(_) => BuilderState::Finalized,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &NetworkDefinition {
        &self.definition
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is invalid or the network has already
    /// been formulated.
    pub fn add_layer(&mut self, layer: impl Into<Layer>) -> Result<LayerId, StructuralError> {
        self.ensure_open("add a layer")?;
        self.definition.add_layer(layer)
    }

    /// Connects a producer's output to a consumer's input.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge is invalid or the network has already been
    /// formulated.
    pub fn add_edge(&mut self, producer: LayerId, consumer: LayerId) -> Result<(), StructuralError> {
        self.ensure_open("add an edge")?;
        self.definition.add_edge(producer, consumer)
    }

    /// Validates the network and formulates every layer.
    ///
    /// Nothing is stored unless formulation succeeds, so a failed build leaves
    /// the builder unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder is empty or already formulated, the
    /// graph is not a single chain of layers from one input layer to one
    /// output layer, an input bound or the scaling does not fit the network's
    /// input and output sizes, a layer's activation or kind has no
    /// formulation for the configured strategy, or a full-space bound cannot
    /// be computed.
    pub fn build(&mut self) -> Result<(), FormulationError> {
        self.ensure_open("build")?;
        let order = self.validate()?;
        let strategy = self.config.strategy();

        let mut block = Block::new();
        let mut layers: Vec<Option<LayerBlock>> = vec![None; self.definition.layer_count()];
        let mut scaled_inputs = Vec::new();

        for &id in &order {
            let layer = self.definition.layer(id)?;
            let (variables, constraints) = (block.variables().len(), block.constraints().len());

            let formulated = if let Layer::Input(_) = layer {
                let (vars, formulated) =
                    input_layer(&mut block, layer, self.definition.scaled_input_bounds());
                scaled_inputs = vars;
                formulated
            } else {
                self.weighted_layer(&mut block, id, layer, &layers)?
            };

            debug!(
                layer = %id,
                kind = %layer.kind(),
                %strategy,
                variables = block.variables().len() - variables,
                constraints = block.constraints().len() - constraints,
                "formulated layer"
            );
            layers[id.index()] = Some(formulated);
        }

        let output = order.last().copied().ok_or(StructuralError::Empty)?;
        info!(
            %strategy,
            layers = order.len(),
            variables = block.variables().len(),
            constraints = block.constraints().len(),
            "formulated network block"
        );

        self.stage = Stage::Formulated(Formulation {
            block,
            layers,
            scaled_inputs,
            output,
        });
        Ok(())
    }

    /// Adds the external `inputs` and `outputs` and finalizes the block.
    ///
    /// Inputs are bounded by the unscaled input bounds and linked to the
    /// input layer by `scaled_inputs == scale(inputs)`. Outputs are defined by
    /// `outputs == unscale(z)` of the output layer and, in full-space, bounded
    /// by propagation.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder is not formulated, or if an output
    /// cannot be bounded.
    pub fn expose_boundary(&mut self) -> Result<(), FormulationError> {
        let Stage::Formulated(formulation) = &self.stage else {
            return Err(self.invalid_state("expose the boundary").into());
        };

        let network = self.finalize(formulation)?;
        info!(
            inputs = network.inputs().len(),
            outputs = network.outputs().len(),
            "exposed network boundary"
        );

        self.stage = Stage::Finalized(network);
        Ok(())
    }

    /// Returns the finalized block, if the boundary has been exposed.
    #[must_use]
    pub fn network_block(&self) -> Option<&NetworkBlock> {
        match &self.stage {
            Stage::Finalized(network) => Some(network),
            _ => None,
        }
    }

    /// Consumes the builder and returns the finalized block.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary has not been exposed.
    pub fn into_block(self) -> Result<NetworkBlock, StructuralError> {
        let state = self.state();
        match self.stage {
            Stage::Finalized(network) => Ok(network),
            _ => Err(StructuralError::InvalidState {
                operation: "take the block",
                state: state.name(),
            }),
        }
    }

    /// Checks the whole graph before anything is formulated, and returns a
    /// topological order of the layers.
    fn validate(&self) -> Result<Vec<LayerId>, FormulationError> {
        let net = &self.definition;
        if net.is_empty() {
            return Err(StructuralError::Empty.into());
        }

        let sources = net.input_layers();
        if sources.len() != 1 {
            return Err(StructuralError::MultipleSources(sources).into());
        }
        if net.layer(sources[0])?.kind() != LayerKind::Input {
            return Err(StructuralError::SourceNotInput(sources[0]).into());
        }

        let sinks = net.output_layers();
        if sinks.len() != 1 {
            return Err(StructuralError::MultipleSinks(sinks).into());
        }

        let input_size = net.layer(sources[0])?.output_size().size();
        if let Some((&index, _)) = net.scaled_input_bounds().range(input_size..).next() {
            return Err(StructuralError::InputBoundIndex {
                index,
                size: input_size,
            }
            .into());
        }
        if let Some(scaling) = net.scaling() {
            let output_size = net.layer(sinks[0])?.output_size().size();
            for (boundary, expected, found) in [
                ("input", input_size, scaling.input_len()),
                ("output", output_size, scaling.output_len()),
            ] {
                if expected != found {
                    return Err(StructuralError::ScalingLength {
                        boundary,
                        expected,
                        found,
                    }
                    .into());
                }
            }
        }

        let order = net.topological_order()?;

        for (id, layer) in net.layers() {
            if let Layer::Input(_) = layer {
                continue;
            }
            let found = net.predecessors(id).len();
            if found != 1 {
                return Err(StructuralError::PredecessorCount { layer: id, found }.into());
            }
            self.activation(id, layer)?;
            if let (Layer::Conv2d(_), Strategy::ReducedSpace) = (layer, self.config.strategy()) {
                return Err(unsupported(id, layer, Strategy::ReducedSpace));
            }
        }

        Ok(order)
    }

    /// Formulates a dense or convolutional layer from its formulated
    /// predecessor.
    fn weighted_layer(
        &self,
        block: &mut Block,
        id: LayerId,
        layer: &Layer,
        layers: &[Option<LayerBlock>],
    ) -> Result<LayerBlock, FormulationError> {
        let predecessor_id = self
            .definition
            .predecessors(id)
            .first()
            .copied()
            .ok_or(StructuralError::PredecessorCount { layer: id, found: 0 })?;
        let predecessor = Predecessor {
            id: predecessor_id,
            shape: self.definition.layer(predecessor_id)?.output_size(),
            block: layers
                .get(predecessor_id.index())
                .and_then(Option::as_ref)
                .ok_or(StructuralError::UnknownLayer(predecessor_id))?,
        };
        let activation = self.activation(id, layer)?;
        let strategy = self.config.strategy();

        match (layer, strategy) {
            (Layer::Dense(_) | Layer::Conv2d(_), Strategy::FullSpace) => full_space::weighted_layer(
                block,
                id,
                layer,
                &predecessor,
                activation,
                self.config.bound_margin(),
            ),
            (Layer::Dense(_), Strategy::ReducedSpace) => {
                let formulated = reduced_space::dense_layer(id, layer, &predecessor, activation)?;
                trace!(
                    layer = %id,
                    depth = formulated.z.iter().map(Expr::depth).max().unwrap_or(0),
                    "inlined layer expressions"
                );
                Ok(formulated)
            }
            (Layer::Input(_) | Layer::Conv2d(_), _) => Err(unsupported(id, layer, strategy)),
        }
    }

    /// Looks up the activation of a weighted layer for the configured
    /// strategy.
    fn activation(&self, id: LayerId, layer: &Layer) -> Result<&ActivationBuilder, FormulationError> {
        let strategy = self.config.strategy();
        self.activations
            .get(layer.activation().unwrap_or(LINEAR))
            .filter(|builder| builder.supports(strategy))
            .ok_or_else(|| unsupported(id, layer, strategy))
    }

    fn finalize(&self, formulation: &Formulation) -> Result<NetworkBlock, FormulationError> {
        let mut block = formulation.block.clone();
        let scaling = self.definition.scaling();
        let strategy = self.config.strategy();

        let mut inputs = Vec::with_capacity(formulation.scaled_inputs.len());
        for (i, &scaled) in formulation.scaled_inputs.iter().enumerate() {
            let bounds = self.definition.scaled_input_bounds().get(&i).map(|&bounds| {
                scaling.map_or(bounds, |scaling| scaling.unscale_input_bounds(i, bounds))
            });
            let input = block.add_variable(format!("inputs[{i}]"), bounds);
            let expr = match scaling {
                Some(scaling) => scaling.scale_input(i, &Expr::var(input)),
                None => Expr::var(input),
            };
            block.add_constraint(format!("scaled_inputs[{i}].scaling"), scaled, expr)?;
            inputs.push(input);
        }

        let terminal = formulation
            .layers
            .get(formulation.output.index())
            .and_then(Option::as_ref)
            .ok_or(StructuralError::UnknownLayer(formulation.output))?;

        let mut outputs = Vec::with_capacity(terminal.z.len());
        for (i, z) in terminal.z.iter().enumerate() {
            let name = format!("outputs[{i}]");
            let expr = match scaling {
                Some(scaling) => scaling.unscale_output(i, z),
                None => z.clone(),
            };
            let bounds = match strategy {
                Strategy::FullSpace => Some(
                    propagate(&expr, &block)
                        .map_err(FormulationError::bounds(&name))?
                        .widen(self.config.bound_margin()),
                ),
                Strategy::ReducedSpace => None,
            };
            let output = block.add_variable(&name, bounds);
            block.add_constraint(format!("{name}.scaling"), output, expr)?;
            outputs.push(output);
        }

        Ok(NetworkBlock::new(
            block,
            inputs,
            outputs,
            formulation.layers.clone(),
            strategy,
        ))
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), StructuralError> {
        match self.stage {
            Stage::Open => Ok(()),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> StructuralError {
        StructuralError::InvalidState {
            operation,
            state: self.state().name(),
        }
    }
}

/// Validates and formulates a network in one call.
///
/// # Errors
///
/// Returns any error raised by [`NetworkBlockBuilder::build`] or
/// [`NetworkBlockBuilder::expose_boundary`].
pub fn formulate(
    definition: NetworkDefinition,
    config: Config,
    activations: ActivationRegistry,
) -> Result<NetworkBlock, FormulationError> {
    let mut builder = NetworkBlockBuilder::new(definition, config).with_activations(activations);
    builder.build()?;
    builder.expose_boundary()?;
    Ok(builder.into_block()?)
}

#[cfg(test)]
mod tests;
