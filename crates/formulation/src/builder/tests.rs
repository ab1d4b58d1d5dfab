use std::{collections::BTreeMap, sync::Arc};

use approx::assert_relative_eq;
use ndarray::{Array1, Array2, Array4, arr1, arr2};
use netform_core::{
    ConvLayer, DenseLayer, IndexMapper, InputLayer, Interval, LayerKind, OffsetScaling, Scaling,
    UnaryOp,
};
use proptest::{prelude::*, strategy::Strategy as _};

use super::*;

use crate::{ActivationContext, BlockError, BoundError, Strategy};

fn bounds_for(size: usize, lower: f64, upper: f64) -> BTreeMap<usize, Interval> {
    (0..size)
        .map(|i| (i, Interval::new(lower, upper).unwrap()))
        .collect()
}

/// `x -> Dense(1 -> 3, relu) -> Dense(3 -> 1, linear)`.
fn small_network(
    input_bounds: BTreeMap<usize, Interval>,
    scaling: Option<Arc<dyn Scaling>>,
) -> NetworkDefinition {
    NetworkDefinition::sequential(
        InputLayer::new([1]),
        [
            DenseLayer::new([1], [3], arr2(&[[1.0, 2.0, -1.0]]), arr1(&[0.0, 0.0, 0.0]), "relu")
                .unwrap()
                .into(),
            DenseLayer::linear([3], [1], arr2(&[[1.0], [1.0], [1.0]]), arr1(&[0.0]))
                .unwrap()
                .into(),
        ],
        input_bounds,
        scaling,
    )
    .unwrap()
}

fn config(strategy: Strategy) -> Config {
    Config::default().with_strategy(strategy)
}

fn formulated(definition: NetworkDefinition, strategy: Strategy) -> NetworkBlock {
    formulate(definition, config(strategy), ActivationRegistry::default()).unwrap()
}

#[test]
fn full_space_worked_example() {
    let network = formulated(small_network(bounds_for(1, -3.0, 3.0), None), Strategy::FullSpace);

    assert_eq!(network.evaluate(&[2.0]).unwrap(), vec![6.0]);

    let assignment = network.forward(&[2.0]).unwrap();
    let values = |exprs: &[Expr]| -> Vec<f64> {
        exprs
            .iter()
            .map(|e| assignment.value(e.as_var().unwrap()))
            .collect()
    };
    let hidden = LayerId::new(1);
    assert_eq!(values(network.layer_pre_activations(hidden).unwrap()), vec![2.0, 4.0, -2.0]);
    assert_eq!(values(network.layer_outputs(hidden).unwrap()), vec![2.0, 4.0, 0.0]);

    // One scaled input, (zhat, z) for three hidden units, one linear output,
    // then the external input and output.
    assert_eq!(network.block().variables().len(), 10);
    assert_eq!(network.block().constraints().len(), 9);
    assert!(network.block().violations(&assignment, 0.0).is_empty());
}

#[test]
fn full_space_bounds_each_layer() {
    let network = formulated(small_network(bounds_for(1, -3.0, 3.0), None), Strategy::FullSpace);
    let block = network.block();
    let bounds_of = |expr: &Expr| block.variable(expr.as_var().unwrap()).unwrap().bounds().unwrap();

    let zhat = network.layer_pre_activations(LayerId::new(1)).unwrap();
    let expected = [(-3.0, 3.0), (-6.0, 6.0), (-3.0, 3.0)];
    for (zhat, (lower, upper)) in zhat.iter().zip(expected) {
        assert_relative_eq!(bounds_of(zhat).lower(), lower, epsilon = 1e-6);
        assert_relative_eq!(bounds_of(zhat).upper(), upper, epsilon = 1e-6);
    }

    let z = network.layer_outputs(LayerId::new(1)).unwrap();
    assert_relative_eq!(bounds_of(&z[1]).lower(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(bounds_of(&z[1]).upper(), 6.0, epsilon = 1e-6);

    let output = block.variable(network.outputs()[0]).unwrap().bounds().unwrap();
    assert_relative_eq!(output.lower(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(output.upper(), 12.0, epsilon = 1e-6);
}

#[test]
fn reduced_space_worked_example() {
    let network = formulated(small_network(BTreeMap::new(), None), Strategy::ReducedSpace);

    assert_eq!(network.evaluate(&[2.0]).unwrap(), vec![6.0]);
    assert_eq!(network.strategy(), Strategy::ReducedSpace);

    // Scaled input, external input and output only.
    assert_eq!(network.block().variables().len(), 3);
    assert_eq!(network.block().constraints().len(), 2);

    let z = network.layer_outputs(LayerId::new(1)).unwrap();
    assert!(matches!(z[0], Expr::Unary(UnaryOp::Relu, _)));
    let output = network.layer_outputs(LayerId::new(2)).unwrap();
    assert_eq!(output[0].depth(), z[0].depth() + 1);
}

#[test]
fn scaling_maps_the_boundary() {
    let scaling = OffsetScaling::new(vec![1.0], vec![0.5], vec![-0.25], vec![0.125]).unwrap();
    let definition = small_network(bounds_for(1, -3.0, 3.0), Some(Arc::new(scaling)));

    for strategy in [Strategy::FullSpace, Strategy::ReducedSpace] {
        let network = formulated(definition.clone(), strategy);

        // x = 2 scales to (2 - 1) / 0.5 = 2, the network maps it to 6, and
        // 6 unscales to 6 * 0.125 - 0.25.
        let outputs = network.evaluate(&[2.0]).unwrap();
        assert_relative_eq!(outputs[0], 0.5);

        let input = network.block().variable(network.inputs()[0]).unwrap();
        assert_eq!(input.name(), "inputs[0]");
        assert_eq!(input.bounds(), Interval::new(-0.5, 2.5).ok());
    }
}

/// `[x0, x1] -> Dense(2 -> 1, linear)` summing both inputs.
fn summing_network(scaling: Option<Arc<dyn Scaling>>) -> NetworkDefinition {
    NetworkDefinition::sequential(
        InputLayer::new([2]),
        [DenseLayer::linear([2], [1], arr2(&[[1.0], [1.0]]), arr1(&[0.0])).unwrap().into()],
        bounds_for(2, -3.0, 3.0),
        scaling,
    )
    .unwrap()
}

#[test]
fn scaling_must_cover_every_input() {
    let scaling = OffsetScaling::new(vec![1.0], vec![0.5], vec![0.0], vec![1.0]).unwrap();
    let mut builder =
        NetworkBlockBuilder::new(summing_network(Some(Arc::new(scaling))), Config::default());

    assert_eq!(
        builder.build(),
        Err(FormulationError::Structural(StructuralError::ScalingLength {
            boundary: "input",
            expected: 2,
            found: 1,
        }))
    );
    assert_eq!(builder.state(), BuilderState::LayersRegistered);
}

#[test]
fn scaling_must_cover_every_output() {
    let scaling = OffsetScaling::new(vec![0.0, 0.0], vec![1.0, 1.0], vec![], vec![]).unwrap();

    for strategy in [Strategy::FullSpace, Strategy::ReducedSpace] {
        let result = formulate(
            summing_network(Some(Arc::new(scaling.clone()))),
            config(strategy),
            ActivationRegistry::default(),
        );

        assert!(matches!(
            result,
            Err(FormulationError::Structural(StructuralError::ScalingLength {
                boundary: "output",
                expected: 1,
                found: 0,
            }))
        ));
    }
}

#[test]
fn input_bounds_must_index_the_input_layer() {
    let mut bounds = bounds_for(1, -3.0, 3.0);
    bounds.insert(1, Interval::new(0.0, 1.0).unwrap());

    let result = formulate(
        small_network(bounds, None),
        Config::default(),
        ActivationRegistry::default(),
    );

    assert!(matches!(
        result,
        Err(FormulationError::Structural(StructuralError::InputBoundIndex { index: 1, size: 1 }))
    ));
}

#[test]
fn full_space_requires_input_bounds() {
    let mut builder =
        NetworkBlockBuilder::new(small_network(BTreeMap::new(), None), Config::default());

    let result = builder.build();

    assert!(matches!(
        result,
        Err(FormulationError::BoundPropagation { ref name, source: BoundError::Unbounded(_) })
            if name == "layer[1].zhat[0]"
    ));
    assert_eq!(builder.state(), BuilderState::LayersRegistered);

    // The failed build left nothing behind, so the builder can still be used.
    builder.add_layer(InputLayer::new([1])).unwrap();
}

#[test]
fn build_runs_once() {
    let mut builder = NetworkBlockBuilder::new(
        small_network(bounds_for(1, -1.0, 1.0), None),
        Config::default(),
    );

    builder.build().unwrap();
    assert_eq!(builder.state(), BuilderState::Formulated);

    assert_eq!(
        builder.build(),
        Err(FormulationError::Structural(StructuralError::InvalidState {
            operation: "build",
            state: "formulated",
        }))
    );
    assert!(matches!(
        builder.add_layer(InputLayer::new([1])),
        Err(StructuralError::InvalidState { .. })
    ));
    assert!(matches!(
        builder.add_edge(LayerId::new(0), LayerId::new(1)),
        Err(StructuralError::InvalidState { .. })
    ));
}

#[test]
fn stages_must_run_in_order() {
    let mut builder = NetworkBlockBuilder::new(NetworkDefinition::default(), Config::default());
    assert_eq!(builder.state(), BuilderState::Empty);
    assert_eq!(
        builder.build(),
        Err(FormulationError::Structural(StructuralError::Empty))
    );

    let input = builder.add_layer(InputLayer::new([1])).unwrap();
    let dense = builder
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
        .unwrap();
    builder.add_edge(input, dense).unwrap();
    assert_eq!(builder.state(), BuilderState::LayersRegistered);

    assert_eq!(
        builder.expose_boundary(),
        Err(FormulationError::Structural(StructuralError::InvalidState {
            operation: "expose the boundary",
            state: "layers registered",
        }))
    );
    assert!(builder.network_block().is_none());
}

#[test]
fn finalized_builder_yields_the_block() {
    let definition = small_network(bounds_for(1, -1.0, 1.0), None);
    let mut builder = NetworkBlockBuilder::new(definition, Config::default());
    builder.build().unwrap();
    builder.expose_boundary().unwrap();

    assert_eq!(builder.state(), BuilderState::Finalized);
    assert!(builder.network_block().is_some());
    assert!(matches!(
        builder.expose_boundary(),
        Err(FormulationError::Structural(StructuralError::InvalidState {
            state: "finalized",
            ..
        }))
    ));

    let network = builder.into_block().unwrap();
    assert_eq!(network.inputs().len(), 1);
    assert_eq!(network.outputs().len(), 1);
}

#[test]
fn into_block_requires_finalization() {
    let builder = NetworkBlockBuilder::new(
        small_network(bounds_for(1, -1.0, 1.0), None),
        Config::default(),
    );

    assert!(matches!(
        builder.into_block(),
        Err(StructuralError::InvalidState {
            operation: "take the block",
            ..
        })
    ));
}

#[test]
fn rejects_two_sources() {
    let mut net = NetworkDefinition::default();
    let a = net.add_layer(InputLayer::new([1])).unwrap();
    let b = net.add_layer(InputLayer::new([1])).unwrap();
    let dense = net
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
        .unwrap();
    net.add_edge(a, dense).unwrap();
    net.add_edge(b, dense).unwrap();

    let result = formulate(net, Config::default(), ActivationRegistry::default());

    assert_eq!(
        result.unwrap_err(),
        FormulationError::Structural(StructuralError::MultipleSources(vec![a, b]))
    );
}

#[test]
fn rejects_two_sinks() {
    let mut net = NetworkDefinition::default();
    let input = net.add_layer(InputLayer::new([1])).unwrap();
    let a = net
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
        .unwrap();
    let b = net
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[2.0]]), arr1(&[0.0])).unwrap())
        .unwrap();
    net.add_edge(input, a).unwrap();
    net.add_edge(input, b).unwrap();

    let result = formulate(net, Config::default(), ActivationRegistry::default());

    assert_eq!(
        result.unwrap_err(),
        FormulationError::Structural(StructuralError::MultipleSinks(vec![a, b]))
    );
}

#[test]
fn rejects_merging_branches() {
    let mut net = NetworkDefinition::new(bounds_for(1, 0.0, 1.0), None);
    let input = net.add_layer(InputLayer::new([1])).unwrap();
    let a = net
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
        .unwrap();
    let b = net
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[2.0]]), arr1(&[0.0])).unwrap())
        .unwrap();
    let merge = net
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
        .unwrap();
    for (producer, consumer) in [(input, a), (input, b), (a, merge), (b, merge)] {
        net.add_edge(producer, consumer).unwrap();
    }

    let result = formulate(net, Config::default(), ActivationRegistry::default());

    assert_eq!(
        result.unwrap_err(),
        FormulationError::Structural(StructuralError::PredecessorCount {
            layer: merge,
            found: 2
        })
    );
}

#[test]
fn rejects_source_that_is_not_an_input() {
    let mut net = NetworkDefinition::default();
    let dense = net
        .add_layer(DenseLayer::linear([1], [1], arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
        .unwrap();

    let result = formulate(net, Config::default(), ActivationRegistry::default());

    assert_eq!(
        result.unwrap_err(),
        FormulationError::Structural(StructuralError::SourceNotInput(dense))
    );
}

#[test]
fn unknown_activation_fails_before_formulating() {
    let definition = NetworkDefinition::sequential(
        InputLayer::new([1]),
        [
            DenseLayer::new([1], [1], arr2(&[[1.0]]), arr1(&[0.0]), "relu").unwrap().into(),
            DenseLayer::new([1], [1], arr2(&[[1.0]]), arr1(&[0.0]), "gelu").unwrap().into(),
        ],
        bounds_for(1, 0.0, 1.0),
        None,
    )
    .unwrap();
    let mut builder = NetworkBlockBuilder::new(definition, Config::default());

    assert_eq!(
        builder.build(),
        Err(FormulationError::UnsupportedLayer {
            layer: LayerId::new(2),
            kind: LayerKind::Dense,
            activation: "gelu".to_owned(),
            strategy: Strategy::FullSpace,
        })
    );
    assert_eq!(builder.state(), BuilderState::LayersRegistered);
}

#[test]
fn custom_activations_extend_the_registry() {
    fn clipped(
        block: &mut Block,
        context: &ActivationContext<'_>,
    ) -> Result<Expr, FormulationError> {
        let z = block.add_variable(context.name, Interval::new(0.0, 1.0).ok());
        let expr = context.zhat.apply(UnaryOp::Sigmoid);
        block.add_constraint(format!("{}.clip", context.name), z, expr)?;
        Ok(Expr::var(z))
    }

    let mut activations = ActivationRegistry::default();
    activations
        .register("clip", ActivationBuilder::from_constraints(clipped))
        .unwrap();
    let definition = NetworkDefinition::sequential(
        InputLayer::new([1]),
        [DenseLayer::new([1], [1], arr2(&[[1.0]]), arr1(&[0.0]), "clip").unwrap().into()],
        bounds_for(1, -1.0, 1.0),
        None,
    )
    .unwrap();

    let network = formulate(definition.clone(), Config::default(), activations.clone()).unwrap();
    assert_relative_eq!(network.evaluate(&[0.0]).unwrap()[0], 0.5);

    let reduced = formulate(definition, config(Strategy::ReducedSpace), activations);
    assert!(matches!(
        reduced,
        Err(FormulationError::UnsupportedLayer { ref activation, .. }) if activation == "clip"
    ));
}

/// `[1, 3, 3] -> Conv(2x2, relu) -> flatten -> Dense(4 -> 1, linear)`.
fn conv_network() -> NetworkDefinition {
    let conv = ConvLayer::new([1, 3, 3], [1, 2, 2], [1, 1], Array4::ones((1, 1, 2, 2)), "relu")
        .unwrap();
    let dense = DenseLayer::linear([4], [1], Array2::ones((4, 1)), Array1::zeros(1))
        .unwrap()
        .with_input_index_mapper(IndexMapper::new([1, 2, 2], [4]).unwrap())
        .unwrap();

    NetworkDefinition::sequential(
        InputLayer::new([1, 3, 3]),
        [conv.into(), dense.into()],
        bounds_for(9, 0.0, 1.0),
        None,
    )
    .unwrap()
}

#[test]
fn full_space_convolution_end_to_end() {
    let network = formulated(conv_network(), Strategy::FullSpace);
    let inputs: Vec<f64> = (0..9_u8).map(|i| f64::from(i) * 0.1).collect();

    // Windows sum to 0.8, 1.2, 2.0 and 2.4.
    assert_relative_eq!(network.evaluate(&inputs).unwrap()[0], 6.4, epsilon = 1e-12);

    let conv = network.layer_pre_activations(LayerId::new(1)).unwrap();
    assert_eq!(conv.len(), 4);

    let output = network.block().variable(network.outputs()[0]).unwrap().bounds().unwrap();
    assert_relative_eq!(output.lower(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(output.upper(), 16.0, epsilon = 1e-6);

    let assignment = network.forward(&inputs).unwrap();
    assert!(network.block().violations(&assignment, 0.0).is_empty());
}

#[test]
fn reduced_space_convolution_is_unsupported() {
    let result = formulate(
        conv_network(),
        config(Strategy::ReducedSpace),
        ActivationRegistry::default(),
    );

    assert!(matches!(
        result,
        Err(FormulationError::UnsupportedLayer {
            kind: LayerKind::Conv2d,
            strategy: Strategy::ReducedSpace,
            ..
        })
    ));
}

#[test]
fn input_only_network_passes_inputs_through() {
    let definition = NetworkDefinition::sequential(
        InputLayer::new([2]),
        [],
        bounds_for(2, -1.0, 1.0),
        None,
    )
    .unwrap();

    let network = formulated(definition, Strategy::FullSpace);

    assert_eq!(network.evaluate(&[0.25, -0.5]).unwrap(), vec![0.25, -0.5]);
}

#[test]
fn fixed_inputs_drive_forward_evaluation() {
    let mut network = formulated(small_network(bounds_for(1, -3.0, 3.0), None), Strategy::FullSpace);

    assert_eq!(
        network.evaluate(&[1.0, 2.0]),
        Err(BlockError::ValueCount {
            expected: 1,
            found: 2
        })
    );
    assert_eq!(network.block().forward(&[]), Err(BlockError::Undetermined(network.inputs()[0])));

    network.fix_inputs(&[-1.0]).unwrap();
    let assignment = network.block().forward(&[]).unwrap();

    // Only the third hidden unit is active: relu(-1 * -1) = 1.
    assert_relative_eq!(assignment.value(network.outputs()[0]), 1.0);
}

fn activation_tag() -> impl proptest::strategy::Strategy<Value = &'static str> {
    prop_oneof![
        Just("relu"),
        Just("sigmoid"),
        Just("tanh"),
        Just("softplus"),
        Just("silu"),
        Just("linear"),
    ]
}

fn two_layer_network(
    w1: Vec<f64>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: Vec<f64>,
    activation: &str,
) -> NetworkDefinition {
    let hidden = DenseLayer::new(
        [2],
        [3],
        Array2::from_shape_vec((2, 3), w1).unwrap(),
        Array1::from(b1),
        activation,
    )
    .unwrap();
    let output = DenseLayer::new(
        [3],
        [2],
        Array2::from_shape_vec((3, 2), w2).unwrap(),
        Array1::from(b2),
        activation,
    )
    .unwrap();

    NetworkDefinition::sequential(
        InputLayer::new([2]),
        [hidden.into(), output.into()],
        bounds_for(2, -1.0, 1.0),
        None,
    )
    .unwrap()
}

proptest! {
    #[test]
    fn strategies_agree_and_bounds_enclose_forward_values(
        w1 in prop::collection::vec(-2.0..2.0_f64, 6),
        b1 in prop::collection::vec(-1.0..1.0_f64, 3),
        w2 in prop::collection::vec(-2.0..2.0_f64, 6),
        b2 in prop::collection::vec(-1.0..1.0_f64, 2),
        activation in activation_tag(),
        x in prop::collection::vec(-1.0..=1.0_f64, 2),
    ) {
        let definition = two_layer_network(w1, b1, w2, b2, activation);
        let full = formulated(definition.clone(), Strategy::FullSpace);
        let reduced = formulated(definition, Strategy::ReducedSpace);

        let full_outputs = full.evaluate(&x).unwrap();
        let reduced_outputs = reduced.evaluate(&x).unwrap();
        for (a, b) in full_outputs.iter().zip(&reduced_outputs) {
            prop_assert!((a - b).abs() <= 1e-12 * (1.0 + a.abs()), "{a} != {b}");
        }

        // Every variable, including each zhat, lies within its propagated
        // bounds, and every constraint holds.
        let assignment = full.forward(&x).unwrap();
        let violations = full.block().violations(&assignment, 0.0);
        prop_assert!(violations.is_empty(), "{violations:?}");
    }
}
