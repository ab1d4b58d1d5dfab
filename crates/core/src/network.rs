//! The layered graph describing a trained network.

use std::{collections::BTreeMap, fmt, sync::Arc};

use petgraph::{
    Direction,
    algo::{has_path_connecting, toposort},
    graph::{DiGraph, NodeIndex},
};

use crate::{Interval, Layer, Scaling, StructuralError};

/// Identifies a layer within a [`NetworkDefinition`].
///
/// Ids are assigned in registration order, starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(usize);

impl LayerId {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }

    fn node(self) -> NodeIndex {
        NodeIndex::new(self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directed acyclic graph of layers, plus the input bounds and scaling
/// that apply at the network's boundary.
///
/// Layers live in an arena indexed by [`LayerId`], and each edge connects a
/// producer's output to a consumer's input. Every mutation is validated, so
/// an existing definition never contains a cycle, an ill-shaped edge, or a
/// layer whose parameters disagree with its declared shapes.
///
/// # Example
///
/// ```
/// use ndarray::{arr1, arr2};
/// use netform_core::{DenseLayer, InputLayer, NetworkDefinition};
///
/// let mut net = NetworkDefinition::default();
/// let input = net.add_layer(InputLayer::new([2])).unwrap();
/// let dense = net
///     .add_layer(
///         DenseLayer::new([2], [1], arr2(&[[1.0], [-1.0]]), arr1(&[0.0]), "relu").unwrap(),
///     )
///     .unwrap();
/// net.add_edge(input, dense).unwrap();
///
/// assert_eq!(net.topological_order().unwrap(), vec![input, dense]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetworkDefinition {
    layers: Vec<Layer>,
    graph: DiGraph<LayerId, ()>,
    scaled_input_bounds: BTreeMap<usize, Interval>,
    scaling: Option<Arc<dyn Scaling>>,
}

impl NetworkDefinition {
    /// Creates an empty network.
    ///
    /// `scaled_input_bounds` bounds the input layer's entries, keyed by flat
    /// input index, in the network's scaled space. Every key must be below the
    /// input layer's size, and `scaling` must cover exactly the input and
    /// output sizes; both are checked when the network is formulated.
    #[must_use]
    pub fn new(
        scaled_input_bounds: BTreeMap<usize, Interval>,
        scaling: Option<Arc<dyn Scaling>>,
    ) -> Self {
        Self {
            scaled_input_bounds,
            scaling,
            ..Self::default()
        }
    }

    /// Builds a chain `input -> layers[0] -> layers[1] -> ...`.
    ///
    /// # Errors
    ///
    /// Returns an error if any layer is invalid or does not accept its
    /// predecessor's output shape.
    pub fn sequential(
        input: impl Into<Layer>,
        layers: impl IntoIterator<Item = Layer>,
        scaled_input_bounds: BTreeMap<usize, Interval>,
        scaling: Option<Arc<dyn Scaling>>,
    ) -> Result<Self, StructuralError> {
        let mut net = Self::new(scaled_input_bounds, scaling);
        let mut previous = net.add_layer(input)?;
        for layer in layers {
            let next = net.add_layer(layer)?;
            net.add_edge(previous, next)?;
            previous = next;
        }
        Ok(net)
    }

    /// Registers a layer and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer's declared shapes disagree with its
    /// weights or kernel.
    pub fn add_layer(&mut self, layer: impl Into<Layer>) -> Result<LayerId, StructuralError> {
        let layer = layer.into();
        layer.validate()?;

        let id = LayerId(self.layers.len());
        self.layers.push(layer);
        let node = self.graph.add_node(id);
        debug_assert_eq!(node, id.node());
        Ok(id)
    }

    /// Connects a producer's output to a consumer's input.
    ///
    /// # Errors
    ///
    /// Returns an error if either layer is unknown, the consumer is an input
    /// layer, the producer's output shape does not match what the consumer
    /// reads, the edge already exists, or the edge would create a cycle.
    pub fn add_edge(&mut self, producer: LayerId, consumer: LayerId) -> Result<(), StructuralError> {
        let producer_layer = self.layer(producer)?;
        let consumer_layer = self.layer(consumer)?;

        if matches!(consumer_layer, Layer::Input(_)) {
            return Err(StructuralError::EdgeIntoInput(consumer));
        }

        let expected = consumer_layer.expected_predecessor_shape();
        let found = producer_layer.output_size();
        if expected != found {
            return Err(StructuralError::ShapeMismatch {
                producer,
                consumer,
                expected: expected.clone(),
                found: found.clone(),
            });
        }

        if self.graph.contains_edge(producer.node(), consumer.node()) {
            return Err(StructuralError::DuplicateEdge { producer, consumer });
        }
        if has_path_connecting(&self.graph, consumer.node(), producer.node(), None) {
            return Err(StructuralError::Cycle { producer, consumer });
        }

        self.graph.add_edge(producer.node(), consumer.node(), ());
        Ok(())
    }

    /// Returns a registered layer.
    ///
    /// # Errors
    ///
    /// Returns an error if no layer has this id.
    pub fn layer(&self, id: LayerId) -> Result<&Layer, StructuralError> {
        self.layers
            .get(id.0)
            .ok_or(StructuralError::UnknownLayer(id))
    }

    /// Returns every layer with its id, in registration order.
    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter().enumerate().map(|(i, layer)| (LayerId(i), layer))
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Returns the layers feeding `id`, in the order their edges were added.
    #[must_use]
    pub fn predecessors(&self, id: LayerId) -> Vec<LayerId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Returns the layers fed by `id`, in the order their edges were added.
    #[must_use]
    pub fn successors(&self, id: LayerId) -> Vec<LayerId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: LayerId, direction: Direction) -> Vec<LayerId> {
        if id.0 >= self.layers.len() {
            return Vec::new();
        }
        // petgraph yields the most recently added edge first.
        let mut ids: Vec<_> = self
            .graph
            .neighbors_directed(id.node(), direction)
            .map(|node| self.graph[node])
            .collect();
        ids.reverse();
        ids
    }

    /// Returns the layers without predecessors.
    #[must_use]
    pub fn input_layers(&self) -> Vec<LayerId> {
        self.layers()
            .map(|(id, _)| id)
            .filter(|&id| self.predecessors(id).is_empty())
            .collect()
    }

    /// Returns the layers without successors.
    #[must_use]
    pub fn output_layers(&self) -> Vec<LayerId> {
        self.layers()
            .map(|(id, _)| id)
            .filter(|&id| self.successors(id).is_empty())
            .collect()
    }

    /// Returns every layer ordered so producers precede their consumers.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle, which `add_edge`
    /// prevents.
    pub fn topological_order(&self) -> Result<Vec<LayerId>, StructuralError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|node| self.graph[node]).collect())
            .map_err(|cycle| {
                let id = self.graph[cycle.node_id()];
                StructuralError::Cycle {
                    producer: id,
                    consumer: id,
                }
            })
    }

    /// Bounds on the scaled network inputs, keyed by flat input index.
    #[must_use]
    pub fn scaled_input_bounds(&self) -> &BTreeMap<usize, Interval> {
        &self.scaled_input_bounds
    }

    #[must_use]
    pub fn scaling(&self) -> Option<&dyn Scaling> {
        self.scaling.as_deref()
    }
}
