//! Networks described as JSON documents, shared by the integration tests.

use std::{collections::BTreeMap, error::Error, sync::Arc};

use netform_core::{Interval, Layer, NetworkDefinition, OffsetScaling, Scaling};
use serde::Deserialize;

/// A chain of layers, starting with the input layer.
#[derive(Debug, Deserialize)]
pub struct SequentialNetwork {
    pub layers: Vec<Layer>,

    /// Scaled input bounds keyed by flat input index.
    #[serde(default)]
    pub input_bounds: BTreeMap<usize, Interval>,

    /// Validated while parsing.
    #[serde(default)]
    pub scaling: Option<OffsetScaling>,
}

impl SequentialNetwork {
    /// Parses a network document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid network description,
    /// including invalid scaling parameters.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builds the validated network definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the description has no layers or the layers do
    /// not chain.
    pub fn into_definition(self) -> Result<NetworkDefinition, Box<dyn Error>> {
        let scaling: Option<Arc<dyn Scaling>> = match self.scaling {
            Some(scaling) => Some(Arc::new(scaling)),
            None => None,
        };

        let mut layers = self.layers.into_iter();
        let input = layers.next().ok_or("a network needs at least an input layer")?;

        Ok(NetworkDefinition::sequential(
            input,
            layers,
            self.input_bounds,
            scaling,
        )?)
    }
}

/// Parses and validates a network document in one step.
///
/// # Errors
///
/// Returns an error if parsing or validation fails.
pub fn load(json: &str) -> Result<NetworkDefinition, Box<dyn Error>> {
    SequentialNetwork::from_json(json)?.into_definition()
}
