use ndarray::{Array1, Array2};

use crate::{IndexMapper, Shape, StructuralError};

use super::{LINEAR, check_finite, check_mapper};

/// A fully connected layer.
///
/// Dense layers multiply only the last dimension of their input, so an input
/// of shape `[.., n]` and weights of shape `[n, m]` produce an output of shape
/// `[.., m]` with the leading dimensions unchanged:
///
/// ```text
/// zhat[.., i] = sum_j weights[j, i] * z_prev[.., j] + biases[i]
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct DenseLayer {
    input_size: Shape,
    output_size: Shape,
    weights: Array2<f64>,
    biases: Array1<f64>,
    #[cfg_attr(feature = "serde-derive", serde(default = "super::default_activation"))]
    activation: String,
    #[cfg_attr(feature = "serde-derive", serde(default))]
    input_index_mapper: Option<IndexMapper>,
}

impl DenseLayer {
    /// Creates a dense layer.
    ///
    /// # Errors
    ///
    /// Returns a [`StructuralError`] if the weight or bias dimensions do not
    /// match the declared shapes, or if any weight is not finite.
    pub fn new(
        input_size: impl Into<Shape>,
        output_size: impl Into<Shape>,
        weights: Array2<f64>,
        biases: Array1<f64>,
        activation: impl Into<String>,
    ) -> Result<Self, StructuralError> {
        let layer = Self {
            input_size: input_size.into(),
            output_size: output_size.into(),
            weights,
            biases,
            activation: activation.into(),
            input_index_mapper: None,
        };
        layer.validate()?;
        Ok(layer)
    }

    /// Creates a dense layer with the identity activation.
    ///
    /// # Errors
    ///
    /// See [`DenseLayer::new`].
    pub fn linear(
        input_size: impl Into<Shape>,
        output_size: impl Into<Shape>,
        weights: Array2<f64>,
        biases: Array1<f64>,
    ) -> Result<Self, StructuralError> {
        Self::new(input_size, output_size, weights, biases, LINEAR)
    }

    /// Reads the predecessor's output through `mapper`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapper does not produce this layer's input shape.
    pub fn with_input_index_mapper(mut self, mapper: IndexMapper) -> Result<Self, StructuralError> {
        self.input_index_mapper = Some(mapper);
        self.validate()?;
        Ok(self)
    }

    #[must_use]
    pub fn input_size(&self) -> &Shape {
        &self.input_size
    }

    #[must_use]
    pub fn output_size(&self) -> &Shape {
        &self.output_size
    }

    #[must_use]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    #[must_use]
    pub fn biases(&self) -> &Array1<f64> {
        &self.biases
    }

    #[must_use]
    pub fn activation(&self) -> &str {
        &self.activation
    }

    #[must_use]
    pub fn input_index_mapper(&self) -> Option<&IndexMapper> {
        self.input_index_mapper.as_ref()
    }

    /// Returns the `(weight, input index)` pairs contributing to an output.
    ///
    /// Input indexes are in this layer's input shape.
    #[must_use]
    pub fn connections(&self, output_index: &[usize]) -> Vec<(f64, Vec<usize>)> {
        let Some((&out, leading)) = output_index.split_last() else {
            return Vec::new();
        };
        (0..self.weights.nrows())
            .map(|j| {
                let mut input_index = leading.to_vec();
                input_index.push(j);
                (self.weights[[j, out]], input_index)
            })
            .collect()
    }

    #[must_use]
    pub fn bias(&self, output_index: &[usize]) -> f64 {
        output_index
            .last()
            .and_then(|&i| self.biases.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    pub(crate) fn validate(&self) -> Result<(), StructuralError> {
        let (Some((&n_in, in_leading)), Some((&n_out, out_leading))) = (
            self.input_size.dims().split_last(),
            self.output_size.dims().split_last(),
        ) else {
            return Err(StructuralError::Rank {
                expected: 1,
                found: Shape::new([]),
            });
        };

        if in_leading != out_leading || self.weights.dim() != (n_in, n_out) {
            return Err(StructuralError::WeightShape {
                weights: self.weights.shape().to_vec(),
                input: self.input_size.clone(),
                output: self.output_size.clone(),
            });
        }
        if self.biases.len() != n_out {
            return Err(StructuralError::BiasLength {
                expected: n_out,
                found: self.biases.len(),
            });
        }

        check_finite(self.weights.iter().chain(self.biases.iter()))?;
        check_mapper(self.input_index_mapper.as_ref(), &self.input_size)
    }
}
