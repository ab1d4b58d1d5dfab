use ndarray::{Array1, Array4};

use crate::{IndexMapper, Shape, StructuralError};

use super::{check_finite, check_mapper};

/// A two-dimensional convolutional layer.
///
/// Inputs have shape `[channels, rows, cols]` and outputs
/// `[out_channels, out_rows, out_cols]`. The kernel has shape
/// `[out_channels, channels, kernel_rows, kernel_cols]`. Zero padding is only
/// applied when declared with [`ConvLayer::padded`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvLayer {
    input_size: Shape,
    output_size: Shape,
    strides: [usize; 2],
    #[cfg_attr(feature = "serde-derive", serde(default))]
    padding: [usize; 2],
    kernel: Array4<f64>,
    #[cfg_attr(feature = "serde-derive", serde(default))]
    biases: Option<Array1<f64>>,
    #[cfg_attr(feature = "serde-derive", serde(default = "super::default_activation"))]
    activation: String,
    #[cfg_attr(feature = "serde-derive", serde(default))]
    input_index_mapper: Option<IndexMapper>,
}

impl ConvLayer {
    /// Creates a convolutional layer without padding or biases.
    ///
    /// # Errors
    ///
    /// Returns a [`StructuralError`] if the output shape differs from the one
    /// implied by the input shape, kernel, and strides.
    pub fn new(
        input_size: impl Into<Shape>,
        output_size: impl Into<Shape>,
        strides: [usize; 2],
        kernel: Array4<f64>,
        activation: impl Into<String>,
    ) -> Result<Self, StructuralError> {
        Self::padded(input_size, output_size, strides, [0, 0], kernel, activation)
    }

    /// Creates a convolutional layer with symmetric zero padding of
    /// `[rows, cols]` on each side of the input.
    ///
    /// # Errors
    ///
    /// Returns a [`StructuralError`] if the output shape differs from the one
    /// implied by the padded input shape, kernel, and strides.
    pub fn padded(
        input_size: impl Into<Shape>,
        output_size: impl Into<Shape>,
        strides: [usize; 2],
        padding: [usize; 2],
        kernel: Array4<f64>,
        activation: impl Into<String>,
    ) -> Result<Self, StructuralError> {
        let layer = Self {
            input_size: input_size.into(),
            output_size: output_size.into(),
            strides,
            padding,
            kernel,
            biases: None,
            activation: activation.into(),
            input_index_mapper: None,
        };
        layer.validate()?;
        Ok(layer)
    }

    /// Adds one bias per output channel.
    ///
    /// # Errors
    ///
    /// Returns an error if there is not exactly one bias per output channel.
    pub fn with_biases(mut self, biases: Array1<f64>) -> Result<Self, StructuralError> {
        self.biases = Some(biases);
        self.validate()?;
        Ok(self)
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
    pub fn strides(&self) -> [usize; 2] {
        self.strides
    }

    #[must_use]
    pub fn padding(&self) -> [usize; 2] {
        self.padding
    }

    #[must_use]
    pub fn kernel(&self) -> &Array4<f64> {
        &self.kernel
    }

    #[must_use]
    pub fn activation(&self) -> &str {
        &self.activation
    }

    #[must_use]
    pub fn input_index_mapper(&self) -> Option<&IndexMapper> {
        self.input_index_mapper.as_ref()
    }

    /// Returns the bias of an output channel, zero when the layer has none.
    #[must_use]
    pub fn bias(&self, channel: usize) -> f64 {
        self.biases
            .as_ref()
            .and_then(|biases| biases.get(channel))
            .copied()
            .unwrap_or(0.0)
    }

    /// Returns the `(weight, input index)` pairs contributing to the output
    /// at `(channel, row, col)`.
    ///
    /// The kernel window for an output starts at `row * stride - padding` in
    /// the input. Kernel cells falling in the zero padding are omitted.
    #[must_use]
    pub fn kernel_with_input_indexes(
        &self,
        channel: usize,
        row: usize,
        col: usize,
    ) -> Vec<(f64, Vec<usize>)> {
        let (_, depth, kernel_rows, kernel_cols) = self.kernel.dim();
        let [stride_r, stride_c] = self.strides;
        let [pad_r, pad_c] = self.padding;
        let [_, rows, cols] = dims3(&self.input_size);

        let mut pairs = Vec::with_capacity(depth * kernel_rows * kernel_cols);
        for k in 0..depth {
            for i in 0..kernel_rows {
                let Some(r) = (row * stride_r + i).checked_sub(pad_r).filter(|&r| r < rows) else {
                    continue;
                };
                for j in 0..kernel_cols {
                    let Some(c) = (col * stride_c + j).checked_sub(pad_c).filter(|&c| c < cols)
                    else {
                        continue;
                    };
                    pairs.push((self.kernel[[channel, k, i, j]], vec![k, r, c]));
                }
            }
        }
        pairs
    }

    pub(crate) fn validate(&self) -> Result<(), StructuralError> {
        for shape in [&self.input_size, &self.output_size] {
            if shape.rank() != 3 {
                return Err(StructuralError::Rank {
                    expected: 3,
                    found: shape.clone(),
                });
            }
        }
        let [stride_r, stride_c] = self.strides;
        if stride_r == 0 || stride_c == 0 {
            return Err(StructuralError::InvalidStride);
        }

        let [channels, rows, cols] = dims3(&self.input_size);
        let (out_channels, depth, kernel_rows, kernel_cols) = self.kernel.dim();
        let [pad_r, pad_c] = self.padding;

        let implied = (rows + 2 * pad_r)
            .checked_sub(kernel_rows)
            .zip((cols + 2 * pad_c).checked_sub(kernel_cols))
            .map(|(r, c)| [out_channels, r / stride_r + 1, c / stride_c + 1]);

        if depth != channels || implied != Some(dims3(&self.output_size)) {
            return Err(StructuralError::WeightShape {
                weights: self.kernel.shape().to_vec(),
                input: self.input_size.clone(),
                output: self.output_size.clone(),
            });
        }

        if let Some(biases) = &self.biases {
            if biases.len() != out_channels {
                return Err(StructuralError::BiasLength {
                    expected: out_channels,
                    found: biases.len(),
                });
            }
        }

        check_finite(self.kernel.iter().chain(self.biases.iter().flatten()))?;
        check_mapper(self.input_index_mapper.as_ref(), &self.input_size)
    }
}

fn dims3(shape: &Shape) -> [usize; 3] {
    match *shape.dims() {
        [d, r, c] => [d, r, c],
        _ => [0, 0, 0],
    }
}
