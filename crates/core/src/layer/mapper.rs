use crate::{Shape, StructuralError};

/// Reshapes a predecessor's output into a layer's input.
///
/// The mapping preserves row-major flat offsets, which is how a flatten
/// between a convolutional and a dense layer behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexMapper {
    input_shape: Shape,
    output_shape: Shape,
}

impl IndexMapper {
    /// Creates a mapper from the predecessor's output shape (`input_shape`) to
    /// the consuming layer's input shape (`output_shape`).
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes have different sizes.
    pub fn new(
        input_shape: impl Into<Shape>,
        output_shape: impl Into<Shape>,
    ) -> Result<Self, StructuralError> {
        let mapper = Self {
            input_shape: input_shape.into(),
            output_shape: output_shape.into(),
        };
        mapper.validate()?;
        Ok(mapper)
    }

    pub(crate) fn validate(&self) -> Result<(), StructuralError> {
        if self.input_shape.size() == self.output_shape.size() {
            Ok(())
        } else {
            Err(StructuralError::IndexMapper {
                from: self.input_shape.clone(),
                to: self.output_shape.clone(),
            })
        }
    }

    /// The shape the predecessor produces.
    #[must_use]
    pub fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    /// The shape the consuming layer expects.
    #[must_use]
    pub fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    /// Maps an index of the consuming layer's input to the predecessor index.
    #[must_use]
    pub fn predecessor_index(&self, layer_input_index: &[usize]) -> Option<Vec<usize>> {
        let offset = self.output_shape.offset(layer_input_index)?;
        self.input_shape.index(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_by_row_major_offset() {
        let mapper = IndexMapper::new([2, 3, 3], [18]).unwrap();

        assert_eq!(mapper.predecessor_index(&[0]), Some(vec![0, 0, 0]));
        assert_eq!(mapper.predecessor_index(&[4]), Some(vec![0, 1, 1]));
        assert_eq!(mapper.predecessor_index(&[17]), Some(vec![1, 2, 2]));
        assert_eq!(mapper.predecessor_index(&[18]), None);
    }

    #[test]
    fn rejects_size_change() {
        assert!(matches!(
            IndexMapper::new([2, 3], [5]),
            Err(StructuralError::IndexMapper { .. })
        ));
    }
}
