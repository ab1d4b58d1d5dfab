use std::fmt;

/// The dimensions of a layer's input or output tensor.
///
/// Indexes into a shape are tuples with one entry per dimension. Every
/// per-layer collection is stored flat, in row-major order of its shape, so
/// [`Shape::offset`] and [`Shape::index`] convert between the two views.
///
/// # Example
///
/// ```
/// use netform_core::Shape;
///
/// let shape = Shape::new([2, 3]);
/// assert_eq!(shape.size(), 6);
/// assert_eq!(shape.offset(&[1, 2]), Some(5));
/// assert_eq!(shape.index(4), Some(vec![1, 1]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-derive", serde(transparent))]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// Returns the dimension sizes.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Returns the total number of entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// Returns the size of the last dimension, if any.
    #[must_use]
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Returns the row-major flat offset of `index`.
    ///
    /// Returns `None` if the index has the wrong rank or is out of range.
    #[must_use]
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.0.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.0) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        Some(offset)
    }

    /// Returns the index tuple at a row-major flat offset.
    #[must_use]
    pub fn index(&self, offset: usize) -> Option<Vec<usize>> {
        if offset >= self.size() {
            return None;
        }
        let mut rest = offset;
        let mut index = vec![0; self.0.len()];
        for (slot, &dim) in index.iter_mut().zip(&self.0).rev() {
            *slot = rest % dim;
            rest /= dim;
        }
        Some(index)
    }

    /// Returns an iterator over every index tuple in row-major order.
    pub fn indexes(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        (0..self.size()).filter_map(|offset| self.index(offset))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
