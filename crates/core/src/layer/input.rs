use crate::Shape;

/// The network's input layer.
///
/// It holds no weights. Its outputs are the (scaled) network inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct InputLayer {
    size: Shape,
}

impl InputLayer {
    pub fn new(size: impl Into<Shape>) -> Self {
        Self { size: size.into() }
    }

    #[must_use]
    pub fn size(&self) -> &Shape {
        &self.size
    }
}
