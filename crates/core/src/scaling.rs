//! Affine transforms between a model's external variables and the units the
//! network was trained in.
//!
//! The network itself is formulated in scaled space. A [`Scaling`] maps the
//! block's external `inputs` into the scaled inputs of the input layer, and
//! the terminal layer's scaled outputs back to the external `outputs`.

use std::fmt::Debug;

use thiserror::Error;

use crate::{Expr, Interval};

/// A transform applied at the boundary of a network block.
///
/// A scaling covers a fixed number of input and output entries, and every
/// `index` passed to it is below the matching length. A network block
/// builder rejects a scaling whose lengths differ from the network's input
/// and output sizes.
pub trait Scaling: Debug + Send + Sync {
    /// The number of input entries this scaling covers.
    fn input_len(&self) -> usize;

    /// The number of output entries this scaling covers.
    fn output_len(&self) -> usize;

    /// Maps an external input expression into the network's scaled space.
    fn scale_input(&self, index: usize, input: &Expr) -> Expr;

    /// Maps a scaled network output expression back to external units.
    fn unscale_output(&self, index: usize, output: &Expr) -> Expr;

    /// Maps bounds on a scaled input back to bounds on the external input.
    fn unscale_input_bounds(&self, index: usize, bounds: Interval) -> Interval;
}

/// Scales each entry by `(x - offset) / factor`.
///
/// Inputs are scaled on the way in and outputs unscaled on the way out:
///
/// ```text
/// x_scaled = (x - offset_inputs[i]) / factor_inputs[i]
/// y        = y_scaled * factor_outputs[i] + offset_outputs[i]
/// ```
///
/// Deserialization goes through [`OffsetScaling::new`], so a deserialized
/// scaling is validated like a constructed one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-derive", serde(try_from = "OffsetScalingParameters"))]
pub struct OffsetScaling {
    offset_inputs: Vec<f64>,
    factor_inputs: Vec<f64>,
    offset_outputs: Vec<f64>,
    factor_outputs: Vec<f64>,
}

/// The unvalidated fields of a serialized [`OffsetScaling`].
#[cfg(feature = "serde-derive")]
#[derive(serde::Deserialize)]
struct OffsetScalingParameters {
    offset_inputs: Vec<f64>,
    factor_inputs: Vec<f64>,
    offset_outputs: Vec<f64>,
    factor_outputs: Vec<f64>,
}

#[cfg(feature = "serde-derive")]
impl TryFrom<OffsetScalingParameters> for OffsetScaling {
    type Error = ScalingError;

    fn try_from(p: OffsetScalingParameters) -> Result<Self, Self::Error> {
        Self::new(
            p.offset_inputs,
            p.factor_inputs,
            p.offset_outputs,
            p.factor_outputs,
        )
    }
}

/// Errors that can occur when constructing an [`OffsetScaling`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScalingError {
    #[error("{offsets} offsets were given for {factors} factors")]
    LengthMismatch { offsets: usize, factors: usize },

    #[error("scaling factor {0} must be finite and non-zero")]
    InvalidFactor(f64),

    #[error("scaling offset {0} must be finite")]
    InvalidOffset(f64),
}

impl OffsetScaling {
    /// Creates an offset scaling.
    ///
    /// # Errors
    ///
    /// Returns an error if the offsets and factors differ in length, if any
    /// offset is not finite, or if any factor is zero or not finite.
    pub fn new(
        offset_inputs: Vec<f64>,
        factor_inputs: Vec<f64>,
        offset_outputs: Vec<f64>,
        factor_outputs: Vec<f64>,
    ) -> Result<Self, ScalingError> {
        check(&offset_inputs, &factor_inputs)?;
        check(&offset_outputs, &factor_outputs)?;
        Ok(Self {
            offset_inputs,
            factor_inputs,
            offset_outputs,
            factor_outputs,
        })
    }

    /// Offset and factor of an input entry.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Scaling::input_len`].
    fn input(&self, index: usize) -> (f64, f64) {
        (self.offset_inputs[index], self.factor_inputs[index])
    }

    /// Offset and factor of an output entry.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Scaling::output_len`].
    fn output(&self, index: usize) -> (f64, f64) {
        (self.offset_outputs[index], self.factor_outputs[index])
    }
}

fn check(offsets: &[f64], factors: &[f64]) -> Result<(), ScalingError> {
    if offsets.len() != factors.len() {
        return Err(ScalingError::LengthMismatch {
            offsets: offsets.len(),
            factors: factors.len(),
        });
    }
    if let Some(&offset) = offsets.iter().find(|o| !o.is_finite()) {
        return Err(ScalingError::InvalidOffset(offset));
    }
    if let Some(&factor) = factors.iter().find(|f| !f.is_finite() || **f == 0.0) {
        return Err(ScalingError::InvalidFactor(factor));
    }
    Ok(())
}

impl Scaling for OffsetScaling {
    fn input_len(&self) -> usize {
        self.factor_inputs.len()
    }

    fn output_len(&self) -> usize {
        self.factor_outputs.len()
    }

    fn scale_input(&self, index: usize, input: &Expr) -> Expr {
        let (offset, factor) = self.input(index);
        input.affine(1.0 / factor, -offset / factor)
    }

    fn unscale_output(&self, index: usize, output: &Expr) -> Expr {
        let (offset, factor) = self.output(index);
        output.affine(factor, offset)
    }

    fn unscale_input_bounds(&self, index: usize, bounds: Interval) -> Interval {
        let (offset, factor) = self.input(index);
        bounds.scale(factor).shift(offset)
    }
}
