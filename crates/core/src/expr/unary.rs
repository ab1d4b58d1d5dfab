use std::fmt;

use crate::Interval;

/// Location of the global minimum of `silu(x) = x * sigmoid(x)`.
const SILU_ARGMIN: f64 = -1.278_464_542_761_074;

/// Global minimum value of `silu`, rounded down.
const SILU_MIN: f64 = -0.278_464_542_761_075;

/// A closed-form scalar function applied elementwise by an activation.
///
/// Every operation can be evaluated numerically with [`UnaryOp::apply`] and
/// knows the exact image of an interval under itself via [`UnaryOp::image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-derive", serde(rename_all = "lowercase"))]
pub enum UnaryOp {
    /// `max(0, x)`
    Relu,
    /// `1 / (1 + exp(-x))`
    Sigmoid,
    Tanh,
    /// `ln(1 + exp(x))`
    Softplus,
    /// `x * sigmoid(x)`, also known as swish.
    Silu,
    Exp,
}

impl UnaryOp {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softplus => "softplus",
            Self::Silu => "silu",
            Self::Exp => "exp",
        }
    }

    /// Evaluates the function at `x`.
    ///
    /// Infinite arguments evaluate to the function's limit.
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Relu => x.max(0.0),
            Self::Sigmoid => sigmoid(x),
            Self::Tanh => x.tanh(),
            Self::Softplus => x.max(0.0) + (-x.abs()).exp().ln_1p(),
            Self::Silu => {
                if x == f64::NEG_INFINITY {
                    0.0
                } else {
                    x * sigmoid(x)
                }
            }
            Self::Exp => x.exp(),
        }
    }

    /// Returns `true` if the function is nondecreasing on the whole real line.
    #[must_use]
    pub fn is_monotone(self) -> bool {
        !matches!(self, Self::Silu)
    }

    /// Returns the exact image of `input` under the function.
    ///
    /// Monotone functions map the endpoints. `Silu` decreases up to its global
    /// minimizer and increases after it, so an interval containing the
    /// minimizer is bounded below by the global minimum.
    #[must_use]
    pub fn image(self, input: Interval) -> Interval {
        let (lo, hi) = (self.apply(input.lower()), self.apply(input.upper()));

        let (lower, upper) = match self {
            Self::Silu if input.contains(SILU_ARGMIN) => (SILU_MIN, lo.max(hi)),
            Self::Silu if input.upper() < SILU_ARGMIN => (hi, lo),
            _ => (lo, hi),
        };

        // Endpoint images of a valid interval are ordered and never NaN, so
        // this falls back only on a broken invariant.
        Interval::new(lower, upper).unwrap_or(Interval::UNBOUNDED)
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
