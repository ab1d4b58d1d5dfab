use std::{fmt, ops::Add};

use thiserror::Error;

/// A closed interval `[lower, upper]` on the extended real line.
///
/// Endpoints may be infinite but never `NaN`, and `lower <= upper` always
/// holds. Intervals carry variable bounds and the results of bound
/// propagation.
///
/// # Example
///
/// ```
/// use netform_core::Interval;
///
/// let x = Interval::new(-1.0, 2.0).unwrap();
/// let scaled = x.scale(-3.0);
///
/// assert_eq!(scaled.lower(), -6.0);
/// assert_eq!(scaled.upper(), 3.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-derive", serde(try_from = "(f64, f64)", into = "(f64, f64)"))]
pub struct Interval {
    lower: f64,
    upper: f64,
}

/// Errors that can occur when constructing an [`Interval`].
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum IntervalError {
    #[error("interval endpoint is not a number")]
    NotANumber,

    #[error("lower bound {lower} exceeds upper bound {upper}")]
    Reversed { lower: f64, upper: f64 },
}

impl Interval {
    /// The interval containing every real number.
    pub const UNBOUNDED: Self = Self {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    /// Creates an interval from its endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is `NaN` or if `lower > upper`.
    pub fn new(lower: f64, upper: f64) -> Result<Self, IntervalError> {
        if lower.is_nan() || upper.is_nan() {
            return Err(IntervalError::NotANumber);
        }
        if lower > upper {
            return Err(IntervalError::Reversed { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// Creates the degenerate interval `[value, value]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is `NaN`.
    pub fn point(value: f64) -> Result<Self, IntervalError> {
        Self::new(value, value)
    }

    #[must_use]
    pub fn lower(&self) -> f64 {
        self.lower
    }

    #[must_use]
    pub fn upper(&self) -> f64 {
        self.upper
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Returns `true` if `other` lies entirely within this interval.
    #[must_use]
    pub fn encloses(&self, other: &Interval) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }

    /// Multiplies the interval by a scalar weight.
    ///
    /// A negative weight swaps the endpoints. A zero weight yields `[0, 0]`
    /// even for infinite endpoints.
    #[must_use]
    pub fn scale(&self, weight: f64) -> Self {
        if weight == 0.0 {
            return Self {
                lower: 0.0,
                upper: 0.0,
            };
        }
        if weight > 0.0 {
            Self {
                lower: weight * self.lower,
                upper: weight * self.upper,
            }
        } else {
            Self {
                lower: weight * self.upper,
                upper: weight * self.lower,
            }
        }
    }

    /// Translates both endpoints by `offset`.
    #[must_use]
    pub fn shift(&self, offset: f64) -> Self {
        Self {
            lower: self.lower + offset,
            upper: self.upper + offset,
        }
    }

    /// Moves both endpoints outward by a non-negative `margin`.
    #[must_use]
    pub fn widen(&self, margin: f64) -> Self {
        Self {
            lower: self.lower - margin,
            upper: self.upper + margin,
        }
    }

    /// Returns the smallest interval containing both intervals.
    #[must_use]
    pub fn hull(&self, other: &Interval) -> Self {
        Self {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }
}

/// Interval addition: `[a, b] + [c, d] = [a + c, b + d]`.
///
/// An endpoint where opposite infinities meet widens to infinity.
impl Add for Interval {
    type Output = Interval;

    fn add(self, rhs: Interval) -> Interval {
        let lower = self.lower + rhs.lower;
        let upper = self.upper + rhs.upper;
        Interval {
            lower: if lower.is_nan() { f64::NEG_INFINITY } else { lower },
            upper: if upper.is_nan() { f64::INFINITY } else { upper },
        }
    }
}

impl TryFrom<(f64, f64)> for Interval {
    type Error = IntervalError;

    fn try_from((lower, upper): (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(lower, upper)
    }
}

impl From<Interval> for (f64, f64) {
    fn from(interval: Interval) -> Self {
        (interval.lower, interval.upper)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}
