//! Interval bound propagation through expressions.

use std::collections::HashMap;

use netform_core::{Expr, Interval, IntervalError, VarId};
use thiserror::Error;

/// A source of declared variable bounds.
pub trait BoundTable {
    /// Returns the bounds of `var`, or `None` if it has none.
    fn bounds(&self, var: VarId) -> Option<Interval>;
}

impl BoundTable for HashMap<VarId, Interval> {
    fn bounds(&self, var: VarId) -> Option<Interval> {
        self.get(&var).copied()
    }
}

/// Errors that can occur while propagating bounds.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BoundError {
    #[error("variable {0} has no declared bounds")]
    Unbounded(VarId),

    #[error(transparent)]
    Interval(#[from] IntervalError),
}

/// Computes an interval enclosing every value `expr` can take when each
/// variable ranges over its declared bounds.
///
/// Linear nodes sum the sign-aware scaling of each term's interval and shift
/// by the constant. Unary nodes map their argument through the function's
/// image. The result is exact for expressions in which no variable appears
/// twice, and an over-approximation otherwise.
///
/// # Errors
///
/// Returns [`BoundError::Unbounded`] if a referenced variable has no bounds.
pub fn propagate<T>(expr: &Expr, table: &T) -> Result<Interval, BoundError>
where
    T: BoundTable + ?Sized,
{
    match expr {
        Expr::Constant(c) => Ok(Interval::point(*c)?),
        Expr::Var(var) => table.bounds(*var).ok_or(BoundError::Unbounded(*var)),
        Expr::Linear(linear) => {
            let mut sum = Interval::point(0.0)?;
            for (weight, term) in linear.terms() {
                sum = sum + propagate(term, table)?.scale(*weight);
            }
            Ok(sum.shift(linear.constant()))
        }
        Expr::Unary(op, inner) => Ok(op.image(propagate(inner, table)?)),
    }
}
