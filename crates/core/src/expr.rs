//! Symbolic algebraic expressions over block variables.
//!
//! An [`Expr`] is the unit exchanged between layers during formulation. The
//! full-space strategy builds expressions only to state equality constraints,
//! while the reduced-space strategy nests them layer after layer. Nested
//! expressions share their sub-trees through [`Arc`], so a downstream layer
//! holds a reference to its predecessor's expression rather than a copy.

mod unary;

use std::{collections::BTreeSet, fmt, sync::Arc};

pub use unary::UnaryOp;

/// Handle for a variable owned by a formulation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the position of the variable in its block.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// An algebraic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(f64),
    Var(VarId),
    Linear(Arc<Linear>),
    Unary(UnaryOp, Arc<Expr>),
}

/// A weighted sum of expressions plus a constant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Linear {
    terms: Vec<(f64, Expr)>,
    constant: f64,
}

impl Linear {
    #[must_use]
    pub fn terms(&self) -> &[(f64, Expr)] {
        &self.terms
    }

    #[must_use]
    pub fn constant(&self) -> f64 {
        self.constant
    }
}

impl Expr {
    #[must_use]
    pub fn var(var: VarId) -> Self {
        Self::Var(var)
    }

    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self::Constant(value)
    }

    /// Builds `sum(coefficient * expr) + constant`.
    pub fn linear(terms: impl IntoIterator<Item = (f64, Expr)>, constant: f64) -> Self {
        Self::Linear(Arc::new(Linear {
            terms: terms.into_iter().collect(),
            constant,
        }))
    }

    /// Builds `factor * self + offset`.
    #[must_use]
    pub fn affine(&self, factor: f64, offset: f64) -> Self {
        Self::linear([(factor, self.clone())], offset)
    }

    /// Wraps this expression in a unary operation.
    #[must_use]
    pub fn apply(&self, op: UnaryOp) -> Self {
        Self::Unary(op, Arc::new(self.clone()))
    }

    /// Returns the variable if this expression is a bare variable.
    #[must_use]
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Self::Var(var) => Some(*var),
            _ => None,
        }
    }

    /// Evaluates the expression with a value for each variable.
    pub fn evaluate(&self, value: &impl Fn(VarId) -> f64) -> f64 {
        match self {
            Self::Constant(c) => *c,
            Self::Var(var) => value(*var),
            Self::Linear(linear) => linear
                .terms
                .iter()
                .fold(linear.constant, |acc, (w, expr)| {
                    acc + w * expr.evaluate(value)
                }),
            Self::Unary(op, inner) => op.apply(inner.evaluate(value)),
        }
    }

    /// Returns every variable referenced by the expression.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<VarId> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<VarId>) {
        match self {
            Self::Constant(_) => {}
            Self::Var(var) => {
                vars.insert(*var);
            }
            Self::Linear(linear) => {
                for (_, expr) in &linear.terms {
                    expr.collect_variables(vars);
                }
            }
            Self::Unary(_, inner) => inner.collect_variables(vars),
        }
    }

    /// Returns the height of the expression tree.
    ///
    /// Constants and variables have depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Constant(_) | Self::Var(_) => 1,
            Self::Linear(linear) => {
                1 + linear
                    .terms
                    .iter()
                    .map(|(_, expr)| expr.depth())
                    .max()
                    .unwrap_or(0)
            }
            Self::Unary(_, inner) => 1 + inner.depth(),
        }
    }
}

impl From<VarId> for Expr {
    fn from(var: VarId) -> Self {
        Self::Var(var)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(c) => write!(f, "{c}"),
            Self::Var(var) => write!(f, "{var}"),
            Self::Linear(linear) => {
                write!(f, "(")?;
                for (w, expr) in &linear.terms {
                    write!(f, "{w}*{expr} + ")?;
                }
                write!(f, "{})", linear.constant)
            }
            Self::Unary(op, inner) => write!(f, "{op}({inner})"),
        }
    }
}
