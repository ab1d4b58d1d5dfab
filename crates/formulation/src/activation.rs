//! Pluggable activation formulations.
//!
//! Each activation tag maps to an [`ActivationBuilder`] holding up to two
//! forms of the function:
//!
//! - an expression form, which wraps `zhat` in a closed-form expression and is
//!   all the reduced-space formulation can use, and
//! - a constraint form, which may add variables and constraints to the block
//!   and returns the expression standing for `z`.
//!
//! When a builder has no constraint form, the full-space formulation adds a
//! bounded variable `z` and the constraint `z == f(zhat)`.

use std::collections::HashMap;

use netform_core::{Expr, LINEAR, UnaryOp};
use thiserror::Error;

use crate::{Block, FormulationError, Strategy, bounds::propagate};

/// Wraps a pre-activation expression in the activation function.
pub type ExpressionFn = fn(&Expr) -> Expr;

/// Formulates an activation in a block and returns the expression for `z`.
pub type ConstraintFn =
    fn(&mut Block, &ActivationContext<'_>) -> Result<Expr, FormulationError>;

/// What a constraint formulation receives for one activation output.
#[derive(Debug, Clone, Copy)]
pub struct ActivationContext<'a> {
    /// Name for the activation's output variable.
    pub name: &'a str,

    /// The pre-activation expression `zhat`.
    pub zhat: &'a Expr,

    /// Margin to widen propagated bounds by.
    pub bound_margin: f64,
}

/// The registered forms of one activation.
#[derive(Debug, Clone, Copy)]
pub struct ActivationBuilder {
    expression: Option<ExpressionFn>,
    constraints: Option<ConstraintFn>,
}

/// Errors that can occur when registering an activation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("an activation needs an expression form or a constraint form")]
    NoForm,

    #[error("activation names must not be empty")]
    EmptyName,
}

impl ActivationBuilder {
    /// Creates a builder from either or both forms.
    ///
    /// # Errors
    ///
    /// Returns an error if neither form is given.
    pub fn new(
        expression: Option<ExpressionFn>,
        constraints: Option<ConstraintFn>,
    ) -> Result<Self, RegistryError> {
        if expression.is_none() && constraints.is_none() {
            return Err(RegistryError::NoForm);
        }
        Ok(Self {
            expression,
            constraints,
        })
    }

    /// A builder usable by both strategies.
    #[must_use]
    pub fn from_expression(expression: ExpressionFn) -> Self {
        Self {
            expression: Some(expression),
            constraints: None,
        }
    }

    /// A builder usable only by the full-space strategy.
    #[must_use]
    pub fn from_constraints(constraints: ConstraintFn) -> Self {
        Self {
            expression: None,
            constraints: Some(constraints),
        }
    }

    #[must_use]
    pub fn supports(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::FullSpace => true,
            Strategy::ReducedSpace => self.expression.is_some(),
        }
    }

    /// Returns the closed-form expression for `z`, if this builder has one.
    #[must_use]
    pub fn reduced_space(&self, zhat: &Expr) -> Option<Expr> {
        self.expression.map(|f| f(zhat))
    }

    /// Formulates `z` in the block.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be bounded.
    pub fn full_space(
        &self,
        block: &mut Block,
        context: &ActivationContext<'_>,
    ) -> Result<Expr, FormulationError> {
        match (self.constraints, self.expression) {
            (Some(constraints), _) => constraints(block, context),
            (None, Some(expression)) => smooth(block, context, expression(context.zhat)),
            // Construction requires at least one form.
            (None, None) => Err(RegistryError::NoForm.into()),
        }
    }
}

/// Adds `z` bounded by the propagated image of `zhat`, and `z == expr`.
fn smooth(
    block: &mut Block,
    context: &ActivationContext<'_>,
    expr: Expr,
) -> Result<Expr, FormulationError> {
    let bounds = propagate(&expr, &*block)
        .map_err(FormulationError::bounds(context.name))?
        .widen(context.bound_margin);

    let z = block.add_variable(context.name, Some(bounds));
    block.add_constraint(format!("{}.activation", context.name), z, expr)?;
    Ok(Expr::var(z))
}

/// Activation builders keyed by activation tag.
#[derive(Debug, Clone)]
pub struct ActivationRegistry {
    builders: HashMap<String, ActivationBuilder>,
}

impl Default for ActivationRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (name, builder) in builtins() {
            registry.builders.insert(name.to_owned(), builder);
        }
        registry
    }
}

impl ActivationRegistry {
    /// Creates a registry with no activations, not even `linear`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registers a builder, replacing any earlier one with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: ActivationBuilder,
    ) -> Result<Option<ActivationBuilder>, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        Ok(self.builders.insert(name, builder))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActivationBuilder> {
        self.builders.get(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn builtins() -> [(&'static str, ActivationBuilder); 8] {
    let identity = ActivationBuilder {
        expression: Some(Expr::clone),
        constraints: Some(identity_constraints),
    };
    let silu = ActivationBuilder::from_expression(|zhat| zhat.apply(UnaryOp::Silu));

    [
        (LINEAR, identity),
        ("identity", identity),
        ("relu", ActivationBuilder::from_expression(|zhat| zhat.apply(UnaryOp::Relu))),
        ("sigmoid", ActivationBuilder::from_expression(|zhat| zhat.apply(UnaryOp::Sigmoid))),
        ("tanh", ActivationBuilder::from_expression(|zhat| zhat.apply(UnaryOp::Tanh))),
        ("softplus", ActivationBuilder::from_expression(|zhat| zhat.apply(UnaryOp::Softplus))),
        ("silu", silu),
        ("swish", silu),
    ]
}

/// `z` is `zhat` itself, so no variable or constraint is added.
fn identity_constraints(
    _block: &mut Block,
    context: &ActivationContext<'_>,
) -> Result<Expr, FormulationError> {
    Ok(context.zhat.clone())
}
