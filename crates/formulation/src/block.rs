//! The algebraic container a network is formulated into.
//!
//! A [`Block`] owns bounded variables and definitional equality constraints of
//! the form `var == expr`. Host models consume the block; without a solver,
//! [`Block::forward`] computes every defined variable from the fixed ones so a
//! formulation can be checked directly.

use std::collections::HashMap;

use netform_core::{Expr, Interval, VarId};
use thiserror::Error;

use crate::bounds::BoundTable;

/// A scalar decision variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    bounds: Option<Interval>,
    fixed: Option<f64>,
}

impl Variable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared bounds, or `None` if the variable is unbounded.
    #[must_use]
    pub fn bounds(&self) -> Option<Interval> {
        self.bounds
    }

    #[must_use]
    pub fn fixed(&self) -> Option<f64> {
        self.fixed
    }
}

/// The equality `var == expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    name: String,
    var: VarId,
    expr: Expr,
}

impl Constraint {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn var(&self) -> VarId {
        self.var
    }

    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Returns `value(var) - expr(value)`.
    pub fn residual(&self, value: &impl Fn(VarId) -> f64) -> f64 {
        value(self.var) - self.expr.evaluate(value)
    }
}

/// Errors raised by block bookkeeping and forward evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    #[error("variable {0} does not exist")]
    UnknownVariable(VarId),

    #[error("variable {0} is already defined by a constraint")]
    AlreadyDefined(VarId),

    #[error("variable {0} is neither fixed nor defined by a constraint")]
    Undetermined(VarId),

    #[error("the definition of variable {0} depends on itself")]
    Cyclic(VarId),

    #[error("expected {expected} values, found {found}")]
    ValueCount { expected: usize, found: usize },
}

/// Values for every variable of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment(Vec<f64>);

impl Assignment {
    #[must_use]
    pub fn value(&self, var: VarId) -> f64 {
        self.0.get(var.index()).copied().unwrap_or(f64::NAN)
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// A constraint or bound that an assignment fails to satisfy.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Constraint { name: String, residual: f64 },
    Bound { name: String, value: f64, bounds: Interval },
}

/// Variables and constraints produced by a formulation.
#[derive(Debug, Clone, Default)]
pub struct Block {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    definitions: HashMap<VarId, usize>,
}

impl Block {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable and returns its id.
    pub fn add_variable(&mut self, name: impl Into<String>, bounds: Option<Interval>) -> VarId {
        let var = VarId::new(self.variables.len());
        self.variables.push(Variable {
            name: name.into(),
            bounds,
            fixed: None,
        });
        var
    }

    /// Replaces the declared bounds of a variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable does not exist.
    pub fn set_bounds(&mut self, var: VarId, bounds: Option<Interval>) -> Result<(), BlockError> {
        self.variable_mut(var)?.bounds = bounds;
        Ok(())
    }

    /// Fixes a variable to a value, as a host model does before solving.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable does not exist.
    pub fn fix(&mut self, var: VarId, value: f64) -> Result<(), BlockError> {
        self.variable_mut(var)?.fixed = Some(value);
        Ok(())
    }

    /// Removes a fixed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable does not exist.
    pub fn unfix(&mut self, var: VarId) -> Result<(), BlockError> {
        self.variable_mut(var)?.fixed = None;
        Ok(())
    }

    /// Adds the constraint `var == expr`.
    ///
    /// # Errors
    ///
    /// Returns an error if `var` or a variable of `expr` does not exist, or if
    /// `var` is already defined by another constraint.
    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        var: VarId,
        expr: Expr,
    ) -> Result<(), BlockError> {
        self.variable(var)?;
        if let Some(&unknown) = expr
            .variables()
            .iter()
            .find(|v| v.index() >= self.variables.len())
        {
            return Err(BlockError::UnknownVariable(unknown));
        }
        if self.definitions.contains_key(&var) {
            return Err(BlockError::AlreadyDefined(var));
        }

        self.definitions.insert(var, self.constraints.len());
        self.constraints.push(Constraint {
            name: name.into(),
            var,
            expr,
        });
        Ok(())
    }

    /// Returns a variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable does not exist.
    pub fn variable(&self, var: VarId) -> Result<&Variable, BlockError> {
        self.variables
            .get(var.index())
            .ok_or(BlockError::UnknownVariable(var))
    }

    fn variable_mut(&mut self, var: VarId) -> Result<&mut Variable, BlockError> {
        self.variables
            .get_mut(var.index())
            .ok_or(BlockError::UnknownVariable(var))
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Returns the constraint defining `var`, if any.
    #[must_use]
    pub fn definition(&self, var: VarId) -> Option<&Constraint> {
        self.definitions.get(&var).map(|&i| &self.constraints[i])
    }

    /// Computes every variable from the fixed values and the constraints.
    ///
    /// `overrides` fix additional variables for this evaluation only. A fixed
    /// value takes precedence over a variable's defining constraint.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is neither fixed nor defined.
    pub fn forward(&self, overrides: &[(VarId, f64)]) -> Result<Assignment, BlockError> {
        let mut values: Vec<Option<f64>> = self.variables.iter().map(Variable::fixed).collect();
        for &(var, value) in overrides {
            *values
                .get_mut(var.index())
                .ok_or(BlockError::UnknownVariable(var))? = Some(value);
        }

        let mut visiting = vec![false; values.len()];
        for index in 0..values.len() {
            self.resolve(VarId::new(index), &mut values, &mut visiting)?;
        }

        Ok(Assignment(
            values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        ))
    }

    fn resolve(
        &self,
        var: VarId,
        values: &mut [Option<f64>],
        visiting: &mut [bool],
    ) -> Result<f64, BlockError> {
        if let Some(value) = values[var.index()] {
            return Ok(value);
        }
        let constraint = self.definition(var).ok_or(BlockError::Undetermined(var))?;
        if visiting[var.index()] {
            return Err(BlockError::Cyclic(var));
        }
        visiting[var.index()] = true;

        for dependency in constraint.expr.variables() {
            self.resolve(dependency, values, visiting)?;
        }
        let value = constraint
            .expr
            .evaluate(&|v| values[v.index()].unwrap_or(f64::NAN));

        values[var.index()] = Some(value);
        Ok(value)
    }

    /// Lists every constraint residual and bound exceeding `tolerance`.
    #[must_use]
    pub fn violations(&self, assignment: &Assignment, tolerance: f64) -> Vec<Violation> {
        let value = |var: VarId| assignment.value(var);

        let constraints = self.constraints.iter().filter_map(|c| {
            let residual = c.residual(&value);
            (residual.abs() > tolerance || residual.is_nan()).then(|| Violation::Constraint {
                name: c.name.clone(),
                residual,
            })
        });

        let bounds = self.variables.iter().enumerate().filter_map(|(i, v)| {
            let bounds = v.bounds?;
            let value = assignment.value(VarId::new(i));
            (!bounds.widen(tolerance).contains(value)).then(|| Violation::Bound {
                name: v.name.clone(),
                value,
                bounds,
            })
        });

        constraints.chain(bounds).collect()
    }
}

impl BoundTable for Block {
    fn bounds(&self, var: VarId) -> Option<Interval> {
        self.variables.get(var.index()).and_then(Variable::bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn forward_resolves_out_of_order_definitions() {
        let mut block = Block::new();
        let x = block.add_variable("x", None);
        let y = block.add_variable("y", None);
        let z = block.add_variable("z", None);

        // z is defined in terms of y before y is defined.
        block.add_constraint("z_def", z, Expr::var(y).affine(2.0, 1.0)).unwrap();
        block.add_constraint("y_def", y, Expr::var(x).affine(-1.0, 0.0)).unwrap();

        let assignment = block.forward(&[(x, 3.0)]).unwrap();

        assert_relative_eq!(assignment.value(y), -3.0);
        assert_relative_eq!(assignment.value(z), -5.0);
        assert!(block.violations(&assignment, 1e-12).is_empty());
    }

    #[test]
    fn free_variables_must_be_fixed() {
        let mut block = Block::new();
        let x = block.add_variable("x", None);
        let y = block.add_variable("y", None);
        block.add_constraint("y_def", y, Expr::var(x)).unwrap();

        assert_eq!(block.forward(&[]), Err(BlockError::Undetermined(x)));

        block.fix(x, 1.5).unwrap();
        assert_relative_eq!(block.forward(&[]).unwrap().value(y), 1.5);
    }

    #[test]
    fn rejects_second_definition_and_unknown_variables() {
        let mut block = Block::new();
        let x = block.add_variable("x", None);
        let y = block.add_variable("y", None);
        block.add_constraint("y_def", y, Expr::var(x)).unwrap();

        assert_eq!(
            block.add_constraint("y_again", y, Expr::constant(0.0)),
            Err(BlockError::AlreadyDefined(y))
        );
        assert_eq!(
            block.add_constraint("x_def", x, Expr::var(VarId::new(9))),
            Err(BlockError::UnknownVariable(VarId::new(9)))
        );
    }

    #[test]
    fn detects_self_referencing_definitions() {
        let mut block = Block::new();
        let x = block.add_variable("x", None);
        block.add_constraint("x_def", x, Expr::var(x).affine(1.0, 1.0)).unwrap();

        assert_eq!(block.forward(&[]), Err(BlockError::Cyclic(x)));
    }

    #[test]
    fn reports_bound_and_residual_violations() {
        let mut block = Block::new();
        let x = block.add_variable("x", Some(Interval::new(0.0, 1.0).unwrap()));
        let y = block.add_variable("y", None);
        block.add_constraint("y_def", y, Expr::var(x)).unwrap();

        // Fixing y overrides its definition, so the constraint is violated.
        let assignment = block.forward(&[(x, 2.0), (y, 0.0)]).unwrap();
        let violations = block.violations(&assignment, 1e-9);

        assert_eq!(violations.len(), 2);
        assert!(matches!(&violations[0], Violation::Constraint { name, .. } if name == "y_def"));
        assert!(matches!(&violations[1], Violation::Bound { name, .. } if name == "x"));
    }
}
