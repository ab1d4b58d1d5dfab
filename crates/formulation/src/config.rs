use std::fmt;

use thiserror::Error;

/// How a network is expressed as constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// One variable per pre-activation and activation value, linked by
    /// equality constraints.
    #[default]
    FullSpace,

    /// No intermediate variables: each output is a single nested expression
    /// of the inputs.
    ReducedSpace,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FullSpace => "full-space",
            Self::ReducedSpace => "reduced-space",
        })
    }
}

/// Configuration for formulating a network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    strategy: Strategy,
    bound_margin: f64,
}

/// Errors that can occur when validating a formulation config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bound_margin must be finite and non-negative")]
    BoundMargin,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(Strategy::FullSpace, 1e-9).unwrap()
    }
}

impl Config {
    /// Creates a new config with a validated bound margin.
    ///
    /// # Errors
    ///
    /// Returns an error if the margin is negative or non-finite.
    pub fn new(strategy: Strategy, bound_margin: f64) -> Result<Self, ConfigError> {
        if !bound_margin.is_finite() || bound_margin < 0.0 {
            return Err(ConfigError::BoundMargin);
        }

        Ok(Self {
            strategy,
            bound_margin,
        })
    }

    /// Returns a copy of this config using another strategy.
    #[must_use]
    pub fn with_strategy(self, strategy: Strategy) -> Self {
        Self { strategy, ..self }
    }

    /// Returns the formulation strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Returns the amount every propagated bound is widened by on each side.
    #[must_use]
    pub fn bound_margin(&self) -> f64 {
        self.bound_margin
    }
}
