//! Analysis settings with semantic validation.
//!
//! The reduction engine is configured per run, not process-wide. Settings
//! are serializable so callers can persist and audit the exact parameters
//! a reduction ran with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings validation errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Inner DTMC reach-reward solver selection.
///
/// Gauss–Seidel is the reliability choice and the default; it is the only
/// method the κ-derivation stages use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    GaussSeidel,
    /// Plain Jacobi-style value iteration. Kept for cross-checking.
    Power,
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverKind::GaussSeidel => write!(f, "gauss_seidel"),
            SolverKind::Power => write!(f, "power"),
        }
    }
}

/// Settings for an ACTMC reduction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Termination criterion ε for downstream model checking.
    /// Must lie in the open interval (0, 0.5).
    pub termination_epsilon: f64,

    /// Whether to derive the per-potato precision κ adaptively.
    /// When false, `constant_kappa_decimal_digits` is used directly.
    pub compute_kappa: bool,

    /// Number of decimal digits d for the constant precision 10^(-d).
    /// Acts as the guaranteed minimum precision even when adaptive κ
    /// derivation is enabled. Must be at least 1.
    pub constant_kappa_decimal_digits: u32,

    /// Inner DTMC reach-reward solver used during κ derivation.
    pub solver: SolverKind,

    /// Iteration cap for the inner solver.
    pub max_solver_iterations: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            termination_epsilon: 1e-6,
            compute_kappa: true,
            constant_kappa_decimal_digits: 10,
            solver: SolverKind::GaussSeidel,
            max_solver_iterations: 100_000,
        }
    }
}

impl Settings {
    /// Validate the settings semantically.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.termination_epsilon.is_finite()
            || self.termination_epsilon <= 0.0
            || self.termination_epsilon >= 0.5
        {
            return Err(SettingsError::InvalidValue {
                field: "termination_epsilon",
                message: format!(
                    "must lie in (0, 0.5), got {}",
                    self.termination_epsilon
                ),
            });
        }
        if self.constant_kappa_decimal_digits < 1 {
            return Err(SettingsError::InvalidValue {
                field: "constant_kappa_decimal_digits",
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_solver_iterations == 0 {
            return Err(SettingsError::InvalidValue {
                field: "max_solver_iterations",
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
