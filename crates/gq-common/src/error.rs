//! Error types for gsmp-quant.
//!
//! Structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints so callers know when widening precision and
//!   retrying is worthwhile
//!
//! Numeric errors carry enough context (event identifier, entrance state,
//! the κ in effect) for a caller to widen precision and retry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for gsmp-quant operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed models: alarm overlap, bad distribution parameters,
    /// empty active sets, non-stochastic rows.
    Model,
    /// Distribution families the reduction path cannot handle.
    Distribution,
    /// Numerical failures in Fox–Glynn or transient analysis.
    Numeric,
    /// Inner DTMC solver failures.
    Solver,
    /// Settings validation failures.
    Settings,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Model => write!(f, "model"),
            ErrorCategory::Distribution => write!(f, "distribution"),
            ErrorCategory::Numeric => write!(f, "numeric"),
            ErrorCategory::Solver => write!(f, "solver"),
            ErrorCategory::Settings => write!(f, "settings"),
        }
    }
}

/// Unified error type for gsmp-quant.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Model errors (10-19)
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("event {event}: more than one non-exponential event active in state {state}")]
    AlarmOverlap { event: String, state: usize },

    #[error("event {event}: {message}")]
    InvalidDistributionParameters { event: String, message: String },

    #[error("event {event}: active set is empty")]
    EmptyActiveSet { event: String },

    // Distribution errors (20-29)
    #[error("event {event}: {family} distribution is not supported by the reduction")]
    UnsupportedDistribution { event: String, family: String },

    #[error("event {event}: exponential events are ordinary CTMC transitions, not alarms")]
    InvalidPotatoDistribution { event: String },

    // Numeric errors (30-39)
    #[error(
        "Fox-Glynn overflow for event {event}: rate {rate} exceeded the overflow \
         guard before the tail fell below kappa {kappa}"
    )]
    NumericOverflow {
        event: String,
        rate: f64,
        kappa: String,
    },

    #[error("numerical failure for event {event}, entrance {entrance}: {message}")]
    NumericFailure {
        event: String,
        entrance: usize,
        message: String,
    },

    // Solver errors (40-49)
    #[error("reach-reward solver failed to converge within {iterations} iterations")]
    Unsolvable { iterations: usize },

    #[error("computation cancelled at an iteration boundary")]
    Interrupted,

    // Settings errors (50-59)
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl Error {
    /// Returns the stable error code for this error.
    ///
    /// Codes are grouped by category:
    /// - 10-19: Model errors
    /// - 20-29: Distribution errors
    /// - 30-39: Numeric errors
    /// - 40-49: Solver errors
    /// - 50-59: Settings errors
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidModel(_) => 10,
            Error::AlarmOverlap { .. } => 11,
            Error::InvalidDistributionParameters { .. } => 12,
            Error::EmptyActiveSet { .. } => 13,
            Error::UnsupportedDistribution { .. } => 20,
            Error::InvalidPotatoDistribution { .. } => 21,
            Error::NumericOverflow { .. } => 30,
            Error::NumericFailure { .. } => 31,
            Error::Unsolvable { .. } => 40,
            Error::Interrupted => 41,
            Error::InvalidSettings(_) => 50,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidModel(_)
            | Error::AlarmOverlap { .. }
            | Error::InvalidDistributionParameters { .. }
            | Error::EmptyActiveSet { .. } => ErrorCategory::Model,

            Error::UnsupportedDistribution { .. } | Error::InvalidPotatoDistribution { .. } => {
                ErrorCategory::Distribution
            }

            Error::NumericOverflow { .. } | Error::NumericFailure { .. } => ErrorCategory::Numeric,

            Error::Unsolvable { .. } | Error::Interrupted => ErrorCategory::Solver,

            Error::InvalidSettings(_) => ErrorCategory::Settings,
        }
    }

    /// Returns whether the error is potentially recoverable.
    ///
    /// Construction-time model and distribution errors are fatal to the
    /// reduction attempt. Numeric and solver errors may be resolved by
    /// widening precision or loosening the termination criterion and
    /// retrying.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::InvalidModel(_)
            | Error::AlarmOverlap { .. }
            | Error::InvalidDistributionParameters { .. }
            | Error::EmptyActiveSet { .. } => false,

            Error::UnsupportedDistribution { .. } | Error::InvalidPotatoDistribution { .. } => {
                false
            }

            Error::NumericOverflow { .. } | Error::NumericFailure { .. } => true,

            Error::Unsolvable { .. } => true,
            Error::Interrupted => true,

            Error::InvalidSettings(_) => false,
        }
    }

    /// Returns the offending identifier (event id) if the error carries one.
    pub fn offending_event(&self) -> Option<&str> {
        match self {
            Error::AlarmOverlap { event, .. }
            | Error::InvalidDistributionParameters { event, .. }
            | Error::EmptyActiveSet { event }
            | Error::UnsupportedDistribution { event, .. }
            | Error::InvalidPotatoDistribution { event }
            | Error::NumericOverflow { event, .. }
            | Error::NumericFailure { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Structured error response for machine-parseable reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (event id, state index, kappa).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::AlarmOverlap { event, state } => {
                context.insert("event".to_string(), serde_json::json!(event));
                context.insert("state".to_string(), serde_json::json!(state));
            }
            Error::InvalidDistributionParameters { event, .. }
            | Error::EmptyActiveSet { event }
            | Error::UnsupportedDistribution { event, .. }
            | Error::InvalidPotatoDistribution { event } => {
                context.insert("event".to_string(), serde_json::json!(event));
            }
            Error::NumericOverflow { event, rate, kappa } => {
                context.insert("event".to_string(), serde_json::json!(event));
                context.insert("rate".to_string(), serde_json::json!(rate));
                context.insert("kappa".to_string(), serde_json::json!(kappa));
            }
            Error::NumericFailure {
                event, entrance, ..
            } => {
                context.insert("event".to_string(), serde_json::json!(event));
                context.insert("entrance".to_string(), serde_json::json!(entrance));
            }
            Error::Unsolvable { iterations } => {
                context.insert("iterations".to_string(), serde_json::json!(iterations));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::InvalidModel("x".into()).code(), 10);
        assert_eq!(
            Error::InvalidPotatoDistribution {
                event: "e".into()
            }
            .code(),
            21
        );
        assert_eq!(Error::Unsolvable { iterations: 5 }.code(), 40);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::AlarmOverlap {
                event: "e".into(),
                state: 3
            }
            .category(),
            ErrorCategory::Model
        );
        assert_eq!(
            Error::NumericOverflow {
                event: "e".into(),
                rate: 12.0,
                kappa: "1e-20".into()
            }
            .category(),
            ErrorCategory::Numeric
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(!Error::EmptyActiveSet { event: "e".into() }.is_recoverable());
        assert!(Error::NumericOverflow {
            event: "e".into(),
            rate: 12.0,
            kappa: "1e-20".into()
        }
        .is_recoverable());
        assert!(Error::Unsolvable { iterations: 1000 }.is_recoverable());
    }

    #[test]
    fn test_offending_event() {
        let err = Error::NumericFailure {
            event: "producer".into(),
            entrance: 4,
            message: "negative mass".into(),
        };
        assert_eq!(err.offending_event(), Some("producer"));
        assert_eq!(Error::InvalidModel("x".into()).offending_event(), None);
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::NumericOverflow {
            event: "timeout".into(),
            rate: 2048.0,
            kappa: "1e-30".into(),
        };
        let structured = StructuredError::from(&err);
        let json = structured.to_json();

        assert!(json.contains(r#""code":30"#));
        assert!(json.contains(r#""category":"numeric""#));
        assert!(json.contains(r#""recoverable":true"#));
        assert!(json.contains(r#""event":"timeout""#));
    }
}
