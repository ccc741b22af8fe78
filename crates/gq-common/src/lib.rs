//! Shared foundations for the gsmp-quant workspace.
//!
//! This crate provides the types every other crate agrees on:
//! - Structured error handling with stable codes and recoverability hints
//! - Analysis settings with semantic validation

pub mod error;
pub mod settings;

pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use settings::{Settings, SettingsError, SolverKind};
