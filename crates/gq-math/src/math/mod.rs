//! Core math modules.

pub mod decimal;
pub mod extended;
pub mod foxglynn;
pub mod stable;
