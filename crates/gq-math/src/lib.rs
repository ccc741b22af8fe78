//! gsmp-quant numerical kernels.

pub mod math;

pub use math::decimal::{BigDec, DecimalError, MathCtx, Rounding};
pub use math::extended::ExtendedFloat;
pub use math::foxglynn::{FoxGlynn, FoxGlynnError};
pub use math::stable::*;
