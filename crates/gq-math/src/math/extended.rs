//! Extended-range floating point: (mantissa, decimal exponent) pairs.
//!
//! Intermediate Poisson and negative-binomial probabilities span thousands
//! of orders of magnitude, far beyond what a native double can hold. An
//! `ExtendedFloat` keeps an `f64` mantissa normalised into `[1, 10)` and a
//! separate decimal exponent, so products and quotients of astronomically
//! small terms stay exact in magnitude.

use crate::math::decimal::{BigDec, MathCtx};

/// A number `mantissa * 10^exponent` with `1 <= |mantissa| < 10` (or zero).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendedFloat {
    mantissa: f64,
    exponent: i64,
}

impl ExtendedFloat {
    pub const ZERO: ExtendedFloat = ExtendedFloat {
        mantissa: 0.0,
        exponent: 0,
    };

    /// Build from a native double. Non-finite input yields zero mantissa
    /// with a saturated exponent so comparisons stay sane.
    pub fn from_f64(x: f64) -> Self {
        if x == 0.0 || !x.is_finite() {
            return Self::ZERO;
        }
        let exponent = x.abs().log10().floor() as i64;
        let mantissa = x / 10f64.powi(exponent as i32);
        Self {
            mantissa,
            exponent,
        }
        .normalised()
    }

    /// Build `10^log10` from a base-10 logarithm, which may lie far
    /// outside the double range.
    pub fn from_log10(log10: f64) -> Self {
        if log10.is_nan() {
            return Self::ZERO;
        }
        if log10 == f64::NEG_INFINITY {
            return Self::ZERO;
        }
        let exponent = log10.floor() as i64;
        let mantissa = 10f64.powf(log10 - exponent as f64);
        Self { mantissa, exponent }.normalised()
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0.0
    }

    pub fn mantissa(&self) -> f64 {
        self.mantissa
    }

    pub fn exponent(&self) -> i64 {
        self.exponent
    }

    fn normalised(mut self) -> Self {
        if self.mantissa == 0.0 {
            return Self::ZERO;
        }
        while self.mantissa.abs() >= 10.0 {
            self.mantissa /= 10.0;
            self.exponent += 1;
        }
        while self.mantissa.abs() < 1.0 {
            self.mantissa *= 10.0;
            self.exponent -= 1;
        }
        self
    }

    pub fn mul(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::ZERO;
        }
        Self {
            mantissa: self.mantissa * other.mantissa,
            exponent: self.exponent + other.exponent,
        }
        .normalised()
    }

    /// Multiply by a plain double.
    pub fn scale(&self, factor: f64) -> Self {
        self.mul(&Self::from_f64(factor))
    }

    pub fn div(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::ZERO;
        }
        Self {
            mantissa: self.mantissa / other.mantissa,
            exponent: self.exponent - other.exponent,
        }
        .normalised()
    }

    /// Addition with exponent alignment. When the magnitudes differ by
    /// more than the double's decimal resolution, the larger operand wins
    /// outright.
    pub fn add(&self, other: &Self) -> Self {
        if self.is_zero() {
            return *other;
        }
        if other.is_zero() {
            return *self;
        }
        let (hi, lo) = if self.exponent >= other.exponent {
            (self, other)
        } else {
            (other, self)
        };
        let shift = hi.exponent - lo.exponent;
        if shift > 30 {
            return *hi;
        }
        Self {
            mantissa: hi.mantissa + lo.mantissa / 10f64.powi(shift as i32),
            exponent: hi.exponent,
        }
        .normalised()
    }

    /// Magnitude comparison of non-negative values.
    pub fn cmp_magnitude(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self.is_zero(), other.is_zero()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        match self.exponent.cmp(&other.exponent) {
            Ordering::Equal => self
                .mantissa
                .abs()
                .partial_cmp(&other.mantissa.abs())
                .unwrap_or(Ordering::Equal),
            ord => ord,
        }
    }

    /// Base-10 logarithm of the magnitude.
    pub fn log10(&self) -> f64 {
        if self.is_zero() {
            return f64::NEG_INFINITY;
        }
        self.exponent as f64 + self.mantissa.abs().log10()
    }

    /// Nearest double; saturates to 0 / infinity outside the range.
    pub fn to_f64(&self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        if self.exponent > 308 {
            return if self.mantissa > 0.0 {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            };
        }
        if self.exponent < -325 {
            return 0.0;
        }
        self.mantissa * 10f64.powi(self.exponent as i32)
    }

    /// Exact conversion into a decimal (mantissa expanded exactly).
    pub fn to_bigdec(&self, ctx: MathCtx) -> BigDec {
        if self.is_zero() {
            return BigDec::zero();
        }
        // Mantissa is finite by construction.
        let m = BigDec::from_f64(self.mantissa).unwrap_or_else(|_| BigDec::zero());
        let shift = if self.exponent >= 0 {
            BigDec::from_parts(num_bigint::BigInt::from(10u8).pow(self.exponent as u32), 0)
        } else {
            BigDec::allowed_error((-self.exponent) as u32)
        };
        m.mul(&shift).round(ctx)
    }
}
