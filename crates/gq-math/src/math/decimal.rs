//! Arbitrary-precision decimal arithmetic.
//!
//! `BigDec` is an exact decimal: a signed arbitrary-precision integer
//! scaled by a power of ten. Addition, subtraction and multiplication are
//! exact; division and the transcendental operations take an explicit
//! [`MathCtx`] carrying the precision (significant digits) and rounding
//! mode. Anywhere a result must be auditable against a κ error bound,
//! this type is used instead of `f64`.
//!
//! # Rounding
//!
//! Every operation that takes a precision rounds half-up unless the
//! context says otherwise. Half-up is the mode the error-bound
//! derivations assume.

use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, Zero};
use std::cmp::Ordering;
use thiserror::Error;

/// Errors from decimal operations.
#[derive(Debug, Error, PartialEq)]
pub enum DecimalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("operand outside the domain of {op}: {value}")]
    InvalidOperand { op: &'static str, value: String },
    #[error("cannot convert non-finite float {0}")]
    NonFinite(f64),
}

/// Rounding mode for precision-bounded operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rounding {
    /// Round away from zero when the discarded fraction is >= 1/2.
    #[default]
    HalfUp,
    /// Truncate toward zero.
    Down,
}

/// Precision context: significant digits plus rounding mode.
///
/// Threaded per-operation; there is no process-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MathCtx {
    pub digits: u32,
    pub rounding: Rounding,
}

impl MathCtx {
    /// Half-up context with the given number of significant digits.
    pub fn half_up(digits: u32) -> Self {
        Self {
            digits: digits.max(1),
            rounding: Rounding::HalfUp,
        }
    }
}

/// Arbitrary-precision decimal: `unscaled * 10^(-scale)`.
#[derive(Debug, Clone)]
pub struct BigDec {
    unscaled: BigInt,
    scale: i64,
}

impl BigDec {
    pub fn zero() -> Self {
        Self {
            unscaled: BigInt::zero(),
            scale: 0,
        }
    }

    pub fn one() -> Self {
        Self {
            unscaled: BigInt::one(),
            scale: 0,
        }
    }

    pub fn from_int(v: i64) -> Self {
        Self {
            unscaled: BigInt::from(v),
            scale: 0,
        }
    }

    /// Construct `unscaled * 10^(-scale)` directly.
    pub fn from_parts(unscaled: BigInt, scale: i64) -> Self {
        Self { unscaled, scale }
    }

    /// Exact conversion from a finite `f64`.
    ///
    /// The binary fraction is expanded exactly into decimal form, the same
    /// way the full-expansion decimal constructor of the reference
    /// arithmetic behaves; no rounding occurs.
    pub fn from_f64(x: f64) -> Result<Self, DecimalError> {
        if !x.is_finite() {
            return Err(DecimalError::NonFinite(x));
        }
        if x == 0.0 {
            return Ok(Self::zero());
        }
        let bits = x.to_bits();
        let negative = bits >> 63 == 1;
        let exp_bits = ((bits >> 52) & 0x7ff) as i64;
        let frac = bits & ((1u64 << 52) - 1);
        let (mantissa, exp2) = if exp_bits == 0 {
            (frac, -1074i64)
        } else {
            (frac | (1u64 << 52), exp_bits - 1075)
        };
        let mut unscaled = BigInt::from(mantissa);
        let scale;
        if exp2 >= 0 {
            unscaled = unscaled << (exp2 as usize);
            scale = 0;
        } else {
            // m * 2^exp2 = m * 5^(-exp2) * 10^(exp2)
            unscaled *= BigInt::from(5u8).pow((-exp2) as u32);
            scale = -exp2;
        }
        if negative {
            unscaled = -unscaled;
        }
        Ok(Self { unscaled, scale })
    }

    /// The decimal `10^(-digits)`: the allowed error for a precision of
    /// `digits` decimal digits.
    pub fn allowed_error(digits: u32) -> Self {
        Self {
            unscaled: BigInt::one(),
            scale: digits as i64,
        }
    }

    /// Number of decimal digits required to represent this value to unit
    /// precision: the scale after stripping trailing zeros, floored at 0.
    ///
    /// `allowed_error(d).decimal_digits() == d`.
    pub fn decimal_digits(&self) -> u32 {
        let stripped = self.stripped();
        stripped.scale.max(0) as u32
    }

    pub fn is_zero(&self) -> bool {
        self.unscaled.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.unscaled.is_negative()
    }

    pub fn abs(&self) -> Self {
        Self {
            unscaled: self.unscaled.abs(),
            scale: self.scale,
        }
    }

    pub fn neg(&self) -> Self {
        Self {
            unscaled: -self.unscaled.clone(),
            scale: self.scale,
        }
    }

    /// Number of significant decimal digits in the unscaled value.
    fn precision_digits(&self) -> u64 {
        if self.unscaled.is_zero() {
            return 1;
        }
        let (_, digits) = self.unscaled.to_radix_le(10);
        digits.len() as u64
    }

    /// Floor of log10(|self|), approximately. Exact for powers of ten.
    pub fn approx_log10(&self) -> i64 {
        if self.is_zero() {
            return i64::MIN / 2;
        }
        self.precision_digits() as i64 - 1 - self.scale
    }

    fn stripped(&self) -> Self {
        if self.unscaled.is_zero() {
            return Self::zero();
        }
        let ten = BigInt::from(10u8);
        let mut unscaled = self.unscaled.clone();
        let mut scale = self.scale;
        loop {
            let (q, r) = (&unscaled / &ten, &unscaled % &ten);
            if r.is_zero() {
                unscaled = q;
                scale -= 1;
            } else {
                break;
            }
        }
        Self { unscaled, scale }
    }

    fn pow10(exp: u64) -> BigInt {
        BigInt::from(10u8).pow(exp as u32)
    }

    /// Align two values to a common scale.
    fn align(&self, other: &Self) -> (BigInt, BigInt, i64) {
        let scale = self.scale.max(other.scale);
        let a = &self.unscaled * Self::pow10((scale - self.scale) as u64);
        let b = &other.unscaled * Self::pow10((scale - other.scale) as u64);
        (a, b, scale)
    }

    /// Exact addition.
    pub fn add(&self, other: &Self) -> Self {
        let (a, b, scale) = self.align(other);
        Self {
            unscaled: a + b,
            scale,
        }
    }

    /// Exact subtraction.
    pub fn sub(&self, other: &Self) -> Self {
        let (a, b, scale) = self.align(other);
        Self {
            unscaled: a - b,
            scale,
        }
    }

    /// Exact multiplication.
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            unscaled: &self.unscaled * &other.unscaled,
            scale: self.scale + other.scale,
        }
    }

    /// Round to the context's number of significant digits.
    pub fn round(&self, ctx: MathCtx) -> Self {
        let prec = self.precision_digits();
        if prec <= ctx.digits as u64 || self.unscaled.is_zero() {
            return self.clone();
        }
        let drop = prec - ctx.digits as u64;
        let divisor = Self::pow10(drop);
        let (mut q, r) = (
            &self.unscaled / &divisor,
            &self.unscaled % &divisor,
        );
        if ctx.rounding == Rounding::HalfUp && r.abs() * BigInt::from(2u8) >= divisor {
            if self.unscaled.is_negative() {
                q -= BigInt::one();
            } else {
                q += BigInt::one();
            }
        }
        Self {
            unscaled: q,
            scale: self.scale - drop as i64,
        }
    }

    /// Division rounded to the context's precision.
    pub fn div(&self, other: &Self, ctx: MathCtx) -> Result<Self, DecimalError> {
        if other.is_zero() {
            return Err(DecimalError::DivisionByZero);
        }
        if self.is_zero() {
            return Ok(Self::zero());
        }
        // Shift the numerator so the integer quotient carries one guard
        // digit beyond the requested precision.
        let shift = ctx.digits as i64 + 1 + other.precision_digits() as i64
            - self.precision_digits() as i64;
        let shift = shift.max(0) as u64;
        let num = &self.unscaled * Self::pow10(shift);
        let (mut q, r) = (&num / &other.unscaled, &num % &other.unscaled);
        if ctx.rounding == Rounding::HalfUp
            && r.abs() * BigInt::from(2u8) >= other.unscaled.abs()
        {
            let negative = (num.sign() == Sign::Minus) ^ (other.unscaled.sign() == Sign::Minus);
            if negative {
                q -= BigInt::one();
            } else {
                q += BigInt::one();
            }
        }
        let out = Self {
            unscaled: q,
            scale: self.scale - other.scale + shift as i64,
        };
        Ok(out.round(ctx))
    }

    /// Integer power by repeated squaring, rounding intermediates to a
    /// guarded working precision.
    pub fn pow_int(&self, mut exp: u64, ctx: MathCtx) -> Self {
        let wp = MathCtx {
            digits: ctx.digits + 10,
            rounding: ctx.rounding,
        };
        let mut base = self.round(wp);
        let mut acc = Self::one();
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc.mul(&base).round(wp);
            }
            base = base.mul(&base).round(wp);
            exp >>= 1;
        }
        acc.round(ctx)
    }

    /// Square root by Newton iteration.
    pub fn sqrt(&self, ctx: MathCtx) -> Result<Self, DecimalError> {
        if self.is_zero() {
            return Ok(Self::zero());
        }
        if self.is_negative() {
            return Err(DecimalError::InvalidOperand {
                op: "sqrt",
                value: self.to_string(),
            });
        }
        let wp = MathCtx {
            digits: ctx.digits + 10,
            rounding: Rounding::HalfUp,
        };
        // Seed from the magnitude; f64 seed when representable.
        let seed = self.to_f64();
        let mut y = if seed.is_finite() && seed > 0.0 {
            Self::from_f64(seed.sqrt())?
        } else {
            let half_log = self.approx_log10() / 2;
            if half_log >= 0 {
                Self::from_parts(Self::pow10(half_log as u64), 0)
            } else {
                Self::from_parts(BigInt::one(), -half_log)
            }
        };
        let half = Self::from_parts(BigInt::from(5u8), 1);
        // Newton converges quadratically; the iteration cap covers the
        // worst-case seed.
        for _ in 0..64 {
            let next = y.add(&self.div(&y, wp)?).mul(&half).round(wp);
            if next.cmp_value(&y) == Ordering::Equal {
                break;
            }
            y = next;
        }
        Ok(y.round(ctx))
    }

    /// Natural exponential.
    pub fn exp(&self, ctx: MathCtx) -> Result<Self, DecimalError> {
        let wp = MathCtx::half_up(ctx.digits + 15);
        if self.is_zero() {
            return Ok(Self::one());
        }
        // Argument reduction: e^x = (e^(x/2^k))^(2^k) with |x/2^k| < 1/8.
        let mag = self.approx_log10();
        let mut k: u32 = if mag >= 0 {
            ((mag + 1) as u32) * 4 + 3
        } else {
            3
        };
        k = k.min(64);
        let two = Self::from_int(2);
        let reduced = self.div(&two.pow_int(k as u64, wp), wp)?;

        // Taylor series around zero.
        let mut term = Self::one();
        let mut sum = Self::one();
        let threshold = Self::allowed_error(ctx.digits + 10);
        for i in 1..10_000u64 {
            term = term
                .mul(&reduced)
                .div(&Self::from_int(i as i64), wp)?;
            sum = sum.add(&term).round(wp);
            if term.abs().cmp_value(&threshold) == Ordering::Less {
                break;
            }
        }
        for _ in 0..k {
            sum = sum.mul(&sum).round(wp);
        }
        Ok(sum.round(ctx))
    }

    /// Natural logarithm via the atanh series with digit-shift and
    /// square-root reduction.
    pub fn ln(&self, ctx: MathCtx) -> Result<Self, DecimalError> {
        if self.is_zero() || self.is_negative() {
            return Err(DecimalError::InvalidOperand {
                op: "ln",
                value: self.to_string(),
            });
        }
        let wp = MathCtx::half_up(ctx.digits + 15);
        // self = m * 10^p with m in [1, 10)
        let p = self.approx_log10();
        let m = if p >= 0 {
            self.div(&Self::from_parts(Self::pow10(p as u64), 0), wp)?
        } else {
            self.mul(&Self::from_parts(Self::pow10((-p) as u64), 0))
        };
        // Pull m toward 1 so the series converges quickly.
        let m4 = m.sqrt(wp)?.sqrt(wp)?;
        let ln_m4 = Self::ln_near_one(&m4, wp)?;
        let ln_m = ln_m4.mul(&Self::from_int(4));
        let ln10 = Self::ln_10(wp)?;
        Ok(ln_m.add(&ln10.mul(&Self::from_int(p))).round(ctx))
    }

    /// atanh-series logarithm for operands near 1.
    fn ln_near_one(x: &Self, wp: MathCtx) -> Result<Self, DecimalError> {
        let one = Self::one();
        let t = x.sub(&one).div(&x.add(&one), wp)?;
        let t2 = t.mul(&t).round(wp);
        let mut term = t.clone();
        let mut sum = t;
        let threshold = Self::allowed_error(wp.digits);
        for i in 1..10_000u64 {
            term = term.mul(&t2).round(wp);
            let contrib = term.div(&Self::from_int((2 * i + 1) as i64), wp)?;
            sum = sum.add(&contrib).round(wp);
            if contrib.abs().cmp_value(&threshold) == Ordering::Less {
                break;
            }
        }
        Ok(sum.mul(&Self::from_int(2)))
    }

    /// ln(10) = 2 * ln(sqrt(10)), with sqrt(10) close enough to 1 after
    /// two more square roots.
    fn ln_10(wp: MathCtx) -> Result<Self, DecimalError> {
        let ten = Self::from_int(10);
        let r = ten.sqrt(wp)?.sqrt(wp)?.sqrt(wp)?;
        Ok(Self::ln_near_one(&r, wp)?.mul(&Self::from_int(8)))
    }

    /// Real power: `self^exp = exp(exp * ln(self))`.
    pub fn pow(&self, exp: &Self, ctx: MathCtx) -> Result<Self, DecimalError> {
        if self.is_zero() {
            return Ok(if exp.is_zero() {
                Self::one()
            } else {
                Self::zero()
            });
        }
        let wp = MathCtx::half_up(ctx.digits + 10);
        let ln = self.ln(wp)?;
        exp.mul(&ln).exp(ctx)
    }

    /// Total-order comparison by value (`5.0 == 5.00`).
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        let (a, b, _) = self.align(other);
        a.cmp(&b)
    }

    pub fn min(a: Self, b: Self) -> Self {
        if a.cmp_value(&b) == Ordering::Greater {
            b
        } else {
            a
        }
    }

    pub fn max(a: Self, b: Self) -> Self {
        if a.cmp_value(&b) == Ordering::Less {
            b
        } else {
            a
        }
    }

    /// Nearest `f64`. Values beyond the double range saturate to
    /// `0.0` / `±inf`.
    pub fn to_f64(&self) -> f64 {
        if self.unscaled.is_zero() {
            return 0.0;
        }
        // Keep the literal short: round to 25 significant digits first,
        // then let the float parser do correct nearest-even rounding.
        let shortened = self.round(MathCtx::half_up(25));
        let literal = format!("{}e{}", shortened.unscaled, -shortened.scale);
        literal.parse::<f64>().unwrap_or(f64::NAN)
    }
}

impl PartialEq for BigDec {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_value(other) == Ordering::Equal
    }
}

impl Eq for BigDec {}

impl PartialOrd for BigDec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_value(other))
    }
}

impl Ord for BigDec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }
}

impl std::fmt::Display for BigDec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.stripped();
        if s.scale <= 0 {
            if s.scale < -20 || s.precision_digits() > 25 {
                return write!(f, "{}e{}", s.unscaled, -s.scale);
            }
            return write!(f, "{}", &s.unscaled * Self::pow10((-s.scale) as u64));
        }
        let digits = s.precision_digits() as i64;
        if s.scale > 25 || digits > 25 {
            return write!(f, "{}e{}", s.unscaled, -s.scale);
        }
        let sign = if s.unscaled.is_negative() { "-" } else { "" };
        let body = s.unscaled.abs().to_string();
        if digits > s.scale {
            let split = (digits - s.scale) as usize;
            write!(f, "{}{}.{}", sign, &body[..split], &body[split..])
        } else {
            let zeros = "0".repeat((s.scale - digits) as usize);
            write!(f, "{}0.{}{}", sign, zeros, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(d: u32) -> MathCtx {
        MathCtx::half_up(d)
    }

    #[test]
    fn test_from_f64_exact() {
        // 0.5 is exactly representable; expansion must be exact.
        let half = BigDec::from_f64(0.5).unwrap();
        assert_eq!(half, BigDec::from_parts(BigInt::from(5), 1));
        // 0.1 is not; the expansion still round-trips through f64.
        let tenth = BigDec::from_f64(0.1).unwrap();
        assert_eq!(tenth.to_f64(), 0.1);
    }

    #[test]
    fn test_from_f64_rejects_non_finite() {
        assert!(BigDec::from_f64(f64::NAN).is_err());
        assert!(BigDec::from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_exact_ring_ops() {
        let a = BigDec::from_f64(1.25).unwrap();
        let b = BigDec::from_f64(2.75).unwrap();
        assert_eq!(a.add(&b).to_f64(), 4.0);
        assert_eq!(b.sub(&a).to_f64(), 1.5);
        assert_eq!(a.mul(&b).to_f64(), 3.4375);
    }

    #[test]
    fn test_div_rounds_half_up() {
        let one = BigDec::one();
        let three = BigDec::from_int(3);
        let q = one.div(&three, ctx(5)).unwrap();
        // 0.33333|3... -> 0.33333
        assert_eq!(q.to_string(), "0.33333");

        let two = BigDec::from_int(2);
        let q = two.div(&three, ctx(5)).unwrap();
        // 0.66666|6... rounds up to 0.66667
        assert_eq!(q.to_string(), "0.66667");
    }

    #[test]
    fn test_div_half_boundary() {
        // 1/8 at two digits: 0.125 -> 0.13 under half-up.
        let q = BigDec::one()
            .div(&BigDec::from_int(8), ctx(2))
            .unwrap();
        assert_eq!(q.to_string(), "0.13");
        // Truncation keeps 0.12.
        let q = BigDec::one()
            .div(
                &BigDec::from_int(8),
                MathCtx {
                    digits: 2,
                    rounding: Rounding::Down,
                },
            )
            .unwrap();
        assert_eq!(q.to_string(), "0.12");
    }

    #[test]
    fn test_division_by_zero() {
        let err = BigDec::one().div(&BigDec::zero(), ctx(10)).unwrap_err();
        assert_eq!(err, DecimalError::DivisionByZero);
    }

    #[test]
    fn test_allowed_error_and_decimal_digits() {
        let e = BigDec::allowed_error(20);
        assert_eq!(e.decimal_digits(), 20);
        assert_eq!(e.to_f64(), 1e-20);
        assert_eq!(BigDec::from_int(100).decimal_digits(), 0);
    }

    #[test]
    fn test_pow_int() {
        let two = BigDec::from_int(2);
        assert_eq!(two.pow_int(10, ctx(20)).to_f64(), 1024.0);
        let half = BigDec::from_f64(0.5).unwrap();
        assert!((half.pow_int(20, ctx(30)).to_f64() - 2f64.powi(-20)).abs() < 1e-15);
    }

    #[test]
    fn test_sqrt() {
        let four = BigDec::from_int(4);
        assert_eq!(four.sqrt(ctx(20)).unwrap().to_f64(), 2.0);
        let two = BigDec::from_int(2);
        let r = two.sqrt(ctx(30)).unwrap().to_f64();
        assert!((r - std::f64::consts::SQRT_2).abs() < 1e-15);
        assert!(BigDec::from_int(-1).sqrt(ctx(10)).is_err());
    }

    #[test]
    fn test_exp_ln_roundtrip() {
        let x = BigDec::from_f64(3.5).unwrap();
        let e = x.exp(ctx(30)).unwrap();
        assert!((e.to_f64() - 3.5f64.exp()).abs() / 3.5f64.exp() < 1e-14);
        let back = e.ln(ctx(30)).unwrap();
        assert!((back.to_f64() - 3.5).abs() < 1e-14);
    }

    #[test]
    fn test_ln_of_ten() {
        let ten = BigDec::from_int(10);
        let l = ten.ln(ctx(30)).unwrap();
        assert!((l.to_f64() - std::f64::consts::LN_10).abs() < 1e-14);
    }

    #[test]
    fn test_ln_rejects_non_positive() {
        assert!(BigDec::zero().ln(ctx(10)).is_err());
        assert!(BigDec::from_int(-3).ln(ctx(10)).is_err());
    }

    #[test]
    fn test_pow_real() {
        let two = BigDec::from_int(2);
        let half = BigDec::from_f64(0.5).unwrap();
        let r = two.pow(&half, ctx(30)).unwrap().to_f64();
        assert!((r - std::f64::consts::SQRT_2).abs() < 1e-13);
    }

    #[test]
    fn test_compare_ignores_scale() {
        let a = BigDec::from_parts(BigInt::from(500), 2); // 5.00
        let b = BigDec::from_int(5);
        assert_eq!(a, b);
        assert_eq!(BigDec::min(a, BigDec::from_int(4)), BigDec::from_int(4));
    }

    #[test]
    fn test_tiny_values_survive() {
        // Far below f64 range: 10^-400 must not collapse to zero.
        let tiny = BigDec::allowed_error(400);
        assert!(!tiny.is_zero());
        assert_eq!(tiny.approx_log10(), -400);
        assert_eq!(tiny.to_f64(), 0.0); // saturates only on conversion
    }

    #[test]
    fn test_display_fixed_point() {
        assert_eq!(BigDec::from_f64(0.25).unwrap().to_string(), "0.25");
        assert_eq!(BigDec::from_int(42).to_string(), "42");
        assert_eq!(
            BigDec::from_parts(BigInt::from(-125), 2).to_string(),
            "-1.25"
        );
    }
}
