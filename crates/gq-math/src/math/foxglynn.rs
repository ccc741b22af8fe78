//! Truncated Poisson weights after Fox & Glynn (1988).
//!
//! Given a Poisson rate λ and a target truncation error κ, computes the
//! left and right truncation points L ≤ R and a table of weights
//! `W[L..=R]` such that the normalised weights approximate the Poisson
//! pmf with total tail mass at most κ. The weights are kept in
//! arbitrary-precision decimals, re-scaled against the overflow guard, so
//! the table stays meaningful for rates where `e^(-λ)` underflows any
//! native float.
//!
//! The truncation-point finder follows the corrected bounds (Corollary 1
//! for the right tail, Corollary 2 for the left tail); the weighter runs
//! the two-sided recurrence from the mode.

use crate::math::decimal::{BigDec, DecimalError, MathCtx};
use crate::math::extended::ExtendedFloat;
use crate::math::stable::poisson_log_pmf;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

/// Hard cap on the truncation window; a window beyond this cannot be
/// iterated in reasonable memory and is reported as overflow.
const MAX_WINDOW: usize = 1 << 26;

const LN_10: f64 = std::f64::consts::LN_10;
const SQRT_2PI: f64 = 2.506_628_274_631_000_5;

/// Errors from the Fox–Glynn computation.
#[derive(Debug, Error)]
pub enum FoxGlynnError {
    #[error("Poisson rate must be positive and finite, got {0}")]
    InvalidRate(f64),

    #[error("accuracy must lie in (0, 1), got {0}")]
    InvalidAccuracy(String),

    #[error(
        "truncation overflow: rate {lambda} reached the overflow guard before \
         the tail fell below {kappa}"
    )]
    Overflow { lambda: f64, kappa: String },

    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

/// Truncated Poisson weight table.
#[derive(Debug, Clone)]
pub struct FoxGlynn {
    left: usize,
    right: usize,
    weights: Vec<BigDec>,
    total_weight: BigDec,
}

impl FoxGlynn {
    /// Compute the weight table for Poisson rate `lambda`.
    ///
    /// `underflow` and `overflow` guard the representable magnitude range
    /// (typically `1e-300` and `1e+300`); `kappa` is the required
    /// truncation accuracy.
    pub fn compute(
        lambda: f64,
        underflow: f64,
        overflow: f64,
        kappa: &BigDec,
    ) -> Result<Self, FoxGlynnError> {
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(FoxGlynnError::InvalidRate(lambda));
        }
        if kappa.is_zero() || kappa.is_negative() || kappa.cmp_value(&BigDec::one()) != Ordering::Less
        {
            return Err(FoxGlynnError::InvalidAccuracy(kappa.to_string()));
        }

        let kappa_log10 = kappa.approx_log10() as f64;
        let (left, right) = find_truncation(lambda, kappa_log10).ok_or_else(|| {
            FoxGlynnError::Overflow {
                lambda,
                kappa: kappa.to_string(),
            }
        })?;
        if right - left + 1 > MAX_WINDOW {
            return Err(FoxGlynnError::Overflow {
                lambda,
                kappa: kappa.to_string(),
            });
        }
        debug!(lambda, left, right, "fox-glynn truncation window");

        Self::weigh(lambda, left, right, underflow, overflow, kappa)
    }

    /// Run the two-sided recurrence from the mode and trim entries that
    /// fall below the underflow guard.
    fn weigh(
        lambda: f64,
        left: usize,
        right: usize,
        underflow: f64,
        overflow: f64,
        kappa: &BigDec,
    ) -> Result<Self, FoxGlynnError> {
        let precision = MathCtx::half_up(kappa.decimal_digits().max(30) + 10);
        let mode = (lambda.floor() as usize).clamp(left, right);
        let window = right - left + 1;

        // Start weight scaled down from the overflow guard so the whole
        // window fits under it even after summation.
        let start = BigDec::from_f64(overflow)?
            .div(&BigDec::from_int(10_000_000_000), precision)?
            .div(&BigDec::from_int(window as i64), precision)?;

        // Sanity of the scale: the smallest kept weight relative to the
        // mode must stay above the underflow guard. Checked in extended
        // range because the ratio spans thousands of orders of magnitude.
        let edge_log10 = poisson_log_pmf(left as u64, lambda)
            .min(poisson_log_pmf(right as u64, lambda))
            / LN_10;
        let mode_log10 = poisson_log_pmf(mode as u64, lambda) / LN_10;
        let smallest = ExtendedFloat::from_log10(start.approx_log10() as f64)
            .mul(&ExtendedFloat::from_log10(edge_log10 - mode_log10));
        let guard = ExtendedFloat::from_f64(underflow);
        let trimming = smallest.cmp_magnitude(&guard) == Ordering::Less;

        let lambda_dec = BigDec::from_f64(lambda)?;
        let mut weights = vec![BigDec::zero(); window];
        weights[mode - left] = start;
        for j in (left..mode).rev() {
            let next = weights[j + 1 - left]
                .mul(&BigDec::from_int((j + 1) as i64))
                .div(&lambda_dec, precision)?;
            weights[j - left] = next;
        }
        for j in mode..right {
            let next = weights[j - left]
                .mul(&lambda_dec)
                .div(&BigDec::from_int((j + 1) as i64), precision)?;
            weights[j + 1 - left] = next;
        }

        // Trim the window where the recurrence dropped under the guard.
        let underflow_dec = BigDec::from_f64(underflow)?;
        let mut new_left = left;
        let mut new_right = right;
        if trimming {
            while new_left < mode
                && weights[new_left - left].cmp_value(&underflow_dec) == Ordering::Less
            {
                new_left += 1;
            }
            while new_right > mode
                && weights[new_right - left].cmp_value(&underflow_dec) == Ordering::Less
            {
                new_right -= 1;
            }
            debug!(
                dropped_left = new_left - left,
                dropped_right = right - new_right,
                "fox-glynn window trimmed at the underflow guard"
            );
        }
        let weights: Vec<BigDec> =
            weights[(new_left - left)..=(new_right - left)].to_vec();

        let mut total_weight = BigDec::zero();
        for w in &weights {
            total_weight = total_weight.add(w);
        }

        Ok(Self {
            left: new_left,
            right: new_right,
            weights,
            total_weight,
        })
    }

    /// Left truncation point L.
    pub fn left(&self) -> usize {
        self.left
    }

    /// Right truncation point R.
    pub fn right(&self) -> usize {
        self.right
    }

    /// The raw (re-scaled) weights, indexed `0 ..= R - L`.
    pub fn weights(&self) -> &[BigDec] {
        &self.weights
    }

    /// Total weight `T = Σ W[i]`, exact over the stored weights.
    pub fn total_weight(&self) -> &BigDec {
        &self.total_weight
    }

    /// The weights normalised into an `f64` pmf over `L ..= R`.
    pub fn normalised_f64(&self) -> Vec<f64> {
        let total = self.total_weight.to_f64();
        self.weights
            .iter()
            .map(|w| w.to_f64() / total)
            .collect()
    }
}

/// Find (L, R) for the given rate and accuracy. `None` when the right
/// truncation point grows past the window cap before the tail bound
/// falls below the accuracy.
fn find_truncation(lambda: f64, kappa_log10: f64) -> Option<(usize, usize)> {
    let m = lambda.floor();
    let kappa_ln_half = kappa_log10 * LN_10 - 2.0f64.ln();

    // Left point: Corollary 2. Small rates keep the full left tail; so
    // does a bound that is never met inside the corollary's validity
    // range.
    let left = if lambda < 25.0 {
        0
    } else {
        let b = (1.0 + 1.0 / lambda) * (1.0 / (8.0 * lambda)).exp();
        let k_cap = (m / lambda.sqrt()).floor().max(1.0) as u64;
        let mut left = 0usize;
        for k in 1..=k_cap {
            let kf = k as f64;
            let bound_ln = b.ln() - kf * kf / 2.0 - (kf * SQRT_2PI).ln();
            if bound_ln < kappa_ln_half {
                let candidate = m - kf * lambda.sqrt() - 1.5;
                left = if candidate > 0.0 {
                    candidate.floor() as usize
                } else {
                    0
                };
                break;
            }
        }
        left
    };

    // Right point: Corollary 1 with the d(k,λ) correction, rate floored
    // at 400 as the bound requires. k grows until the bound is met or
    // the window explodes.
    let lambda_r = lambda.max(400.0);
    let sqrt_2lambda = (2.0 * lambda_r).sqrt();
    let a = (1.0 + 1.0 / lambda_r) * (1.0f64 / 16.0).exp() * 2.0f64.sqrt();
    let mut right = None;
    for k in 4..100_000u64 {
        let kf = k as f64;
        let dkl = 1.0 / (1.0 - (-(2.0 / 9.0) * (kf * sqrt_2lambda + 1.5)).exp());
        let bound_ln = a.ln() + dkl.ln() - kf * kf / 2.0 - (kf * SQRT_2PI).ln();
        if bound_ln < kappa_ln_half {
            let candidate = (m + kf * sqrt_2lambda + 4.0).ceil();
            if candidate > MAX_WINDOW as f64 {
                return None;
            }
            right = Some(candidate as usize);
            break;
        }
    }
    let right = right?;
    Some((left.min(right), right))
}
