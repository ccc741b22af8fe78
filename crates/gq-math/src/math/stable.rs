//! Numerically stable log-domain primitives.
//!
//! These show up in two places: closed-form distribution moments (the
//! Weibull mean needs Γ), and reference computations against truncated
//! Poisson and negative-binomial weight tables.

use std::f64::consts::PI;

const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_8; // 0.5 * ln(2*pi)
const LANCZOS_G: f64 = 7.0;
#[allow(clippy::excessive_precision)] // published numerical constants
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the Gamma function, log |Γ(z)|.
///
/// Lanczos approximation (g = 7, n = 9) with the reflection formula for
/// z < 0.5. NaN for non-positive integers and other poles.
pub fn log_gamma(z: f64) -> f64 {
    if z.is_nan() || z == f64::NEG_INFINITY {
        return f64::NAN;
    }
    if z == f64::INFINITY {
        return f64::INFINITY;
    }
    if z <= 0.0 && (z - z.round()).abs() < 1e-15 {
        return f64::NAN;
    }
    if z < 0.5 {
        // Reflection: Γ(z)Γ(1-z) = π / sin(πz)
        let sin_pi = (PI * z).sin();
        if sin_pi == 0.0 {
            return f64::NAN;
        }
        return PI.ln() - sin_pi.abs().ln() - log_gamma(1.0 - z);
    }

    let x = z - 1.0;
    let mut acc = LANCZOS_COEFFS[0];
    for (i, c) in LANCZOS_COEFFS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    LOG_SQRT_2PI + (x + 0.5) * t.ln() - t + acc.ln()
}

/// Natural log of n!.
pub fn ln_factorial(n: u64) -> f64 {
    // Small values exactly, large via log_gamma.
    const TABLE: [f64; 10] = [
        0.0,
        0.0,
        0.693_147_180_559_945_3,
        1.791_759_469_228_055,
        3.178_053_830_347_946,
        4.787_491_742_782_046,
        6.579_251_212_010_101,
        8.525_161_361_065_415,
        10.604_602_902_745_25,
        12.801_827_480_081_469,
    ];
    if (n as usize) < TABLE.len() {
        TABLE[n as usize]
    } else {
        log_gamma(n as f64 + 1.0)
    }
}

/// Stable log(sum(exp(values))).
///
/// Returns NEG_INFINITY for empty input or all -inf inputs.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY || max == f64::INFINITY {
        return max;
    }
    let mut sum = 0.0;
    for v in values {
        sum += (*v - max).exp();
    }
    max + sum.ln()
}

/// Log of the Poisson pmf, log P(X = k) for X ~ Poisson(λ).
pub fn poisson_log_pmf(k: u64, lambda: f64) -> f64 {
    if lambda.is_nan() || lambda < 0.0 {
        return f64::NAN;
    }
    if lambda == 0.0 {
        return if k == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    k as f64 * lambda.ln() - lambda - ln_factorial(k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
    }

    #[test]
    fn test_log_gamma_integers() {
        // Γ(n) = (n-1)!
        assert!(approx(log_gamma(1.0), 0.0, 1e-12));
        assert!(approx(log_gamma(2.0), 0.0, 1e-12));
        assert!(approx(log_gamma(5.0), 24.0_f64.ln(), 1e-10));
        assert!(approx(log_gamma(10.0), 362_880.0_f64.ln(), 1e-10));
    }

    #[test]
    fn test_log_gamma_half() {
        // Γ(1/2) = sqrt(π)
        assert!(approx(log_gamma(0.5), 0.5 * PI.ln(), 1e-10));
    }

    #[test]
    fn test_log_gamma_poles() {
        assert!(log_gamma(0.0).is_nan());
        assert!(log_gamma(-3.0).is_nan());
    }

    #[test]
    fn test_ln_factorial_matches_gamma() {
        for n in 0..50u64 {
            assert!(approx(ln_factorial(n), log_gamma(n as f64 + 1.0), 1e-9));
        }
    }

    #[test]
    fn test_log_sum_exp_extremes() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert!(approx(
            log_sum_exp(&[-1000.0, -1000.0]),
            -1000.0 + 2.0_f64.ln(),
            1e-12
        ));
    }

    #[test]
    fn test_poisson_log_pmf_sums_to_one() {
        let lambda = 3.7;
        let logs: Vec<f64> = (0..100).map(|k| poisson_log_pmf(k, lambda)).collect();
        assert!(approx(log_sum_exp(&logs), 0.0, 1e-10));
    }

    #[test]
    fn test_poisson_zero_rate() {
        assert_eq!(poisson_log_pmf(0, 0.0), 0.0);
        assert_eq!(poisson_log_pmf(3, 0.0), f64::NEG_INFINITY);
    }
}
