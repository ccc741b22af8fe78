//! Step-count weight profiles for alarm firing distributions.
//!
//! Transient analysis against an alarm distribution reduces to the pmf of
//! the number of uniformised steps the chain takes before the alarm
//! fires: for firing time `T` and a rate-`q` step process,
//! `π_i = P(N(T) = i)`. Each supported family yields its own table:
//!
//! - Dirac(d): `N(T) ~ Poisson(q·d)`, the Jensen uniformisation at time
//!   d, straight from a Fox-Glynn table.
//! - Erlang(k, λ): `N(T)` counts rate-`q` steps before the k-th arrival
//!   of an independent rate-λ process, which is
//!   NegativeBinomial(k, q/(q+λ)); computed by the forward recurrence in
//!   extended-range arithmetic.
//! - Uniform(a, b): integrating the Poisson kernel over [a, b] gives the
//!   two-sided cumulative form
//!   `π_i = (F_{qa}(i) - F_{qb}(i)) / (q·(b - a))` from two Fox-Glynn
//!   tables.

use crate::model::{Event, FiringDistribution};
use gq_common::Error;
use gq_math::{BigDec, ExtendedFloat, FoxGlynn, FoxGlynnError};
use tracing::debug;

/// Underflow guard for Fox-Glynn tables.
const UNDERFLOW_GUARD: f64 = 1e-300;
/// Overflow guard for Fox-Glynn tables.
const OVERFLOW_GUARD: f64 = 1e+300;
/// Cap on the step-count support; recurrences that run past it overflow.
const MAX_STEPS: usize = 1 << 26;

/// A truncated, normalised pmf of the uniformised step count before the
/// alarm fires, supported on `left ..= right`.
#[derive(Debug, Clone)]
pub struct StepProfile {
    left: usize,
    right: usize,
    probs: Vec<f64>,
}

impl StepProfile {
    /// Build the profile for an event's firing distribution at
    /// uniformisation rate `q` with accuracy `kappa`.
    pub fn for_event(event: &Event, q: f64, kappa: &BigDec) -> Result<Self, Error> {
        match *event.distribution() {
            FiringDistribution::Dirac { delay } => Self::dirac(event.id(), delay, q, kappa),
            FiringDistribution::Erlang { shape, rate } => {
                Self::erlang(event.id(), shape, rate, q, kappa)
            }
            FiringDistribution::Uniform { low, high } => {
                Self::uniform(event.id(), low, high, q, kappa)
            }
            FiringDistribution::Exponential { .. } => Err(Error::InvalidPotatoDistribution {
                event: event.id().to_string(),
            }),
            FiringDistribution::Weibull { .. } => Err(Error::UnsupportedDistribution {
                event: event.id().to_string(),
                family: "weibull".to_string(),
            }),
        }
    }

    /// First step index with non-negligible mass.
    pub fn left(&self) -> usize {
        self.left
    }

    /// Last step index with non-negligible mass.
    pub fn right(&self) -> usize {
        self.right
    }

    /// The normalised step-count pmf over `left ..= right`.
    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    /// The time-profile weights for mean-time and mean-reward
    /// accumulation: `w'_i = (1 - Σ_{j<=i} π_j) / q`, the expected time
    /// spent beyond step i, per step, scaled to continuous time.
    pub fn time_profile(&self, q: f64) -> Vec<f64> {
        let mut w = self.probs.clone();
        for i in 1..w.len() {
            w[i] += w[i - 1];
        }
        for v in w.iter_mut() {
            *v = (1.0 - *v) / q;
        }
        w
    }

    fn dirac(event_id: &str, delay: f64, q: f64, kappa: &BigDec) -> Result<Self, Error> {
        if delay == 0.0 {
            // Fires immediately: zero steps with certainty.
            return Ok(Self {
                left: 0,
                right: 0,
                probs: vec![1.0],
            });
        }
        let rate = q * delay;
        let fg = FoxGlynn::compute(rate, UNDERFLOW_GUARD, OVERFLOW_GUARD, kappa)
            .map_err(|e| fox_glynn_error(event_id, rate, kappa, e))?;
        Ok(Self {
            left: fg.left(),
            right: fg.right(),
            probs: fg.normalised_f64(),
        })
    }

    /// Negative-binomial step counts for Erlang firing times, by the
    /// stable forward recurrence `π_0 = (1-p)^k`,
    /// `π_{i+1} = π_i · p · (k+i)/(i+1)` with `p = q/(q+λ)`.
    fn erlang(
        event_id: &str,
        shape: u32,
        rate: f64,
        q: f64,
        kappa: &BigDec,
    ) -> Result<Self, Error> {
        let k = shape as f64;
        let p = q / (q + rate);
        let log10_p = p.log10();
        let mean_steps = k * q / rate;
        let kappa_log10 = kappa.approx_log10() as f64;

        let mut probs = Vec::new();
        let mut cur_log10 = k * (rate / (q + rate)).log10();
        let mut i = 0usize;
        loop {
            let cur = ExtendedFloat::from_log10(cur_log10);
            probs.push(cur.to_f64());

            // Ratio of consecutive terms decreases toward p, so beyond
            // the mean the remaining tail is dominated by a geometric
            // series.
            let next_log10 = cur_log10 + log10_p + ((k + i as f64) / (i as f64 + 1.0)).log10();
            if i as f64 >= mean_steps {
                let tail_ratio = p * (k + i as f64 + 1.0) / (i as f64 + 2.0);
                if tail_ratio < 1.0 {
                    let tail_log10 = next_log10 - (1.0 - tail_ratio).log10();
                    if tail_log10 < kappa_log10 - 1.0 {
                        break;
                    }
                }
            }
            cur_log10 = next_log10;
            i += 1;
            if i > MAX_STEPS {
                return Err(Error::NumericOverflow {
                    event: event_id.to_string(),
                    rate: q,
                    kappa: kappa.to_string(),
                });
            }
        }

        let total: f64 = probs.iter().sum();
        for v in probs.iter_mut() {
            *v /= total;
        }
        debug!(
            event = event_id,
            support = probs.len(),
            "erlang step-count profile computed"
        );
        Ok(Self {
            left: 0,
            right: probs.len() - 1,
            probs,
        })
    }

    /// Two-sided cumulative-Poisson step counts for Uniform firing times.
    fn uniform(
        event_id: &str,
        low: f64,
        high: f64,
        q: f64,
        kappa: &BigDec,
    ) -> Result<Self, Error> {
        let rate_hi = q * high;
        let fg_hi = FoxGlynn::compute(rate_hi, UNDERFLOW_GUARD, OVERFLOW_GUARD, kappa)
            .map_err(|e| fox_glynn_error(event_id, rate_hi, kappa, e))?;
        let cum_hi = CumulativePoisson::from_table(&fg_hi);

        let cum_lo = if low == 0.0 {
            // F_0(i) = 1 for every i >= 0.
            CumulativePoisson::degenerate()
        } else {
            let rate_lo = q * low;
            let fg_lo = FoxGlynn::compute(rate_lo, UNDERFLOW_GUARD, OVERFLOW_GUARD, kappa)
                .map_err(|e| fox_glynn_error(event_id, rate_lo, kappa, e))?;
            CumulativePoisson::from_table(&fg_lo)
        };

        let right = fg_hi.right();
        let norm = q * (high - low);
        let mut probs = Vec::with_capacity(right + 1);
        for i in 0..=right {
            let mass = (cum_lo.at(i) - cum_hi.at(i)) / norm;
            probs.push(mass.max(0.0));
        }

        let total: f64 = probs.iter().sum();
        for v in probs.iter_mut() {
            *v /= total;
        }
        Ok(Self {
            left: 0,
            right,
            probs,
        })
    }
}

/// Cumulative Poisson distribution function backed by a Fox-Glynn table:
/// zero below the window, one above it.
struct CumulativePoisson {
    left: usize,
    right: usize,
    cumulative: Vec<f64>,
}

impl CumulativePoisson {
    fn from_table(fg: &FoxGlynn) -> Self {
        let mut cumulative = fg.normalised_f64();
        for i in 1..cumulative.len() {
            cumulative[i] += cumulative[i - 1];
        }
        Self {
            left: fg.left(),
            right: fg.right(),
            cumulative,
        }
    }

    /// The distribution function of the degenerate rate-zero case.
    fn degenerate() -> Self {
        Self {
            left: 0,
            right: 0,
            cumulative: vec![1.0],
        }
    }

    /// `F(i) = P(X <= i)`.
    fn at(&self, i: usize) -> f64 {
        if i < self.left {
            0.0
        } else if i > self.right {
            1.0
        } else {
            self.cumulative[i - self.left].min(1.0)
        }
    }
}

fn fox_glynn_error(event_id: &str, rate: f64, kappa: &BigDec, err: FoxGlynnError) -> Error {
    match err {
        FoxGlynnError::Overflow { .. } => Error::NumericOverflow {
            event: event_id.to_string(),
            rate,
            kappa: kappa.to_string(),
        },
        other => Error::NumericFailure {
            event: event_id.to_string(),
            entrance: 0,
            message: other.to_string(),
        },
    }
}
