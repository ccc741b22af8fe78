//! Firing-time distributions for GSMP events.

use gq_common::Error;
use gq_math::log_gamma;
use serde::{Deserialize, Serialize};

/// The firing-time distribution of an event.
///
/// Exponential events race memorylessly and are folded into the CTMC;
/// every other family makes its event an alarm whose active region is
/// collapsed by the reduction. Weibull is declared but unsupported by the
/// reduction path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FiringDistribution {
    /// Fires deterministically after `delay >= 0`.
    Dirac { delay: f64 },
    /// Memoryless with `rate > 0`.
    Exponential { rate: f64 },
    /// Sum of `shape >= 1` exponentials, each with `rate > 0`.
    Erlang { shape: u32, rate: f64 },
    /// Uniform on `[low, high)` with `0 <= low < high`.
    Uniform { low: f64, high: f64 },
    /// Weibull with `scale > 0`, `shape > 0`. Unsupported by the
    /// reduction.
    Weibull { scale: f64, shape: f64 },
}

impl FiringDistribution {
    /// Name of the distribution family, for messages and audit output.
    pub fn family(&self) -> &'static str {
        match self {
            FiringDistribution::Dirac { .. } => "dirac",
            FiringDistribution::Exponential { .. } => "exponential",
            FiringDistribution::Erlang { .. } => "erlang",
            FiringDistribution::Uniform { .. } => "uniform",
            FiringDistribution::Weibull { .. } => "weibull",
        }
    }

    /// Check the parameter constraints of the family.
    pub fn validate(&self, event_id: &str) -> Result<(), Error> {
        let fail = |message: String| Error::InvalidDistributionParameters {
            event: event_id.to_string(),
            message,
        };
        match *self {
            FiringDistribution::Dirac { delay } => {
                if !delay.is_finite() || delay < 0.0 {
                    return Err(fail(format!("dirac delay must be >= 0, got {delay}")));
                }
            }
            FiringDistribution::Exponential { rate } => {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(fail(format!("exponential rate must be > 0, got {rate}")));
                }
            }
            FiringDistribution::Erlang { shape, rate } => {
                if shape < 1 {
                    return Err(fail("erlang shape must be >= 1".to_string()));
                }
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(fail(format!("erlang rate must be > 0, got {rate}")));
                }
            }
            FiringDistribution::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() || low < 0.0 || low >= high {
                    return Err(fail(format!(
                        "uniform bounds must satisfy 0 <= low < high, got [{low}, {high})"
                    )));
                }
            }
            FiringDistribution::Weibull { scale, shape } => {
                if !scale.is_finite() || scale <= 0.0 || !shape.is_finite() || shape <= 0.0 {
                    return Err(fail(format!(
                        "weibull scale and shape must be > 0, got scale={scale} shape={shape}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Closed-form mean firing time.
    pub fn mean(&self) -> f64 {
        match *self {
            FiringDistribution::Dirac { delay } => delay,
            FiringDistribution::Exponential { rate } => 1.0 / rate,
            FiringDistribution::Erlang { shape, rate } => shape as f64 / rate,
            FiringDistribution::Uniform { low, high } => (low + high) / 2.0,
            FiringDistribution::Weibull { scale, shape } => {
                scale * log_gamma(1.0 + 1.0 / shape).exp()
            }
        }
    }

    /// Whether the event races memorylessly (and therefore belongs in the
    /// CTMC rather than a potato).
    pub fn is_exponential(&self) -> bool {
        matches!(self, FiringDistribution::Exponential { .. })
    }

    /// Whether the reduction path can collapse an alarm with this
    /// distribution.
    pub fn supports_reduction(&self) -> bool {
        matches!(
            self,
            FiringDistribution::Dirac { .. }
                | FiringDistribution::Erlang { .. }
                | FiringDistribution::Uniform { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_good_parameters() {
        assert!(FiringDistribution::Dirac { delay: 0.0 }.validate("e").is_ok());
        assert!(FiringDistribution::Erlang { shape: 3, rate: 2.0 }
            .validate("e")
            .is_ok());
        assert!(FiringDistribution::Uniform { low: 0.0, high: 1.0 }
            .validate("e")
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(FiringDistribution::Dirac { delay: -1.0 }.validate("e").is_err());
        assert!(FiringDistribution::Exponential { rate: 0.0 }
            .validate("e")
            .is_err());
        assert!(FiringDistribution::Erlang { shape: 0, rate: 1.0 }
            .validate("e")
            .is_err());
        assert!(FiringDistribution::Uniform { low: 2.0, high: 2.0 }
            .validate("e")
            .is_err());
        assert!(FiringDistribution::Weibull { scale: 1.0, shape: 0.0 }
            .validate("e")
            .is_err());
    }

    #[test]
    fn test_means() {
        assert_eq!(FiringDistribution::Dirac { delay: 2.5 }.mean(), 2.5);
        assert_eq!(FiringDistribution::Exponential { rate: 4.0 }.mean(), 0.25);
        assert_eq!(FiringDistribution::Erlang { shape: 6, rate: 2.0 }.mean(), 3.0);
        assert_eq!(FiringDistribution::Uniform { low: 1.0, high: 3.0 }.mean(), 2.0);
        // Weibull with shape 1 degenerates to Exponential(1/scale).
        let w = FiringDistribution::Weibull { scale: 2.0, shape: 1.0 };
        assert!((w.mean() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_capability_tags() {
        assert!(FiringDistribution::Dirac { delay: 1.0 }.supports_reduction());
        assert!(!FiringDistribution::Weibull { scale: 1.0, shape: 0.5 }.supports_reduction());
        assert!(!FiringDistribution::Exponential { rate: 1.0 }.supports_reduction());
        assert!(FiringDistribution::Exponential { rate: 1.0 }.is_exponential());
    }
}
