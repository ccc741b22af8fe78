//! Discrete-time Markov chains produced by uniformisation.

use super::{StateDist, StateSet};
use serde::{Deserialize, Serialize};

/// An explicit-state DTMC with its uniformisation rate.
///
/// Rows are sparse probability distributions. The two multiplication
/// kernels mirror the two transient iterations: `vm_mult` evolves a
/// distribution forward, `mv_mult` pulls expected rewards backward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dtmc {
    rows: Vec<StateDist>,
    uniformisation_rate: f64,
}

impl Dtmc {
    pub fn from_rows(rows: Vec<StateDist>, uniformisation_rate: f64) -> Self {
        Self {
            rows,
            uniformisation_rate,
        }
    }

    pub fn num_states(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, state: usize) -> &StateDist {
        &self.rows[state]
    }

    pub fn uniformisation_rate(&self) -> f64 {
        self.uniformisation_rate
    }

    /// Vector-matrix product: `dst[t] = Σ_s src[s] * P(s, t)`.
    ///
    /// Evolves a distribution over states one step forward.
    pub fn vm_mult(&self, src: &[f64], dst: &mut [f64]) {
        dst.fill(0.0);
        for (s, src_val) in src.iter().enumerate() {
            if *src_val == 0.0 {
                continue;
            }
            for (t, p) in self.rows[s].iter() {
                dst[t] += src_val * p;
            }
        }
    }

    /// Matrix-vector product: `dst[s] = Σ_t P(s, t) * src[t]`.
    ///
    /// Pulls an expected-value vector one step backward.
    pub fn mv_mult(&self, src: &[f64], dst: &mut [f64]) {
        for (s, out) in dst.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (t, p) in self.rows[s].iter() {
                acc += p * src[t];
            }
            *out = acc;
        }
    }

    /// Minimum positive transition probability over the rows of the given
    /// states. Returns 1.0 when the states carry no transitions.
    pub fn min_transition_probability(&self, states: &StateSet) -> f64 {
        let mut min = f64::MAX;
        for s in states {
            for (_, p) in self.rows[*s].iter() {
                if p > 0.0 && p < min {
                    min = p;
                }
            }
        }
        if min == f64::MAX {
            1.0
        } else {
            min
        }
    }
}
