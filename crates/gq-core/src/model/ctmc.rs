//! Continuous-time Markov chains with explicit sparse rate rows.

use super::{Dtmc, StateDist, StateSet};
use serde::{Deserialize, Serialize};

/// An explicit-state CTMC: one sparse rate row per state plus a set of
/// initial states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ctmc {
    rows: Vec<StateDist>,
    initial: StateSet,
}

impl Ctmc {
    pub fn new(num_states: usize) -> Self {
        Self {
            rows: vec![StateDist::new(); num_states],
            initial: StateSet::new(),
        }
    }

    pub fn num_states(&self) -> usize {
        self.rows.len()
    }

    /// Rate row of `state`.
    pub fn rates(&self, state: usize) -> &StateDist {
        &self.rows[state]
    }

    pub fn set_rate(&mut self, from: usize, to: usize, rate: f64) {
        self.rows[from].set(to, rate);
    }

    pub fn add_rate(&mut self, from: usize, to: usize, rate: f64) {
        self.rows[from].add_to(to, rate);
    }

    /// Replace the whole rate row of `state`.
    pub fn set_row(&mut self, state: usize, row: StateDist) {
        self.rows[state] = row;
    }

    pub fn initial_states(&self) -> &StateSet {
        &self.initial
    }

    pub fn add_initial_state(&mut self, state: usize) {
        self.initial.insert(state);
    }

    /// Total exit rate of `state` (sum of its rate row).
    pub fn exit_rate(&self, state: usize) -> f64 {
        self.rows[state].sum()
    }

    /// Maximum total exit rate over all states.
    pub fn max_exit_rate(&self) -> f64 {
        (0..self.num_states())
            .map(|s| self.exit_rate(s))
            .fold(0.0, f64::max)
    }

    /// Uniformise at rate `q`: `P = I + Q/q`.
    ///
    /// `q` must be at least the maximum exit rate, or rows come out with
    /// negative diagonal mass.
    pub fn uniformised(&self, q: f64) -> Dtmc {
        let mut rows = Vec::with_capacity(self.num_states());
        for s in 0..self.num_states() {
            let mut row = StateDist::new();
            for (t, rate) in self.rows[s].iter() {
                row.add_to(t, rate / q);
            }
            row.add_to(s, 1.0 - self.exit_rate(s) / q);
            rows.push(row);
        }
        Dtmc::from_rows(rows, q)
    }
}
