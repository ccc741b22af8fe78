//! GSMP events: a firing distribution racing over an active state region.

use super::{FiringDistribution, StateDist, StateSet};
use gq_common::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance for checking that successor rows are stochastic.
const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// An event of a GSMP: an identifier, a firing-time distribution, the set
/// of states it is active in, and a successor distribution for each
/// active state, fired when the event wins the race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    id: String,
    distribution: FiringDistribution,
    active: StateSet,
    transitions: BTreeMap<usize, StateDist>,
}

impl Event {
    /// Construct a validated event.
    ///
    /// The active set must be non-empty, every active state must carry a
    /// successor distribution summing to one, and the distribution
    /// parameters must be in range.
    pub fn new(
        id: impl Into<String>,
        distribution: FiringDistribution,
        active: StateSet,
        transitions: BTreeMap<usize, StateDist>,
    ) -> Result<Self, Error> {
        let id = id.into();
        distribution.validate(&id)?;
        if active.is_empty() {
            return Err(Error::EmptyActiveSet { event: id });
        }
        for s in &active {
            let row = transitions.get(s).ok_or_else(|| {
                Error::InvalidModel(format!(
                    "event {id}: active state {s} has no successor distribution"
                ))
            })?;
            let sum = row.sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(Error::InvalidModel(format!(
                    "event {id}: successor distribution of state {s} sums to {sum}, not 1"
                )));
            }
            for (t, p) in row.iter() {
                if !p.is_finite() || p < 0.0 {
                    return Err(Error::InvalidModel(format!(
                        "event {id}: transition {s} -> {t} has invalid probability {p}"
                    )));
                }
            }
        }
        for s in transitions.keys() {
            if !active.contains(s) {
                return Err(Error::InvalidModel(format!(
                    "event {id}: transition row for state {s} outside the active set"
                )));
            }
        }
        Ok(Self {
            id,
            distribution,
            active,
            transitions,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn distribution(&self) -> &FiringDistribution {
        &self.distribution
    }

    /// States in which this event races.
    pub fn active(&self) -> &StateSet {
        &self.active
    }

    pub fn is_active(&self, state: usize) -> bool {
        self.active.contains(&state)
    }

    /// Successor distribution fired from `state`, if the event is active
    /// there.
    pub fn transitions(&self, state: usize) -> Option<&StateDist> {
        self.transitions.get(&state)
    }
}
