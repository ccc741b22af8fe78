//! Reward structures for ACTMCs and for the reduced DTMC.

use super::StateSet;
use gq_common::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rewards attached to an ACTMC: per-state reward rates plus rewards on
/// event transitions, keyed by (event, state, successor).
///
/// CTMC transition rewards are expected to have been folded into state
/// rewards by the caller. All rewards are finite and non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActmcRewards {
    state_rewards: Vec<f64>,
    event_rewards: BTreeMap<String, BTreeMap<usize, BTreeMap<usize, f64>>>,
}

impl ActmcRewards {
    pub fn new(num_states: usize) -> Self {
        Self {
            state_rewards: vec![0.0; num_states],
            event_rewards: BTreeMap::new(),
        }
    }

    fn check(value: f64) -> Result<(), Error> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidModel(format!(
                "rewards must be finite and non-negative, got {value}"
            )));
        }
        Ok(())
    }

    fn check_state(&self, state: usize) -> Result<(), Error> {
        if state >= self.state_rewards.len() {
            return Err(Error::InvalidModel(format!(
                "reward state {state} out of range (model has {} states)",
                self.state_rewards.len()
            )));
        }
        Ok(())
    }

    pub fn set_state_reward(&mut self, state: usize, reward: f64) -> Result<(), Error> {
        Self::check(reward)?;
        self.check_state(state)?;
        self.state_rewards[state] = reward;
        Ok(())
    }

    /// The reward rate of `state`; zero for out-of-range indices.
    pub fn state_reward(&self, state: usize) -> f64 {
        self.state_rewards.get(state).copied().unwrap_or(0.0)
    }

    pub fn num_states(&self) -> usize {
        self.state_rewards.len()
    }

    /// Set the reward earned when `event` fires in `state` and moves the
    /// chain to `successor`.
    pub fn set_event_transition_reward(
        &mut self,
        event: impl Into<String>,
        state: usize,
        successor: usize,
        reward: f64,
    ) -> Result<(), Error> {
        Self::check(reward)?;
        self.check_state(state)?;
        self.check_state(successor)?;
        self.event_rewards
            .entry(event.into())
            .or_default()
            .entry(state)
            .or_default()
            .insert(successor, reward);
        Ok(())
    }

    /// Transition rewards of `event` fired from `state`, keyed by
    /// successor.
    pub fn event_transition_rewards(
        &self,
        event: &str,
        state: usize,
    ) -> Option<&BTreeMap<usize, f64>> {
        self.event_rewards.get(event)?.get(&state)
    }

    pub fn has_transition_rewards(&self) -> bool {
        self.event_rewards
            .values()
            .any(|by_state| by_state.values().any(|m| !m.is_empty()))
    }
}

/// Per-state rewards of the reduced DTMC, same state indexing as the
/// DTMC itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McRewards {
    rewards: Vec<f64>,
}

impl McRewards {
    pub fn new(num_states: usize) -> Self {
        Self {
            rewards: vec![0.0; num_states],
        }
    }

    /// A constant reward on every state.
    pub fn constant(num_states: usize, value: f64) -> Self {
        Self {
            rewards: vec![value; num_states],
        }
    }

    pub fn set_state_reward(&mut self, state: usize, reward: f64) -> Result<(), Error> {
        if state >= self.rewards.len() {
            return Err(Error::InvalidModel(format!(
                "reward state {state} out of range (vector has {} states)",
                self.rewards.len()
            )));
        }
        self.rewards[state] = reward;
        Ok(())
    }

    /// The reward of `state`; zero for out-of-range indices.
    pub fn state_reward(&self, state: usize) -> f64 {
        self.rewards.get(state).copied().unwrap_or(0.0)
    }

    pub fn num_states(&self) -> usize {
        self.rewards.len()
    }

    /// Maximum reward over the given states; zero for an empty set.
    /// Out-of-range members contribute zero.
    pub fn max_over(&self, states: &StateSet) -> f64 {
        states
            .iter()
            .map(|s| self.state_reward(*s))
            .fold(0.0, f64::max)
    }
}
