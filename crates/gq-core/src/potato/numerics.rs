//! Transient computations over the potato DTMC.
//!
//! Three quantities per entrance, all driven by the step-count profile of
//! the alarm's firing distribution:
//!
//! 1. mean dwell time per potato state (time-profile weights, forward
//!    distribution evolution),
//! 2. exit distribution over successors, together with the distribution
//!    at the moment the alarm fires,
//! 3. mean accumulated reward (time-profile weights, backward reward
//!    pull, plus event-transition rewards).
//!
//! Iterations below the profile's left truncation point contribute
//! `v_i / q` with unit coefficient. Tiny negative entries from float
//! noise are absolute-valued on output, and exit distributions are
//! renormalised over the successors; both residuals are bounded by the
//! κ in effect.

use super::Potato;
use crate::model::StateDist;
use gq_common::Error;
use tracing::debug;

impl Potato<'_> {
    pub(super) fn compute_mean_times(&mut self) -> Result<(), Error> {
        self.ensure_profile()?;
        let Some(profile) = self.profile.clone() else {
            return Ok(());
        };
        let q = self.uniformisation_rate;
        let weights = profile.time_profile(q);
        let (left, right) = (profile.left(), profile.right());
        let num_states = self.dtmc.num_states();

        self.mean_times.clear();
        let entrances: Vec<usize> = self.entrances.iter().copied().collect();
        for entrance in entrances {
            let mut soln = vec![0.0; num_states];
            let mut soln2 = vec![0.0; num_states];
            let mut result = vec![0.0; num_states];
            soln[self.to_local[&entrance]] = 1.0;

            // Step 0 needs no matrix power.
            if left == 0 {
                for i in 0..num_states {
                    result[i] += weights[0] * soln[i];
                }
            } else {
                for i in 0..num_states {
                    result[i] += soln[i] / q;
                }
            }

            for iters in 1..=right {
                self.check_cancelled()?;
                self.dtmc.vm_mult(&soln, &mut soln2);
                std::mem::swap(&mut soln, &mut soln2);
                if iters >= left {
                    for i in 0..num_states {
                        result[i] += weights[iters - left] * soln[i];
                    }
                } else {
                    for i in 0..num_states {
                        result[i] += soln[i] / q;
                    }
                }
            }

            let mut dwell = StateDist::new();
            for ps in self.states.iter().copied() {
                let time = result[self.to_local[&ps]];
                if time != 0.0 {
                    dwell.set(ps, time.abs());
                }
            }
            debug!(
                event = self.event().id(),
                entrance,
                theta = dwell.sum(),
                "mean sojourn computed"
            );
            self.mean_times.insert(entrance, dwell);
        }
        self.mean_times_computed = true;
        Ok(())
    }

    pub(super) fn compute_mean_distributions(&mut self) -> Result<(), Error> {
        self.ensure_profile()?;
        let Some(profile) = self.profile.clone() else {
            return Ok(());
        };
        let probs = profile.probs().to_vec();
        let (left, right) = (profile.left(), profile.right());
        let num_states = self.dtmc.num_states();
        let event = self.event();

        self.mean_distributions.clear();
        self.mean_distributions_before_event.clear();
        let entrances: Vec<usize> = self.entrances.iter().copied().collect();
        for entrance in entrances {
            let mut soln = vec![0.0; num_states];
            let mut soln2 = vec![0.0; num_states];
            let mut result = vec![0.0; num_states];
            soln[self.to_local[&entrance]] = 1.0;

            if left == 0 {
                for i in 0..num_states {
                    result[i] += probs[0] * soln[i];
                }
            }

            // Evolve the distribution up to the firing time.
            for iters in 1..=right {
                self.check_cancelled()?;
                self.dtmc.vm_mult(&soln, &mut soln2);
                std::mem::swap(&mut soln, &mut soln2);
                if iters >= left {
                    for i in 0..num_states {
                        result[i] += probs[iters - left] * soln[i];
                    }
                }
            }

            let mut before_event = StateDist::new();
            for (i, mass) in result.iter().enumerate() {
                if *mass != 0.0 {
                    before_event.set(self.to_global[i], *mass);
                }
            }
            self.mean_distributions_before_event
                .insert(entrance, before_event);

            // Mass still inside the potato when the alarm fires moves
            // through the event's transition distribution.
            let at_firing = result.clone();
            for ps in self.states.iter().copied() {
                result[self.to_local[&ps]] = 0.0;
            }
            for ps in self.states.iter().copied() {
                let mass = at_firing[self.to_local[&ps]];
                if mass > 0.0 {
                    if let Some(row) = event.transitions(ps) {
                        for (succ, p) in row.iter() {
                            result[self.to_local[&succ]] += mass * p;
                        }
                    }
                }
            }

            // Renormalise over the successors; truncation leaves the sum
            // short of one by at most κ.
            let mut prob_sum = 0.0;
            for succ in self.successors.iter().copied() {
                prob_sum += result[self.to_local[&succ]];
            }
            if prob_sum <= 0.0 {
                return Err(Error::NumericFailure {
                    event: event.id().to_string(),
                    entrance,
                    message: "exit distribution lost all probability mass".to_string(),
                });
            }
            let mut exit = StateDist::new();
            for succ in self.successors.iter().copied() {
                let p = result[self.to_local[&succ]];
                if p != 0.0 {
                    exit.set(succ, p.abs() / prob_sum);
                }
            }
            self.mean_distributions.insert(entrance, exit);
        }
        self.mean_distributions_computed = true;
        Ok(())
    }

    pub(super) fn compute_mean_rewards(&mut self) -> Result<(), Error> {
        if !self.mean_distributions_computed {
            self.compute_mean_distributions()?;
        }
        let Some(rewards) = self.rewards else {
            return Err(Error::InvalidModel(format!(
                "mean rewards of event {} requested without a reward structure",
                self.event().id()
            )));
        };
        let Some(profile) = self.profile.clone() else {
            return Ok(());
        };
        let q = self.uniformisation_rate;
        let weights = profile.time_profile(q);
        let (left, right) = (profile.left(), profile.right());
        let num_states = self.dtmc.num_states();

        // One backward pass serves every entrance: the solution vector
        // holds expected accumulated reward from each start state.
        let mut soln = vec![0.0; num_states];
        let mut soln2 = vec![0.0; num_states];
        let mut result = vec![0.0; num_states];
        for (i, value) in soln.iter_mut().enumerate() {
            let global = self.to_global[i];
            if self.states.contains(&global) {
                *value = rewards.state_reward(global);
            }
        }

        if left == 0 {
            for i in 0..num_states {
                result[i] += weights[0] * soln[i];
            }
        } else {
            for i in 0..num_states {
                result[i] += soln[i] / q;
            }
        }

        for iters in 1..=right {
            self.check_cancelled()?;
            self.dtmc.mv_mult(&soln, &mut soln2);
            std::mem::swap(&mut soln, &mut soln2);
            if iters >= left {
                for i in 0..num_states {
                    result[i] += weights[iters - left] * soln[i];
                }
            } else {
                for i in 0..num_states {
                    result[i] += soln[i] / q;
                }
            }
        }

        // The iteration covers the underlying CTMC behavior only; the
        // alarm's own transition rewards are applied on top.
        self.apply_event_rewards(&mut result)?;

        self.mean_rewards.clear();
        let entrances: Vec<usize> = self.entrances.iter().copied().collect();
        for entrance in entrances {
            let value = result[self.to_local[&entrance]];
            self.mean_rewards.insert(entrance, value.abs());
        }
        self.mean_rewards_computed = true;
        Ok(())
    }

    /// Add the event-transition rewards to a locally indexed reward
    /// vector: each reward is weighted by the probability of sitting in
    /// its source state when the alarm fires, and by the transition's own
    /// probability.
    fn apply_event_rewards(&self, result: &mut [f64]) -> Result<(), Error> {
        let Some(rewards) = self.rewards else {
            return Ok(());
        };
        let event = self.event();
        if !rewards.has_transition_rewards() {
            return Ok(());
        }
        for entrance in self.entrances.iter().copied() {
            let Some(before_event) = self.mean_distributions_before_event.get(&entrance)
            else {
                continue;
            };
            for ps in self.states.iter().copied() {
                let Some(rews) = rewards.event_transition_rewards(event.id(), ps) else {
                    continue;
                };
                let Some(row) = event.transitions(ps) else {
                    continue;
                };
                let weight = before_event.get(ps);
                for (succ, event_rew) in rews {
                    let prob = row.get(*succ);
                    result[self.to_local[&entrance]] += prob * weight * event_rew;
                }
            }
        }
        Ok(())
    }
}
