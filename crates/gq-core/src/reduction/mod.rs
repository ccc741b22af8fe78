//! Reduction of an ACTMC to a numerically equivalent DTMC.
//!
//! The reduction collapses every potato into its per-entrance expected
//! behavior and installs the results into a uniformised DTMC: each
//! entrance's outgoing row becomes its mean exit distribution scaled by
//! the mean rate `1/θ`, and the uniformisation rate is raised where a
//! potato turns over faster than the exponential part of the chain.
//!
//! Companion rewards come in two flavours. Reachability mode produces
//! per-step rewards (scaled by the uniformisation rate) for transient
//! solvers; steady-state mode produces rewards per unit time for mean
//! payoff. In both, an entrance carries the mean reward rate of the whole
//! potato visit, `meanReward/θ`.

mod kappa;

use crate::model::{Actmc, ActmcRewards, Dtmc, McRewards, StateSet};
use crate::potato::Potato;
use gq_common::{Error, Settings};
use gq_math::BigDec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

/// Reduction of one ACTMC (with optional rewards and target set) to an
/// equivalent DTMC plus reward structure.
///
/// The model and reward structure are read-only borrows; the reduction
/// owns its potato map. Results are computed on first request and reused.
#[derive(Debug)]
pub struct ActmcReduction<'a> {
    actmc: &'a Actmc,
    rewards: Option<&'a ActmcRewards>,
    target: StateSet,
    computing_steady_state: bool,
    settings: Settings,

    potatoes: BTreeMap<String, Potato<'a>>,
    relevant: Vec<bool>,
    cancel: Option<&'a AtomicBool>,

    epsilon: BigDec,
    constant_kappa: BigDec,
    kappa_in_effect: Option<BigDec>,

    dtmc: Option<Dtmc>,
    dtmc_rewards: Option<McRewards>,
}

impl<'a> ActmcReduction<'a> {
    /// Build a reduction for the given model.
    ///
    /// `computing_steady_state` selects the reward flavour: true for mean
    /// payoff, false for reachability rewards. Fails fast on invalid
    /// settings, out-of-range targets, or events the reduction path
    /// cannot handle.
    pub fn new(
        actmc: &'a Actmc,
        rewards: Option<&'a ActmcRewards>,
        target: Option<StateSet>,
        computing_steady_state: bool,
        settings: Settings,
    ) -> Result<Self, Error> {
        settings
            .validate()
            .map_err(|e| Error::InvalidSettings(e.to_string()))?;
        let target = target.unwrap_or_default();
        if let Some(max) = target.iter().next_back() {
            if *max >= actmc.num_states() {
                return Err(Error::InvalidModel(format!(
                    "target state {max} out of range (model has {} states)",
                    actmc.num_states()
                )));
            }
        }

        let mut potatoes = BTreeMap::new();
        for event in actmc.events() {
            let potato = Potato::new(actmc, event.id(), rewards, Some(&target))?;
            potatoes.insert(event.id().to_string(), potato);
        }

        let epsilon = BigDec::from_f64(settings.termination_epsilon)
            .map_err(|e| Error::InvalidSettings(e.to_string()))?;
        let constant_kappa = BigDec::allowed_error(settings.constant_kappa_decimal_digits);

        let mut reduction = Self {
            actmc,
            rewards,
            target,
            computing_steady_state,
            settings,
            potatoes,
            relevant: Vec::new(),
            cancel: None,
            epsilon,
            constant_kappa,
            kappa_in_effect: None,
            dtmc: None,
            dtmc_rewards: None,
        };
        reduction.compute_relevant_states();
        Ok(reduction)
    }

    /// The DTMC equivalent to the ACTMC, accurate to the κ in effect.
    pub fn dtmc(&mut self) -> Result<&Dtmc, Error> {
        if self.dtmc.is_none() {
            let built = self.compute_equivalent_dtmc()?;
            self.dtmc = Some(built);
        }
        match self.dtmc.as_ref() {
            Some(d) => Ok(d),
            None => Err(Error::InvalidModel(
                "reduction produced no model".to_string(),
            )),
        }
    }

    /// The reward structure for [`ActmcReduction::dtmc`], in the flavour
    /// selected at construction.
    pub fn dtmc_rewards(&mut self) -> Result<&McRewards, Error> {
        if self.dtmc.is_none() {
            let built = self.compute_equivalent_dtmc()?;
            self.dtmc = Some(built);
        }
        if self.dtmc_rewards.is_none() {
            let rewards = if self.computing_steady_state {
                self.construct_unscaled_rewards()?
            } else {
                let q = match self.dtmc.as_ref() {
                    Some(d) => d.uniformisation_rate(),
                    None => 1.0,
                };
                self.construct_uniformised_rewards(q)?
            };
            self.dtmc_rewards = Some(rewards);
        }
        match self.dtmc_rewards.as_ref() {
            Some(r) => Ok(r),
            None => Err(Error::InvalidModel(
                "reduction produced no rewards".to_string(),
            )),
        }
    }

    /// The κ precision the reduction settled on, once a DTMC has been
    /// produced.
    pub fn kappa(&self) -> Option<&BigDec> {
        self.kappa_in_effect.as_ref()
    }

    /// Install a cooperative cancellation flag, polled at every full
    /// matrix sweep of the transient iterations and the inner solver.
    pub fn set_cancel_flag(&mut self, flag: &'a AtomicBool) {
        self.cancel = Some(flag);
        for potato in self.potatoes.values_mut() {
            potato.set_cancel_flag(flag);
        }
    }

    /// The potato map, for auditability. Forces the reduction.
    pub fn potatoes(&mut self) -> Result<&BTreeMap<String, Potato<'a>>, Error> {
        if self.dtmc.is_none() {
            let built = self.compute_equivalent_dtmc()?;
            self.dtmc = Some(built);
        }
        Ok(&self.potatoes)
    }

    /// Relevance per state: true for pure CTMC states and potato
    /// entrances. Collapsed interior states carry no meaningful values
    /// downstream.
    pub fn relevant_states(&self) -> &[bool] {
        &self.relevant
    }

    /// Audit metadata: per-event entrances, sojourn times, exit
    /// distributions and mean rewards, plus the κ in effect.
    pub fn audit(&mut self) -> Result<ReductionAudit, Error> {
        if self.dtmc.is_none() {
            let built = self.compute_equivalent_dtmc()?;
            self.dtmc = Some(built);
        }
        let mut entries = BTreeMap::new();
        let has_rewards = self.rewards.is_some();
        for (id, potato) in self.potatoes.iter_mut() {
            let entrances: Vec<usize> = potato.entrances().iter().copied().collect();
            let mut theta = BTreeMap::new();
            let mut mean_exit = BTreeMap::new();
            for (entrance, dwell) in potato.mean_times()? {
                theta.insert(*entrance, dwell.sum());
            }
            for (entrance, exit) in potato.mean_distributions()? {
                mean_exit.insert(*entrance, exit.iter().collect::<BTreeMap<usize, f64>>());
            }
            let mean_reward = if has_rewards {
                potato.mean_rewards()?.clone()
            } else {
                BTreeMap::new()
            };
            entries.insert(
                id.clone(),
                PotatoAudit {
                    entrances,
                    theta,
                    mean_exit,
                    mean_reward,
                },
            );
        }
        Ok(ReductionAudit {
            kappa: self
                .kappa_in_effect
                .as_ref()
                .map(|k| k.to_string())
                .unwrap_or_default(),
            potatoes: entries,
        })
    }

    fn compute_relevant_states(&mut self) {
        let n = self.actmc.num_states();
        let mut relevant = vec![true; n];
        let mut entrances = StateSet::new();
        for potato in self.potatoes.values_mut() {
            for s in potato.states() {
                relevant[*s] = false;
            }
            entrances.extend(potato.entrances().iter().copied());
        }
        for s in entrances {
            relevant[s] = true;
        }
        self.relevant = relevant;
    }

    pub(crate) fn relevant_set(&self) -> StateSet {
        self.relevant
            .iter()
            .enumerate()
            .filter_map(|(s, r)| r.then_some(s))
            .collect()
    }

    fn compute_equivalent_dtmc(&mut self) -> Result<Dtmc, Error> {
        let kappa = if self.settings.compute_kappa && !self.potatoes.is_empty() {
            BigDec::min(self.derive_kappa()?, self.constant_kappa.clone())
        } else {
            self.constant_kappa.clone()
        };
        info!(kappa = %kappa, "reduction precision selected");
        self.set_kappa_all(&kappa);
        self.kappa_in_effect = Some(kappa);
        self.construct_uniformised_dtmc()
    }

    pub(crate) fn set_kappa_all(&mut self, kappa: &BigDec) {
        for potato in self.potatoes.values_mut() {
            potato.set_kappa(kappa.clone());
        }
    }

    /// Assemble the equivalent uniformised DTMC from the CTMC projection
    /// and the per-entrance potato results.
    pub(crate) fn construct_uniformised_dtmc(&mut self) -> Result<Dtmc, Error> {
        let mut ctmc = self.actmc.ctmc().clone();
        let mut q = ctmc.max_exit_rate();

        for (id, potato) in self.potatoes.iter_mut() {
            let entrances: Vec<usize> = potato.entrances().iter().copied().collect();
            let mean_times = potato.mean_times()?.clone();
            let mean_exits = potato.mean_distributions()?.clone();
            for entrance in entrances {
                let dwell = mean_times.get(&entrance).ok_or_else(|| {
                    Error::NumericFailure {
                        event: id.clone(),
                        entrance,
                        message: "missing mean sojourn".to_string(),
                    }
                })?;
                let exit = mean_exits.get(&entrance).ok_or_else(|| {
                    Error::NumericFailure {
                        event: id.clone(),
                        entrance,
                        message: "missing exit distribution".to_string(),
                    }
                })?;
                let theta = dwell.sum();
                if !(theta > 0.0) {
                    return Err(Error::NumericFailure {
                        event: id.clone(),
                        entrance,
                        message: format!("non-positive mean sojourn {theta}"),
                    });
                }
                let mean_rate = 1.0 / theta;
                if mean_rate > q {
                    q = mean_rate;
                }
                // The entrance's original row described the chain inside
                // the potato, which has now been collapsed.
                ctmc.set_row(entrance, exit.scaled(mean_rate));
                debug!(event = %id, entrance, theta, "entrance row installed");
            }
        }

        if q <= 0.0 {
            q = 1.0;
        }
        Ok(ctmc.uniformised(q))
    }

    /// Per-step rewards for transient solving: everything scaled by the
    /// uniformisation rate.
    pub(crate) fn construct_uniformised_rewards(&mut self, q: f64) -> Result<McRewards, Error> {
        let mut out = McRewards::new(self.actmc.num_states());
        let Some(rewards) = self.rewards else {
            return Ok(out);
        };
        for s in 0..self.actmc.num_states() {
            let rew = rewards.state_reward(s);
            if rew > 0.0 {
                out.set_state_reward(s, rew / q)?;
            }
        }
        for potato in self.potatoes.values_mut() {
            let mean_times = potato.mean_times()?.clone();
            for (entrance, rew) in potato.mean_rewards()? {
                if *rew > 0.0 {
                    let theta = mean_times
                        .get(entrance)
                        .map(|d| d.sum())
                        .unwrap_or(1.0);
                    out.set_state_reward(*entrance, (rew / theta) / q)?;
                }
            }
        }
        Ok(out)
    }

    /// Rewards per unit time for mean payoff: state rewards unscaled,
    /// entrances carrying the mean reward rate of the potato visit.
    fn construct_unscaled_rewards(&mut self) -> Result<McRewards, Error> {
        let mut out = McRewards::new(self.actmc.num_states());
        let Some(rewards) = self.rewards else {
            return Ok(out);
        };
        for s in 0..self.actmc.num_states() {
            out.set_state_reward(s, rewards.state_reward(s))?;
        }
        for potato in self.potatoes.values_mut() {
            let mean_times = potato.mean_times()?.clone();
            for (entrance, rew) in potato.mean_rewards()? {
                if *rew > 0.0 {
                    let theta = mean_times
                        .get(entrance)
                        .map(|d| d.sum())
                        .unwrap_or(1.0);
                    out.set_state_reward(*entrance, rew / theta)?;
                }
            }
        }
        Ok(out)
    }
}

/// Audit metadata for one potato.
#[derive(Debug, Clone, Serialize)]
pub struct PotatoAudit {
    pub entrances: Vec<usize>,
    /// Expected total sojourn per entrance.
    pub theta: BTreeMap<usize, f64>,
    /// Mean exit distribution per entrance.
    pub mean_exit: BTreeMap<usize, BTreeMap<usize, f64>>,
    /// Mean accumulated reward per entrance (empty without rewards).
    pub mean_reward: BTreeMap<usize, f64>,
}

/// Audit metadata for a whole reduction.
#[derive(Debug, Clone, Serialize)]
pub struct ReductionAudit {
    /// The κ precision in effect, as a decimal string.
    pub kappa: String,
    pub potatoes: BTreeMap<String, PotatoAudit>,
}
