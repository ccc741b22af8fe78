//! Per-event potato analysis.
//!
//! A *potato* is the region of states in which a given alarm event is
//! active. The reduction collapses each potato into per-entrance expected
//! behavior: how long the chain dwells inside, where it exits to, and how
//! much reward it accumulates between entry and exit. Those quantities
//! are computed here by uniformised transient analysis against the
//! alarm's firing distribution.
//!
//! All derived data is computed lazily on first access and invalidated
//! wholesale when the precision κ changes.

mod numerics;
mod profile;

pub use profile::StepProfile;

use crate::model::{Actmc, ActmcRewards, Ctmc, Dtmc, Event, StateDist, StateSet};
use gq_common::Error;
use gq_math::BigDec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Default precision seeding a potato before the reduction assigns a
/// derived κ.
const DEFAULT_KAPPA_DIGITS: u32 = 20;

/// Potato data for one alarm event of an ACTMC.
///
/// The local DTMC uses its own contiguous state indexing; translate with
/// [`Potato::to_local`] and [`Potato::to_global`].
#[derive(Debug)]
pub struct Potato<'a> {
    actmc: &'a Actmc,
    event_index: usize,
    rewards: Option<&'a ActmcRewards>,
    target: StateSet,
    cancel: Option<&'a AtomicBool>,

    kappa: Option<BigDec>,

    states: StateSet,
    entrances: StateSet,
    successors: StateSet,
    states_computed: bool,

    dtmc: Dtmc,
    uniformisation_rate: f64,
    to_local: BTreeMap<usize, usize>,
    to_global: Vec<usize>,
    dtmc_computed: bool,

    profile: Option<StepProfile>,
    profile_computed: bool,

    mean_times: BTreeMap<usize, StateDist>,
    mean_times_computed: bool,

    mean_distributions: BTreeMap<usize, StateDist>,
    mean_distributions_before_event: BTreeMap<usize, StateDist>,
    mean_distributions_computed: bool,

    mean_rewards: BTreeMap<usize, f64>,
    mean_rewards_computed: bool,
}

impl<'a> Potato<'a> {
    /// Build potato data for the event with the given identifier.
    ///
    /// Fails when the event does not exist, when it is exponential (an
    /// ordinary CTMC transition, never a potato), or when its family is
    /// not supported by the reduction path.
    pub fn new(
        actmc: &'a Actmc,
        event_id: &str,
        rewards: Option<&'a ActmcRewards>,
        target: Option<&StateSet>,
    ) -> Result<Self, Error> {
        let event_index = actmc
            .events()
            .iter()
            .position(|e| e.id() == event_id)
            .ok_or_else(|| {
                Error::InvalidModel(format!("model has no event named {event_id}"))
            })?;
        let event = &actmc.events()[event_index];
        if event.distribution().is_exponential() {
            return Err(Error::InvalidPotatoDistribution {
                event: event_id.to_string(),
            });
        }
        if !event.distribution().supports_reduction() {
            return Err(Error::UnsupportedDistribution {
                event: event_id.to_string(),
                family: event.distribution().family().to_string(),
            });
        }
        Ok(Self {
            actmc,
            event_index,
            rewards,
            target: target.cloned().unwrap_or_default(),
            cancel: None,
            kappa: None,
            states: StateSet::new(),
            entrances: StateSet::new(),
            successors: StateSet::new(),
            states_computed: false,
            dtmc: Dtmc::from_rows(Vec::new(), 0.0),
            uniformisation_rate: 0.0,
            to_local: BTreeMap::new(),
            to_global: Vec::new(),
            dtmc_computed: false,
            profile: None,
            profile_computed: false,
            mean_times: BTreeMap::new(),
            mean_times_computed: false,
            mean_distributions: BTreeMap::new(),
            mean_distributions_before_event: BTreeMap::new(),
            mean_distributions_computed: false,
            mean_rewards: BTreeMap::new(),
            mean_rewards_computed: false,
        })
    }

    /// The event this potato belongs to.
    pub fn event(&self) -> &'a Event {
        &self.actmc.events()[self.event_index]
    }

    /// Current precision κ, if one has been assigned.
    pub fn kappa(&self) -> Option<&BigDec> {
        self.kappa.as_ref()
    }

    /// Install a cooperative cancellation flag, polled once per full
    /// matrix sweep of the transient iterations.
    pub fn set_cancel_flag(&mut self, flag: &'a AtomicBool) {
        self.cancel = Some(flag);
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), Error> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Interrupted),
            _ => Ok(()),
        }
    }

    /// Assign a new precision κ and invalidate everything derived from
    /// the old one. State sets and the local DTMC survive; weight tables
    /// and all mean results are wiped in one step.
    pub fn set_kappa(&mut self, kappa: BigDec) {
        debug!(
            event = self.event().id(),
            kappa = %kappa,
            "potato precision changed, invalidating caches"
        );
        self.kappa = Some(kappa);
        self.profile_computed = false;
        self.mean_times_computed = false;
        self.mean_distributions_computed = false;
        self.mean_rewards_computed = false;
    }

    /// Potato states: the event's active set minus reachability targets.
    pub fn states(&mut self) -> &StateSet {
        if !self.states_computed {
            self.compute_states();
        }
        &self.states
    }

    /// States through which the potato can be entered.
    pub fn entrances(&mut self) -> &StateSet {
        if !self.states_computed {
            self.compute_states();
        }
        &self.entrances
    }

    /// States the chain can be in right after leaving the potato.
    pub fn successors(&mut self) -> &StateSet {
        if !self.states_computed {
            self.compute_states();
        }
        &self.successors
    }

    /// The uniformised local DTMC over potato states and successors,
    /// with successors absorbing.
    pub fn potato_dtmc(&mut self) -> &Dtmc {
        if !self.dtmc_computed {
            self.compute_potato_dtmc();
        }
        &self.dtmc
    }

    /// The uniformisation rate of the local DTMC.
    pub fn uniformisation_rate(&mut self) -> f64 {
        if !self.dtmc_computed {
            self.compute_potato_dtmc();
        }
        self.uniformisation_rate
    }

    /// Global-to-local state index map.
    pub fn to_local(&mut self) -> &BTreeMap<usize, usize> {
        if !self.dtmc_computed {
            self.compute_potato_dtmc();
        }
        &self.to_local
    }

    /// Local-to-global state index map.
    pub fn to_global(&mut self) -> &[usize] {
        if !self.dtmc_computed {
            self.compute_potato_dtmc();
        }
        &self.to_global
    }

    /// Expected dwell time per potato state until first leaving the
    /// potato, keyed by entrance. The sum over a value gives the total
    /// expected sojourn θ(entrance).
    pub fn mean_times(&mut self) -> Result<&BTreeMap<usize, StateDist>, Error> {
        if !self.mean_times_computed {
            self.compute_mean_times()?;
        }
        Ok(&self.mean_times)
    }

    /// Expected distribution over successors after leaving the potato,
    /// keyed by entrance.
    pub fn mean_distributions(&mut self) -> Result<&BTreeMap<usize, StateDist>, Error> {
        if !self.mean_distributions_computed {
            self.compute_mean_distributions()?;
        }
        Ok(&self.mean_distributions)
    }

    /// Expected distribution over states at the moment the alarm fires,
    /// keyed by entrance.
    pub fn mean_distributions_before_event(
        &mut self,
    ) -> Result<&BTreeMap<usize, StateDist>, Error> {
        if !self.mean_distributions_computed {
            self.compute_mean_distributions()?;
        }
        Ok(&self.mean_distributions_before_event)
    }

    /// Expected reward accumulated between entering and leaving the
    /// potato, keyed by entrance. Requires a reward structure.
    pub fn mean_rewards(&mut self) -> Result<&BTreeMap<usize, f64>, Error> {
        if !self.mean_rewards_computed {
            self.compute_mean_rewards()?;
        }
        Ok(&self.mean_rewards)
    }

    fn compute_states(&mut self) {
        let actmc = self.actmc;
        let event = &actmc.events()[self.event_index];

        self.states = event.active().clone();
        self.entrances.clear();
        self.successors.clear();

        // Entrances via exponential transitions from outside the potato.
        let mut candidates: Vec<usize> = self.states.iter().copied().collect();
        for s in 0..actmc.num_states() {
            if candidates.is_empty() {
                break;
            }
            let inside = actmc
                .active_event(s)
                .map(|e| e.id() == event.id())
                .unwrap_or(false);
            if inside {
                continue;
            }
            let row = actmc.transitions(s);
            let entrances = &mut self.entrances;
            candidates.retain(|ps| {
                if row.get(*ps) > 0.0 {
                    entrances.insert(*ps);
                    false
                } else {
                    true
                }
            });
        }

        // Entrances via other events' successor distributions.
        for (idx, other) in actmc.events().iter().enumerate() {
            if idx == self.event_index {
                continue;
            }
            for s in other.active().iter().copied() {
                if let Some(row) = other.transitions(s) {
                    for t in row.support() {
                        if self.states.contains(&t) {
                            self.entrances.insert(t);
                        }
                    }
                }
            }
        }

        // Initial states inside the potato are entrances. The initial
        // distribution is consulted as a set.
        for is in actmc.initial_states().iter().copied() {
            if self.states.contains(&is) {
                self.entrances.insert(is);
            }
        }

        // The event's own transitions: self re-entries are entrances, and
        // every event successor is a successor of the potato.
        for ps in self.states.iter().copied() {
            if let Some(row) = event.transitions(ps) {
                for t in row.support() {
                    if self.states.contains(&t) {
                        self.entrances.insert(t);
                    }
                    self.successors.insert(t);
                }
            }
        }

        // Successors via exponential transitions out of the potato.
        for ps in self.states.iter().copied() {
            for t in actmc.transitions(ps).support() {
                if !self.states.contains(&t) {
                    self.successors.insert(t);
                }
            }
        }

        // Targets cannot be absorbed by the potato: move them out and
        // treat them as successors.
        for t in self.target.iter().copied() {
            if self.states.remove(&t) {
                self.entrances.remove(&t);
                self.successors.insert(t);
            }
        }

        debug!(
            event = event.id(),
            states = self.states.len(),
            entrances = self.entrances.len(),
            successors = self.successors.len(),
            "potato state sets computed"
        );
        self.states_computed = true;
    }

    fn compute_potato_dtmc(&mut self) {
        if !self.states_computed {
            self.compute_states();
        }
        let actmc = self.actmc;

        let mut all: StateSet = self.states.clone();
        all.extend(self.successors.iter().copied());

        self.to_local.clear();
        self.to_global.clear();
        for (local, s) in all.iter().copied().enumerate() {
            self.to_local.insert(s, local);
            self.to_global.push(s);
        }

        let mut rate = actmc.max_exit_rate();
        if rate <= 0.0 {
            // A model driven purely by alarms still needs a positive
            // uniformisation rate; the chain then sits still between
            // firings.
            rate = 1.0;
        }
        self.uniformisation_rate = rate;

        let mut local = Ctmc::new(all.len());
        for s in all.iter().copied() {
            let ls = self.to_local[&s];
            if self.states.contains(&s) {
                for (t, r) in actmc.transitions(s).iter() {
                    if let Some(lt) = self.to_local.get(&t) {
                        local.add_rate(ls, *lt, r);
                    }
                }
            } else {
                // Successors absorb.
                local.add_rate(ls, ls, rate);
            }
        }

        self.dtmc = local.uniformised(rate);
        self.dtmc_computed = true;
    }

    pub(crate) fn ensure_profile(&mut self) -> Result<(), Error> {
        if self.profile_computed {
            return Ok(());
        }
        if !self.dtmc_computed {
            self.compute_potato_dtmc();
        }
        if self.kappa.is_none() {
            // No κ preset: fall back to a conservative default.
            self.kappa = Some(BigDec::allowed_error(DEFAULT_KAPPA_DIGITS));
        }
        let kappa = self.kappa.clone().unwrap_or_else(BigDec::one);
        let event = self.event();
        let profile =
            StepProfile::for_event(event, self.uniformisation_rate, &kappa)?;
        debug!(
            event = event.id(),
            left = profile.left(),
            right = profile.right(),
            "step-count profile computed"
        );
        self.profile = Some(profile);
        self.profile_computed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FiringDistribution;

    /// 0 --2.0--> 1 --1.0--> 2 --0.5--> 3, alarm Dirac(1) active in
    /// {1, 2} firing into 3, state 0 initial.
    fn chain_model() -> Actmc {
        let mut ctmc = Ctmc::new(4);
        ctmc.set_rate(0, 1, 2.0);
        ctmc.set_rate(1, 2, 1.0);
        ctmc.set_rate(2, 3, 0.5);
        ctmc.add_initial_state(0);
        let event = Event::new(
            "alarm",
            FiringDistribution::Dirac { delay: 1.0 },
            StateSet::from([1, 2]),
            BTreeMap::from([
                (1, [(3, 1.0)].into_iter().collect()),
                (2, [(3, 1.0)].into_iter().collect()),
            ]),
        )
        .unwrap();
        Actmc::new(ctmc, vec![event]).unwrap()
    }

    #[test]
    fn test_state_classification() {
        let actmc = chain_model();
        let mut potato = Potato::new(&actmc, "alarm", None, None).unwrap();
        assert_eq!(potato.states().clone(), StateSet::from([1, 2]));
        assert_eq!(potato.entrances().clone(), StateSet::from([1]));
        assert_eq!(potato.successors().clone(), StateSet::from([3]));
    }

    #[test]
    fn test_self_reentry_is_entrance() {
        let mut ctmc = Ctmc::new(3);
        ctmc.set_rate(0, 1, 1.0);
        let event = Event::new(
            "cycle",
            FiringDistribution::Dirac { delay: 0.5 },
            StateSet::from([1, 2]),
            BTreeMap::from([
                (1, [(2, 1.0)].into_iter().collect()),
                (2, [(0, 1.0)].into_iter().collect()),
            ]),
        )
        .unwrap();
        let actmc = Actmc::new(ctmc, vec![event]).unwrap();
        let mut potato = Potato::new(&actmc, "cycle", None, None).unwrap();
        // 1 is entered from outside, 2 by the event's own firing.
        assert_eq!(potato.entrances().clone(), StateSet::from([1, 2]));
        // The in-potato firing target counts as a successor too.
        assert_eq!(potato.successors().clone(), StateSet::from([0, 2]));
    }

    #[test]
    fn test_target_inside_potato_becomes_successor() {
        let actmc = chain_model();
        let target = StateSet::from([2]);
        let mut potato = Potato::new(&actmc, "alarm", None, Some(&target)).unwrap();
        assert_eq!(potato.states().clone(), StateSet::from([1]));
        assert_eq!(potato.successors().clone(), StateSet::from([2, 3]));
        assert!(!potato.entrances().contains(&2));
    }

    #[test]
    fn test_potato_dtmc_absorbs_successors() {
        let actmc = chain_model();
        let mut potato = Potato::new(&actmc, "alarm", None, None).unwrap();
        let local_of_3 = potato.to_local()[&3];
        let dtmc = potato.potato_dtmc();
        assert_eq!(dtmc.num_states(), 3);
        assert_eq!(dtmc.row(local_of_3).get(local_of_3), 1.0);
        for s in 0..dtmc.num_states() {
            assert!((dtmc.row(s).sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mean_results() {
        let actmc = chain_model();
        let mut potato = Potato::new(&actmc, "alarm", None, None).unwrap();
        potato.set_kappa(BigDec::allowed_error(10));

        let times = potato.mean_times().unwrap().clone();
        let theta = times[&1].sum();
        // Dwell is capped by the alarm delay of 1.
        assert!(theta > 0.0 && theta <= 1.0 + 1e-9, "theta {theta}");

        let exits = potato.mean_distributions().unwrap();
        let exit = &exits[&1];
        // Every path out of this potato lands in 3.
        assert!((exit.sum() - 1.0).abs() < 1e-9);
        assert!((exit.get(3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_kappa_invalidates() {
        let actmc = chain_model();
        let mut potato = Potato::new(&actmc, "alarm", None, None).unwrap();
        potato.set_kappa(BigDec::allowed_error(6));
        let coarse = potato.mean_times().unwrap()[&1].sum();
        potato.set_kappa(BigDec::allowed_error(12));
        let fine = potato.mean_times().unwrap()[&1].sum();
        // Same quantity at tighter precision: close but recomputed.
        assert!((coarse - fine).abs() < 1e-5);
        assert_eq!(potato.kappa().unwrap(), &BigDec::allowed_error(12));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let mut ctmc = Ctmc::new(2);
        ctmc.set_rate(0, 1, 1.0);
        let actmc = Actmc::new(ctmc, Vec::new()).unwrap();
        let err = Potato::new(&actmc, "missing", None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidModel(_)));
    }

    #[test]
    fn test_weibull_alarm_rejected() {
        let ctmc = Ctmc::new(2);
        let event = Event::new(
            "wear",
            FiringDistribution::Weibull { scale: 1.0, shape: 0.5 },
            StateSet::from([0]),
            BTreeMap::from([(0, [(1, 1.0)].into_iter().collect())]),
        )
        .unwrap();
        let actmc = Actmc::new(ctmc, vec![event]).unwrap();
        let err = Potato::new(&actmc, "wear", None, None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDistribution { .. }));
    }

    #[test]
    fn test_mean_rewards_require_reward_structure() {
        let actmc = chain_model();
        let mut potato = Potato::new(&actmc, "alarm", None, None).unwrap();
        potato.set_kappa(BigDec::allowed_error(8));
        assert!(potato.mean_rewards().is_err());
    }

    #[test]
    fn test_mean_rewards_accumulate_state_rewards() {
        let actmc = chain_model();
        let mut rewards = ActmcRewards::new(4);
        rewards.set_state_reward(1, 1.0).unwrap();
        rewards.set_state_reward(2, 1.0).unwrap();
        let mut potato = Potato::new(&actmc, "alarm", Some(&rewards), None).unwrap();
        potato.set_kappa(BigDec::allowed_error(10));

        let theta = potato.mean_times().unwrap()[&1].sum();
        let mean_rew = potato.mean_rewards().unwrap()[&1];
        // Unit reward on every potato state accrues at unit rate while
        // inside, so the mean reward matches the mean sojourn.
        assert!((mean_rew - theta).abs() < 1e-9, "{mean_rew} vs {theta}");
    }
}
