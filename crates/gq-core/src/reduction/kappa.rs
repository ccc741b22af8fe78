//! Two-stage adaptive derivation of the per-potato precision κ.
//!
//! Stage 1 probes a seed reduction for the smallest transition
//! probability and largest reward among relevant states, and turns those
//! into coarse per-quantity precisions κ_steps and κ_TR via worst-case
//! bounds on expected step counts and total reward. Stage 2 rebuilds the
//! chain at those precisions and harvests tight empirical bounds by
//! solving reach-rewards from every relevant state treated transiently as
//! a target. The final κ guarantees ε-accuracy of downstream results.

use super::ActmcReduction;
use crate::model::McRewards;
use crate::solver::compute_reach_rewards;
use gq_common::Error;
use gq_math::{BigDec, MathCtx};
use tracing::{debug, info};

/// Coarse first-stage accuracy, 0.1 exactly.
fn pre_epsilon() -> BigDec {
    BigDec::allowed_error(1)
}

/// Seed precision for the structure probe.
const SEED_KAPPA_DIGITS: u32 = 20;

impl ActmcReduction<'_> {
    /// Derive κ such that model checking on the reduced DTMC is accurate
    /// within the termination ε.
    pub(super) fn derive_kappa(&mut self) -> Result<BigDec, Error> {
        let num_states = self.actmc.num_states();
        let non_target = num_states - self.target.len();
        if non_target == 0 {
            // Every state is a target; precision is irrelevant.
            return Ok(self.constant_kappa.clone());
        }
        let n = BigDec::from_int(non_target as i64);
        let one = BigDec::one();
        let two = BigDec::from_int(2);
        let pre_eps = pre_epsilon();

        // Stage 1: coarse per-quantity precisions from a structure probe.
        let (min_prob, probed_max_rew) = self.probe_min_prob_max_rew()?;
        let mut max_rew = if self.rewards.is_some() {
            probed_max_rew
        } else {
            0.0
        };
        if max_rew == 0.0 {
            max_rew = 1.0;
        }
        let base_kappa_one = from_f64(min_prob / 2.0)?;
        let base_kappa_two = from_f64((min_prob / 2.0).min(max_rew))?;

        let mc = MathCtx::half_up(saturating_digits(
            3 + base_kappa_one.decimal_digits() as u64 * non_target as u64 * 2,
        ));
        let max_expected_steps = n
            .div(&base_kappa_one.pow_int(non_target as u64, mc), mc)
            .map_err(numeric)?;
        let max_expected_tr = max_expected_steps.mul(&from_f64(max_rew)?);
        let mc = MathCtx::half_up(saturating_digits(
            mc.digits as u64 * 2 + max_rew as u64,
        ));

        let b = one
            .div(&two.mul(&max_expected_steps).mul(&n), mc)
            .map_err(numeric)?;
        let kappa_steps = {
            let c = pre_eps
                .div(
                    &two.mul(&max_expected_steps)
                        .mul(&max_expected_steps.mul(&n).add(&one)),
                    mc,
                )
                .map_err(numeric)?;
            BigDec::min(base_kappa_one.clone(), BigDec::min(b.clone(), c))
        };
        let kappa_tr = {
            let c = pre_eps
                .div(
                    &two.mul(&max_expected_steps)
                        .mul(&max_expected_tr.mul(&n).add(&one)),
                    mc,
                )
                .map_err(numeric)?;
            BigDec::min(base_kappa_two, BigDec::min(b, c))
        };
        debug!(
            kappa_steps = %kappa_steps,
            kappa_tr = %kappa_tr,
            "stage-1 precisions derived"
        );

        // Stage 2a: tight empirical bounds on expected time and steps.
        self.set_kappa_all(&kappa_steps);
        let steps_dtmc = self.construct_uniformised_dtmc()?;
        let steps_rewards = McRewards::constant(
            steps_dtmc.num_states(),
            1.0 / steps_dtmc.uniformisation_rate(),
        );
        let pre_eps_f64 = 0.1;
        let mut min_time: Option<BigDec> = None;
        let mut max_time: Option<BigDec> = None;
        let mut working_target = self.target.clone();
        let relevant = self.relevant_set();
        for s in relevant.iter().copied() {
            let already_target = !working_target.insert(s);
            let soln = compute_reach_rewards(
                &steps_dtmc,
                &steps_rewards,
                &working_target,
                self.settings.solver,
                pre_eps_f64,
                self.settings.max_solver_iterations,
                self.cancel,
            )?;
            if !already_target {
                working_target.remove(&s);
            }
            let (mn, mx) = self.find_min_max(&soln);
            if let Some(mn) = mn {
                let adjusted = from_f64(mn)?.sub(&pre_eps);
                min_time = Some(match min_time {
                    Some(cur) => BigDec::min(cur, adjusted),
                    None => adjusted,
                });
            }
            if let Some(mx) = mx {
                let adjusted = from_f64(mx)?.add(&pre_eps);
                max_time = Some(match max_time {
                    Some(cur) => BigDec::max(cur, adjusted),
                    None => adjusted,
                });
            }
        }
        let min_time = min_time.unwrap_or_else(BigDec::one);
        let max_time = max_time.unwrap_or_else(BigDec::one);
        let max_steps = max_time
            .mul(&from_f64(steps_dtmc.uniformisation_rate())?)
            .round(mc);

        // Stage 2b: tight empirical bound on expected total reward.
        self.set_kappa_all(&kappa_tr);
        let tr_dtmc = self.construct_uniformised_dtmc()?;
        let tr_rewards = self.construct_uniformised_rewards(tr_dtmc.uniformisation_rate())?;
        let mut max_tr: Option<BigDec> = None;
        for s in relevant.iter().copied() {
            let already_target = !working_target.insert(s);
            let soln = compute_reach_rewards(
                &tr_dtmc,
                &tr_rewards,
                &working_target,
                self.settings.solver,
                pre_eps_f64,
                self.settings.max_solver_iterations,
                self.cancel,
            )?;
            if !already_target {
                working_target.remove(&s);
            }
            let (_, mx) = self.find_min_max(&soln);
            if let Some(mx) = mx {
                let adjusted = from_f64(mx)?.add(&pre_eps);
                max_tr = Some(match max_tr {
                    Some(cur) => BigDec::max(cur, adjusted),
                    None => adjusted,
                });
            }
        }
        let max_tr = max_tr.unwrap_or_else(BigDec::one);
        debug!(
            min_time = %min_time,
            max_time = %max_time,
            max_steps = %max_steps,
            max_tr = %max_tr,
            "stage-2 empirical bounds harvested"
        );

        // Combine into the final precision for the selected mode.
        let kappa = if self.computing_steady_state {
            let w_max = BigDec::max(max_tr, max_time);
            let eps_over_n = self.epsilon.div(&n, mc).map_err(numeric)?;
            let a = min_time.mul(&min_time).round(mc).mul(&eps_over_n).round(mc);
            let b = w_max
                .mul(&eps_over_n.add(&two))
                .round(mc)
                .mul(&n.mul(&w_max).round(mc).add(&one))
                .round(mc);
            let a_div_b = a.div(&b, mc).map_err(numeric)?;
            BigDec::min(a_div_b, BigDec::min(kappa_steps, kappa_tr))
        } else {
            let a = one
                .div(&two.mul(&n).mul(&max_steps), mc)
                .map_err(numeric)?;
            let b = self
                .epsilon
                .div(
                    &two.mul(&max_steps).mul(&max_tr.mul(&n).add(&one)),
                    mc,
                )
                .map_err(numeric)?;
            BigDec::min(kappa_steps, BigDec::min(kappa_tr, BigDec::min(a, b)))
        };

        // Scale by the termination epsilon for additional headroom.
        let kappa = kappa.mul(&self.epsilon).round(mc);
        info!(kappa = %kappa, "adaptive precision derived");
        Ok(kappa)
    }

    /// Probe the reduced chain at a seed precision for the smallest
    /// transition probability and the largest state reward over relevant
    /// non-target states, widened by the seed precision itself.
    fn probe_min_prob_max_rew(&mut self) -> Result<(f64, f64), Error> {
        let seed = BigDec::allowed_error(SEED_KAPPA_DIGITS);
        let seed_f64 = seed.to_f64();
        self.set_kappa_all(&seed);

        let dtmc = self.construct_uniformised_dtmc()?;
        let rewards = self.construct_uniformised_rewards(dtmc.uniformisation_rate())?;

        let mut probe_states = self.relevant_set();
        for t in &self.target {
            probe_states.remove(t);
        }
        let min_prob = dtmc.min_transition_probability(&probe_states) + seed_f64;
        let max_rew = rewards.max_over(&probe_states) + seed_f64;
        debug!(min_prob, max_rew, "structure probe complete");
        Ok((min_prob, max_rew))
    }

    /// Minimum positive and maximum element over relevant states, with
    /// degenerate results (empty, zero, infinite) mapped to `None`.
    fn find_min_max(&self, values: &[f64]) -> (Option<f64>, Option<f64>) {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        for (s, value) in values.iter().enumerate() {
            if !self.relevant[s] {
                continue;
            }
            if max.map_or(true, |m| *value > m) {
                max = Some(*value);
            }
            if *value > 0.0 && min.map_or(true, |m| *value < m) {
                min = Some(*value);
            }
        }
        let min = min.filter(|v| v.is_finite());
        let max = max.filter(|v| v.is_finite() && *v > 0.0);
        (min, max)
    }
}

fn from_f64(value: f64) -> Result<BigDec, Error> {
    BigDec::from_f64(value).map_err(numeric)
}

fn numeric(err: gq_math::DecimalError) -> Error {
    Error::NumericFailure {
        event: "kappa-derivation".to_string(),
        entrance: 0,
        message: err.to_string(),
    }
}

/// Derived precisions are clamped to one million digits.
fn saturating_digits(digits: u64) -> u32 {
    digits.min(1_000_000) as u32
}
