//! Reach-reward solving for DTMCs.
//!
//! The κ-derivation probes the reduced chain by solving expected
//! accumulated reward until reaching a target set, once per relevant
//! state. Gauss–Seidel is the reliability choice; a plain power method is
//! kept for cross-checking.
//!
//! States that do not reach the target with probability one have infinite
//! expected reward; they are identified by graph analysis up front and
//! pinned to `+inf`, which the caller filters.

use crate::model::{Dtmc, McRewards, StateSet};
use gq_common::{Error, SolverKind};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Solve `x = rewards + P·x` with `x = 0` on the target set.
///
/// `epsilon` is the relative convergence threshold on the largest change
/// per sweep. The optional `cancel` flag is polled once per sweep.
/// Returns `Unsolvable` when the iteration cap is exhausted.
pub fn compute_reach_rewards(
    dtmc: &Dtmc,
    rewards: &McRewards,
    target: &StateSet,
    solver: SolverKind,
    epsilon: f64,
    max_iterations: usize,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<f64>, Error> {
    let n = dtmc.num_states();
    let mut x = vec![0.0; n];

    // Probability-1 precomputation: a state whose paths can avoid the
    // target forever accumulates reward forever.
    let reaches_target = backward_reachable(dtmc, target);
    let missing: StateSet = (0..n).filter(|s| !reaches_target[*s]).collect();
    let divergent = backward_reachable(dtmc, &missing);
    let mut solve = vec![false; n];
    for s in 0..n {
        if target.contains(&s) {
            x[s] = 0.0;
        } else if divergent[s] {
            x[s] = f64::INFINITY;
        } else {
            solve[s] = true;
        }
    }

    match solver {
        SolverKind::GaussSeidel => {
            gauss_seidel(dtmc, rewards, &solve, &mut x, epsilon, max_iterations, cancel)?
        }
        SolverKind::Power => {
            power(dtmc, rewards, &solve, &mut x, epsilon, max_iterations, cancel)?
        }
    }
    Ok(x)
}

fn check_cancelled(cancel: Option<&AtomicBool>) -> Result<(), Error> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Interrupted),
        _ => Ok(()),
    }
}

/// States from which `set` is reachable (members included).
fn backward_reachable(dtmc: &Dtmc, set: &StateSet) -> Vec<bool> {
    let n = dtmc.num_states();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for s in 0..n {
        for (t, p) in dtmc.row(s).iter() {
            if p > 0.0 {
                predecessors[t].push(s);
            }
        }
    }
    let mut reached = vec![false; n];
    let mut queue: Vec<usize> = Vec::new();
    for s in set {
        if !reached[*s] {
            reached[*s] = true;
            queue.push(*s);
        }
    }
    while let Some(t) = queue.pop() {
        for s in &predecessors[t] {
            if !reached[*s] {
                reached[*s] = true;
                queue.push(*s);
            }
        }
    }
    reached
}

#[allow(clippy::too_many_arguments)]
fn gauss_seidel(
    dtmc: &Dtmc,
    rewards: &McRewards,
    solve: &[bool],
    x: &mut [f64],
    epsilon: f64,
    max_iterations: usize,
    cancel: Option<&AtomicBool>,
) -> Result<(), Error> {
    let n = dtmc.num_states();
    for iteration in 0..max_iterations {
        check_cancelled(cancel)?;
        let mut max_delta: f64 = 0.0;
        for s in 0..n {
            if !solve[s] {
                continue;
            }
            let mut acc = rewards.state_reward(s);
            let mut self_prob = 0.0;
            for (t, p) in dtmc.row(s).iter() {
                if t == s {
                    self_prob = p;
                } else {
                    acc += p * x[t];
                }
            }
            let denom = 1.0 - self_prob;
            let new = if denom > 0.0 { acc / denom } else { f64::INFINITY };
            max_delta = max_delta.max(relative_delta(x[s], new));
            x[s] = new;
        }
        trace!(iteration, max_delta, "gauss-seidel sweep");
        if max_delta <= epsilon {
            debug!(iterations = iteration + 1, "reach-reward solver converged");
            return Ok(());
        }
    }
    Err(Error::Unsolvable {
        iterations: max_iterations,
    })
}

#[allow(clippy::too_many_arguments)]
fn power(
    dtmc: &Dtmc,
    rewards: &McRewards,
    solve: &[bool],
    x: &mut [f64],
    epsilon: f64,
    max_iterations: usize,
    cancel: Option<&AtomicBool>,
) -> Result<(), Error> {
    let n = dtmc.num_states();
    let mut next = x.to_vec();
    for iteration in 0..max_iterations {
        check_cancelled(cancel)?;
        let mut max_delta: f64 = 0.0;
        for s in 0..n {
            if !solve[s] {
                continue;
            }
            let mut acc = rewards.state_reward(s);
            for (t, p) in dtmc.row(s).iter() {
                acc += p * x[t];
            }
            max_delta = max_delta.max(relative_delta(x[s], acc));
            next[s] = acc;
        }
        x.copy_from_slice(&next);
        if max_delta <= epsilon {
            debug!(iterations = iteration + 1, "reach-reward solver converged");
            return Ok(());
        }
    }
    Err(Error::Unsolvable {
        iterations: max_iterations,
    })
}

fn relative_delta(old: f64, new: f64) -> f64 {
    if old == new {
        return 0.0;
    }
    let diff = (new - old).abs();
    if new.abs() > 1e-300 {
        diff / new.abs()
    } else {
        diff
    }
}
