//! End-to-end reduction scenarios.

use gq_common::{Error, Settings};
use gq_core::{
    Actmc, ActmcReduction, ActmcRewards, Ctmc, Event, FiringDistribution, Potato, StateDist,
    StateSet,
};
use gq_math::BigDec;
use std::collections::BTreeMap;

fn fixed_kappa_settings(digits: u32) -> Settings {
    Settings {
        compute_kappa: false,
        constant_kappa_decimal_digits: digits,
        ..Settings::default()
    }
}

fn unit_row(target: usize) -> StateDist {
    [(target, 1.0)].into_iter().collect()
}

/// Scenario 1: one Dirac alarm, one absorbing state.
#[test]
fn single_state_dirac() {
    let mut ctmc = Ctmc::new(2);
    ctmc.add_initial_state(0);
    let event = Event::new(
        "fire",
        FiringDistribution::Dirac { delay: 2.0 },
        StateSet::from([0]),
        BTreeMap::from([(0, unit_row(1))]),
    )
    .unwrap();
    let actmc = Actmc::new(ctmc, vec![event]).unwrap();
    let rewards = ActmcRewards::new(2);

    let mut reduction = ActmcReduction::new(
        &actmc,
        Some(&rewards),
        None,
        false,
        fixed_kappa_settings(10),
    )
    .unwrap();

    let audit = reduction.audit().unwrap();
    let potato = &audit.potatoes["fire"];
    assert_eq!(potato.entrances, vec![0]);
    let theta: f64 = potato.theta[&0];
    assert!((theta - 2.0).abs() < 1e-6, "theta {theta}");
    assert_eq!(potato.mean_exit[&0].len(), 1);
    assert!((potato.mean_exit[&0][&1] - 1.0).abs() < 1e-9);
    assert_eq!(potato.mean_reward[&0], 0.0);

    // The reduced chain: 0 leaves with certainty, 1 absorbs.
    let dtmc = reduction.dtmc().unwrap();
    assert!((dtmc.row(0).get(1) - 1.0).abs() < 1e-6);
    assert!((dtmc.row(1).get(1) - 1.0).abs() < 1e-12);
}

/// Scenario 2: M/D/1/5 queue. The Weibull producer is rejected up
/// front; a Dirac producer reduces to a well-formed chain.
#[test]
fn mdq_weibull_rejected_dirac_reduces() {
    let capacity = 5usize;
    let build = |producer: FiringDistribution| -> Result<Actmc, Error> {
        let mut ctmc = Ctmc::new(capacity + 1);
        // Consumer: exponential service at rate 1.
        for i in 1..=capacity {
            ctmc.set_rate(i, i - 1, 1.0);
        }
        ctmc.add_initial_state(0);
        let active: StateSet = (0..capacity).collect();
        let transitions: BTreeMap<usize, StateDist> =
            (0..capacity).map(|i| (i, unit_row(i + 1))).collect();
        let producer = Event::new("producer", producer, active, transitions)?;
        Actmc::new(ctmc, vec![producer])
    };

    // Weibull cannot be reduced.
    let weibull = build(FiringDistribution::Weibull {
        scale: 1.0,
        shape: 0.5,
    })
    .unwrap();
    let err = ActmcReduction::new(&weibull, None, None, true, fixed_kappa_settings(8))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedDistribution { .. }));

    // Dirac arrivals make the queue tractable.
    let dirac = build(FiringDistribution::Dirac { delay: 1.0 }).unwrap();
    let mut reduction =
        ActmcReduction::new(&dirac, None, None, true, fixed_kappa_settings(8)).unwrap();
    let dtmc = reduction.dtmc().unwrap().clone();

    assert_eq!(dtmc.num_states(), capacity + 1);
    for s in 0..dtmc.num_states() {
        let sum = dtmc.row(s).sum();
        assert!((sum - 1.0).abs() < 1e-7, "row {s} sums to {sum}");
    }

    // Steady-state occupancy of the reduced chain sums to one.
    let n = dtmc.num_states();
    let mut pi = vec![1.0 / n as f64; n];
    let mut next = vec![0.0; n];
    for _ in 0..20_000 {
        dtmc.vm_mult(&pi, &mut next);
        std::mem::swap(&mut pi, &mut next);
    }
    let total: f64 = pi.iter().sum();
    assert!((total - 1.0).abs() < 1e-9, "occupancy sums to {total}");
    for (s, mass) in pi.iter().enumerate() {
        assert!(*mass >= -1e-12, "state {s} has negative occupancy {mass}");
    }
}

/// Scenario 3: both states share a Dirac alarm, plus an exponential
/// transition racing it. The exponential must survive the reduction.
#[test]
fn two_state_race_keeps_exponential_mass() {
    let mut ctmc = Ctmc::new(2);
    ctmc.set_rate(0, 1, 0.5);
    let event = Event::new(
        "swap",
        FiringDistribution::Dirac { delay: 1.0 },
        StateSet::from([0, 1]),
        BTreeMap::from([(0, unit_row(1)), (1, unit_row(0))]),
    )
    .unwrap();
    let actmc = Actmc::new(ctmc, vec![event]).unwrap();

    let mut reduction =
        ActmcReduction::new(&actmc, None, None, false, fixed_kappa_settings(10)).unwrap();
    let dtmc = reduction.dtmc().unwrap();

    // Starting in 0, the chain is still in 0 at the firing time with
    // probability e^(-1/2); the alarm then moves it to 1. Otherwise the
    // exponential already moved it to 1 and the alarm brings it back.
    let stay = (-0.5f64).exp();
    assert!((dtmc.row(0).get(1) - stay).abs() < 1e-6);
    assert!((dtmc.row(0).get(0) - (1.0 - stay)).abs() < 1e-6);
    assert!((dtmc.row(1).get(0) - 1.0).abs() < 1e-6);
}

/// Scenario 4: unit reward on every potato state accrues at unit rate,
/// so the mean accumulated reward equals the mean sojourn.
#[test]
fn reward_conservation() {
    let mut ctmc = Ctmc::new(4);
    ctmc.set_rate(0, 1, 2.0);
    ctmc.set_rate(1, 2, 1.0);
    ctmc.set_rate(2, 3, 0.5);
    ctmc.add_initial_state(0);
    let event = Event::new(
        "alarm",
        FiringDistribution::Dirac { delay: 1.0 },
        StateSet::from([1, 2]),
        BTreeMap::from([(1, unit_row(3)), (2, unit_row(3))]),
    )
    .unwrap();
    let actmc = Actmc::new(ctmc, vec![event]).unwrap();

    let mut rewards = ActmcRewards::new(4);
    rewards.set_state_reward(1, 1.0).unwrap();
    rewards.set_state_reward(2, 1.0).unwrap();

    let mut reduction = ActmcReduction::new(
        &actmc,
        Some(&rewards),
        None,
        true,
        fixed_kappa_settings(10),
    )
    .unwrap();
    let audit = reduction.audit().unwrap();
    let potato = &audit.potatoes["alarm"];
    let theta = potato.theta[&1];
    let mean_reward = potato.mean_reward[&1];
    assert!(
        (mean_reward - theta).abs() < 1e-9,
        "reward {mean_reward} vs sojourn {theta}"
    );

    // Steady-state rewards carry the mean reward rate: one, here.
    let dtmc_rewards = reduction.dtmc_rewards().unwrap();
    assert!((dtmc_rewards.state_reward(1) - 1.0).abs() < 1e-9);
}

/// Scenario 5: the configured digit count clamps κ, and disabling the
/// adaptive derivation uses exactly that constant.
#[test]
fn kappa_clamping() {
    let mut ctmc = Ctmc::new(4);
    ctmc.set_rate(0, 1, 2.0);
    ctmc.set_rate(1, 2, 1.0);
    ctmc.set_rate(2, 3, 0.5);
    ctmc.set_rate(3, 0, 0.25);
    ctmc.add_initial_state(0);
    let event = Event::new(
        "alarm",
        FiringDistribution::Dirac { delay: 1.0 },
        StateSet::from([1, 2]),
        BTreeMap::from([(1, unit_row(3)), (2, unit_row(3))]),
    )
    .unwrap();
    let actmc = Actmc::new(ctmc, vec![event]).unwrap();

    // Disabled adaptive derivation: exactly the constant.
    let mut fixed =
        ActmcReduction::new(&actmc, None, None, false, fixed_kappa_settings(5)).unwrap();
    fixed.dtmc().unwrap();
    assert_eq!(fixed.kappa().unwrap(), &BigDec::allowed_error(5));
    let potatoes = fixed.potatoes().unwrap();
    for potato in potatoes.values() {
        assert_eq!(potato.kappa().unwrap(), &BigDec::allowed_error(5));
    }

    // Adaptive derivation: never looser than the constant.
    let settings = Settings {
        compute_kappa: true,
        constant_kappa_decimal_digits: 5,
        ..Settings::default()
    };
    let mut adaptive = ActmcReduction::new(&actmc, None, None, false, settings).unwrap();
    adaptive.dtmc().unwrap();
    let kappa = adaptive.kappa().unwrap();
    assert!(kappa <= &BigDec::allowed_error(5), "kappa {kappa}");
}

/// A raised cancellation flag interrupts the reduction at the next
/// sweep boundary.
#[test]
fn cancellation_interrupts_reduction() {
    use std::sync::atomic::AtomicBool;

    let mut ctmc = Ctmc::new(2);
    ctmc.set_rate(1, 0, 1.0);
    ctmc.add_initial_state(0);
    let event = Event::new(
        "fire",
        FiringDistribution::Dirac { delay: 2.0 },
        StateSet::from([0]),
        BTreeMap::from([(0, unit_row(1))]),
    )
    .unwrap();
    let actmc = Actmc::new(ctmc, vec![event]).unwrap();

    let flag = AtomicBool::new(true);
    let mut reduction =
        ActmcReduction::new(&actmc, None, None, false, fixed_kappa_settings(10)).unwrap();
    reduction.set_cancel_flag(&flag);
    let err = reduction.dtmc().unwrap_err();
    assert!(matches!(err, Error::Interrupted));
}

/// Scenario 6: truncation residue inside the potato is hidden by the
/// exit renormalisation.
#[test]
fn renormalisation_boundary() {
    let mut ctmc = Ctmc::new(3);
    ctmc.set_rate(0, 1, 8.0);
    ctmc.set_rate(1, 2, 0.125);
    ctmc.add_initial_state(0);
    let event = Event::new(
        "alarm",
        FiringDistribution::Dirac { delay: 3.0 },
        StateSet::from([1]),
        BTreeMap::from([(1, unit_row(2))]),
    )
    .unwrap();
    let actmc = Actmc::new(ctmc, vec![event]).unwrap();

    let kappa = BigDec::allowed_error(12);
    let mut potato = Potato::new(&actmc, "alarm", None, None).unwrap();
    potato.set_kappa(kappa);
    let exits = potato.mean_distributions().unwrap();
    for (entrance, exit) in exits {
        let sum = exit.sum();
        assert!(
            (sum - 1.0).abs() <= 10.0 * 1e-12,
            "entrance {entrance}: exit sums to {sum}"
        );
    }
}
