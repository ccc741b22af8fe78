//! gsmp-quant core: reduction of alarm CTMCs to equivalent DTMCs.
//!
//! An ACTMC is a CTMC in which at most one non-exponential "alarm" event
//! races the exponential transitions in any state. The engine collapses
//! each alarm's active region (its *potato*) into per-entrance expected
//! behavior (sojourn times, exit distributions, accumulated rewards) and
//! stitches the results into a single uniformised DTMC plus reward
//! structure, accurate to a derived error bound κ.
//!
//! The pipeline: model + events → potato state sets → Fox-Glynn weights →
//! potato numerics → reduction assembly → DTMC + rewards.

pub mod model;
pub mod potato;
pub mod reduction;
pub mod solver;

pub use model::{
    Actmc, ActmcRewards, Ctmc, Dtmc, Event, FiringDistribution, McRewards, StateDist, StateSet,
};
pub use potato::{Potato, StepProfile};
pub use reduction::{ActmcReduction, PotatoAudit, ReductionAudit};
pub use solver::compute_reach_rewards;
