//! Alarm CTMCs: a CTMC plus a list of general-distribution events.

use super::{Ctmc, Event, StateDist, StateSet};
use gq_common::Error;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An alarm CTMC: a CTMC together with events carrying general firing
/// distributions.
///
/// At most one non-exponential event (the state's *alarm*) may be active
/// in any state; exponential events are memoryless and are folded into
/// the CTMC rate rows at construction time. The model is immutable once
/// built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actmc {
    ctmc: Ctmc,
    events: Vec<Event>,
    /// Index into `events` of the alarm active in each state.
    alarm_by_state: Vec<Option<usize>>,
}

impl Actmc {
    /// Build and validate an ACTMC.
    ///
    /// Exponential events are converted to CTMC transitions (rate times
    /// successor probability) and dropped from the event list. The
    /// remaining events must have disjoint active sets per state and
    /// in-range state indices.
    pub fn new(mut ctmc: Ctmc, events: Vec<Event>) -> Result<Self, Error> {
        let num_states = ctmc.num_states();
        let mut alarms = Vec::new();
        for event in events {
            Self::check_bounds(&event, num_states)?;
            if let FiringKind::Exponential(rate) = firing_kind(&event) {
                debug!(event = event.id(), rate, "folding exponential event into the CTMC");
                for s in event.active().iter().copied() {
                    if let Some(row) = event.transitions(s) {
                        for (t, p) in row.iter() {
                            ctmc.add_rate(s, t, rate * p);
                        }
                    }
                }
            } else {
                alarms.push(event);
            }
        }

        let mut alarm_by_state = vec![None; num_states];
        for (idx, event) in alarms.iter().enumerate() {
            for s in event.active().iter().copied() {
                if alarm_by_state[s].is_some() {
                    return Err(Error::AlarmOverlap {
                        event: event.id().to_string(),
                        state: s,
                    });
                }
                alarm_by_state[s] = Some(idx);
            }
        }

        Ok(Self {
            ctmc,
            events: alarms,
            alarm_by_state,
        })
    }

    fn check_bounds(event: &Event, num_states: usize) -> Result<(), Error> {
        for s in event.active() {
            if *s >= num_states {
                return Err(Error::InvalidModel(format!(
                    "event {}: active state {s} out of range (model has {num_states} states)",
                    event.id()
                )));
            }
            if let Some(max) = event.transitions(*s).and_then(StateDist::max_state) {
                if max >= num_states {
                    return Err(Error::InvalidModel(format!(
                        "event {}: successor {max} out of range (model has {num_states} states)",
                        event.id()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn num_states(&self) -> usize {
        self.ctmc.num_states()
    }

    /// The underlying CTMC (exponential behavior only; alarm transitions
    /// live in the event list).
    pub fn ctmc(&self) -> &Ctmc {
        &self.ctmc
    }

    /// The alarm events. Exponential events were folded away at
    /// construction.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id() == id)
    }

    /// The alarm active in `state`, if any.
    pub fn active_event(&self, state: usize) -> Option<&Event> {
        self.alarm_by_state[state].map(|idx| &self.events[idx])
    }

    pub fn initial_states(&self) -> &StateSet {
        self.ctmc.initial_states()
    }

    /// Exponential transition row of `state`.
    pub fn transitions(&self, state: usize) -> &StateDist {
        self.ctmc.rates(state)
    }

    pub fn max_exit_rate(&self) -> f64 {
        self.ctmc.max_exit_rate()
    }
}

enum FiringKind {
    Exponential(f64),
    Alarm,
}

fn firing_kind(event: &Event) -> FiringKind {
    match event.distribution() {
        super::FiringDistribution::Exponential { rate } => FiringKind::Exponential(*rate),
        _ => FiringKind::Alarm,
    }
}
