//! Per-hash event state machine.
//!
//! ```text
//! Absent ──fire──▶ PendingFire ──held for_duration──▶ Firing
//!   ▲                  │ quiet                          │ ▲ fire
//!   └──────────────────┘                          quiet │ │
//!   ▲                                                   ▼ │
//!   └──────────recover_duration elapsed────────── PendingRecover
//! ```
//!
//! Planning never mutates: [`Lifecycle::plan_fire`] and
//! [`Lifecycle::plan_quiet`] return a [`Plan`], the caller persists the plan's
//! event, and only then applies it with [`Lifecycle::commit`]. A failed
//! persist leaves the state untouched, so replaying the same evaluation is
//! safe.

use n9e_common::types::AlertEvent;
use n9e_storage::store::{Expected, PersistOutcome};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum HashState {
    /// Firing, but not yet for `prom_for_duration`. Memory only.
    PendingFire {
        rule_id: i64,
        first_seen: i64,
        last_eval: i64,
    },
    /// A current row exists; `event` mirrors it.
    Firing { event: AlertEvent },
    /// Quiet since `since`, waiting out `recover_duration`. Memory only.
    PendingRecover { event: AlertEvent, since: i64 },
}

impl HashState {
    pub fn rule_id(&self) -> i64 {
        match self {
            HashState::PendingFire { rule_id, .. } => *rule_id,
            HashState::Firing { event } | HashState::PendingRecover { event, .. } => event.rule_id,
        }
    }

    /// The last persisted firing event, if any.
    pub fn firing_event(&self) -> Option<&AlertEvent> {
        match self {
            HashState::PendingFire { .. } => None,
            HashState::Firing { event } | HashState::PendingRecover { event, .. } => Some(event),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Nothing to persist: waiting on a duration, or nothing was tracked.
    Hold,
    Birth,
    /// Another firing evaluation of a live event. Also cancels a pending
    /// recovery.
    Refresh,
    Recover,
}

/// Decision for one evaluation of one hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub hash: String,
    pub step: Step,
    /// Event to persist for `Birth`, `Refresh` and `Recover`.
    pub event: Option<AlertEvent>,
    /// Whether the persisted event should be handed to the emitter.
    pub notify: bool,
    /// State to keep after a `Hold`; `None` forgets the hash.
    hold: Option<HashState>,
}

impl Plan {
    fn hold(hash: &str, next: Option<HashState>) -> Self {
        Self {
            hash: hash.to_string(),
            step: Step::Hold,
            event: None,
            notify: false,
            hold: next,
        }
    }

    pub fn persists(&self) -> bool {
        self.event.is_some()
    }

    /// The current row this plan was made against. A birth expects none; a
    /// refresh or recovery expects the row it last saw.
    pub fn expected_current(&self) -> Expected {
        match (self.step, &self.event) {
            (Step::Birth, _) => Expected::Absent,
            (Step::Refresh | Step::Recover, Some(event)) => Expected::Current(event.id),
            _ => Expected::Any,
        }
    }
}

/// Repeat suppression for a firing event about to be persisted.
///
/// The first notification of a firing window goes out as soon as the event
/// is not muted. Repeats need a positive `notify_repeat_step`, that many
/// minutes since the last send, and room under `notify_max_number`
/// (0 = unlimited).
pub fn should_notify_fire(event: &AlertEvent, now: i64) -> bool {
    if event.is_muted() {
        return false;
    }
    if event.notify_cur_number == 0 {
        return true;
    }
    if event.notify_repeat_step <= 0 {
        return false;
    }
    if now - event.last_sent_time < event.notify_repeat_step * 60 {
        return false;
    }
    event.notify_max_number == 0 || event.notify_cur_number < event.notify_max_number
}

/// Recoveries are announced only for rules that ask for it, and only if the
/// firing itself was announced.
pub fn should_notify_recovery(event: &AlertEvent) -> bool {
    event.notify_recovered && event.notify_cur_number > 0
}

fn for_duration_held(first_seen: i64, last_eval: i64, eval_interval: i64, for_duration: i64) -> bool {
    last_eval - first_seen + eval_interval >= for_duration
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    states: HashMap<String, HashState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, hash: &str) -> Option<&HashState> {
        self.states.get(hash)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Hashes currently tracked for `rule_id`.
    pub fn hashes_for_rule(&self, rule_id: i64) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.rule_id() == rule_id)
            .map(|(h, _)| h.clone())
            .collect()
    }

    /// Rebuilds `Firing` states from current rows; hashes already tracked
    /// are left alone.
    pub fn restore(&mut self, events: impl IntoIterator<Item = AlertEvent>) -> usize {
        let mut restored = 0;
        for event in events {
            if !self.states.contains_key(&event.hash) {
                self.states
                    .insert(event.hash.clone(), HashState::Firing { event });
                restored += 1;
            }
        }
        restored
    }

    /// Replaces whatever is tracked for `hash` with the persisted truth.
    pub fn resync(&mut self, hash: &str, current: Option<AlertEvent>) {
        match current {
            Some(event) => {
                self.states
                    .insert(hash.to_string(), HashState::Firing { event });
            }
            None => {
                self.states.remove(hash);
            }
        }
    }

    /// Plans a firing evaluation.
    ///
    /// `event` is freshly built from the rule and evaluation, with `status`
    /// already set by the mute gate. `now` is the wall clock used for repeat
    /// suppression.
    pub fn plan_fire(&self, mut event: AlertEvent, now: i64) -> Plan {
        let hash = event.hash.clone();
        let eval_ts = event.last_eval_time;

        let previous = match self.states.get(&hash) {
            None => {
                if event.prom_for_duration > 0
                    && !for_duration_held(eval_ts, eval_ts, event.prom_eval_interval, event.prom_for_duration)
                {
                    return Plan::hold(
                        &hash,
                        Some(HashState::PendingFire {
                            rule_id: event.rule_id,
                            first_seen: eval_ts,
                            last_eval: eval_ts,
                        }),
                    );
                }
                None
            }
            Some(HashState::PendingFire { first_seen, .. }) => {
                let first_seen = *first_seen;
                if !for_duration_held(first_seen, eval_ts, event.prom_eval_interval, event.prom_for_duration) {
                    return Plan::hold(
                        &hash,
                        Some(HashState::PendingFire {
                            rule_id: event.rule_id,
                            first_seen,
                            last_eval: eval_ts,
                        }),
                    );
                }
                None
            }
            Some(HashState::Firing { event: prev }) | Some(HashState::PendingRecover { event: prev, .. }) => {
                Some(prev)
            }
        };

        let step = match previous {
            None => {
                event.first_trigger_time = event.trigger_time;
                event.notify_cur_number = 0;
                event.last_sent_time = 0;
                Step::Birth
            }
            Some(prev) => {
                event.id = prev.id;
                event.first_trigger_time = prev.first_trigger_time;
                event.notify_cur_number = prev.notify_cur_number;
                event.last_sent_time = prev.last_sent_time;
                event.claimant = prev.claimant.clone();
                Step::Refresh
            }
        };

        let notify = should_notify_fire(&event, now);
        if notify {
            event.notify_cur_number += 1;
            event.last_sent_time = now;
        }

        Plan {
            hash,
            step,
            event: Some(event),
            notify,
            hold: None,
        }
    }

    /// Plans a non-firing evaluation at `eval_ts`.
    pub fn plan_quiet(&self, hash: &str, eval_ts: i64) -> Plan {
        let (prev, since) = match self.states.get(hash) {
            None | Some(HashState::PendingFire { .. }) => return Plan::hold(hash, None),
            Some(HashState::Firing { event }) => (event, eval_ts),
            Some(HashState::PendingRecover { event, since }) => (event, *since),
        };

        if prev.recover_duration > 0 && eval_ts - prev.last_eval_time < prev.recover_duration {
            return Plan::hold(
                hash,
                Some(HashState::PendingRecover {
                    event: prev.clone(),
                    since,
                }),
            );
        }

        Plan {
            hash: hash.to_string(),
            step: Step::Recover,
            event: Some(prev.recovered_at(eval_ts)),
            notify: should_notify_recovery(prev),
            hold: None,
        }
    }

    /// Applies a plan after its event was persisted. Returns the event as
    /// stored, with the id assigned by the store.
    pub fn commit(&mut self, plan: Plan, outcome: Option<&PersistOutcome>) -> Option<AlertEvent> {
        let Plan {
            hash,
            step,
            event,
            hold,
            ..
        } = plan;

        match step {
            Step::Hold => {
                match hold {
                    Some(next) => self.states.insert(hash, next),
                    None => self.states.remove(&hash),
                };
                None
            }
            Step::Birth | Step::Refresh => {
                let mut event = event?;
                if let Some(outcome) = outcome {
                    event.id = outcome.id;
                    event.first_trigger_time = outcome.first_trigger_time;
                }
                self.states
                    .insert(hash, HashState::Firing { event: event.clone() });
                Some(event)
            }
            Step::Recover => {
                self.states.remove(&hash);
                let mut event = event?;
                if let Some(outcome) = outcome {
                    event.id = outcome.id;
                }
                Some(event)
            }
        }
    }
}
