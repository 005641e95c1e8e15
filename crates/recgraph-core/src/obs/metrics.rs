use serde::{Deserialize, Serialize};
use std::{cell::RefCell, cmp::Ordering, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for record-graph operations.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub models: BTreeMap<String, ModelCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Server data
    pub pushes: u64,
    pub keys_changed: u64,

    // Local edits
    pub local_writes: u64,
    pub rollbacks: u64,
    pub keys_rolled_back: u64,

    // Commit lifecycle
    pub commits_started: u64,
    pub commits_confirmed: u64,
    pub commits_rejected: u64,

    // Nested records
    pub children_reified: u64,
    pub children_destroyed: u64,
    pub unloads: u64,

    // Resolution cache
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub invalidations: u64,

    // Observers
    pub notifications: u64,
    pub keys_notified: u64,
}

///
/// ModelCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ModelCounters {
    pub pushes: u64,
    pub local_writes: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub reified: u64,
    pub unloads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow event state immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow event state mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: Option<EventState>,

    /// Per-model counters, most cache misses first.
    pub model_counters: Vec<ModelSummary>,
}

///
/// ModelSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ModelSummary {
    pub model_name: String,
    pub pushes: u64,
    pub local_writes: u64,
    pub commits: u64,
    pub unloads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

/// Build a report from in-memory counters.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let mut model_counters: Vec<ModelSummary> = snap
        .models
        .iter()
        .map(|(model_name, ops)| {
            let lookups = ops.cache_hits.saturating_add(ops.cache_misses);
            let cache_hit_rate = if lookups > 0 {
                ops.cache_hits as f64 / lookups as f64
            } else {
                0.0
            };

            ModelSummary {
                model_name: model_name.clone(),
                pushes: ops.pushes,
                local_writes: ops.local_writes,
                commits: ops.commits,
                unloads: ops.unloads,
                cache_hits: ops.cache_hits,
                cache_misses: ops.cache_misses,
                cache_hit_rate,
            }
        })
        .collect();

    model_counters.sort_by(|a, b| match b.cache_misses.cmp(&a.cache_misses) {
        Ordering::Equal => a.model_name.cmp(&b.model_name),
        other => other,
    });

    EventReport {
        counters: Some(snap),
        model_counters,
    }
}

///
/// TESTS
///
