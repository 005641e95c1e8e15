//! Record event sink boundary.
//!
//! Graph logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through RecordEvent and RecordSink.
//!
//! This module is the only bridge between graph operations and the global
//! event state.
use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn RecordSink>>> = RefCell::new(None);
}

///
/// CommitPhase
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum CommitPhase {
    Confirmed,
    Rejected,
    Started,
}

///
/// RecordEvent
///
/// `model_name` is the model of the record or facade the event concerns.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum RecordEvent<'a> {
    CacheHit {
        model_name: &'a str,
    },
    CacheMiss {
        model_name: &'a str,
    },
    ChildDestroyed {
        model_name: &'a str,
    },
    ChildReified {
        model_name: &'a str,
    },
    Commit {
        model_name: &'a str,
        phase: CommitPhase,
    },
    Invalidated {
        model_name: &'a str,
        keys: u64,
    },
    LocalWrite {
        model_name: &'a str,
    },
    Notified {
        model_name: &'a str,
        keys: u64,
    },
    Push {
        model_name: &'a str,
        changed: u64,
    },
    Rollback {
        model_name: &'a str,
        keys: u64,
    },
    Unload {
        model_name: &'a str,
    },
}

impl RecordEvent<'_> {
    #[must_use]
    pub const fn model_name(&self) -> &str {
        match self {
            Self::CacheHit { model_name }
            | Self::CacheMiss { model_name }
            | Self::ChildDestroyed { model_name }
            | Self::ChildReified { model_name }
            | Self::Commit { model_name, .. }
            | Self::Invalidated { model_name, .. }
            | Self::LocalWrite { model_name }
            | Self::Notified { model_name, .. }
            | Self::Push { model_name, .. }
            | Self::Rollback { model_name, .. }
            | Self::Unload { model_name } => model_name,
        }
    }
}

///
/// RecordSink
///

pub trait RecordSink {
    fn record(&self, event: RecordEvent<'_>);
}

/// GlobalRecordSink
/// Default sink that writes into the thread-local event state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalRecordSink;

impl RecordSink for GlobalRecordSink {
    fn record(&self, event: RecordEvent<'_>) {
        metrics::with_state_mut(|m| {
            let ops = &mut m.ops;
            match event {
                RecordEvent::CacheHit { .. } => ops.cache_hits = ops.cache_hits.saturating_add(1),
                RecordEvent::CacheMiss { .. } => {
                    ops.cache_misses = ops.cache_misses.saturating_add(1);
                }
                RecordEvent::ChildDestroyed { .. } => {
                    ops.children_destroyed = ops.children_destroyed.saturating_add(1);
                }
                RecordEvent::ChildReified { .. } => {
                    ops.children_reified = ops.children_reified.saturating_add(1);
                }
                RecordEvent::Commit { phase, .. } => match phase {
                    CommitPhase::Confirmed => {
                        ops.commits_confirmed = ops.commits_confirmed.saturating_add(1);
                    }
                    CommitPhase::Rejected => {
                        ops.commits_rejected = ops.commits_rejected.saturating_add(1);
                    }
                    CommitPhase::Started => {
                        ops.commits_started = ops.commits_started.saturating_add(1);
                    }
                },
                RecordEvent::Invalidated { keys, .. } => {
                    ops.invalidations = ops.invalidations.saturating_add(keys);
                }
                RecordEvent::LocalWrite { .. } => {
                    ops.local_writes = ops.local_writes.saturating_add(1);
                }
                RecordEvent::Notified { keys, .. } => {
                    ops.notifications = ops.notifications.saturating_add(1);
                    ops.keys_notified = ops.keys_notified.saturating_add(keys);
                }
                RecordEvent::Push { changed, .. } => {
                    ops.pushes = ops.pushes.saturating_add(1);
                    ops.keys_changed = ops.keys_changed.saturating_add(changed);
                }
                RecordEvent::Rollback { keys, .. } => {
                    ops.rollbacks = ops.rollbacks.saturating_add(1);
                    ops.keys_rolled_back = ops.keys_rolled_back.saturating_add(keys);
                }
                RecordEvent::Unload { .. } => ops.unloads = ops.unloads.saturating_add(1),
            }

            let entry = m.models.entry(event.model_name().to_string()).or_default();
            match event {
                RecordEvent::CacheHit { .. } => {
                    entry.cache_hits = entry.cache_hits.saturating_add(1);
                }
                RecordEvent::CacheMiss { .. } => {
                    entry.cache_misses = entry.cache_misses.saturating_add(1);
                }
                RecordEvent::ChildReified { .. } => {
                    entry.reified = entry.reified.saturating_add(1);
                }
                RecordEvent::Commit {
                    phase: CommitPhase::Confirmed,
                    ..
                } => entry.commits = entry.commits.saturating_add(1),
                RecordEvent::LocalWrite { .. } => {
                    entry.local_writes = entry.local_writes.saturating_add(1);
                }
                RecordEvent::Push { .. } => entry.pushes = entry.pushes.saturating_add(1),
                RecordEvent::Rollback { .. } => {
                    entry.rollbacks = entry.rollbacks.saturating_add(1);
                }
                RecordEvent::Unload { .. } => entry.unloads = entry.unloads.saturating_add(1),
                RecordEvent::ChildDestroyed { .. }
                | RecordEvent::Commit { .. }
                | RecordEvent::Invalidated { .. }
                | RecordEvent::Notified { .. } => {}
            }
        });
    }
}

pub(crate) const GLOBAL_RECORD_SINK: GlobalRecordSink = GlobalRecordSink;

pub(crate) fn record(event: RecordEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_RECORD_SINK.record(event),
    }
}

/// Snapshot the current event counters.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all event counters.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary sink override on this thread.
pub fn with_record_sink<T>(sink: Rc<dyn RecordSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn RecordSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
