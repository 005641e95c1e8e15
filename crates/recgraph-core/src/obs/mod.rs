//! Observability: record-graph telemetry and sink abstractions.
//!
//! This module never reads graph state. Graph code reports what it did
//! through `sink::record`; counters live in `metrics`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, ModelCounters, ModelSummary};
pub use sink::{
    CommitPhase, RecordEvent, RecordSink, metrics_report, metrics_reset_all, with_record_sink,
};
