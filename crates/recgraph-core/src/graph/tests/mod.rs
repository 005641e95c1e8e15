mod resolve;
mod unload;

use crate::{
    graph::{ModelHandle, RecordGraph, RecordHandle},
    value::Resolved,
};
use serde_json::Value;

/// Plain JSON read through a facade; models and arrays read as `None`.
fn read(graph: &mut RecordGraph, model: ModelHandle, key: &str) -> Option<Value> {
    match graph.get(model, key).expect("read") {
        Some(Resolved::Value(value)) => Some(value),
        _ => None,
    }
}

fn read_model(graph: &mut RecordGraph, model: ModelHandle, key: &str) -> Option<ModelHandle> {
    graph.get(model, key).expect("read").and_then(|r| r.as_model())
}

fn record(graph: &RecordGraph, model: ModelHandle) -> RecordHandle {
    graph.record_of(model).expect("live model")
}

/// Keys queued for `model`, draining the queue.
fn notified(graph: &mut RecordGraph, model: ModelHandle) -> Vec<String> {
    graph
        .take_notifications()
        .into_iter()
        .find(|n| n.model == model)
        .map(|n| n.keys)
        .unwrap_or_default()
}
