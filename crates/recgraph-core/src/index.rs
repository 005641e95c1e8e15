//! Module: index
//! Responsibility: id -> live facade lookup for references without a type.
//! Does not own: the decision of which models are indexed (the graph asks
//! the schema's `includes_model` before inserting).

use crate::{graph::ModelHandle, identity::RecordId};
use std::collections::HashMap;

///
/// GlobalIdentityIndex
///
/// First facade loaded for an id wins until it is unloaded.
///

#[derive(Debug, Default)]
pub struct GlobalIdentityIndex {
    entries: HashMap<RecordId, ModelHandle>,
}

impl GlobalIdentityIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<ModelHandle> {
        self.entries.get(id).copied()
    }

    /// Index `model` under `id` unless another facade already holds it.
    pub fn insert(&mut self, id: RecordId, model: ModelHandle) -> bool {
        match self.entries.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(model);
                true
            }
        }
    }

    /// Remove `id` only while it still points at `model`.
    pub fn remove(&mut self, id: &RecordId, model: ModelHandle) -> bool {
        if self.entries.get(id) == Some(&model) {
            self.entries.remove(id);
            true
        } else {
            false
        }
    }
}

///
/// TESTS
///
