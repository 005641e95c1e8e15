//! Teardown of facades, records, and reified children.
//!
//! Unloading a facade removes it from the identity indexes, from every
//! array that holds it, and from every cache that resolved to it. A record
//! is destroyed once nothing keeps it alive.

use crate::{
    error::InternalError,
    graph::{ArrayEntry, ArrayHandle, ModelHandle, ModelKind, RecordGraph, RecordHandle},
    identity::RecordId,
    obs::sink::{self, RecordEvent},
    record::ChildSlot,
};
use std::collections::BTreeSet;

impl RecordGraph {
    /// Unload one facade. A projection leaves its base store in place while
    /// other facades or holds remain; a nested facade leaves its parent slot.
    pub fn unload_model(&mut self, model: ModelHandle) -> Result<(), InternalError> {
        let (record, kind) = {
            let facade = self.model(model)?;
            (facade.record, facade.kind)
        };
        if kind == ModelKind::Nested {
            return self.unload_nested(record);
        }

        self.detach_model(model, true)?;
        let rec = self.record_mut(record)?;
        match kind {
            ModelKind::Base => rec.owner = None,
            ModelKind::Projection => rec.projections.retain(|p| *p != model),
            ModelKind::Nested => {}
        }

        self.collect_if_orphaned(record)
    }

    /// Unload every facade of `record` and destroy it, holds included.
    pub fn unload_record(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let rec = self.record(record)?;
        if rec.parent.is_some() {
            return self.unload_nested(record);
        }

        for facade in rec.facades() {
            self.detach_model(facade, true)?;
        }
        let rec = self.record_mut(record)?;
        rec.owner = None;
        rec.projections.clear();
        rec.holds = 0;

        self.destroy_record(record, true)
    }

    /// Destroy a top-level record nothing keeps alive any more.
    pub(crate) fn collect_if_orphaned(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let orphaned = self
            .records
            .get(record)
            .is_some_and(|rec| rec.is_orphaned() && rec.parent.is_none());
        if orphaned {
            self.destroy_record(record, true)?;
        }

        Ok(())
    }

    /// Take the child slot under `key` and destroy every record in it.
    pub(crate) fn destroy_child_slot(
        &mut self,
        record: RecordHandle,
        key: &str,
    ) -> Result<(), InternalError> {
        let Some(slot) = self.record_mut(record)?.children.remove(key) else {
            return Ok(());
        };
        for child in slot.records() {
            self.destroy_record(child, false)?;
        }

        Ok(())
    }

    /// Remove a record, its facades, the arrays it owns, and its children.
    /// Destroying an already-destroyed record is a no-op.
    pub(crate) fn destroy_record(
        &mut self,
        record: RecordHandle,
        notify: bool,
    ) -> Result<(), InternalError> {
        let Some(rec) = self.records.get(record) else {
            return Ok(());
        };
        for facade in rec.facades() {
            self.detach_model(facade, notify)?;
        }

        let Some(rec) = self.records.remove(record) else {
            return Ok(());
        };
        if rec.parent.is_none()
            && let Some(key) = rec.identity.key()
            && self.record_index.get(&key) == Some(&record)
        {
            self.record_index.remove(&key);
        }

        let owned: Vec<ArrayHandle> = self
            .arrays
            .iter()
            .filter(|(_, array)| array.owner.as_ref().is_some_and(|o| o.record == record))
            .map(|(handle, _)| handle)
            .collect();
        for array in owned {
            self.arrays.remove(array);
        }

        if rec.parent.is_some() {
            sink::record(RecordEvent::ChildDestroyed {
                model_name: rec.identity.model_name.as_str(),
            });
        }

        for child in rec.children.values().flat_map(ChildSlot::records) {
            self.destroy_record(child, false)?;
        }

        Ok(())
    }

    /// Drop a facade from the arena, the indexes, every array holding it,
    /// and every cache that resolved to it.
    fn detach_model(&mut self, model: ModelHandle, notify: bool) -> Result<(), InternalError> {
        let Some(facade) = self.models.remove(model) else {
            return Ok(());
        };
        self.pending.remove(&model);
        sink::record(RecordEvent::Unload {
            model_name: facade.model_name.as_str(),
        });

        let id = self
            .records
            .get(facade.record)
            .and_then(|rec| rec.identity.id.clone());
        if facade.kind != ModelKind::Nested
            && let Some(id) = id
        {
            let key = (facade.model_name.clone(), id.clone());
            if self.model_index.get(&key) == Some(&model) {
                self.model_index.remove(&key);
            }
            if self.global.remove(&id, model) {
                self.repoint_global(&id);
            }
        }

        let entry = ArrayEntry::Model(model);
        let mut purged = Vec::new();
        for (_, array) in self.arrays.iter_mut() {
            let before = array.entries.len();
            array.entries.retain(|e| *e != entry);
            if array.entries.len() != before
                && let Some(owner) = &array.owner
            {
                purged.push((owner.record, owner.key.clone()));
            }
        }

        let referencing: Vec<(ModelHandle, BTreeSet<String>)> = self
            .models
            .iter()
            .filter_map(|(handle, other)| {
                let keys = other.cache.keys_resolving_to_model(model);
                (!keys.is_empty()).then(|| (handle, keys.into_iter().collect()))
            })
            .collect();
        for (other, keys) in referencing {
            let affected = self.invalidate_keys(other, &keys, false)?;
            if notify {
                self.notify(other, affected);
            }
        }

        if notify && facade.kind != ModelKind::Nested {
            for (record, key) in purged {
                let Some(rec) = self.records.get(record) else {
                    continue;
                };
                for holder in rec.facades() {
                    self.notify(holder, [key.clone()]);
                }
            }
        }

        Ok(())
    }

    /// After the indexed facade for `id` goes away, hand the global entry to
    /// another live facade with the same id, if any.
    fn repoint_global(&mut self, id: &RecordId) {
        let replacement = self.models.iter().find_map(|(handle, model)| {
            let same_id = self
                .records
                .get(model.record)
                .is_some_and(|rec| rec.parent.is_none() && rec.identity.id.as_ref() == Some(id));

            (same_id && self.schema.includes_model(&model.model_name)).then_some(handle)
        });

        if let Some(replacement) = replacement {
            self.global.insert(id.clone(), replacement);
        }
    }

    /// Tear down a nested record and take it out of its parent slot. A
    /// single child re-reifies from the raw parent value on the next read;
    /// an array element leaves the owned array, which is written back.
    fn unload_nested(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let Some(link) = self.record(record)?.parent.clone() else {
            return Ok(());
        };

        self.destroy_record(record, true)?;
        if !self.records.contains(link.record) {
            return Ok(());
        }

        match self.record(link.record)?.children.get(&link.key).cloned() {
            Some(ChildSlot::One(child)) if child == record => {
                self.record_mut(link.record)?.children.remove(&link.key);
            }
            Some(ChildSlot::Many(_)) => match self.owned_array(link.record, &link.key) {
                Some(array) => {
                    self.sync_children(array)?;
                    self.write_back(array)?;
                }
                None => self.destroy_child_slot(link.record, &link.key)?,
            },
            _ => {}
        }

        for facade in self.record(link.record)?.facades() {
            self.notify(facade, [link.key.clone()]);
        }

        Ok(())
    }
}
