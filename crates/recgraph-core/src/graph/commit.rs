//! Save round trip: `will_commit`, then `did_commit` or
//! `commit_was_rejected`; plus rollback and dirty tracking. Every step
//! recurses into reified children.

use crate::{
    error::{IdentityError, InternalError},
    graph::{RecordGraph, RecordHandle},
    identity::RecordId,
    obs::sink::{self, CommitPhase, RecordEvent},
    record::{AttrChange, ChildSlot, Changes, RecordData},
    value::AttrValue,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

impl RecordGraph {
    /// Snapshot local edits into the in-flight bucket.
    pub fn will_commit(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        self.begin_commit_tree(record)?;
        self.emit_commit(record, CommitPhase::Started)
    }

    /// Confirm the in-flight snapshot, register a server-assigned id, then
    /// merge `patch` with push semantics. Keys written since `will_commit`
    /// keep their local value.
    pub fn did_commit(
        &mut self,
        record: RecordHandle,
        id: Option<RecordId>,
        patch: Option<Map<String, Value>>,
    ) -> Result<Vec<String>, InternalError> {
        if let Some(id) = id {
            self.register_id(record, id)?;
        }
        self.confirm_commit_tree(record)?;
        self.emit_commit(record, CommitPhase::Confirmed)?;

        match patch {
            Some(patch) => self.push_data(record, patch, true),
            None => Ok(Vec::new()),
        }
    }

    /// Return the in-flight snapshot to the local bucket.
    pub fn commit_was_rejected(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        self.reject_commit_tree(record)?;
        self.emit_commit(record, CommitPhase::Rejected)
    }

    /// Drop every unconfirmed edit, recursively. Returns the top-level keys
    /// whose effective value changed; a clean record reports nothing.
    pub fn rollback_attributes(
        &mut self,
        record: RecordHandle,
    ) -> Result<Vec<String>, InternalError> {
        let changed: BTreeSet<String> = self.record_mut(record)?.rollback().into_iter().collect();

        for key in &changed {
            self.destroy_child_slot(record, key)?;
        }
        let children: Vec<RecordHandle> = self
            .record(record)?
            .children
            .values()
            .flat_map(ChildSlot::records)
            .collect();
        for child in children {
            self.rollback_attributes(child)?;
        }

        if !changed.is_empty() {
            self.fan_out(record, &changed, true)?;

            let model_name = self.primary_model_name(record)?;
            sink::record(RecordEvent::Rollback {
                model_name: model_name.as_str(),
                keys: changed.len() as u64,
            });
        }

        Ok(changed.into_iter().collect())
    }

    /// Whether the record or any reified child carries unconfirmed edits.
    pub fn is_dirty(&self, record: RecordHandle) -> Result<bool, InternalError> {
        let rec = self.record(record)?;
        if rec.dirty_keys().any(|key| self.is_bucket_dirty(rec, key)) {
            return Ok(true);
        }

        for child in rec.children.values().flat_map(ChildSlot::records) {
            if self.is_dirty(child)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Whether `key` is dirty, counting edits inside a child under it.
    pub fn is_attr_dirty(&self, record: RecordHandle, key: &str) -> Result<bool, InternalError> {
        let rec = self.record(record)?;
        if self.is_bucket_dirty(rec, key) {
            return Ok(true);
        }

        match rec.children.get(key) {
            Some(slot) => {
                for child in slot.records() {
                    if self.is_dirty(child)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// `[prior, current]` for dirty keys, nested diffs for dirty children.
    /// Clean children are omitted.
    pub fn changed_attributes(&self, record: RecordHandle) -> Result<Changes, InternalError> {
        let rec = self.record(record)?;
        let mut changes = rec.local_changes();
        changes.retain(|key, _| self.is_bucket_dirty(rec, key));

        for (key, slot) in &rec.children {
            if changes.contains_key(key) {
                continue;
            }

            match slot {
                ChildSlot::One(child) => {
                    let nested = self.changed_attributes(*child)?;
                    if !nested.is_empty() {
                        changes.insert(key.clone(), AttrChange::Nested(nested));
                    }
                }
                ChildSlot::Many(children) => {
                    let mut per_index = BTreeMap::new();
                    for (index, child) in children.iter().enumerate() {
                        let Some(child) = child else {
                            continue;
                        };
                        let nested = self.changed_attributes(*child)?;
                        if !nested.is_empty() {
                            per_index.insert(index, nested);
                        }
                    }
                    if !per_index.is_empty() {
                        changes.insert(key.clone(), AttrChange::NestedList(per_index));
                    }
                }
            }
        }

        Ok(changes)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Bucket dirtiness of `key`, comparing owned arrays by content so an
    /// array mutated back to its prior elements reads clean.
    fn is_bucket_dirty(&self, rec: &RecordData, key: &str) -> bool {
        let (Some(current), Some(prior)) = (rec.local.get(key), rec.prior(key)) else {
            return rec.is_key_dirty(key);
        };
        if current.as_array().is_none() && prior.as_array().is_none() {
            return current != prior;
        }

        match (self.value_json(current), self.value_json(prior)) {
            (Ok(current), Ok(prior)) => current != prior,
            _ => true,
        }
    }

    fn begin_commit_tree(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let rec = self.record_mut(record)?;
        rec.begin_commit();

        let children = Self::child_records(rec.children.values());
        for child in children {
            self.begin_commit_tree(child)?;
        }

        Ok(())
    }

    /// Arrays in flight are confirmed as JSON so later in-place mutations
    /// still differ from the server bucket.
    fn confirm_commit_tree(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let arrays: Vec<(String, Value)> = self
            .record(record)?
            .in_flight
            .iter()
            .filter_map(|(key, value)| Some((key.clone(), value.as_array()?)))
            .map(|(key, array)| Ok((key, self.array_json(array)?)))
            .collect::<Result<_, InternalError>>()?;

        let rec = self.record_mut(record)?;
        for (key, snapshot) in arrays {
            rec.in_flight.insert(key, AttrValue::Json(snapshot));
        }
        rec.confirm_commit();

        let children = Self::child_records(rec.children.values());
        for child in children {
            self.confirm_commit_tree(child)?;
        }

        Ok(())
    }

    fn reject_commit_tree(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let rec = self.record_mut(record)?;
        rec.reject_commit();

        let children = Self::child_records(rec.children.values());
        for child in children {
            self.reject_commit_tree(child)?;
        }

        Ok(())
    }

    fn child_records<'a>(slots: impl Iterator<Item = &'a ChildSlot>) -> Vec<RecordHandle> {
        slots.flat_map(ChildSlot::records).collect()
    }

    /// Attach a server-assigned id and enter the record in the indexes.
    fn register_id(&mut self, record: RecordHandle, id: RecordId) -> Result<(), InternalError> {
        let rec = self.record(record)?;
        let base = rec.identity.model_name.clone();

        match &rec.identity.id {
            Some(existing) if *existing == id => return Ok(()),
            Some(existing) if rec.parent.is_none() => {
                return Err(IdentityError::IdentityReassignment {
                    model_name: base.to_string(),
                    from: existing.to_string(),
                    to: id.to_string(),
                }
                .into());
            }
            _ => {}
        }

        if rec.parent.is_some() {
            self.record_mut(record)?.identity.id = Some(id);
            return Ok(());
        }
        if self.peek_record(&base, &id).is_some() {
            return Err(IdentityError::DuplicateIdentity {
                model_name: base.to_string(),
                id: id.to_string(),
            }
            .into());
        }

        let facades = rec.facades();
        self.record_mut(record)?.identity.id = Some(id.clone());
        self.record_index.insert((base, id.clone()), record);

        for facade in facades {
            let model_name = self.model(facade)?.model_name.clone();
            self.index_model(facade, model_name, id.clone());
        }

        Ok(())
    }

    fn emit_commit(&self, record: RecordHandle, phase: CommitPhase) -> Result<(), InternalError> {
        let model_name = self.primary_model_name(record)?;
        sink::record(RecordEvent::Commit {
            model_name: model_name.as_str(),
            phase,
        });

        Ok(())
    }
}
