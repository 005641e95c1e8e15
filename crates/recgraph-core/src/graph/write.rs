use crate::{
    error::{IdentityError, InternalError},
    graph::{
        ArrayHandle, ArrayOwner, GraphReader, GraphWriter, LazyArray, ModelHandle, RecordGraph,
        RecordHandle,
    },
    identity::{ModelName, RecordId},
    obs::sink::{self, RecordEvent},
    record::ChildSlot,
    value::{AttrValue, Resolved},
};
use std::{collections::BTreeSet, rc::Rc};

impl RecordGraph {
    /// Local write on `record`, routed through the schema's
    /// `set_attribute` hook.
    pub fn set_attr(
        &mut self,
        record: RecordHandle,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), InternalError> {
        let model_name = self.primary_model_name(record)?;

        self.set_attr_as(record, &model_name, key, value.into())
    }

    pub(crate) fn set_attr_as(
        &mut self,
        record: RecordHandle,
        model_name: &ModelName,
        key: &str,
        value: AttrValue,
    ) -> Result<(), InternalError> {
        if key == self.config.identity_key {
            return self.assign_id(record, &value);
        }

        let schema = Rc::clone(&self.schema);
        let mut writer = GraphWriter {
            graph: self,
            record,
        };

        schema.set_attribute(model_name, key, value, &mut writer)
    }

    /// Remove `key` from every bucket and drop any child under it.
    pub fn delete_attr(
        &mut self,
        record: RecordHandle,
        key: &str,
    ) -> Result<Option<AttrValue>, InternalError> {
        self.destroy_child_slot(record, key)?;
        let removed = self.record_mut(record)?.remove_attr(key);

        if removed.is_some() {
            let keys = BTreeSet::from([key.to_string()]);
            self.fan_out(record, &keys, self.config.notify_on_local_writes)?;
        }

        Ok(removed)
    }

    /// Write into the local bucket, reconciling any reified child under
    /// `key` first.
    pub(crate) fn write_local(
        &mut self,
        record: RecordHandle,
        key: &str,
        value: AttrValue,
    ) -> Result<(), InternalError> {
        if key == self.config.identity_key {
            return self.assign_id(record, &value);
        }

        match self.record(record)?.children.get(key).cloned() {
            Some(ChildSlot::One(child)) => {
                if self.write_into_child(record, key, child, &value)? {
                    return Ok(());
                }
                self.destroy_child_slot(record, key)?;
            }
            // an array write re-keys the slot in adopt_array
            Some(ChildSlot::Many(_)) if value.as_array().is_some() => {}
            Some(ChildSlot::Many(_)) => self.destroy_child_slot(record, key)?,
            None => {}
        }

        let value = match value {
            AttrValue::Array(source) => self.adopt_array(record, key, source)?,
            other => other,
        };

        let model_name = self.primary_model_name(record)?;
        self.record_mut(record)?
            .local
            .insert(key.to_string(), value.clone());
        sink::record(RecordEvent::LocalWrite {
            model_name: model_name.as_str(),
        });

        self.settle_local_write(record, key, &value)
    }

    /// Route a write that denotes the existing child into the child itself.
    /// Returns false when the child has to be replaced.
    fn write_into_child(
        &mut self,
        record: RecordHandle,
        key: &str,
        child: RecordHandle,
        value: &AttrValue,
    ) -> Result<bool, InternalError> {
        let child_rec = self.record(child)?;
        let child_identity = child_rec.identity.clone();
        let child_model = child_rec.owner;

        match value {
            AttrValue::Model(model) => Ok(Some(*model) == child_model),
            AttrValue::Json(raw) => {
                let model_name = self.primary_model_name(record)?;
                let Some(spec) = self
                    .nested_spec(record, &model_name, key, raw)
                    .filter(|spec| child_identity.same_nested_slot(&spec.identity()))
                else {
                    return Ok(false);
                };

                for (attr, attr_value) in spec.attributes {
                    self.write_local(child, &attr, AttrValue::Json(attr_value))?;
                }

                Ok(true)
            }
            AttrValue::Array(_) => Ok(false),
        }
    }

    /// Reassigning an array onto a key that already has an owned array
    /// copies the entries across so the owned array keeps its identity. A
    /// detached array is adopted by the slot; an array owned elsewhere is
    /// copied into a fresh one.
    fn adopt_array(
        &mut self,
        record: RecordHandle,
        key: &str,
        source: ArrayHandle,
    ) -> Result<AttrValue, InternalError> {
        if self.array_slot_of(source) == Some((record, key)) {
            return Ok(AttrValue::Array(source));
        }

        let (kind, entries, detached) = {
            let live = self.array(source)?;
            (live.kind, live.entries.clone(), live.owner.is_none())
        };
        let owner = ArrayOwner {
            record,
            key: key.to_string(),
        };

        let target = match self.owned_array(record, key) {
            Some(target) => {
                let owned = self.array_mut(target)?;
                owned.entries = entries;
                owned.stale = false;
                target
            }
            None if detached => {
                self.array_mut(source)?.owner = Some(owner);
                source
            }
            None => self.arrays.insert(LazyArray {
                kind,
                owner: Some(owner),
                entries,
                stale: false,
            }),
        };
        self.sync_children(target)?;

        Ok(AttrValue::Array(target))
    }

    /// Seed or invalidate caches after a local write, then notify.
    pub(crate) fn settle_local_write(
        &mut self,
        record: RecordHandle,
        key: &str,
        value: &AttrValue,
    ) -> Result<(), InternalError> {
        let roots = BTreeSet::from([key.to_string()]);
        let schema = Rc::clone(&self.schema);

        for facade in self.record(record)?.facades() {
            let Some(model_name) = self.models.get(facade).map(|m| m.model_name.clone()) else {
                continue;
            };

            let resolved = {
                let mut reader = GraphReader::new(self, record, model_name.clone());
                schema.is_attribute_resolved(&model_name, key, value, &mut reader)
            };
            let seed = (resolved && self.allows(&model_name, key)).then(|| value.to_resolved());

            let affected = self.invalidate_keys(facade, &roots, seed.is_some())?;
            if let Some(seed) = seed {
                self.seed_cache(facade, key, seed)?;
            }
            if self.config.notify_on_local_writes {
                self.notify(facade, affected);
            }
        }

        self.touch_ancestors(record, self.config.notify_on_local_writes)
    }

    fn seed_cache(
        &mut self,
        model: ModelHandle,
        key: &str,
        resolved: Resolved,
    ) -> Result<(), InternalError> {
        let (record, previous) = {
            let facade = self.model(model)?;
            (facade.record, facade.cache.get(key).and_then(Resolved::as_array))
        };
        if previous != resolved.as_array() {
            self.retire_array(record, key, previous)?;
        }

        self.model_mut(model)?
            .cache
            .insert(key, resolved, BTreeSet::new());

        Ok(())
    }

    /// Nested records accept late ids; top-level ids are fixed at creation
    /// or by the server.
    pub(crate) fn assign_id(
        &mut self,
        record: RecordHandle,
        value: &AttrValue,
    ) -> Result<(), InternalError> {
        let id = match value {
            AttrValue::Json(raw) => RecordId::from_json(raw)?,
            AttrValue::Model(_) | AttrValue::Array(_) => {
                return Err(IdentityError::InvalidId {
                    value: format!("{value:?}"),
                }
                .into());
            }
        };

        let rec = self.record(record)?;
        if rec.identity.id == id {
            return Ok(());
        }
        if rec.parent.is_some() {
            self.record_mut(record)?.identity.id = id;
            return Ok(());
        }

        let model_name = rec.identity.model_name.to_string();
        let err = match (&rec.identity.id, id) {
            (Some(from), to) => IdentityError::IdentityReassignment {
                model_name,
                from: from.to_string(),
                to: to.map_or_else(|| "null".to_string(), |to| to.to_string()),
            },
            (None, to) => IdentityError::IdNotAssignable {
                model_name,
                id: to.map_or_else(|| "null".to_string(), |to| to.to_string()),
            },
        };

        Err(err.into())
    }

    /// (record, key) slot an array is owned under, if any.
    pub(crate) fn array_slot_of(&self, array: ArrayHandle) -> Option<(RecordHandle, &str)> {
        let owner = self.arrays.get(array)?.owner.as_ref()?;

        Some((owner.record, owner.key.as_str()))
    }
}
