//! Lazy resolution of raw attributes into models, lazy arrays, and values.
//!
//! The schema is consulted with a read-only `GraphReader`; every key it
//! reads becomes a dependency of the key being resolved. Reference misses
//! are never memoized so a later load is picked up on the next read.

use crate::{
    error::InternalError,
    graph::{
        ArrayEntry, ArrayHandle, ArrayKind, ArrayOwner, GraphReader, LazyArray, Model,
        ModelHandle, ModelKind, RecordGraph, RecordHandle,
    },
    identity::ModelName,
    obs::sink::{self, RecordEvent},
    record::{ChildSlot, ParentLink, RecordData},
    schema::{NestedModelSpec, ReferenceSpec},
    value::{AttrValue, Resolved},
};
use serde_json::Value;
use std::{collections::BTreeSet, rc::Rc};

impl RecordGraph {
    /// Resolve `key` on a facade, bypassing whitelist and table handling.
    pub fn resolve_attr(
        &mut self,
        model: ModelHandle,
        key: &str,
    ) -> Result<Option<Resolved>, InternalError> {
        let (record, model_name, cached) = {
            let facade = self.model(model)?;
            (
                facade.record,
                facade.model_name.clone(),
                facade.cache.get(key).cloned(),
            )
        };

        let mut reuse = None;
        match cached {
            Some(Resolved::Array(array)) if self.arrays.get(array).is_some_and(|a| a.stale) => {
                reuse = Some(array);
            }
            Some(Resolved::Model(target)) if !self.models.contains(target) => {
                self.model_mut(model)?.cache.remove(key);
            }
            Some(Resolved::Array(array)) if !self.arrays.contains(array) => {
                self.model_mut(model)?.cache.remove(key);
            }
            Some(hit) => {
                sink::record(RecordEvent::CacheHit {
                    model_name: model_name.as_str(),
                });
                return Ok(Some(hit));
            }
            None => {}
        }

        sink::record(RecordEvent::CacheMiss {
            model_name: model_name.as_str(),
        });

        self.compute(model, record, &model_name, key, reuse)
    }

    fn compute(
        &mut self,
        model: ModelHandle,
        record: RecordHandle,
        model_name: &ModelName,
        key: &str,
        reuse: Option<ArrayHandle>,
    ) -> Result<Option<Resolved>, InternalError> {
        let Some(raw) = self.record(record)?.effective(key).cloned() else {
            self.retire_array(record, key, reuse)?;
            return Ok(None);
        };

        let value = match raw {
            AttrValue::Model(target) => {
                self.retire_array(record, key, reuse)?;
                if !self.models.contains(target) {
                    return Ok(None);
                }
                return self.memoize(model, key, Resolved::Model(target), BTreeSet::new());
            }
            AttrValue::Array(array) => {
                if reuse != Some(array) {
                    self.retire_array(record, key, reuse)?;
                }
                let Some(live) = self.arrays.get_mut(array) else {
                    return Ok(None);
                };
                live.stale = false;
                return self.memoize(model, key, Resolved::Array(array), BTreeSet::new());
            }
            AttrValue::Json(value) => value,
        };

        let schema = Rc::clone(&self.schema);
        let (reference, nested, mut dependencies) = {
            let mut reader = GraphReader::new(self, record, model_name.clone());
            let reference =
                schema.compute_attribute_reference(key, &value, model_name, &mut reader);
            let nested = if reference.is_none() && !value.is_array() {
                schema.compute_nested_model(key, &value, model_name, &mut reader)
            } else {
                None
            };

            (reference, nested, reader.into_reads())
        };

        let resolved = match (reference, nested) {
            (Some(ReferenceSpec::One(target)), _) => {
                self.retire_array(record, key, reuse)?;
                match self.lookup_ref(&target) {
                    Some(target) => Resolved::Model(target),
                    None => return Ok(None),
                }
            }
            (Some(ReferenceSpec::Many(targets)), _) => {
                let entries = targets.into_iter().map(ArrayEntry::Unresolved).collect();
                let array = self.install_array(record, key, ArrayKind::Reference, entries, reuse)?;
                Resolved::Array(array)
            }
            (None, Some(spec)) => {
                self.retire_array(record, key, reuse)?;
                Resolved::Model(self.reify_child(record, key, spec)?)
            }
            (None, None) => match value {
                Value::Array(items) => {
                    let (entries, reads) = self.reify_elements(record, model_name, key, &items)?;
                    dependencies.extend(reads);
                    let array = self.install_array(record, key, ArrayKind::Tracked, entries, reuse)?;
                    Resolved::Array(array)
                }
                value => {
                    self.retire_array(record, key, reuse)?;
                    Resolved::Value(value)
                }
            },
        };

        dependencies.remove(key);
        self.memoize(model, key, resolved, dependencies)
    }

    fn memoize(
        &mut self,
        model: ModelHandle,
        key: &str,
        resolved: Resolved,
        dependencies: BTreeSet<String>,
    ) -> Result<Option<Resolved>, InternalError> {
        self.model_mut(model)?
            .cache
            .insert(key, resolved.clone(), dependencies);

        Ok(Some(resolved))
    }

    /// Refill the slot's array in place, or allocate a fresh one.
    fn install_array(
        &mut self,
        record: RecordHandle,
        key: &str,
        kind: ArrayKind,
        entries: Vec<ArrayEntry>,
        reuse: Option<ArrayHandle>,
    ) -> Result<ArrayHandle, InternalError> {
        if let Some(array) = reuse.or_else(|| self.owned_array(record, key)) {
            if let Some(live) = self.arrays.get_mut(array)
                && live.kind == kind
            {
                live.entries = entries;
                live.stale = false;
                return Ok(array);
            }
            self.retire_array(record, key, Some(array))?;
        }

        Ok(self.arrays.insert(LazyArray {
            kind,
            owner: Some(ArrayOwner {
                record,
                key: key.to_string(),
            }),
            entries,
            stale: false,
        }))
    }

    /// Array any facade of `record` has materialized for `key`.
    pub(crate) fn owned_array(&self, record: RecordHandle, key: &str) -> Option<ArrayHandle> {
        self.records.get(record)?.facades().into_iter().find_map(|facade| {
            let array = self.models.get(facade)?.cache.get(key)?.as_array()?;
            self.arrays
                .get(array)
                .is_some_and(|live| live.is_owned_by(record, key))
                .then_some(array)
        })
    }

    /// Free a slot array whose attribute no longer resolves to an array.
    pub(crate) fn retire_array(
        &mut self,
        record: RecordHandle,
        key: &str,
        array: Option<ArrayHandle>,
    ) -> Result<(), InternalError> {
        let Some(array) = array else {
            return Ok(());
        };
        if !self
            .arrays
            .get(array)
            .is_some_and(|live| live.is_owned_by(record, key))
        {
            return Ok(());
        }

        self.arrays.remove(array);
        for facade in self.record(record)?.facades() {
            if let Some(model) = self.models.get_mut(facade)
                && model.cache.get(key).and_then(Resolved::as_array) == Some(array)
            {
                model.cache.remove(key);
            }
        }

        Ok(())
    }

    /// Reify a single nested entity under `key`, reusing the existing child
    /// while its identity matches.
    fn reify_child(
        &mut self,
        record: RecordHandle,
        key: &str,
        spec: NestedModelSpec,
    ) -> Result<ModelHandle, InternalError> {
        if let Some(ChildSlot::One(child)) = self.record(record)?.children.get(key)
            && let Some(existing) = self.records.get(*child)
            && existing.identity.same_nested_slot(&spec.identity())
            && let Some(owner) = existing.owner
        {
            return Ok(owner);
        }

        self.destroy_child_slot(record, key)?;
        let child = self.new_child(record, key, None, spec)?;
        self.record_mut(record)?
            .children
            .insert(key.to_string(), ChildSlot::One(child));

        self.nested_model_of(child)
    }

    /// Reify every element of an array value, reusing positional children
    /// whose identity is unchanged.
    fn reify_elements(
        &mut self,
        record: RecordHandle,
        model_name: &ModelName,
        key: &str,
        items: &[Value],
    ) -> Result<(Vec<ArrayEntry>, BTreeSet<String>), InternalError> {
        let schema = Rc::clone(&self.schema);
        let (specs, reads) = {
            let mut reader = GraphReader::new(self, record, model_name.clone());
            let specs: Vec<Option<NestedModelSpec>> = items
                .iter()
                .map(|item| schema.compute_nested_model(key, item, model_name, &mut reader))
                .collect();

            (specs, reader.into_reads())
        };

        let existing = match self.record(record)?.children.get(key) {
            Some(ChildSlot::Many(slot)) if slot.len() == items.len() => slot.clone(),
            Some(_) => {
                self.destroy_child_slot(record, key)?;
                Vec::new()
            }
            None => Vec::new(),
        };

        let mut slot = Vec::with_capacity(items.len());
        let mut entries = Vec::with_capacity(items.len());

        for (index, (item, spec)) in items.iter().zip(specs).enumerate() {
            let previous = existing.get(index).copied().flatten();

            let Some(spec) = spec else {
                if let Some(previous) = previous {
                    self.destroy_record(previous, false)?;
                }
                slot.push(None);
                entries.push(ArrayEntry::Value(item.clone()));
                continue;
            };

            let reused = previous.filter(|child| {
                self.records
                    .get(*child)
                    .is_some_and(|c| c.identity.same_nested_slot(&spec.identity()))
            });
            let child = match reused {
                Some(child) => child,
                None => {
                    if let Some(previous) = previous {
                        self.destroy_record(previous, false)?;
                    }
                    self.new_child(record, key, Some(index), spec)?
                }
            };

            slot.push(Some(child));
            entries.push(ArrayEntry::Model(self.nested_model_of(child)?));
        }

        let rec = self.record_mut(record)?;
        if slot.iter().any(Option::is_some) {
            rec.children.insert(key.to_string(), ChildSlot::Many(slot));
        } else {
            rec.children.remove(key);
        }

        Ok((entries, reads))
    }

    /// Allocate a nested record and its facade under `parent`.
    pub(crate) fn new_child(
        &mut self,
        parent: RecordHandle,
        key: &str,
        index: Option<usize>,
        spec: NestedModelSpec,
    ) -> Result<RecordHandle, InternalError> {
        let identity = spec.identity();
        let server = spec
            .attributes
            .into_iter()
            .filter(|(attr, _)| *attr != self.config.identity_key)
            .map(|(attr, value)| (attr, AttrValue::Json(value)))
            .collect();

        let link = ParentLink {
            record: parent,
            key: key.to_string(),
            index,
        };
        let child = self.records.insert(RecordData::nested(identity, server, link));
        let model = self
            .models
            .insert(Model::new(spec.model_name.clone(), child, ModelKind::Nested));
        self.record_mut(child)?.owner = Some(model);

        sink::record(RecordEvent::ChildReified {
            model_name: spec.model_name.as_str(),
        });

        Ok(child)
    }

    pub(crate) fn nested_model_of(&self, child: RecordHandle) -> Result<ModelHandle, InternalError> {
        self.record(child)?
            .owner
            .ok_or_else(|| InternalError::record_invariant(format!("nested record {child} has no facade")))
    }
}
