use crate::{
    error::{ArrayError, InternalError},
    graph::{
        ArrayEntry, ArrayHandle, ArrayKind, GraphReader, LazyArray, ModelKind, RecordGraph,
        RecordHandle,
    },
    obs::sink::{self, RecordEvent},
    record::ChildSlot,
    schema::ReferenceSpec,
    value::{AttrValue, Resolved},
};
use std::rc::Rc;

impl RecordGraph {
    /// Allocate an empty array not yet bound to any attribute. Assigning it
    /// to an attribute binds it to that slot.
    pub fn create_array(&mut self, kind: ArrayKind) -> ArrayHandle {
        self.arrays.insert(LazyArray::detached(kind))
    }

    pub fn array_kind(&self, array: ArrayHandle) -> Result<ArrayKind, InternalError> {
        Ok(self.array(array)?.kind)
    }

    /// Number of slots, resolving every entry on the way.
    pub fn array_len(&mut self, array: ArrayHandle) -> Result<usize, InternalError> {
        self.refresh_array(array)?;
        let len = self.array(array)?.entries.len();
        for index in 0..len {
            self.resolve_entry(array, index)?;
        }

        Ok(len)
    }

    /// Element at `index`; unresolvable references read as `None`.
    pub fn array_get(
        &mut self,
        array: ArrayHandle,
        index: usize,
    ) -> Result<Option<Resolved>, InternalError> {
        self.refresh_array(array)?;
        if index >= self.array(array)?.entries.len() {
            return Ok(None);
        }

        self.resolve_entry(array, index)
    }

    pub fn array_values(
        &mut self,
        array: ArrayHandle,
    ) -> Result<Vec<Option<Resolved>>, InternalError> {
        let len = self.array_len(array)?;

        (0..len)
            .map(|index| self.resolve_entry(array, index))
            .collect()
    }

    /// Append `value`, returning the new length.
    pub fn array_push(
        &mut self,
        array: ArrayHandle,
        value: impl Into<AttrValue>,
    ) -> Result<usize, InternalError> {
        self.refresh_array(array)?;
        let entry = self.to_entry(array, value.into())?;

        self.mutate_array(array, |entries| {
            entries.push(entry);
            Ok(entries.len())
        })
    }

    pub fn array_pop(&mut self, array: ArrayHandle) -> Result<Option<Resolved>, InternalError> {
        self.refresh_array(array)?;
        let Some(last) = self.array(array)?.entries.len().checked_sub(1) else {
            return Ok(None);
        };

        self.array_remove(array, last).map(Some)
    }

    pub fn array_shift(&mut self, array: ArrayHandle) -> Result<Option<Resolved>, InternalError> {
        self.refresh_array(array)?;
        if self.array(array)?.entries.is_empty() {
            return Ok(None);
        }

        self.array_remove(array, 0).map(Some)
    }

    /// Prepend `value`, returning the new length.
    pub fn array_unshift(
        &mut self,
        array: ArrayHandle,
        value: impl Into<AttrValue>,
    ) -> Result<usize, InternalError> {
        self.array_insert(array, 0, value)?;

        Ok(self.array(array)?.entries.len())
    }

    pub fn array_insert(
        &mut self,
        array: ArrayHandle,
        index: usize,
        value: impl Into<AttrValue>,
    ) -> Result<(), InternalError> {
        self.refresh_array(array)?;
        let len = self.array(array)?.entries.len();
        if index > len {
            return Err(ArrayError::IndexOutOfBounds { index, len }.into());
        }
        let entry = self.to_entry(array, value.into())?;

        self.mutate_array(array, |entries| {
            entries.insert(index, entry);
            Ok(())
        })
    }

    /// Remove the element at `index`. A removed nested entity is returned
    /// as its JSON snapshot, since its record does not outlive the slot.
    pub fn array_remove(
        &mut self,
        array: ArrayHandle,
        index: usize,
    ) -> Result<Resolved, InternalError> {
        self.refresh_array(array)?;
        let len = self.array(array)?.entries.len();
        if index >= len {
            return Err(ArrayError::IndexOutOfBounds { index, len }.into());
        }
        let removed = self.detach_entry(array, index)?;

        self.mutate_array(array, |entries| {
            entries.remove(index);
            Ok(())
        })?;

        Ok(removed)
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn array_replace(
        &mut self,
        array: ArrayHandle,
        index: usize,
        value: impl Into<AttrValue>,
    ) -> Result<Resolved, InternalError> {
        self.refresh_array(array)?;
        let len = self.array(array)?.entries.len();
        if index >= len {
            return Err(ArrayError::IndexOutOfBounds { index, len }.into());
        }
        let entry = self.to_entry(array, value.into())?;
        let removed = self.detach_entry(array, index)?;

        self.mutate_array(array, |entries| {
            entries[index] = entry;
            Ok(())
        })?;

        Ok(removed)
    }

    /// Replace every element in place; the array handle is preserved.
    pub fn set_models(
        &mut self,
        array: ArrayHandle,
        values: Vec<AttrValue>,
    ) -> Result<(), InternalError> {
        self.refresh_array(array)?;
        let replacement = values
            .into_iter()
            .map(|value| self.to_entry(array, value))
            .collect::<Result<Vec<_>, _>>()?;

        self.mutate_array(array, |entries| {
            *entries = replacement;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Re-run resolution for a stale owned array so it refills in place.
    fn refresh_array(&mut self, array: ArrayHandle) -> Result<(), InternalError> {
        let live = self.array(array)?;
        if !live.stale {
            return Ok(());
        }

        let facade = live.owner.clone().and_then(|owner| {
            let facade = self.records.get(owner.record)?.facades().into_iter().next()?;
            Some((facade, owner.key))
        });
        match facade {
            Some((facade, key)) => {
                self.resolve_attr(facade, &key)?;
                if let Some(live) = self.arrays.get_mut(array) {
                    live.stale = false;
                }
            }
            None => self.array_mut(array)?.stale = false,
        }

        self.array(array).map(|_| ())
    }

    fn resolve_entry(
        &mut self,
        array: ArrayHandle,
        index: usize,
    ) -> Result<Option<Resolved>, InternalError> {
        let Some(entry) = self.array(array)?.entries.get(index).cloned() else {
            return Ok(None);
        };

        Ok(match entry {
            ArrayEntry::Unresolved(target) => match self.lookup_ref(&target) {
                Some(model) => {
                    self.array_mut(array)?.entries[index] = ArrayEntry::Model(model);
                    Some(Resolved::Model(model))
                }
                None => None,
            },
            ArrayEntry::Model(model) => self.models.contains(model).then_some(Resolved::Model(model)),
            ArrayEntry::Value(value) => Some(Resolved::Value(value)),
        })
    }

    /// Resolved view of an entry about to leave the array.
    fn detach_entry(&self, array: ArrayHandle, index: usize) -> Result<Resolved, InternalError> {
        let entry = self
            .array(array)?
            .entries
            .get(index)
            .cloned()
            .ok_or_else(|| InternalError::record_invariant("array entry vanished"))?;

        Ok(match entry {
            ArrayEntry::Unresolved(target) => self
                .lookup_ref(&target)
                .map_or_else(|| Resolved::Value(target.to_json()), Resolved::Model),
            ArrayEntry::Model(model) => match self.models.get(model) {
                Some(facade) if facade.kind == ModelKind::Nested => {
                    Resolved::Value(self.record_json(facade.record)?)
                }
                _ => Resolved::Model(model),
            },
            ArrayEntry::Value(value) => Resolved::Value(value),
        })
    }

    /// Turn a written value into an entry this array can hold.
    fn to_entry(
        &mut self,
        array: ArrayHandle,
        value: AttrValue,
    ) -> Result<ArrayEntry, InternalError> {
        let (kind, owner) = {
            let live = self.array(array)?;
            (live.kind, live.owner.clone())
        };

        let raw = match value {
            AttrValue::Array(_) => {
                return Err(ArrayError::UnsupportedElement {
                    kind: kind.label(),
                    element: "arrays",
                }
                .into());
            }
            AttrValue::Model(model) => {
                self.model(model)?;
                return Ok(ArrayEntry::Model(model));
            }
            AttrValue::Json(raw) => raw,
        };

        let context = owner.and_then(|owner| {
            let model_name = self.primary_model_name(owner.record).ok()?;
            Some((owner.record, model_name, owner.key))
        });

        match (kind, context) {
            (ArrayKind::Reference, Some((record, model_name, key))) => {
                let schema = Rc::clone(&self.schema);
                let mut reader = GraphReader::new(self, record, model_name.clone());
                match schema.compute_attribute_reference(&key, &raw, &model_name, &mut reader) {
                    Some(ReferenceSpec::One(target)) => Ok(ArrayEntry::Unresolved(target)),
                    _ => Err(ArrayError::UnsupportedElement {
                        kind: kind.label(),
                        element: "plain values",
                    }
                    .into()),
                }
            }
            (ArrayKind::Reference, None) => Err(ArrayError::UnsupportedElement {
                kind: kind.label(),
                element: "plain values",
            }
            .into()),
            (ArrayKind::Tracked, Some((record, model_name, key))) => {
                match self.nested_spec(record, &model_name, &key, &raw) {
                    Some(spec) => {
                        let child = self.new_child(record, &key, None, spec)?;
                        Ok(ArrayEntry::Model(self.nested_model_of(child)?))
                    }
                    None => Ok(ArrayEntry::Value(raw)),
                }
            }
            (ArrayKind::Tracked, None) => Ok(ArrayEntry::Value(raw)),
        }
    }

    /// Apply `f` to the entries, then re-key children and write the array
    /// into its owner's local bucket.
    fn mutate_array<R>(
        &mut self,
        array: ArrayHandle,
        f: impl FnOnce(&mut Vec<ArrayEntry>) -> Result<R, InternalError>,
    ) -> Result<R, InternalError> {
        let mut entries = std::mem::take(&mut self.array_mut(array)?.entries);
        let out = f(&mut entries);
        self.array_mut(array)?.entries = entries;
        let out = out?;

        self.sync_children(array)?;
        self.write_back(array)?;

        Ok(out)
    }

    /// Rebuild the owner's positional child slot from the array entries,
    /// destroying children that left the array.
    pub(crate) fn sync_children(&mut self, array: ArrayHandle) -> Result<(), InternalError> {
        let Some((record, key)) = self
            .array_slot_of(array)
            .map(|(record, key)| (record, key.to_string()))
        else {
            return Ok(());
        };
        if self.array(array)?.kind != ArrayKind::Tracked || !self.records.contains(record) {
            return Ok(());
        }

        let slot: Vec<Option<RecordHandle>> = self
            .array(array)?
            .entries
            .iter()
            .map(|entry| match entry {
                ArrayEntry::Model(model) => self
                    .models
                    .get(*model)
                    .filter(|facade| facade.kind == ModelKind::Nested)
                    .map(|facade| facade.record)
                    .filter(|child| self.is_child_of(*child, record, &key)),
                ArrayEntry::Unresolved(_) | ArrayEntry::Value(_) => None,
            })
            .collect();

        let previous = match self.record(record)?.children.get(&key) {
            Some(slot) => slot.records(),
            None => Vec::new(),
        };
        for child in previous {
            if !slot.contains(&Some(child)) {
                self.destroy_record(child, false)?;
            }
        }

        for (index, child) in slot.iter().enumerate() {
            if let Some(child) = child
                && let Some(link) = self.record_mut(*child)?.parent.as_mut()
            {
                link.index = Some(index);
            }
        }

        let rec = self.record_mut(record)?;
        if slot.iter().any(Option::is_some) {
            rec.children.insert(key, ChildSlot::Many(slot));
        } else {
            rec.children.remove(&key);
        }

        Ok(())
    }

    fn is_child_of(&self, child: RecordHandle, parent: RecordHandle, key: &str) -> bool {
        self.records
            .get(child)
            .and_then(|rec| rec.parent.as_ref())
            .is_some_and(|link| link.record == parent && link.key == key)
    }

    /// Record a local mutation of an owned array on its attribute.
    pub(crate) fn write_back(&mut self, array: ArrayHandle) -> Result<(), InternalError> {
        let Some((record, key)) = self
            .array_slot_of(array)
            .map(|(record, key)| (record, key.to_string()))
        else {
            return Ok(());
        };

        let value = AttrValue::Array(array);
        let model_name = self.primary_model_name(record)?;
        self.record_mut(record)?.local.insert(key.clone(), value.clone());
        sink::record(RecordEvent::LocalWrite {
            model_name: model_name.as_str(),
        });

        self.settle_local_write(record, &key, &value)
    }
}
