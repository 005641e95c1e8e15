use crate::{
    error::InternalError,
    graph::{ArrayEntry, ArrayHandle, ModelHandle, ModelKind, RecordGraph, RecordHandle},
    identity::RecordIdentity,
    record::{ChildSlot, ParentLink, RecordData},
    schema::RecordRef,
    value::AttrValue,
};
use serde_json::{Map, Value};

impl RecordGraph {
    /// Effective raw value of `key`, with reified children rendered in
    /// place; the identity key reads the record id.
    pub fn get_attr(
        &self,
        record: RecordHandle,
        key: &str,
    ) -> Result<Option<AttrValue>, InternalError> {
        let rec = self.record(record)?;
        if key == self.config.identity_key {
            return Ok(rec.identity.id.as_ref().map(|id| id.to_json().into()));
        }

        self.composed_attr(rec, key)
    }

    pub fn get_server_attr(
        &self,
        record: RecordHandle,
        key: &str,
    ) -> Result<Option<AttrValue>, InternalError> {
        Ok(self.record(record)?.server.get(key).cloned())
    }

    pub fn has_attr(&self, record: RecordHandle, key: &str) -> Result<bool, InternalError> {
        let rec = self.record(record)?;
        if key == self.config.identity_key {
            return Ok(rec.identity.id.is_some());
        }

        Ok(rec.effective(key).is_some())
    }

    pub fn has_local_attr(&self, record: RecordHandle, key: &str) -> Result<bool, InternalError> {
        Ok(self.record(record)?.local.contains_key(key))
    }

    /// Visit every attribute with its effective raw value, in key order.
    pub fn each_attribute(
        &self,
        record: RecordHandle,
        mut f: impl FnMut(&str, &AttrValue),
    ) -> Result<(), InternalError> {
        let rec = self.record(record)?;
        for key in rec.attribute_keys() {
            if let Some(value) = rec.effective(&key) {
                f(&key, value);
            }
        }

        Ok(())
    }

    pub fn is_committing(&self, record: RecordHandle) -> Result<bool, InternalError> {
        Ok(self.record(record)?.committing)
    }

    pub fn is_new(&self, record: RecordHandle) -> Result<bool, InternalError> {
        Ok(self.record(record)?.is_new)
    }

    pub fn identity_of(&self, record: RecordHandle) -> Result<&RecordIdentity, InternalError> {
        Ok(&self.record(record)?.identity)
    }

    pub fn parent_of(&self, record: RecordHandle) -> Result<Option<&ParentLink>, InternalError> {
        Ok(self.record(record)?.parent.as_ref())
    }

    // ------------------------------------------------------------------
    // JSON snapshots
    // ------------------------------------------------------------------

    /// Effective attributes composed with reified children.
    pub fn record_json(&self, record: RecordHandle) -> Result<Value, InternalError> {
        let rec = self.record(record)?;
        let mut out = Map::new();

        if let Some(id) = &rec.identity.id {
            out.insert(self.config.identity_key.clone(), id.to_json());
        }

        for key in rec.attribute_keys() {
            let json = match self.composed_attr(rec, &key)? {
                Some(AttrValue::Json(json)) => json,
                Some(value) => self.value_json(&value)?,
                None => continue,
            };
            out.insert(key, json);
        }

        Ok(Value::Object(out))
    }

    /// Bucket value of `key` with the children reified under it rendered
    /// over the raw JSON they came from.
    pub(crate) fn composed_attr(
        &self,
        rec: &RecordData,
        key: &str,
    ) -> Result<Option<AttrValue>, InternalError> {
        let Some(value) = rec.effective(key) else {
            return Ok(None);
        };

        let json = match (rec.children.get(key), value) {
            (Some(ChildSlot::One(child)), _) => self.record_json(*child)?,
            (Some(ChildSlot::Many(children)), AttrValue::Json(Value::Array(items))) => {
                let mut items = items.clone();
                for (item, child) in items.iter_mut().zip(children) {
                    if let Some(child) = child {
                        *item = self.record_json(*child)?;
                    }
                }
                Value::Array(items)
            }
            (_, value) => return Ok(Some(value.clone())),
        };

        Ok(Some(AttrValue::Json(json)))
    }

    pub fn value_json(&self, value: &AttrValue) -> Result<Value, InternalError> {
        match value {
            AttrValue::Json(value) => Ok(value.clone()),
            AttrValue::Model(model) => self.model_json(*model),
            AttrValue::Array(array) => self.array_json(*array),
        }
    }

    /// Nested facades render their record; others render as a reference.
    /// A facade that is gone renders as null.
    pub fn model_json(&self, model: ModelHandle) -> Result<Value, InternalError> {
        let Some(facade) = self.models.get(model) else {
            return Ok(Value::Null);
        };
        if facade.kind == ModelKind::Nested {
            return self.record_json(facade.record);
        }

        let id = self.record(facade.record)?.identity.id.clone();

        Ok(id.map_or(Value::Null, |id| {
            RecordRef::typed(facade.model_name.clone(), id).to_json()
        }))
    }

    pub fn array_json(&self, array: ArrayHandle) -> Result<Value, InternalError> {
        self.array(array)?
            .entries
            .iter()
            .map(|entry| match entry {
                ArrayEntry::Unresolved(target) => Ok(target.to_json()),
                ArrayEntry::Model(model) => self.model_json(*model),
                ArrayEntry::Value(value) => Ok(value.clone()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}
