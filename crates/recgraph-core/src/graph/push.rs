use crate::{
    error::InternalError,
    graph::{RecordGraph, RecordHandle},
    identity::ModelName,
    obs::sink::{self, RecordEvent},
    record::ChildSlot,
    value::AttrValue,
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

impl RecordGraph {
    /// Merge server data into `record` as a patch. Keys absent from `patch`
    /// are untouched, and keys hidden by local or in-flight edits are stored
    /// without being reported.
    ///
    /// Returns the changed top-level keys when `calculate_change` is set,
    /// and queues notifications for every facade of the record.
    pub fn push_data(
        &mut self,
        record: RecordHandle,
        patch: Map<String, Value>,
        calculate_change: bool,
    ) -> Result<Vec<String>, InternalError> {
        let model_name = self.primary_model_name(record)?;
        let mut changed = BTreeSet::new();

        for (key, value) in patch {
            if key == self.config.identity_key {
                continue;
            }
            if self.push_key(record, &model_name, &key, value, calculate_change)? {
                changed.insert(key);
            }
        }

        self.fan_out(record, &changed, calculate_change)?;
        sink::record(RecordEvent::Push {
            model_name: model_name.as_str(),
            changed: changed.len() as u64,
        });

        if calculate_change {
            Ok(changed.into_iter().collect())
        } else {
            Ok(Vec::new())
        }
    }

    fn push_key(
        &mut self,
        record: RecordHandle,
        model_name: &ModelName,
        key: &str,
        value: Value,
        calculate_change: bool,
    ) -> Result<bool, InternalError> {
        let rec = self.record(record)?;
        if rec.is_shadowed(key) {
            self.record_mut(record)?
                .server
                .insert(key.to_string(), AttrValue::Json(value));
            return Ok(false);
        }

        let mut child_replaced = false;
        match rec.children.get(key).cloned() {
            Some(ChildSlot::One(child)) => {
                let same = self.nested_spec(record, model_name, key, &value).filter(|spec| {
                    self.records
                        .get(child)
                        .is_some_and(|c| c.identity.same_nested_slot(&spec.identity()))
                });

                if let Some(spec) = same {
                    self.push_data(child, spec.attributes, calculate_change)?;
                    self.record_mut(record)?
                        .server
                        .insert(key.to_string(), AttrValue::Json(value));
                    return Ok(false);
                }

                self.destroy_child_slot(record, key)?;
                child_replaced = true;
            }
            Some(ChildSlot::Many(_)) => self.destroy_child_slot(record, key)?,
            None => {}
        }

        let is_array = value.is_array();
        let value = AttrValue::Json(value);
        let rec = self.record_mut(record)?;
        let differs = rec.effective(key) != Some(&value);
        rec.server.insert(key.to_string(), value);

        Ok(child_replaced || differs || is_array)
    }
}
