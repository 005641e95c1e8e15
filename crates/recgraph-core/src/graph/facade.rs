//! Typed facades: loading, creation, projection groups, and the
//! whitelist-filtered read/write surface.

use crate::{
    error::{IdentityError, InternalError, ProjectionError},
    graph::{Model, ModelHandle, ModelKind, RecordGraph, RecordHandle},
    identity::{ModelName, RecordId, RecordIdentity},
    record::RecordData,
    value::{AttrValue, Resolved},
};
use serde_json::{Map, Value};
use std::rc::Rc;

impl RecordGraph {
    /// Load server data for (`model_name`, `id`), creating the facade (and
    /// its base record) on first sight and merging as a patch afterwards.
    pub fn push(
        &mut self,
        model_name: impl Into<ModelName>,
        id: impl Into<RecordId>,
        attrs: Map<String, Value>,
    ) -> Result<ModelHandle, InternalError> {
        let model_name = model_name.into();
        let id = id.into();

        if let Some(model) = self.peek(&model_name, &id) {
            let record = self.model(model)?.record;
            self.push_data(record, attrs, true)?;

            return Ok(model);
        }

        let record = self.base_record(&model_name, Some(id), false);
        let model = self.attach_facade(record, model_name)?;
        self.push_data(record, attrs, true)?;

        // a fresh facade has no observers yet
        self.pending.remove(&model);

        Ok(model)
    }

    /// Create a locally-authored record. Attributes land in the local
    /// bucket; `id` may be absent until the server assigns one.
    pub fn create_record(
        &mut self,
        model_name: impl Into<ModelName>,
        id: Option<RecordId>,
        attrs: Map<String, Value>,
    ) -> Result<ModelHandle, InternalError> {
        let model_name = model_name.into();
        let id = match id {
            Some(id) => Some(id),
            None => match attrs.get(&self.config.identity_key) {
                Some(value) => RecordId::from_json(value)?,
                None => None,
            },
        };

        if let Some(id) = &id
            && self.peek(&model_name, id).is_some()
        {
            return Err(IdentityError::DuplicateIdentity {
                model_name: model_name.to_string(),
                id: id.to_string(),
            }
            .into());
        }

        let schema = Rc::clone(&self.schema);
        let table = schema.model_table(&model_name);
        let mut writes = Vec::with_capacity(attrs.len());
        for (key, value) in attrs {
            if key == self.config.identity_key {
                continue;
            }
            let key = table.map_or(key.as_str(), |t| t.resolve_alias(&key)).to_string();
            if !self.allows(&model_name, &key) {
                return Err(ProjectionError::WhitelistViolation {
                    model_name: model_name.to_string(),
                    key,
                }
                .into());
            }
            writes.push((key, value));
        }

        let record = self.base_record(&model_name, id, true);
        let model = self.attach_facade(record, model_name.clone())?;
        for (key, value) in writes {
            self.set_attr_as(record, &model_name, &key, AttrValue::Json(value))?;
        }
        self.pending.remove(&model);

        Ok(model)
    }

    /// Whitelist-filtered read through a facade: aliases, then defaults
    /// for absent keys, then resolution, then transforms on plain values.
    /// The identity key is readable on every facade.
    pub fn get(&mut self, model: ModelHandle, key: &str) -> Result<Option<Resolved>, InternalError> {
        let (model_name, record) = {
            let facade = self.model(model)?;
            (facade.model_name.clone(), facade.record)
        };
        let schema = Rc::clone(&self.schema);
        let table = schema.model_table(&model_name);
        let key = table.map_or(key, |t| t.resolve_alias(key));

        if key == self.config.identity_key {
            let id = self.record(record)?.identity.id.as_ref();
            return Ok(id.map(|id| Resolved::Value(id.to_json())));
        }
        if table.is_some_and(|t| !t.allows(key)) {
            return Ok(None);
        }
        if self.record(record)?.effective(key).is_none() {
            let default = table.and_then(|t| t.default_for(key)).cloned();
            return Ok(default.map(Resolved::Value));
        }

        let resolved = self.resolve_attr(model, key)?;

        Ok(resolved.map(|resolved| match (resolved, table) {
            (Resolved::Value(value), Some(table)) => Resolved::Value(table.transform(key, value)),
            (resolved, _) => resolved,
        }))
    }

    /// Whitelist-checked write through a facade. A rejected key mutates
    /// nothing.
    pub fn set(
        &mut self,
        model: ModelHandle,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), InternalError> {
        let (model_name, record) = {
            let facade = self.model(model)?;
            (facade.model_name.clone(), facade.record)
        };
        let schema = Rc::clone(&self.schema);
        let key = schema
            .model_table(&model_name)
            .map_or(key, |t| t.resolve_alias(key));

        if !self.allows(&model_name, key) {
            return Err(ProjectionError::WhitelistViolation {
                model_name: model_name.to_string(),
                key: key.to_string(),
            }
            .into());
        }

        self.set_attr_as(record, &model_name, key, value.into())
    }

    /// Pin a record so projection teardown leaves it in place.
    pub fn hold_record(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let rec = self.record_mut(record)?;
        rec.holds = rec.holds.saturating_add(1);

        Ok(())
    }

    /// Drop one pin; an unpinned record with no facades is torn down.
    pub fn release_record(&mut self, record: RecordHandle) -> Result<(), InternalError> {
        let rec = self.record_mut(record)?;
        rec.holds = rec.holds.saturating_sub(1);

        self.collect_if_orphaned(record)
    }

    pub fn model_name(&self, model: ModelHandle) -> Result<&ModelName, InternalError> {
        Ok(&self.model(model)?.model_name)
    }

    pub fn model_kind(&self, model: ModelHandle) -> Result<ModelKind, InternalError> {
        Ok(self.model(model)?.kind)
    }

    pub fn record_of(&self, model: ModelHandle) -> Result<RecordHandle, InternalError> {
        Ok(self.model(model)?.record)
    }

    pub fn id_of(&self, model: ModelHandle) -> Result<Option<RecordId>, InternalError> {
        let record = self.model(model)?.record;

        Ok(self.record(record)?.identity.id.clone())
    }

    #[must_use]
    pub fn is_live(&self, model: ModelHandle) -> bool {
        self.models.contains(model)
    }

    // ------------------------------------------------------------------
    // Projection groups
    // ------------------------------------------------------------------

    /// Get or create the base record a facade of `model_name` delegates to.
    fn base_record(
        &mut self,
        model_name: &ModelName,
        id: Option<RecordId>,
        is_new: bool,
    ) -> RecordHandle {
        let base = self
            .schema
            .compute_base_model_name(model_name)
            .unwrap_or_else(|| model_name.clone());

        if let Some(id) = &id
            && let Some(record) = self.peek_record(&base, id)
        {
            return record;
        }

        let record = self
            .records
            .insert(RecordData::new(RecordIdentity::new(base.clone(), id.clone()), is_new));
        if let Some(id) = id {
            self.record_index.insert((base, id), record);
        }

        record
    }

    fn attach_facade(
        &mut self,
        record: RecordHandle,
        model_name: ModelName,
    ) -> Result<ModelHandle, InternalError> {
        let (base, id) = {
            let rec = self.record(record)?;
            (rec.identity.model_name.clone(), rec.identity.id.clone())
        };
        let kind = if model_name == base {
            ModelKind::Base
        } else {
            ModelKind::Projection
        };

        let model = self
            .models
            .insert(Model::new(model_name.clone(), record, kind));
        let rec = self.record_mut(record)?;
        match kind {
            ModelKind::Base => rec.owner = Some(model),
            ModelKind::Projection => rec.projections.push(model),
            ModelKind::Nested => {}
        }

        if let Some(id) = id {
            self.index_model(model, model_name, id);
        }

        Ok(model)
    }

    pub(crate) fn index_model(&mut self, model: ModelHandle, model_name: ModelName, id: RecordId) {
        if self.schema.includes_model(&model_name) {
            self.global.insert(id.clone(), model);
        }
        self.model_index.insert((model_name, id), model);
    }
}
