use crate::{
    error::InternalError,
    identity::ModelName,
    schema::{NestedModelSpec, ReferenceSpec, Schema, SchemaReader},
    value::AttrValue,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Read-side transform applied to plain JSON attribute values.
pub type AttrTransform = fn(&Value) -> Value;

/// Reference hook used by [`TableSchema`].
pub type ReferenceHook =
    fn(&str, &Value, &ModelName, &mut dyn SchemaReader) -> Option<ReferenceSpec>;

/// Nested-model hook used by [`TableSchema`].
pub type NestedHook =
    fn(&str, &Value, &ModelName, &mut dyn SchemaReader) -> Option<NestedModelSpec>;

/// Per-key override of the "already resolved" heuristic; `None` defers to it.
pub type ResolvedHook = fn(&ModelName, &str, &AttrValue, &mut dyn SchemaReader) -> Option<bool>;

///
/// ModelTable
///
/// Declarative per-model attribute tables.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelTable {
    /// Attribute whitelist; `None` leaves the model unrestricted.
    pub attributes: Option<Vec<String>>,

    /// Values read when an attribute is absent from every bucket.
    pub defaults: BTreeMap<String, Value>,

    /// alias -> attribute key
    pub aliases: BTreeMap<String, String>,

    /// Base model whose store this model projects.
    pub base: Option<ModelName>,

    #[serde(skip)]
    pub transforms: BTreeMap<String, AttrTransform>,
}

impl ModelTable {
    #[must_use]
    pub fn allows(&self, key: &str) -> bool {
        self.attributes
            .as_ref()
            .is_none_or(|attributes| attributes.iter().any(|attr| attr == key))
    }

    #[must_use]
    pub fn resolve_alias<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map_or(key, String::as_str)
    }

    #[must_use]
    pub fn default_for(&self, key: &str) -> Option<&Value> {
        self.defaults.get(key)
    }

    #[must_use]
    pub fn transform(&self, key: &str, value: Value) -> Value {
        match self.transforms.get(key) {
            Some(transform) => transform(&value),
            None => value,
        }
    }
}

///
/// SchemaConfig
///
/// Serializable schema tables, typically loaded from JSON.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    pub models: BTreeMap<ModelName, ModelTable>,

    /// Govern every model name, not only the ones listed in `models`.
    pub include_all_models: bool,
}

impl SchemaConfig {
    pub fn from_json_str(json: &str) -> Result<Self, InternalError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json(value: Value) -> Result<Self, InternalError> {
        Ok(serde_json::from_value(value)?)
    }
}

///
/// TableSchema
///
/// Ready-made [`Schema`] driven by a [`SchemaConfig`] plus function hooks.
/// Without hooks nothing is a reference and nothing is embedded.
///

#[derive(Clone, Debug, Default)]
pub struct TableSchema {
    config: SchemaConfig,
    reference_hook: Option<ReferenceHook>,
    nested_hook: Option<NestedHook>,
    resolved_hook: Option<ResolvedHook>,
}

impl TableSchema {
    #[must_use]
    pub const fn new(config: SchemaConfig) -> Self {
        Self {
            config,
            reference_hook: None,
            nested_hook: None,
            resolved_hook: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, InternalError> {
        SchemaConfig::from_json_str(json).map(Self::new)
    }

    #[must_use]
    pub const fn config(&self) -> &SchemaConfig {
        &self.config
    }

    #[must_use]
    pub fn with_reference_hook(mut self, hook: ReferenceHook) -> Self {
        self.reference_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_nested_hook(mut self, hook: NestedHook) -> Self {
        self.nested_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_resolved_hook(mut self, hook: ResolvedHook) -> Self {
        self.resolved_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model_name: impl Into<ModelName>, table: ModelTable) -> Self {
        self.config.models.insert(model_name.into(), table);
        self
    }

    #[must_use]
    pub fn with_transform(
        mut self,
        model_name: impl Into<ModelName>,
        key: impl Into<String>,
        transform: AttrTransform,
    ) -> Self {
        self.config
            .models
            .entry(model_name.into())
            .or_default()
            .transforms
            .insert(key.into(), transform);
        self
    }
}

impl Schema for TableSchema {
    fn includes_model(&self, model_name: &ModelName) -> bool {
        self.config.include_all_models || self.config.models.contains_key(model_name)
    }

    fn compute_attribute_reference(
        &self,
        key: &str,
        value: &Value,
        model_name: &ModelName,
        reader: &mut dyn SchemaReader,
    ) -> Option<ReferenceSpec> {
        self.reference_hook
            .and_then(|hook| hook(key, value, model_name, reader))
    }

    fn compute_nested_model(
        &self,
        key: &str,
        value: &Value,
        model_name: &ModelName,
        reader: &mut dyn SchemaReader,
    ) -> Option<NestedModelSpec> {
        self.nested_hook
            .and_then(|hook| hook(key, value, model_name, reader))
    }

    fn compute_base_model_name(&self, model_name: &ModelName) -> Option<ModelName> {
        self.config
            .models
            .get(model_name)
            .and_then(|table| table.base.clone())
    }

    fn is_attribute_resolved(
        &self,
        model_name: &ModelName,
        key: &str,
        value: &AttrValue,
        reader: &mut dyn SchemaReader,
    ) -> bool {
        self.resolved_hook
            .and_then(|hook| hook(model_name, key, value, reader))
            .unwrap_or_else(|| value.is_resolved())
    }

    fn model_table(&self, model_name: &ModelName) -> Option<&ModelTable> {
        self.config.models.get(model_name)
    }
}
