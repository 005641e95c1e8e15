//! Module: schema
//! Responsibility: the capability contract the record graph consumes.
//! Does not own: any record state; schema hooks see raw values only.
//!
//! The graph never inspects raw JSON on its own to decide what is a reference
//! or an embedded entity. Every such decision is delegated to a `Schema`.

mod spec;
mod table;


pub use spec::{NestedModelSpec, RecordRef, ReferenceSpec};
pub use table::{
    AttrTransform, ModelTable, NestedHook, ReferenceHook, ResolvedHook, SchemaConfig, TableSchema,
};

use crate::{error::InternalError, identity::ModelName, value::AttrValue};
use serde_json::Value;

///
/// SchemaReader
///
/// Read access to the raw attributes of the record being resolved. Every key
/// read through a reader becomes a dependency of the attribute under
/// resolution.
///

pub trait SchemaReader {
    /// Effective raw value (`local > inFlight > server`) of `key`.
    fn get_attr(&mut self, key: &str) -> Option<AttrValue>;

    /// Model name of the record being read.
    fn model_name(&self) -> &ModelName;
}

///
/// SchemaWriter
///
/// Write access handed to [`Schema::set_attribute`]. Writes go straight into
/// the local bucket without re-entering the schema hook.
///

pub trait SchemaWriter {
    fn set_attr(&mut self, key: &str, value: AttrValue) -> Result<(), InternalError>;

    fn get_attr(&mut self, key: &str) -> Option<AttrValue>;
}

///
/// Schema
///
/// Required hooks decide what is in scope, what is a reference, and what is
/// embedded. Optional hooks default to the graph's built-in behaviour.
///

pub trait Schema {
    /// Whether records of `model_name` are governed by this schema, and so
    /// enter the global identity index.
    fn includes_model(&self, model_name: &ModelName) -> bool;

    /// Reference(s) denoted by `value`, or `None` when it is plain data.
    fn compute_attribute_reference(
        &self,
        key: &str,
        value: &Value,
        model_name: &ModelName,
        reader: &mut dyn SchemaReader,
    ) -> Option<ReferenceSpec>;

    /// Embedded entity denoted by `value`, or `None` when it is plain data.
    fn compute_nested_model(
        &self,
        key: &str,
        value: &Value,
        model_name: &ModelName,
        reader: &mut dyn SchemaReader,
    ) -> Option<NestedModelSpec>;

    /// Base model whose store a projection of `model_name` shares.
    fn compute_base_model_name(&self, model_name: &ModelName) -> Option<ModelName> {
        let _ = model_name;
        None
    }

    /// Whether a written value can seed the resolution cache directly.
    fn is_attribute_resolved(
        &self,
        model_name: &ModelName,
        key: &str,
        value: &AttrValue,
        reader: &mut dyn SchemaReader,
    ) -> bool {
        let _ = (model_name, key, reader);
        value.is_resolved()
    }

    /// Write path for `key`; the default writes the value unchanged.
    fn set_attribute(
        &self,
        model_name: &ModelName,
        key: &str,
        value: AttrValue,
        writer: &mut dyn SchemaWriter,
    ) -> Result<(), InternalError> {
        let _ = model_name;
        writer.set_attr(key, value)
    }

    /// Attribute tables (whitelist, defaults, aliases, transforms).
    fn model_table(&self, model_name: &ModelName) -> Option<&ModelTable> {
        let _ = model_name;
        None
    }
}
