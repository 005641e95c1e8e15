#![allow(dead_code)]

use recgraph::{core::error::InternalError, prelude::*};

///
/// LibrarySchema
///
/// Hand-written schema over a small library domain:
/// - `*Id` string attributes are untyped references
/// - `authorIds` arrays are reference lists
/// - `nextChapter` objects and `chapters` elements embed `chapter` records
/// - `book-card` projects `book` through a `title`/`authorId` whitelist
/// - writing `fullName` on an author splits it into `firstName`/`lastName`
///

pub struct LibrarySchema {
    card: ModelTable,
}

impl LibrarySchema {
    pub fn new() -> Self {
        Self {
            card: ModelTable {
                attributes: Some(vec!["title".to_string(), "authorId".to_string()]),
                base: Some(ModelName::new("book")),
                ..ModelTable::default()
            },
        }
    }
}

impl Schema for LibrarySchema {
    fn includes_model(&self, model_name: &ModelName) -> bool {
        matches!(model_name.as_str(), "book" | "book-card" | "author")
    }

    fn compute_attribute_reference(
        &self,
        key: &str,
        value: &Value,
        _model_name: &ModelName,
        _reader: &mut dyn SchemaReader,
    ) -> Option<ReferenceSpec> {
        match value {
            Value::String(id) if key.ends_with("Id") => {
                Some(ReferenceSpec::One(RecordRef::untyped(id.as_str())))
            }
            Value::Array(items) if key == "authorIds" => Some(ReferenceSpec::Many(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(RecordRef::untyped)
                    .collect(),
            )),
            _ => None,
        }
    }

    fn compute_nested_model(
        &self,
        key: &str,
        value: &Value,
        _model_name: &ModelName,
        _reader: &mut dyn SchemaReader,
    ) -> Option<NestedModelSpec> {
        if !matches!(key, "nextChapter" | "chapters") {
            return None;
        }
        let obj = value.as_object()?;
        let id = obj.get("id").and_then(Value::as_str).map(RecordId::new);

        Some(NestedModelSpec::new("chapter", id, obj.clone()))
    }

    fn compute_base_model_name(&self, model_name: &ModelName) -> Option<ModelName> {
        (model_name.as_str() == "book-card").then(|| ModelName::new("book"))
    }

    fn set_attribute(
        &self,
        model_name: &ModelName,
        key: &str,
        value: AttrValue,
        writer: &mut dyn SchemaWriter,
    ) -> Result<(), InternalError> {
        if model_name.as_str() == "author"
            && key == "fullName"
            && let Some(Value::String(full)) = value.as_json()
            && let Some((first, last)) = full.split_once(' ')
        {
            writer.set_attr("firstName", json!(first).into())?;
            return writer.set_attr("lastName", json!(last).into());
        }

        writer.set_attr(key, value)
    }

    fn model_table(&self, model_name: &ModelName) -> Option<&ModelTable> {
        (model_name.as_str() == "book-card").then_some(&self.card)
    }
}

pub fn library() -> RecordGraph {
    RecordGraph::new(LibrarySchema::new())
}

/// `json!` object literal as an attribute patch.
pub fn attrs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object literal, got {other}"),
    }
}

/// Plain JSON read through a facade.
pub fn read(graph: &mut RecordGraph, model: ModelHandle, key: &str) -> Option<Value> {
    graph
        .get(model, key)
        .expect("read")
        .and_then(|resolved| resolved.as_value().cloned())
}

pub fn read_model(graph: &mut RecordGraph, model: ModelHandle, key: &str) -> Option<ModelHandle> {
    graph
        .get(model, key)
        .expect("read")
        .and_then(|resolved| resolved.as_model())
}
