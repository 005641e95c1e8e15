use crate::{
    graph::{Arena, Model, ModelKind, RecordGraph},
    identity::{ModelName, RecordId, RecordIdentity},
    obs::{RecordEvent, RecordSink},
    record::RecordData,
    schema::{NestedModelSpec, RecordRef, ReferenceSpec, SchemaReader, TableSchema},
    value::AttrValue,
};
use serde_json::{Map, Value, json};
use std::cell::RefCell;

/// Book fixture tables: a base `book` with two projections, plus the
/// top-level models books point at.
pub(crate) const BOOK_SCHEMA_JSON: &str = r#"{
    "models": {
        "book": {
            "defaults": { "format": "hardcover" },
            "aliases": { "name": "title" }
        },
        "book-preview": {
            "attributes": ["title", "author"],
            "base": "book"
        },
        "book-excerpt": {
            "attributes": ["title", "excerpt"],
            "base": "book"
        },
        "author": {},
        "publisher": {}
    }
}"#;

///
/// BookSchema
///
/// References:
/// - `"urn:<type>:<id>"` strings and `{ "type", "id" }` objects are typed
/// - `"@<id>"` strings are untyped
/// - `authorId` reads `authorType` to decide its target model
/// - arrays whose every element is a reference, and `authors` always
///
/// Nested entities: any other object except under `metadata`. The model
/// name comes from its `type` field, falling back to the attribute key.
///

pub(crate) fn book_schema() -> TableSchema {
    TableSchema::from_json_str(BOOK_SCHEMA_JSON)
        .expect("book schema config")
        .with_reference_hook(book_reference)
        .with_nested_hook(book_nested)
}

pub(crate) fn graph() -> RecordGraph {
    RecordGraph::new(book_schema())
}

/// `json!` object literal as an attribute patch.
pub(crate) fn attrs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object literal, got {other}"),
    }
}

/// Facade over a record in a throwaway arena; only the handle matters.
pub(crate) fn detached_model() -> Model {
    let mut records = Arena::new();
    let record = records.insert(RecordData::new(RecordIdentity::new("book", None), false));

    Model::new(ModelName::new("book"), record, ModelKind::Base)
}

fn parse_ref(value: &Value) -> Option<RecordRef> {
    match value {
        Value::String(s) => {
            if let Some(id) = s.strip_prefix('@') {
                return Some(RecordRef::untyped(id));
            }
            let rest = s.strip_prefix("urn:")?;
            let (model_name, id) = rest.split_once(':')?;

            Some(RecordRef::typed(model_name, id))
        }
        Value::Object(obj) if obj.len() == 2 => {
            let model_name = obj.get("type")?.as_str()?;
            let id = RecordId::from_json(obj.get("id")?).ok()??;

            Some(RecordRef::typed(model_name, id))
        }
        _ => None,
    }
}

fn book_reference(
    key: &str,
    value: &Value,
    _model_name: &ModelName,
    reader: &mut dyn SchemaReader,
) -> Option<ReferenceSpec> {
    if key == "authorId" {
        let id = value.as_str()?;
        return match reader.get_attr("authorType") {
            Some(AttrValue::Json(Value::String(model_name))) => {
                Some(ReferenceSpec::One(RecordRef::typed(model_name, id)))
            }
            _ => Some(ReferenceSpec::One(RecordRef::untyped(id))),
        };
    }

    match value {
        Value::Array(items) if key == "authors" => {
            Some(ReferenceSpec::Many(items.iter().filter_map(parse_ref).collect()))
        }
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(parse_ref)
            .collect::<Option<Vec<_>>>()
            .map(ReferenceSpec::Many),
        other => parse_ref(other).map(ReferenceSpec::One),
    }
}

fn book_nested(
    key: &str,
    value: &Value,
    _model_name: &ModelName,
    _reader: &mut dyn SchemaReader,
) -> Option<NestedModelSpec> {
    if key == "metadata" {
        return None;
    }
    let obj = value.as_object()?;
    let model_name = obj.get("type").and_then(Value::as_str).unwrap_or(key);
    let id = obj
        .get("id")
        .and_then(|id| RecordId::from_json(id).ok())
        .flatten();

    Some(NestedModelSpec::new(model_name, id, obj.clone()))
}

///
/// CaptureSink
///
/// Records a compact label per event for assertions.
///

#[derive(Default)]
pub(crate) struct CaptureSink {
    events: RefCell<Vec<String>>,
}

impl CaptureSink {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub(crate) fn count(&self, label: &str) -> usize {
        self.events.borrow().iter().filter(|e| *e == label).count()
    }
}

impl RecordSink for CaptureSink {
    fn record(&self, event: RecordEvent<'_>) {
        let label = match event {
            RecordEvent::CacheHit { .. } => "cache_hit",
            RecordEvent::CacheMiss { .. } => "cache_miss",
            RecordEvent::ChildDestroyed { .. } => "child_destroyed",
            RecordEvent::ChildReified { .. } => "child_reified",
            RecordEvent::Commit { .. } => "commit",
            RecordEvent::Invalidated { .. } => "invalidated",
            RecordEvent::LocalWrite { .. } => "local_write",
            RecordEvent::Notified { .. } => "notified",
            RecordEvent::Push { .. } => "push",
            RecordEvent::Rollback { .. } => "rollback",
            RecordEvent::Unload { .. } => "unload",
        };
        self.events
            .borrow_mut()
            .push(format!("{label}:{}", event.model_name()));
    }
}

#[test]
fn book_schema_recognizes_each_reference_shape() {
    struct NoAttrs(ModelName);
    impl SchemaReader for NoAttrs {
        fn get_attr(&mut self, _key: &str) -> Option<AttrValue> {
            None
        }
        fn model_name(&self) -> &ModelName {
            &self.0
        }
    }
    let mut reader = NoAttrs(ModelName::new("book"));
    let book = ModelName::new("book");

    assert_eq!(
        book_reference("author", &json!("urn:author:a1"), &book, &mut reader),
        Some(ReferenceSpec::One(RecordRef::typed("author", "a1")))
    );
    assert_eq!(
        book_reference("author", &json!("@a1"), &book, &mut reader),
        Some(ReferenceSpec::One(RecordRef::untyped("a1")))
    );
    assert_eq!(
        book_reference("authors", &json!([]), &book, &mut reader),
        Some(ReferenceSpec::Many(Vec::new()))
    );
    assert_eq!(book_reference("tags", &json!(["a", "b"]), &book, &mut reader), None);
    assert!(book_nested("metadata", &json!({ "a": 1 }), &book, &mut reader).is_none());
}
