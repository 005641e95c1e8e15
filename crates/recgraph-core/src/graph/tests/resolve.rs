use super::{notified, read, read_model, record};
use crate::{
    graph::ModelKind,
    obs::with_record_sink,
    test_support::{CaptureSink, attrs, graph},
    value::Resolved,
};
use serde_json::json;
use std::rc::Rc;

#[test]
fn typed_reference_resolves_to_the_loaded_facade() {
    let mut g = graph();
    let author = g.push("author", "a1", attrs(json!({ "name": "Ann" }))).unwrap();
    let book = g
        .push("book", "b1", attrs(json!({ "author": "urn:author:a1" })))
        .unwrap();

    assert_eq!(read_model(&mut g, book, "author"), Some(author));
}

#[test]
fn missing_referents_resolve_once_they_load() {
    let mut g = graph();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "author": "urn:author:a9", "editor": "@e1" })),
        )
        .unwrap();

    assert_eq!(g.get(book, "author").unwrap(), None);
    assert_eq!(g.get(book, "editor").unwrap(), None);
    assert!(!g.model_data(book).unwrap().cache().contains("author"));

    let author = g.push("author", "a9", attrs(json!({}))).unwrap();
    let editor = g.push("author", "e1", attrs(json!({}))).unwrap();

    assert_eq!(read_model(&mut g, book, "author"), Some(author));
    assert_eq!(read_model(&mut g, book, "editor"), Some(editor));
}

#[test]
fn untyped_references_skip_models_outside_the_schema() {
    let mut g = graph();
    g.push("draft", "x1", attrs(json!({}))).unwrap();
    let book = g.push("book", "b1", attrs(json!({ "editor": "@x1" }))).unwrap();

    assert_eq!(g.get(book, "editor").unwrap(), None);
    assert_eq!(g.lookup_id(&"x1".into()), None);
}

#[test]
fn dependency_change_invalidates_and_notifies_dependents() {
    let mut g = graph();
    let author = g.push("author", "x1", attrs(json!({}))).unwrap();
    let publisher = g.push("publisher", "x1", attrs(json!({}))).unwrap();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "authorType": "author", "authorId": "x1" })),
        )
        .unwrap();
    let rec = record(&g, book);

    assert_eq!(read_model(&mut g, book, "authorId"), Some(author));

    g.push_data(rec, attrs(json!({ "authorType": "publisher" })), true)
        .unwrap();

    assert_eq!(
        notified(&mut g, book),
        vec!["authorId".to_string(), "authorType".to_string()]
    );
    assert_eq!(read_model(&mut g, book, "authorId"), Some(publisher));
}

#[test]
fn second_read_is_a_cache_hit() {
    let mut g = graph();
    let book = g.push("book", "b1", attrs(json!({ "title": "T" }))).unwrap();
    let sink = Rc::new(CaptureSink::default());

    with_record_sink(sink.clone(), || {
        read(&mut g, book, "title");
        read(&mut g, book, "title");
    });

    assert_eq!(sink.count("cache_miss:book"), 1);
    assert_eq!(sink.count("cache_hit:book"), 1);
}

#[test]
fn nested_chapter_is_not_reified_before_first_read() {
    let mut g = graph();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({
                "title": "Dune",
                "nextChapter": { "type": "chapter", "id": "c2", "title": "Two" }
            })),
        )
        .unwrap();
    let rec = record(&g, book);

    assert!(g.record_data(rec).unwrap().children.is_empty());
    assert_eq!(g.model_count(), 1);

    let chapter = read_model(&mut g, book, "nextChapter").unwrap();

    assert_eq!(g.model_count(), 2);
    assert_eq!(g.model_kind(chapter).unwrap(), ModelKind::Nested);
    assert_eq!(read(&mut g, chapter, "title"), Some(json!("Two")));
    assert_eq!(g.id_of(chapter).unwrap(), Some("c2".into()));

    let link = g.parent_of(record(&g, chapter)).unwrap().cloned().unwrap();
    assert_eq!(link.record, rec);
    assert_eq!(link.key, "nextChapter");
    assert_eq!(link.index, None);

    // nested entities stay out of the identity indexes
    assert_eq!(g.peek(&"chapter".into(), &"c2".into()), None);
    assert_eq!(g.lookup_id(&"c2".into()), None);
}

#[test]
fn arrays_of_nested_entities_reify_every_element() {
    let mut g = graph();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "chapters": [
                { "type": "chapter", "id": "c1", "title": "One" },
                { "type": "chapter", "id": "c2", "title": "Two" },
                "interlude"
            ] })),
        )
        .unwrap();

    let Some(Resolved::Array(chapters)) = g.get(book, "chapters").unwrap() else {
        panic!("chapters should resolve to an array");
    };

    assert_eq!(g.model_count(), 3);
    assert_eq!(g.array_len(chapters).unwrap(), 3);
    assert_eq!(
        g.array_get(chapters, 2).unwrap(),
        Some(Resolved::Value(json!("interlude")))
    );

    let second = g.array_get(chapters, 1).unwrap().and_then(|r| r.as_model()).unwrap();
    assert_eq!(read(&mut g, second, "title"), Some(json!("Two")));
    assert_eq!(
        g.parent_of(record(&g, second)).unwrap().unwrap().index,
        Some(1)
    );
}

#[test]
fn value_equal_array_push_rebuilds_elements_in_the_same_array() {
    let mut g = graph();
    let data = json!({ "chapters": [{ "type": "chapter", "id": "c1", "title": "One" }] });
    let book = g.push("book", "b1", attrs(data.clone())).unwrap();
    let rec = record(&g, book);

    let Some(Resolved::Array(chapters)) = g.get(book, "chapters").unwrap() else {
        panic!("chapters should resolve to an array");
    };
    let before = g.array_get(chapters, 0).unwrap().and_then(|r| r.as_model()).unwrap();

    g.push_data(rec, attrs(data), true).unwrap();

    assert_eq!(
        g.get(book, "chapters").unwrap(),
        Some(Resolved::Array(chapters))
    );
    let after = g.array_get(chapters, 0).unwrap().and_then(|r| r.as_model()).unwrap();
    assert_ne!(before, after);
    assert!(!g.is_live(before));
    assert_eq!(read(&mut g, after, "title"), Some(json!("One")));
}

#[test]
fn table_defaults_aliases_and_transforms_apply_on_read() {
    fn shout(value: &serde_json::Value) -> serde_json::Value {
        value
            .as_str()
            .map_or_else(|| value.clone(), |s| json!(s.to_uppercase()))
    }

    let schema = crate::test_support::book_schema().with_transform("book", "subtitle", shout);
    let mut g = crate::graph::RecordGraph::new(schema);
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "title": "Dune", "subtitle": "saga" })),
        )
        .unwrap();

    assert_eq!(read(&mut g, book, "format"), Some(json!("hardcover")));
    assert_eq!(read(&mut g, book, "name"), Some(json!("Dune")));
    assert_eq!(read(&mut g, book, "subtitle"), Some(json!("SAGA")));
    assert_eq!(read(&mut g, book, "id"), Some(json!("b1")));

    g.set(book, "name", json!("Dune Messiah")).unwrap();
    assert_eq!(read(&mut g, book, "title"), Some(json!("Dune Messiah")));
}

/// `lead` follows the `authorId` of whatever sits under `nextChapter`.
fn lead_from_next_chapter(
    key: &str,
    _value: &serde_json::Value,
    _model_name: &crate::identity::ModelName,
    reader: &mut dyn crate::schema::SchemaReader,
) -> Option<crate::schema::ReferenceSpec> {
    if key != "lead" {
        return None;
    }
    let Some(crate::value::AttrValue::Json(chapter)) = reader.get_attr("nextChapter") else {
        return None;
    };
    let author = chapter.get("authorId")?.as_str()?;

    Some(crate::schema::ReferenceSpec::One(
        crate::schema::RecordRef::untyped(author),
    ))
}

fn lead_graph() -> crate::graph::RecordGraph {
    crate::graph::RecordGraph::new(
        crate::test_support::book_schema().with_reference_hook(lead_from_next_chapter),
    )
}

#[test]
fn pushing_into_a_kept_child_invalidates_keys_that_read_it() {
    let mut g = lead_graph();
    let a1 = g.push("author", "a1", attrs(json!({}))).unwrap();
    let a2 = g.push("author", "a2", attrs(json!({}))).unwrap();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "lead": true, "nextChapter": { "id": "c1", "authorId": "a1" } })),
        )
        .unwrap();
    let chapter = read_model(&mut g, book, "nextChapter").unwrap();
    assert_eq!(read_model(&mut g, book, "lead"), Some(a1));
    g.take_notifications();

    g.push_data(
        record(&g, book),
        attrs(json!({ "nextChapter": { "id": "c1", "authorId": "a2" } })),
        true,
    )
    .unwrap();

    assert_eq!(notified(&mut g, book), vec!["lead".to_string()]);
    assert_eq!(read_model(&mut g, book, "nextChapter"), Some(chapter));
    assert_eq!(read_model(&mut g, book, "lead"), Some(a2));
}

#[test]
fn writing_into_a_kept_child_updates_the_parent_view() {
    let mut g = lead_graph();
    let a1 = g.push("author", "a1", attrs(json!({}))).unwrap();
    let a2 = g.push("author", "a2", attrs(json!({}))).unwrap();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "lead": true, "nextChapter": { "id": "c1", "authorId": "a1" } })),
        )
        .unwrap();
    let rec = record(&g, book);
    let chapter = read_model(&mut g, book, "nextChapter").unwrap();
    assert_eq!(read_model(&mut g, book, "lead"), Some(a1));

    g.set(book, "nextChapter", json!({ "id": "c1", "authorId": "a2" }))
        .unwrap();

    assert_eq!(read_model(&mut g, book, "nextChapter"), Some(chapter));
    assert_eq!(
        g.get_attr(rec, "nextChapter").unwrap(),
        Some(json!({ "id": "c1", "authorId": "a2" }).into())
    );
    assert_eq!(read_model(&mut g, book, "lead"), Some(a2));

    g.set(chapter, "authorId", json!("a1")).unwrap();
    assert_eq!(read_model(&mut g, book, "lead"), Some(a1));
}
