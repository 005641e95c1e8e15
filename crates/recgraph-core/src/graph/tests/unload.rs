use super::{notified, read, read_model, record};
use crate::{
    obs::with_record_sink,
    test_support::{CaptureSink, attrs, graph},
    value::Resolved,
};
use serde_json::json;
use std::rc::Rc;

#[test]
fn unload_record_clears_every_index() {
    let mut g = graph();
    let book = g.push("book", "b1", attrs(json!({ "title": "T" }))).unwrap();
    let rec = record(&g, book);

    g.unload_record(rec).unwrap();

    assert!(!g.is_live(book));
    assert_eq!(g.peek(&"book".into(), &"b1".into()), None);
    assert_eq!(g.peek_record(&"book".into(), &"b1".into()), None);
    assert_eq!(g.lookup_id(&"b1".into()), None);
    assert_eq!(g.record_count(), 0);
    assert!(g.get(book, "title").unwrap_err().is_not_found());
}

#[test]
fn unloading_a_referenced_model_invalidates_references() {
    let mut g = graph();
    let author = g.push("author", "a1", attrs(json!({}))).unwrap();
    let book = g
        .push("book", "b1", attrs(json!({ "author": "urn:author:a1" })))
        .unwrap();
    assert_eq!(read_model(&mut g, book, "author"), Some(author));

    g.unload_model(author).unwrap();

    assert_eq!(notified(&mut g, book), vec!["author".to_string()]);
    assert_eq!(g.get(book, "author").unwrap(), None);

    let reloaded = g.push("author", "a1", attrs(json!({}))).unwrap();
    assert_eq!(read_model(&mut g, book, "author"), Some(reloaded));
}

#[test]
fn global_index_falls_back_to_another_facade_with_the_same_id() {
    let mut g = graph();
    let author = g.push("author", "x1", attrs(json!({}))).unwrap();
    let publisher = g.push("publisher", "x1", attrs(json!({}))).unwrap();
    let book = g.push("book", "b1", attrs(json!({ "editor": "@x1" }))).unwrap();
    assert_eq!(read_model(&mut g, book, "editor"), Some(author));

    g.unload_model(author).unwrap();

    assert_eq!(g.lookup_id(&"x1".into()), Some(publisher));
    assert_eq!(read_model(&mut g, book, "editor"), Some(publisher));
}

#[test]
fn unloading_removes_the_model_from_reference_arrays() {
    let mut g = graph();
    let first = g.push("author", "a1", attrs(json!({}))).unwrap();
    let second = g.push("author", "a2", attrs(json!({}))).unwrap();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "authors": ["urn:author:a1", "urn:author:a2"] })),
        )
        .unwrap();
    let rec = record(&g, book);
    let Some(Resolved::Array(authors)) = g.get(book, "authors").unwrap() else {
        panic!("authors should resolve to an array");
    };
    assert_eq!(g.array_len(authors).unwrap(), 2);

    g.unload_model(first).unwrap();

    assert_eq!(notified(&mut g, book), vec!["authors".to_string()]);
    assert_eq!(
        g.array_values(authors).unwrap(),
        vec![Some(Resolved::Model(second))]
    );
    assert!(!g.is_dirty(rec).unwrap());
}

#[test]
fn unloading_a_nested_child_leaves_the_parent_slot() {
    let mut g = graph();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "nextChapter": { "type": "chapter", "id": "c1", "title": "One" } })),
        )
        .unwrap();
    let rec = record(&g, book);
    let child = read_model(&mut g, book, "nextChapter").unwrap();

    g.unload_model(child).unwrap();

    assert!(!g.is_live(child));
    assert!(g.record_data(rec).unwrap().children.is_empty());
    assert_eq!(notified(&mut g, book), vec!["nextChapter".to_string()]);

    let again = read_model(&mut g, book, "nextChapter").unwrap();
    assert_ne!(again, child);
    assert_eq!(read(&mut g, again, "title"), Some(json!("One")));
}

#[test]
fn unloading_an_array_element_rekeys_the_rest() {
    let mut g = graph();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "chapters": [
                { "type": "chapter", "id": "c1", "title": "One" },
                { "type": "chapter", "id": "c2", "title": "Two" }
            ] })),
        )
        .unwrap();
    let Some(Resolved::Array(chapters)) = g.get(book, "chapters").unwrap() else {
        panic!("chapters should resolve to an array");
    };
    let first = g.array_get(chapters, 0).unwrap().and_then(|r| r.as_model()).unwrap();
    let second = g.array_get(chapters, 1).unwrap().and_then(|r| r.as_model()).unwrap();

    g.unload_model(first).unwrap();

    assert_eq!(g.array_len(chapters).unwrap(), 1);
    assert_eq!(
        g.parent_of(record(&g, second)).unwrap().unwrap().index,
        Some(0)
    );
}

#[test]
fn unloading_a_middle_element_keeps_the_snapshot_in_step() {
    let one = json!({ "type": "chapter", "id": "c1", "title": "One" });
    let two = json!({ "type": "chapter", "id": "c2", "title": "Two" });
    let three = json!({ "type": "chapter", "id": "c3", "title": "Three" });
    let mut g = graph();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({ "chapters": [one.clone(), two, three.clone()] })),
        )
        .unwrap();
    let rec = record(&g, book);
    let Some(Resolved::Array(chapters)) = g.get(book, "chapters").unwrap() else {
        panic!("chapters should resolve to an array");
    };
    let middle = g.array_get(chapters, 1).unwrap().and_then(|r| r.as_model()).unwrap();

    g.unload_model(middle).unwrap();

    assert_eq!(g.array_len(chapters).unwrap(), 2);
    assert_eq!(g.record_json(rec).unwrap()["chapters"], json!([one, three]));
    assert_eq!(g.array_json(chapters).unwrap(), json!([one, three]));
}

#[test]
fn destroying_a_record_tears_down_its_whole_subtree() {
    let mut g = graph();
    let book = g
        .push(
            "book",
            "b1",
            attrs(json!({
                "nextChapter": { "type": "chapter", "id": "c9", "title": "Nine" },
                "chapters": [{ "type": "chapter", "id": "c1", "title": "One" }]
            })),
        )
        .unwrap();
    let rec = record(&g, book);
    read_model(&mut g, book, "nextChapter").unwrap();
    g.get(book, "chapters").unwrap();
    assert_eq!(g.model_count(), 3);

    let sink = Rc::new(CaptureSink::default());
    with_record_sink(sink.clone(), || g.unload_record(rec).unwrap());

    assert_eq!(g.record_count(), 0);
    assert_eq!(g.model_count(), 0);
    assert_eq!(g.array_count(), 0);
    assert_eq!(sink.count("unload:book"), 1);
    assert_eq!(sink.count("unload:chapter"), 2);
    assert_eq!(sink.count("child_destroyed:chapter"), 2);
}
