use super::*;
use proptest::prelude::*;
use serde_json::{Value, json};

fn record() -> RecordData {
    RecordData::new(RecordIdentity::new("book", None), false)
}

fn json(value: Value) -> AttrValue {
    AttrValue::Json(value)
}

#[test]
fn reads_follow_bucket_precedence() {
    let mut rec = record();
    rec.server.insert("title".into(), json(json!("server")));
    assert_eq!(rec.effective("title"), Some(&json(json!("server"))));

    rec.in_flight.insert("title".into(), json(json!("in-flight")));
    assert_eq!(rec.effective("title"), Some(&json(json!("in-flight"))));
    assert_eq!(rec.prior("title"), Some(&json(json!("in-flight"))));

    rec.local.insert("title".into(), json(json!("local")));
    assert_eq!(rec.effective("title"), Some(&json(json!("local"))));
    assert!(rec.is_shadowed("title"));
}

#[test]
fn writing_the_prior_value_is_not_dirty() {
    let mut rec = record();
    rec.server.insert("pages".into(), json(json!(10)));
    rec.local.insert("pages".into(), json(json!(10)));

    assert!(!rec.is_key_dirty("pages"));
    assert!(rec.local_changes().is_empty());

    rec.local.insert("pages".into(), json(json!(12)));
    assert_eq!(
        rec.local_changes().get("pages"),
        Some(&AttrChange::Changed {
            old: Some(json(json!(10))),
            new: Some(json(json!(12))),
        })
    );
}

#[test]
fn writes_during_commit_survive_confirmation() {
    let mut rec = record();
    rec.local.insert("x".into(), json(json!("A")));
    rec.begin_commit();
    assert!(rec.committing);
    assert!(rec.local.is_empty());

    rec.local.insert("x".into(), json(json!("B")));
    rec.confirm_commit();

    assert_eq!(rec.server.get("x"), Some(&json(json!("A"))));
    assert_eq!(rec.effective("x"), Some(&json(json!("B"))));
    assert!(!rec.committing);
}

#[test]
fn rejected_commit_returns_snapshot_to_local_without_clobbering() {
    let mut rec = record();
    rec.local.insert("x".into(), json(json!("A")));
    rec.local.insert("y".into(), json(json!(1)));
    rec.begin_commit();
    rec.local.insert("x".into(), json(json!("B")));

    rec.reject_commit();

    assert!(rec.in_flight.is_empty());
    assert_eq!(rec.local.get("x"), Some(&json(json!("B"))));
    assert_eq!(rec.local.get("y"), Some(&json(json!(1))));
}

#[test]
fn rollback_reports_only_effective_changes() {
    let mut rec = record();
    rec.server.insert("same".into(), json(json!(1)));
    rec.server.insert("diff".into(), json(json!(1)));
    rec.local.insert("same".into(), json(json!(1)));
    rec.local.insert("diff".into(), json(json!(2)));
    rec.local.insert("fresh".into(), json(json!(3)));

    let changed = rec.rollback();

    assert_eq!(changed, vec!["diff".to_string(), "fresh".to_string()]);
    assert_eq!(rec.effective("fresh"), None);
}

#[test]
fn children_slots_list_their_records() {
    let slot: ChildSlot = ChildSlot::Many(vec![None]);
    assert!(slot.records().is_empty());
}

///
/// Property tests
///

#[derive(Clone, Debug)]
enum Op {
    Set(String, i32),
    Commit,
    Confirm,
    Reject,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => ("[a-c]", 0..3i32).prop_map(|(key, value)| Op::Set(key, value)),
        1 => Just(Op::Commit),
        1 => Just(Op::Confirm),
        1 => Just(Op::Reject),
    ]
}

fn apply(rec: &mut RecordData, op: Op) {
    match op {
        Op::Set(key, value) => {
            rec.local.insert(key, json(json!(value)));
        }
        Op::Commit => rec.begin_commit(),
        Op::Confirm => rec.confirm_commit(),
        Op::Reject => rec.reject_commit(),
    }
}

proptest! {
    #[test]
    fn rollback_restores_server_state(
        server in prop::collection::btree_map("[a-c]", 0..3i32, 0..3),
        ops in prop::collection::vec(arb_op(), 0..12),
    ) {
        let mut rec = record();
        for (key, value) in &server {
            rec.server.insert(key.clone(), json(json!(value)));
        }
        for op in ops {
            apply(&mut rec, op);
        }
        let server_after = rec.server.clone();

        rec.rollback();

        prop_assert!(rec.local_changes().is_empty());
        prop_assert_eq!(rec.dirty_keys().count(), 0);
        for key in ["a", "b", "c"] {
            prop_assert_eq!(rec.effective(key), server_after.get(key));
        }
    }

    #[test]
    fn dirty_keys_are_exactly_the_differing_local_keys(
        server in prop::collection::btree_map("[a-c]", 0..3i32, 0..3),
        local in prop::collection::btree_map("[a-c]", 0..3i32, 0..3),
    ) {
        let mut rec = record();
        for (key, value) in &server {
            rec.server.insert(key.clone(), json(json!(value)));
        }
        for (key, value) in &local {
            rec.local.insert(key.clone(), json(json!(value)));
        }

        let dirty: Vec<&str> = rec.dirty_keys().collect();
        let expected: Vec<&str> = local
            .iter()
            .filter(|(key, value)| server.get(*key) != Some(*value))
            .map(|(key, _)| key.as_str())
            .collect();

        prop_assert_eq!(dirty, expected);
    }
}
