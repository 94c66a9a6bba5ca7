use json_path_tree::{self as jpt, Tree};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn sample() -> Value {
    json!({
        "a": 1,
        "b": 2,
        "c": {"d": [3, 4, 5, {"e": 6}], "f": 7},
        "g": 8,
        "test": {"path": "here"},
        "e": 5
    })
}

fn books() -> Value {
    json!([
        {"title": "Cheap", "cost": 4},
        {"title": "Pricey", "cost": 25},
        {"title": "Mid", "cost": 10},
        {"title": "Dear", "cost": 11}
    ])
}

#[test]
fn test_literal_key() {
    assert_eq!(jpt::find(&sample(), "a").unwrap(), vec![json!(1)]);
}

#[test]
fn test_recursive_descent_is_document_order() {
    assert_eq!(jpt::find(&sample(), "..e").unwrap(), vec![json!(6), json!(5)]);
}

#[test]
fn test_index_inside_path() {
    assert_eq!(jpt::find(&sample(), "c.d.[3].e").unwrap(), vec![json!(6)]);
    assert_eq!(jpt::find(&sample(), "test.path").unwrap(), vec![json!("here")]);
}

#[test]
fn test_filter_formula_keeps_order() {
    let titles = jpt::find(&books(), "[0..-1]($cost > 10).title").unwrap();
    assert_eq!(titles, vec![json!("Pricey"), json!("Dear")]);
}

#[test]
fn test_pattern_and_ranges() {
    let doc = json!({"alpha": 1, "Beta": 2, "gamma": 3, "list": [0, 1, 2, 3, 4]});
    assert_eq!(jpt::find(&doc, "/^[ab]/i").unwrap(), vec![json!(1), json!(2)]);
    assert_eq!(jpt::find(&doc, "list.[1..3]").unwrap(), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(jpt::find(&doc, "list.[1...3]").unwrap(), vec![json!(1), json!(2)]);
    assert_eq!(jpt::find(&doc, "list.[-2..-1]").unwrap(), vec![json!(3), json!(4)]);
}

#[test]
fn test_set_is_idempotent() {
    let mut doc = sample();
    jpt::set(&mut doc, [("c.f", json!({"x": 1}))]).unwrap();
    let once = doc.clone();
    jpt::set(&mut doc, [("c.f", json!({"x": 1}))]).unwrap();
    assert_eq!(doc, once);
    assert_eq!(jpt::find(&doc, "c.f.x").unwrap(), vec![json!(1)]);
}

#[test]
fn test_set_without_match_is_a_no_op() {
    let mut doc = sample();
    jpt::set(&mut doc, [("nonexistent.path", json!(5))]).unwrap();
    assert_eq!(doc, sample());
}

#[test]
fn test_bridge_creates_sequence_then_map() {
    let mut doc = json!({});
    jpt::bridge(&mut doc, [("x.[0].y", json!(1))]).unwrap();
    assert_eq!(doc, json!({"x": [{"y": 1}]}));
}

#[test]
fn test_move_removes_source() {
    let mut doc = json!({"a": 1});
    jpt::move_value(&mut doc, [("a", "b")]).unwrap();
    assert_eq!(doc, json!({"b": 1}));
}

#[test]
fn test_wrap_round_trip_keeps_key_order() {
    let doc = json!({"z": 1, "a": [true, null, {"m": "n", "b": 2.5}], "k": {}});
    assert_eq!(Tree::new(doc.clone()).into_value(), doc);
    assert_eq!(
        serde_json::to_string(&Tree::new(doc.clone()).into_value()).unwrap(),
        serde_json::to_string(&doc).unwrap()
    );
}

#[test]
fn test_squish_expand_round_trip() {
    let doc = sample();
    let flat = jpt::squish(&doc);
    assert_eq!(flat.get("c.d.[3].e"), Some(&json!(6)));
    assert_eq!(jpt::expand(&flat).unwrap(), doc);
}

#[test]
fn test_find_multi_per_path() {
    let out = jpt::find_multi(&sample(), &["a", "c.d.*", "missing"]).unwrap();
    assert_eq!(out, vec![vec![json!(1)], vec![json!(3), json!(4), json!(5), json!({"e": 6})], vec![]]);
}
