use std::sync::{Arc, Mutex};

use json_path_tree::{self as jpt, Context, Error, Tree};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_unbalanced_path_is_a_parse_error() {
    for path in ["a.[0", "a.b)", "a.{max", "/abc", "a.($ == 'x)"] {
        let err = jpt::find(&json!({"a": 1}), path).unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "{path}: {err}");
    }
}

#[test]
fn test_bad_pattern_is_reported() {
    let err = jpt::find(&json!({}), "/(/").unwrap_err();
    assert!(matches!(err, Error::Pattern { .. }));
}

#[test]
fn test_formula_failures_are_silent_non_matches() {
    let doc = json!([{"cost": 5}, {"cost": "n/a"}, {"price": 1}, {"cost": 50}]);
    let out = jpt::find(&doc, "*($cost > 10)").unwrap();
    assert_eq!(out, vec![json!({"cost": 50})]);
}

#[test]
fn test_malformed_formula_matches_nothing() {
    let doc = json!([1, 2, 3]);
    assert_eq!(jpt::find(&doc, "*($ >)").unwrap(), Vec::<serde_json::Value>::new());
}

#[test]
fn test_diagnostic_hook_sees_suppressed_failures() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let context = Context::default().on_diagnostic(move |d| {
        sink.lock().unwrap().push(d.segment.clone());
    });
    let mut tree = Tree::with_context(json!({"xs": [1, "two", 3]}), context);
    let out = tree.find_values("xs.*($ * 2 > 2)").unwrap();
    assert_eq!(out, vec![json!(3)]);
    assert_eq!(*seen.lock().unwrap(), vec!["*($ * 2 > 2)".to_string()]);
}

#[test]
fn test_index_on_map_and_key_on_scalar_match_nothing() {
    let doc = json!({"a": 1, "m": {"k": 2}});
    assert!(jpt::find(&doc, "m.[0]").unwrap().is_empty());
    assert!(jpt::find(&doc, "a.b.c").unwrap().is_empty());
}

#[test]
fn test_mutations_without_matches_change_nothing() {
    let original = json!({"a": [1, 2]});
    let mut doc = original.clone();
    jpt::set(&mut doc, [("a.[9]", json!(0))]).unwrap();
    jpt::copy(&mut doc, [("zz", "a.[0]")]).unwrap();
    jpt::move_all(&mut doc, [("a.[5..7]", "b")]).unwrap();
    assert_eq!(jpt::delete(&mut doc, ["nope", "a.x"]).unwrap(), 0);
    assert_eq!(doc, original);
}
