use json_path_tree::{self as jpt, Context, Operation, Registry, Tree};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

#[test]
fn test_builtin_first() {
    assert_eq!(jpt::first(&[json!(10), json!(20)]), json!(10));
}

#[test]
fn test_builtin_unique() {
    assert_eq!(jpt::unique(&[json!(1), json!(1), json!(2), json!(2), json!(3)]), vec![json!(1), json!(2), json!(3)]);
}

#[test]
fn test_builtin_or_default() {
    assert_eq!(jpt::or_default(&[], "{\"x\":1}"), vec![json!({"x": 1})]);
    assert_eq!(jpt::or_default(&[json!(2)], "{\"x\":1}"), vec![json!(2)]);
}

#[test]
fn unique_idempotent_smoke() {
    let once = jpt::unique(&[json!(1), json!(1), json!(2), json!(3), json!(3)]);
    let twice = jpt::unique(&once);
    assert_eq!(once, twice);
}

#[test]
fn test_special_selector_maps_back_to_child() {
    let mut tree = Tree::new(json!({"scores": [3, 9, 4]}));
    let hits = tree.find("scores.{max}").unwrap();
    assert_eq!(tree.key(hits[0]), Some(jpt::Key::Index(1)));
    tree.set([("scores.{max}", json!(0))]).unwrap();
    assert_eq!(tree.into_value(), json!({"scores": [3, 0, 4]}));
}

#[test]
fn test_special_selector_targets_chosen_duplicate() {
    let mut tree = Tree::new(json!({"xs": [7, 3, 7]}));
    let hits = tree.find("xs.{last}").unwrap();
    assert_eq!(tree.key(hits[0]), Some(jpt::Key::Index(2)));
    tree.set([("xs.{last}", json!(0))]).unwrap();
    assert_eq!(tree.find_values("xs").unwrap(), vec![json!([7, 3, 0])]);
    tree.delete(["xs.{max}"]).unwrap();
    assert_eq!(tree.into_value(), json!({"xs": [3, 0]}));

    let mut doc = json!({"a": 1, "b": 1});
    jpt::set(&mut doc, [("{fetch:b}", json!(5))]).unwrap();
    assert_eq!(doc, json!({"a": 1, "b": 5}));
}

#[test]
fn test_special_selector_computed_result_is_detached() {
    let mut tree = Tree::new(json!({"tags": ["b", "a", "b"]}));
    assert_eq!(tree.find_values("tags.{unique}").unwrap(), vec![json!(["b", "a"])]);
    assert_eq!(tree.find_values("tags.{sort}.[0]").unwrap(), vec![json!("a")]);
    tree.set([("tags.{sort}", json!([]))]).unwrap();
    assert_eq!(tree.into_value(), json!({"tags": ["b", "a", "b"]}));
}

#[test]
fn test_special_selector_with_args_and_formula() {
    let doc = json!({"users": {"ann": {"age": 40}, "bo": {"age": 9}}});
    assert_eq!(jpt::find(&doc, "users.{fetch:ann}.age").unwrap(), vec![json!(40)]);
    assert_eq!(jpt::find(&doc, "users.{fetch:'zed', {\"age\": 1}}.age").unwrap(), vec![json!(1)]);
    assert!(jpt::find(&doc, "users.{size}($ > 5)").unwrap().is_empty());
    assert!(jpt::find(&doc, "users.{nope}").unwrap().is_empty());
}

struct Evens;

impl Operation for Evens {
    fn name(&self) -> &'static str { "evens" }
    fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
    fn call(&self, subject: &Value, _args: &[Value]) -> jpt::Result<Value> {
        let items = subject.as_array().cloned().unwrap_or_default();
        Ok(Value::Array(items.into_iter().filter(|v| v.as_i64().is_some_and(|i| i % 2 == 0)).collect()))
    }
}

#[test]
fn test_custom_operation_registry() {
    let mut registry = Registry::with_builtins();
    registry.register(Evens);
    let mut tree = Tree::with_context(json!([1, 2, 3, 4]), Context::new(registry));
    assert_eq!(tree.find_values("{evens}").unwrap(), vec![json!([2, 4])]);
    assert!(Tree::new(json!([1, 2])).find_values("{evens}").unwrap().is_empty());
}
