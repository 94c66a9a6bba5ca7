//! Flattened view of a document: absolute path → leaf value.
//!
//! Leaves are scalars and empty containers, and `expand(&squish(v))` rebuilds
//! `v`. An empty map key is written `['']`.

use serde_json::{Map, Value};

use crate::errors::Result;
use crate::tree::Tree;

pub fn squish(value: &Value) -> Map<String, Value> {
    let tree = Tree::new(value.clone());
    let root = tree.root();
    let mut flat = Map::new();
    if !tree.has_children(root) {
        flat.insert(String::new(), tree.value(root));
        return flat;
    }
    for id in tree.descendants(root) {
        if tree.has_children(id) {
            continue;
        }
        if let Some(path) = tree.absolute_path(id) {
            flat.insert(path, tree.value(id));
        }
    }
    flat
}

pub fn expand(flat: &Map<String, Value>) -> Result<Value> {
    let mut tree = Tree::new(Value::Null);
    tree.bridge(flat.iter().map(|(path, value)| (path.as_str(), value.clone())))?;
    Ok(tree.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn squish_paths() {
        let doc = json!({"a": {"b.c": [1, {}]}, "d": "x"});
        let flat = squish(&doc);
        assert_eq!(
            Value::Object(flat.clone()),
            json!({r"a.b\.c.[0]": 1, r"a.b\.c.[1]": {}, "d": "x"})
        );
        assert_eq!(expand(&flat).unwrap(), doc);
    }

    #[test]
    fn scalar_and_empty_roots() {
        for doc in [json!(3), json!({}), json!([]), json!(null)] {
            assert_eq!(expand(&squish(&doc)).unwrap(), doc);
        }
    }

    #[test]
    fn empty_keys_survive() {
        let doc = json!({"": 1, "a": {"": [{"": null}]}});
        let flat = squish(&doc);
        assert_eq!(
            Value::Object(flat.clone()),
            json!({"['']": 1, "a.[''].[0].['']": null})
        );
        assert_eq!(expand(&flat).unwrap(), doc);
        assert_eq!(expand(&squish(&json!({"": {}}))).unwrap(), json!({"": {}}));
    }

    #[test]
    fn awkward_keys_survive() {
        let doc = json!({"[0]": 1, "*": 2, "/x/": 3, "f(y)": 4, "0": {"a\\b": 5}});
        assert_eq!(expand(&squish(&doc)).unwrap(), doc);
    }
}
