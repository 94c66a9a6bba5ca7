use itertools::Itertools;
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::tree::Tree;

/// =========================
/// Public API (queries)
/// =========================

/// Values matched by `path` in `data`.
pub fn find(data: &Value, path: &str) -> Result<Vec<Value>> {
    Tree::new(data.clone()).find_values(path)
}

/// One result list per path.
pub fn find_multi<P: AsRef<str>>(data: &Value, paths: &[P]) -> Result<Vec<Vec<Value>>> {
    let mut tree = Tree::new(data.clone());
    paths.iter().map(|p| tree.find_values(p.as_ref())).collect()
}

/// Rows aligned by match position across paths; shorter columns pad with null.
pub fn find_join<P: AsRef<str>>(data: &Value, paths: &[P]) -> Result<Vec<Vec<Value>>> {
    let columns = find_multi(data, paths)?;
    let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
    Ok((0..rows)
        .map(|i| {
            columns
                .iter()
                .map(|col| col.get(i).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect())
}

/// Like [`find_join`], keyed by the path string.
pub fn find_join_hash<P: AsRef<str>>(data: &Value, paths: &[P]) -> Result<Vec<Map<String, Value>>> {
    let rows = find_join(data, paths)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            paths
                .iter()
                .map(|p| p.as_ref().to_string())
                .zip(row)
                .collect()
        })
        .collect())
}

/// =========================
/// Public API (mutations)
/// =========================
/// Each wraps `data`, applies the change and writes the result back.

fn apply<T>(data: &mut Value, op: impl FnOnce(&mut Tree) -> Result<T>) -> Result<T> {
    let mut tree = Tree::new(std::mem::take(data));
    let result = op(&mut tree);
    *data = tree.into_value();
    result
}

pub fn set<P: AsRef<str>>(data: &mut Value, pairs: impl IntoIterator<Item = (P, Value)>) -> Result<()> {
    apply(data, |t| t.set(pairs))
}

pub fn bridge<P: AsRef<str>>(data: &mut Value, pairs: impl IntoIterator<Item = (P, Value)>) -> Result<()> {
    apply(data, |t| t.bridge(pairs))
}

pub fn copy<P: AsRef<str>, Q: AsRef<str>>(data: &mut Value, pairs: impl IntoIterator<Item = (P, Q)>) -> Result<()> {
    apply(data, |t| t.copy(pairs))
}

pub fn copy_all<P: AsRef<str>, Q: AsRef<str>>(data: &mut Value, pairs: impl IntoIterator<Item = (P, Q)>) -> Result<()> {
    apply(data, |t| t.copy_all(pairs))
}

pub fn move_value<P: AsRef<str>, Q: AsRef<str>>(data: &mut Value, pairs: impl IntoIterator<Item = (P, Q)>) -> Result<()> {
    apply(data, |t| t.move_value(pairs))
}

pub fn move_all<P: AsRef<str>, Q: AsRef<str>>(data: &mut Value, pairs: impl IntoIterator<Item = (P, Q)>) -> Result<()> {
    apply(data, |t| t.move_all(pairs))
}

pub fn delete<P: AsRef<str>>(data: &mut Value, paths: impl IntoIterator<Item = P>) -> Result<usize> {
    apply(data, |t| t.delete(paths))
}

/// =========================
/// Public API (result helpers)
/// =========================

/// First match, or null.
pub fn first(vals: &[Value]) -> Value {
    vals.first().cloned().unwrap_or(Value::Null)
}

/// Drops repeated values, keeping first occurrences.
pub fn unique(vals: &[Value]) -> Vec<Value> {
    vals.iter()
        .cloned()
        .unique_by(|x| serde_json::to_string(x).unwrap_or_default())
        .collect()
}

/// `vals` unless empty; then the default, parsed as JSON when possible.
pub fn or_default(vals: &[Value], default_json: &str) -> Vec<Value> {
    if !vals.is_empty() {
        return vals.to_vec();
    }
    let default_val = serde_json::from_str::<Value>(default_json)
        .unwrap_or_else(|_| Value::String(default_json.to_string()));
    vec![default_val]
}
