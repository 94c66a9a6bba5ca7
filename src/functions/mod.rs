use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use crate::errors::{Error, Result};
use crate::tree::Key;

/// Named operation a `{name:args}` selector can invoke on a candidate's value.
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> std::ops::RangeInclusive<usize>;
    fn call(&self, subject: &Value, args: &[Value]) -> Result<Value>;

    /// Key of the subject's own child the operation picks, for operations
    /// that choose an element instead of computing a value. Writes through
    /// the selector then reach that child.
    fn select(&self, _subject: &Value, _args: &[Value]) -> Result<Option<Key>> {
        Ok(None)
    }
}

/// Thread-safe operation registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Operation>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.inner.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(builtins::First);
        reg.register(builtins::Last);
        reg.register(builtins::Min);
        reg.register(builtins::Max);
        reg.register(builtins::Sort);
        reg.register(builtins::Reverse);
        reg.register(builtins::Unique);
        reg.register(builtins::Keys);
        reg.register(builtins::Values);
        reg.register(builtins::Size);
        reg.register(builtins::Lower);
        reg.register(builtins::Upper);
        reg.register(builtins::Fetch);
        reg
    }

    pub fn register<F: Operation + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.inner.get(name).cloned()
    }

    /// Looks up `name`, checks arity and invokes it.
    pub fn call(&self, name: &str, subject: &Value, args: &[Value]) -> Result<Value> {
        self.resolve(name, args)?.call(subject, args)
    }

    /// Like [`Registry::call`], asking which child the operation picks.
    pub fn select(&self, name: &str, subject: &Value, args: &[Value]) -> Result<Option<Key>> {
        self.resolve(name, args)?.select(subject, args)
    }

    fn resolve(&self, name: &str, args: &[Value]) -> Result<Arc<dyn Operation>> {
        let op = self
            .get(name)
            .ok_or_else(|| Error::Operation(format!("unknown operation `{name}`")))?;
        if !op.arity().contains(&args.len()) {
            return Err(Error::Operation(format!(
                "`{name}` takes {:?} arguments, got {}",
                op.arity(),
                args.len()
            )));
        }
        Ok(op)
    }
}

fn elements(subject: &Value, name: &str) -> Result<Vec<Value>> {
    Ok(entries(subject, name)?.into_iter().map(|(_, v)| v.clone()).collect())
}

/// Children of a container with the keys the tree gives them.
fn entries<'a>(subject: &'a Value, name: &str) -> Result<Vec<(Key, &'a Value)>> {
    match subject {
        Value::Array(a) => Ok(a.iter().enumerate().map(|(i, v)| (Key::Index(i), v)).collect()),
        Value::Object(m) => Ok(m.iter().map(|(k, v)| (Key::Name(k.clone()), v)).collect()),
        other => Err(Error::Operation(format!("`{name}` needs a container, got {other}"))),
    }
}

/// Entry holding the smallest (`Less`) or largest (`Greater`) value; ties
/// keep the earliest.
fn extreme<'a>(subject: &'a Value, name: &str, want: std::cmp::Ordering) -> Result<Option<(Key, &'a Value)>> {
    let mut best: Option<(Key, &Value)> = None;
    for (key, item) in entries(subject, name)? {
        best = match best {
            None => Some((key, item)),
            Some(current) => match crate::comparison::compare(item, current.1) {
                Some(ord) if ord == want => Some((key, item)),
                Some(_) => Some(current),
                None => {
                    return Err(Error::Operation(format!(
                        "`{name}` cannot compare {item} with {}",
                        current.1
                    )))
                }
            },
        };
    }
    Ok(best)
}

pub mod builtins {
    use super::*;
    use std::cmp::Ordering;

    pub struct First;
    impl Operation for First {
        fn name(&self) -> &'static str { "first" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(elements(subject, self.name())?.into_iter().next().unwrap_or(Value::Null))
        }
        fn select(&self, subject: &Value, _args: &[Value]) -> Result<Option<Key>> {
            Ok(entries(subject, self.name())?.into_iter().next().map(|(k, _)| k))
        }
    }

    pub struct Last;
    impl Operation for Last {
        fn name(&self) -> &'static str { "last" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(elements(subject, self.name())?.pop().unwrap_or(Value::Null))
        }
        fn select(&self, subject: &Value, _args: &[Value]) -> Result<Option<Key>> {
            Ok(entries(subject, self.name())?.pop().map(|(k, _)| k))
        }
    }

    pub struct Min;
    impl Operation for Min {
        fn name(&self) -> &'static str { "min" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(extreme(subject, self.name(), Ordering::Less)?.map_or(Value::Null, |(_, v)| v.clone()))
        }
        fn select(&self, subject: &Value, _args: &[Value]) -> Result<Option<Key>> {
            Ok(extreme(subject, self.name(), Ordering::Less)?.map(|(k, _)| k))
        }
    }

    pub struct Max;
    impl Operation for Max {
        fn name(&self) -> &'static str { "max" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(extreme(subject, self.name(), Ordering::Greater)?.map_or(Value::Null, |(_, v)| v.clone()))
        }
        fn select(&self, subject: &Value, _args: &[Value]) -> Result<Option<Key>> {
            Ok(extreme(subject, self.name(), Ordering::Greater)?.map(|(k, _)| k))
        }
    }

    pub struct Sort;
    impl Operation for Sort {
        fn name(&self) -> &'static str { "sort" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            let mut items = elements(subject, self.name())?;
            let mut failed = false;
            items.sort_by(|a, b| {
                crate::comparison::compare(a, b).unwrap_or_else(|| {
                    failed = true;
                    Ordering::Equal
                })
            });
            if failed {
                return Err(Error::Operation("`sort` on mixed values".into()));
            }
            Ok(Value::Array(items))
        }
    }

    pub struct Reverse;
    impl Operation for Reverse {
        fn name(&self) -> &'static str { "reverse" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(match subject {
                Value::String(s) => Value::String(s.chars().rev().collect()),
                other => {
                    let mut items = elements(other, self.name())?;
                    items.reverse();
                    Value::Array(items)
                }
            })
        }
    }

    pub struct Unique;
    impl Operation for Unique {
        fn name(&self) -> &'static str { "unique" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(Value::Array(crate::engine::unique(&elements(subject, self.name())?)))
        }
    }

    pub struct Keys;
    impl Operation for Keys {
        fn name(&self) -> &'static str { "keys" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            match subject {
                Value::Object(m) => Ok(Value::Array(m.keys().cloned().map(Value::String).collect())),
                Value::Array(a) => Ok(Value::Array((0..a.len()).map(Value::from).collect())),
                other => Err(Error::Operation(format!("`keys` needs a container, got {other}"))),
            }
        }
    }

    pub struct Values;
    impl Operation for Values {
        fn name(&self) -> &'static str { "values" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(Value::Array(elements(subject, self.name())?))
        }
    }

    pub struct Size;
    impl Operation for Size {
        fn name(&self) -> &'static str { "size" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            Ok(Value::from(match subject {
                Value::Array(a) => a.len(),
                Value::Object(m) => m.len(),
                Value::String(s) => s.chars().count(),
                other => return Err(Error::Operation(format!("`size` of {other}"))),
            }))
        }
    }

    pub struct Lower;
    impl Operation for Lower {
        fn name(&self) -> &'static str { "lower" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            match subject {
                Value::String(t) => Ok(Value::String(t.to_lowercase())),
                other => Err(Error::Operation(format!("`lower` of {other}"))),
            }
        }
    }

    pub struct Upper;
    impl Operation for Upper {
        fn name(&self) -> &'static str { "upper" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
            match subject {
                Value::String(t) => Ok(Value::String(t.to_uppercase())),
                other => Err(Error::Operation(format!("`upper` of {other}"))),
            }
        }
    }

    /// `{fetch:key}` reads one entry; `{fetch:key,default}` falls back.
    pub struct Fetch;
    impl Operation for Fetch {
        fn name(&self) -> &'static str { "fetch" }
        fn arity(&self) -> std::ops::RangeInclusive<usize> { 1..=2 }
        fn call(&self, subject: &Value, args: &[Value]) -> Result<Value> {
            let found = fetch_key(subject, &args[0])
                .and_then(|key| match (subject, key) {
                    (Value::Object(m), Key::Name(k)) => m.get(&k).cloned(),
                    (Value::Array(a), Key::Index(i)) => a.get(i).cloned(),
                    _ => None,
                });
            match (found, args.get(1)) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Error::Operation(format!("key {} not found", args[0]))),
            }
        }
        fn select(&self, subject: &Value, args: &[Value]) -> Result<Option<Key>> {
            Ok(fetch_key(subject, &args[0]))
        }
    }

    /// Key `wanted` names in `subject`, when present.
    fn fetch_key(subject: &Value, wanted: &Value) -> Option<Key> {
        match (subject, wanted) {
            (Value::Object(m), Value::String(k)) => m.contains_key(k).then(|| Key::Name(k.clone())),
            (Value::Object(m), other) => {
                let k = other.to_string();
                m.contains_key(&k).then_some(Key::Name(k))
            }
            (Value::Array(a), key) => key
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| *i < a.len())
                .map(Key::Index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn builtins_dispatch() {
        let reg = Registry::with_builtins();
        assert_eq!(reg.call("max", &json!([3, 9, 1]), &[]).unwrap(), json!(9));
        assert_eq!(reg.call("min", &json!({"a": 3, "b": 1}), &[]).unwrap(), json!(1));
        assert_eq!(reg.call("sort", &json!(["b", "a"]), &[]).unwrap(), json!(["a", "b"]));
        assert_eq!(reg.call("fetch", &json!({"k": 1}), &[json!("x"), json!(0)]).unwrap(), json!(0));
    }

    #[test]
    fn picking_operations_name_the_chosen_child() {
        let reg = Registry::with_builtins();
        let xs = json!([7, 3, 7]);
        assert_eq!(reg.select("last", &xs, &[]).unwrap(), Some(Key::Index(2)));
        assert_eq!(reg.select("first", &xs, &[]).unwrap(), Some(Key::Index(0)));
        assert_eq!(reg.select("min", &xs, &[]).unwrap(), Some(Key::Index(1)));
        assert_eq!(reg.select("max", &json!([1, 9, 9]), &[]).unwrap(), Some(Key::Index(1)));
        let map = json!({"a": 1, "b": 1});
        assert_eq!(reg.select("fetch", &map, &[json!("b")]).unwrap(), Some(Key::Name("b".into())));
        assert_eq!(reg.select("fetch", &map, &[json!("z"), json!(0)]).unwrap(), None);
        assert_eq!(reg.select("sort", &xs, &[]).unwrap(), None);
        assert_eq!(reg.select("last", &json!([]), &[]).unwrap(), None);
        assert!(reg.select("max", &json!(4), &[]).is_err());
    }

    #[test]
    fn arity_and_unknown_names_fail() {
        let reg = Registry::with_builtins();
        assert!(reg.call("first", &json!([1]), &[json!(1)]).is_err());
        assert!(reg.call("nope", &json!([1]), &[]).is_err());
        assert!(reg.call("max", &json!([1, "a"]), &[]).is_err());
    }

    #[test]
    fn custom_operations_register() {
        struct Double;
        impl Operation for Double {
            fn name(&self) -> &'static str { "double" }
            fn arity(&self) -> std::ops::RangeInclusive<usize> { 0..=0 }
            fn call(&self, subject: &Value, _args: &[Value]) -> Result<Value> {
                Ok(json!(subject.as_i64().unwrap_or(0) * 2))
            }
        }
        let mut reg = Registry::new();
        reg.register(Double);
        assert_eq!(reg.call("double", &json!(4), &[]).unwrap(), json!(8));
        assert!(reg.get("max").is_none());
    }
}
