//! Arena-backed value tree.
//!
//! A [`Tree`] wraps a `serde_json::Value` into one node per position. Nodes
//! live in a slot vector and are addressed by generational [`NodeId`]s, so a
//! parent edge is just an id and ownership stays a strict tree. Replacing a
//! node's value keeps its id but rebuilds every descendant; handles into the
//! old subtree go stale and behave like absent nodes from then on.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::Context;

/// Handle to a node inside a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Kind {
    Map,
    Sequence,
    Scalar,
}

/// Key of a child inside its parent: a name for maps, a position for sequences.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    /// Integer view of the key; names that spell an integer convert.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Index(i) => i64::try_from(*i).ok(),
            Key::Name(s) => s.parse().ok(),
        }
    }

    /// Symbol-equivalent form: `":name"` and `"name"` normalize alike.
    pub fn normalized(&self) -> String {
        match self {
            Key::Name(s) => s.strip_prefix(':').unwrap_or(s).to_string(),
            Key::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(s) => f.write_str(s),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: Kind,
    scalar: Value,
    children: Vec<(Key, NodeId)>,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
struct Entry {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    entries: Vec<Entry>,
    free: Vec<u32>,
    root: NodeId,
    // detached nodes holding computed query results
    scratch: Vec<NodeId>,
    pub(crate) context: Context,
}

impl Tree {
    /// Wraps `value`, building the whole child tree eagerly.
    pub fn new(value: Value) -> Self {
        Self::with_context(value, Context::default())
    }

    pub fn with_context(value: Value, context: Context) -> Self {
        let mut tree = Tree {
            entries: Vec::new(),
            free: Vec::new(),
            root: NodeId { index: 0, generation: 0 },
            scratch: Vec::new(),
            context,
        };
        tree.root = tree.alloc(None);
        tree.build(tree.root, value);
        tree
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Reconstructs the whole document.
    pub fn into_value(self) -> Value {
        self.value(self.root)
    }

    /// True while `id` still names a node of this tree.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Creates a detached node: parentless and unreachable from the root.
    pub fn adopt(&mut self, value: Value) -> NodeId {
        let id = self.alloc(None);
        self.build(id, value);
        id
    }

    /// Detached node for a computed query result. It lives until the next
    /// query starts or [`Tree::release_scratch`] lets it go.
    pub(crate) fn adopt_scratch(&mut self, value: Value) -> NodeId {
        let id = self.adopt(value);
        self.scratch.push(id);
        id
    }

    /// Frees scratch nodes, except those holding one of `keep`.
    pub(crate) fn release_scratch(&mut self, keep: &[NodeId]) {
        if self.scratch.is_empty() {
            return;
        }
        let held: HashSet<NodeId> = keep.iter().map(|id| self.root_of(*id)).collect();
        for id in std::mem::take(&mut self.scratch) {
            if held.contains(&id) {
                self.scratch.push(id);
            } else {
                self.release(id);
            }
        }
    }

    pub fn kind(&self, id: NodeId) -> Option<Kind> {
        self.node(id).map(|n| n.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[(Key, NodeId)] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.children(id).is_empty()
    }

    /// Inverse of wrapping: rebuilds the value from the current children.
    pub fn value(&self, id: NodeId) -> Value {
        let Some(node) = self.node(id) else {
            return Value::Null;
        };
        match node.kind {
            Kind::Scalar => node.scalar.clone(),
            Kind::Sequence => Value::Array(
                node.children.iter().map(|(_, c)| self.value(*c)).collect(),
            ),
            Kind::Map => {
                let mut map = Map::with_capacity(node.children.len());
                for (key, child) in &node.children {
                    map.insert(key.to_string(), self.value(*child));
                }
                Value::Object(map)
            }
        }
    }

    /// Replaces the node's value in place. Its position in the parent is
    /// unchanged; its descendants are discarded and rebuilt.
    pub fn replace_with(&mut self, id: NodeId, value: Value) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let old = std::mem::take(&mut node.children);
        for (_, child) in old {
            self.release(child);
        }
        self.build(id, value);
    }

    /// Looks up a child, exactly first, then by normalized key unless `exact`.
    pub fn child(&self, id: NodeId, key: &Key, exact: bool) -> Option<NodeId> {
        self.child_position(id, key, exact)
            .map(|pos| self.children(id)[pos].1)
    }

    pub fn child_exists(&self, id: NodeId, key: &Key, exact: bool) -> bool {
        self.child_position(id, key, exact).is_some()
    }

    fn child_position(&self, id: NodeId, key: &Key, exact: bool) -> Option<usize> {
        let node = self.node(id)?;
        match node.kind {
            Kind::Scalar => None,
            Kind::Sequence => {
                let i = usize::try_from(key.as_int()?).ok()?;
                (i < node.children.len()).then_some(i)
            }
            Kind::Map => {
                let name = key.to_string();
                node.children
                    .iter()
                    .position(|(k, _)| k.to_string() == name)
                    .or_else(|| {
                        if exact {
                            return None;
                        }
                        let wanted = key.normalized();
                        node.children.iter().position(|(k, _)| k.normalized() == wanted)
                    })
            }
        }
    }

    /// Depth-first pre-order walk of everything below `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for (_, child) in self.children(id) {
            out.push(*child);
            self.collect_descendants(*child, out);
        }
    }

    /// Removes the matching child and returns its value.
    pub fn delete_child(&mut self, id: NodeId, key: &Key) -> Option<Value> {
        let pos = self.child_position(id, key, false)?;
        let node = self.node_mut(id)?;
        let (_, child) = node.children.remove(pos);
        if node.kind == Kind::Sequence {
            renumber(&mut node.children);
        }
        let value = self.value(child);
        self.release(child);
        Some(value)
    }

    /// Stores `value` under `key`, replacing an exactly matching child or
    /// appending a new one. Sequences pad with nulls up to the index.
    pub fn insert_child(&mut self, id: NodeId, key: &Key, value: Value) -> Option<NodeId> {
        if let Some(existing) = self.child(id, key, true) {
            self.replace_with(existing, value);
            return Some(existing);
        }
        let kind = self.kind(id)?;
        match kind {
            Kind::Scalar => None,
            Kind::Map => Some(self.push_child(id, Key::Name(key.to_string()), value)),
            Kind::Sequence => {
                let target = usize::try_from(key.as_int()?).ok()?;
                while self.children(id).len() < target {
                    let len = self.children(id).len();
                    self.push_child(id, Key::Index(len), Value::Null);
                }
                Some(self.push_child(id, Key::Index(target), value))
            }
        }
    }

    fn push_child(&mut self, id: NodeId, key: Key, value: Value) -> NodeId {
        let child = self.alloc(Some(id));
        self.build(child, value);
        if let Some(node) = self.node_mut(id) {
            node.children.push((key, child));
        }
        child
    }

    /// Key under which this node currently sits in its parent.
    pub fn key(&self, id: NodeId) -> Option<Key> {
        let parent = self.parent(id)?;
        self.children(parent)
            .iter()
            .find(|(_, c)| *c == id)
            .map(|(k, _)| k.clone())
    }

    /// Position among the parent's children.
    pub fn index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|(_, c)| *c == id)
    }

    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        match self.parent(id) {
            Some(parent) => self
                .children(parent)
                .iter()
                .map(|(_, c)| *c)
                .filter(|c| *c != id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Parent first, root last.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Topmost ancestor; a detached node is its own root.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// This node's own segment: `[i]` under a sequence, the escaped key
    /// under a map.
    pub fn path(&self, id: NodeId) -> Option<String> {
        let parent = self.parent(id)?;
        let key = self.key(id)?;
        Some(match self.kind(parent)? {
            Kind::Sequence => format!("[{key}]"),
            _ => escape_key(&key.to_string()),
        })
    }

    /// Full path from the root; empty for the root itself.
    pub fn absolute_path(&self, id: NodeId) -> Option<String> {
        if !self.contains(id) {
            return None;
        }
        let mut parts = Vec::new();
        let mut current = id;
        while self.parent(current).is_some() {
            parts.push(self.path(current)?);
            current = self.parent(current)?;
        }
        if current != self.root {
            return None;
        }
        parts.reverse();
        Some(parts.join("."))
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.node.as_mut())
    }

    fn alloc(&mut self, parent: Option<NodeId>) -> NodeId {
        let node = Node {
            kind: Kind::Scalar,
            scalar: Value::Null,
            children: Vec::new(),
            parent,
        };
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.node = Some(node);
            return NodeId { index, generation: entry.generation };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry { generation: 0, node: Some(node) });
        NodeId { index, generation: 0 }
    }

    fn release(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        for (_, child) in children {
            self.release(child);
        }
        let entry = &mut self.entries[id.index as usize];
        entry.node = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
    }

    /// Classifies `value` and builds the children of an already allocated node.
    fn build(&mut self, id: NodeId, value: Value) {
        let (kind, scalar, children) = match value {
            Value::Object(map) => {
                let mut children = Vec::with_capacity(map.len());
                for (k, v) in map {
                    let child = self.alloc(Some(id));
                    self.build(child, v);
                    children.push((Key::Name(k), child));
                }
                (Kind::Map, Value::Null, children)
            }
            Value::Array(items) => {
                let mut children = Vec::with_capacity(items.len());
                for (i, v) in items.into_iter().enumerate() {
                    let child = self.alloc(Some(id));
                    self.build(child, v);
                    children.push((Key::Index(i), child));
                }
                (Kind::Sequence, Value::Null, children)
            }
            other => (Kind::Scalar, other, Vec::new()),
        };
        if let Some(node) = self.node_mut(id) {
            node.kind = kind;
            node.scalar = scalar;
            node.children = children;
        }
    }
}

fn renumber(children: &mut [(Key, NodeId)]) {
    for (i, (key, _)) in children.iter_mut().enumerate() {
        *key = Key::Index(i);
    }
}

/// Escapes every character the path tokenizer treats as structure. The
/// empty key renders quoted, since an empty token means recursive descent.
pub fn escape_key(key: &str) -> String {
    match key {
        "" => return "['']".to_string(),
        "*" => return "\\*".to_string(),
        _ => {}
    }
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(c, '.' | '\\' | '[' | ']' | '(' | ')' | '{' | '}' | '/') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!({"b": 1, "a": {"x.y": [10, 20, {"z": true}]}, "c": null})
    }

    #[test]
    fn wrap_then_value_keeps_order() {
        let tree = Tree::new(sample());
        assert_eq!(tree.value(tree.root()), sample());
        let keys: Vec<_> = tree.children(tree.root()).iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn replace_keeps_identity_and_stales_descendants() {
        let mut tree = Tree::new(sample());
        let a = tree.child(tree.root(), &"a".into(), false).unwrap();
        let inner = tree.child(a, &"x.y".into(), false).unwrap();
        tree.replace_with(a, json!([1, 2]));
        assert!(tree.contains(a));
        assert!(!tree.contains(inner));
        assert_eq!(tree.kind(a), Some(Kind::Sequence));
        assert_eq!(tree.key(a), Some(Key::Name("a".into())));
        assert_eq!(tree.index(a), Some(1));
        assert_eq!(tree.value(inner), Value::Null);
    }

    #[test]
    fn symbol_keys_are_equivalent_unless_exact() {
        let tree = Tree::new(json!({":name": "x"}));
        let root = tree.root();
        assert!(tree.child_exists(root, &"name".into(), false));
        assert!(!tree.child_exists(root, &"name".into(), true));
        assert!(tree.child_exists(root, &":name".into(), true));
    }

    #[test]
    fn sequence_bounds() {
        let tree = Tree::new(json!([1, 2, 3]));
        let root = tree.root();
        assert!(tree.child_exists(root, &Key::Index(2), false));
        assert!(tree.child_exists(root, &"1".into(), false));
        assert!(!tree.child_exists(root, &Key::Index(3), false));
        assert!(!tree.child_exists(root, &"-1".into(), false));
    }

    #[test]
    fn delete_renumbers_sequences() {
        let mut tree = Tree::new(json!([1, 2, 3]));
        let root = tree.root();
        let last = tree.child(root, &Key::Index(2), false).unwrap();
        assert_eq!(tree.delete_child(root, &Key::Index(0)), Some(json!(1)));
        assert_eq!(tree.key(last), Some(Key::Index(1)));
        assert_eq!(tree.value(root), json!([2, 3]));
    }

    #[test]
    fn insert_pads_sequences() {
        let mut tree = Tree::new(json!([1]));
        let root = tree.root();
        tree.insert_child(root, &Key::Index(3), json!("x"));
        assert_eq!(tree.value(root), json!([1, null, null, "x"]));
    }

    #[test]
    fn navigation() {
        let tree = Tree::new(sample());
        let root = tree.root();
        let a = tree.child(root, &"a".into(), false).unwrap();
        let seq = tree.child(a, &"x.y".into(), false).unwrap();
        let z_holder = tree.child(seq, &Key::Index(2), false).unwrap();
        let z = tree.child(z_holder, &"z".into(), false).unwrap();
        assert_eq!(tree.absolute_path(z).unwrap(), r"a.x\.y.[2].z");
        assert_eq!(tree.path(z_holder).unwrap(), "[2]");
        assert_eq!(tree.ancestors(z), vec![z_holder, seq, a, root]);
        assert_eq!(tree.root_of(z), root);
        assert_eq!(tree.siblings(a).len(), 2);
        assert_eq!(tree.descendants(a).len(), 5);
        assert_eq!(tree.absolute_path(root).unwrap(), "");
    }

    #[test]
    fn empty_keys_render_quoted() {
        let tree = Tree::new(json!({"": {"": 1}}));
        let outer = tree.child(tree.root(), &"".into(), true).unwrap();
        let inner = tree.child(outer, &"".into(), true).unwrap();
        assert_eq!(tree.absolute_path(inner).unwrap(), "[''].['']");
        assert_eq!(escape_key("*"), r"\*");
    }

    #[test]
    fn computed_results_do_not_pile_up() {
        let mut tree = Tree::new(json!({"tags": ["b", "a", "c"]}));
        tree.find_values("tags.{sort}").unwrap();
        let slots = tree.entries.len();
        for _ in 0..100 {
            assert_eq!(tree.find_values("tags.{sort}").unwrap(), vec![json!(["a", "b", "c"])]);
            tree.find("tags.{sort}.[0]").unwrap();
        }
        assert_eq!(tree.entries.len(), slots);
        assert!(tree.scratch.len() <= 1);
    }

    #[test]
    fn released_slots_are_not_confused_with_new_nodes() {
        let mut tree = Tree::new(json!({"a": {"b": 1}}));
        let a = tree.child(tree.root(), &"a".into(), false).unwrap();
        let b = tree.child(a, &"b".into(), false).unwrap();
        tree.replace_with(a, json!({"c": 2}));
        let c = tree.child(a, &"c".into(), false).unwrap();
        assert_ne!(b, c);
        assert!(!tree.contains(b));
        assert_eq!(tree.value(c), json!(2));
    }
}
