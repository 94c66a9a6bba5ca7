//! Queries and in-place mutations driven by path strings.
//!
//! Every operation treats "matched nothing" as a no-op. Only a path that
//! cannot be tokenized is reported as an error.

use serde_json::Value;

use crate::errors::Result;
use crate::path::{container_for, literal_key, PathExpression};
use crate::tree::{Kind, NodeId, Tree};

fn empty_container(kind: Kind) -> Value {
    match kind {
        Kind::Sequence => Value::Array(Vec::new()),
        _ => Value::Object(Default::default()),
    }
}

impl Tree {
    /// Nodes matched by `path`, starting at the root.
    pub fn find(&mut self, path: &str) -> Result<Vec<NodeId>> {
        let expr = PathExpression::parse(path)?;
        Ok(self.find_expr(&expr))
    }

    pub fn find_expr(&mut self, expr: &PathExpression) -> Vec<NodeId> {
        let root = self.root();
        expr.find(self, root)
    }

    /// Values matched by `path`.
    pub fn find_values(&mut self, path: &str) -> Result<Vec<Value>> {
        let ids = self.find(path)?;
        let values = ids.into_iter().map(|id| self.value(id)).collect();
        self.release_scratch(&[]);
        Ok(values)
    }

    /// Replaces every node `path` matches. Nothing is created.
    pub fn set<P: AsRef<str>>(&mut self, pairs: impl IntoIterator<Item = (P, Value)>) -> Result<()> {
        for (path, value) in pairs {
            let ids = self.find(path.as_ref())?;
            tracing::debug!(path = path.as_ref(), matched = ids.len(), "set");
            for id in ids {
                self.replace_with(id, value.clone());
            }
        }
        Ok(())
    }

    /// Set-or-create: missing literal keys and indices along each path are
    /// created, as a sequence when the following segment is an index and as
    /// a map otherwise.
    pub fn bridge<P: AsRef<str>>(&mut self, pairs: impl IntoIterator<Item = (P, Value)>) -> Result<()> {
        for (path, value) in pairs {
            let expr = PathExpression::parse(path.as_ref())?;
            tracing::debug!(path = path.as_ref(), "bridge");
            self.bridge_expr(&expr, value);
        }
        Ok(())
    }

    fn bridge_expr(&mut self, expr: &PathExpression, value: Value) {
        self.write_through(expr, value);
        self.release_scratch(&[]);
    }

    fn write_through(&mut self, expr: &PathExpression, value: Value) {
        let segments = expr.segments();
        let root = self.root();
        let Some(first) = segments.first() else {
            self.replace_with(root, value);
            return;
        };
        if self.kind(root) == Some(Kind::Scalar) {
            self.replace_with(root, empty_container(container_for(first)));
        }
        let mut current = vec![root];
        for (i, segment) in segments.iter().enumerate() {
            let required = segments.get(i + 1).map(container_for);
            let mut next = Vec::new();
            for node in current {
                let targets = match literal_key(segment, self, node) {
                    Some(key) => match (self.child(node, &key, true), required) {
                        (Some(child), _) => vec![child],
                        (None, Some(kind)) => {
                            self.insert_child(node, &key, empty_container(kind)).into_iter().collect()
                        }
                        (None, None) => {
                            self.insert_child(node, &key, value.clone());
                            continue;
                        }
                    },
                    None => segment.matches(self, node),
                };
                for target in targets {
                    match required {
                        Some(kind) => {
                            if self.kind(target) != Some(kind) {
                                self.replace_with(target, empty_container(kind));
                            }
                            next.push(target);
                        }
                        None => self.replace_with(target, value.clone()),
                    }
                }
            }
            if next.is_empty() {
                return;
            }
            current = next;
        }
    }

    /// Bridges the first match of each `from` onto `to`.
    pub fn copy<P: AsRef<str>, Q: AsRef<str>>(
        &mut self,
        pairs: impl IntoIterator<Item = (P, Q)>,
    ) -> Result<()> {
        self.transfer(pairs, false, false)
    }

    /// Bridges every match of each `from` onto `to`, in match order.
    pub fn copy_all<P: AsRef<str>, Q: AsRef<str>>(
        &mut self,
        pairs: impl IntoIterator<Item = (P, Q)>,
    ) -> Result<()> {
        self.transfer(pairs, true, false)
    }

    /// Like [`Tree::copy`], then kills the source.
    pub fn move_value<P: AsRef<str>, Q: AsRef<str>>(
        &mut self,
        pairs: impl IntoIterator<Item = (P, Q)>,
    ) -> Result<()> {
        self.transfer(pairs, false, true)
    }

    pub fn move_all<P: AsRef<str>, Q: AsRef<str>>(
        &mut self,
        pairs: impl IntoIterator<Item = (P, Q)>,
    ) -> Result<()> {
        self.transfer(pairs, true, true)
    }

    fn transfer<P: AsRef<str>, Q: AsRef<str>>(
        &mut self,
        pairs: impl IntoIterator<Item = (P, Q)>,
        all: bool,
        kill: bool,
    ) -> Result<()> {
        for (from, to) in pairs {
            let to = PathExpression::parse(to.as_ref())?;
            let mut sources = self.find(from.as_ref())?;
            if !all {
                sources.truncate(1);
            }
            tracing::debug!(from = from.as_ref(), to = %to, sources = sources.len(), kill, "transfer");
            let values: Vec<Value> = sources.iter().map(|s| self.value(*s)).collect();
            for value in values {
                self.bridge_expr(&to, value);
            }
            if kill {
                for source in sources {
                    self.kill(source);
                }
            }
        }
        Ok(())
    }

    /// Writes every match of each path into `other` at the same absolute path.
    pub fn copy_to<P: AsRef<str>>(&mut self, other: &mut Tree, paths: impl IntoIterator<Item = P>) -> Result<()> {
        self.export(other, paths, false)
    }

    pub fn move_to<P: AsRef<str>>(&mut self, other: &mut Tree, paths: impl IntoIterator<Item = P>) -> Result<()> {
        self.export(other, paths, true)
    }

    fn export<P: AsRef<str>>(
        &mut self,
        other: &mut Tree,
        paths: impl IntoIterator<Item = P>,
        kill: bool,
    ) -> Result<()> {
        for path in paths {
            let sources = self.find(path.as_ref())?;
            for source in &sources {
                let Some(at) = self.absolute_path(*source) else {
                    continue;
                };
                other.bridge([(at, self.value(*source))])?;
            }
            if kill {
                for source in sources {
                    self.kill(source);
                }
            }
        }
        Ok(())
    }

    /// Removes every node each path matches. Returns how many were removed.
    pub fn delete<P: AsRef<str>>(&mut self, paths: impl IntoIterator<Item = P>) -> Result<usize> {
        let mut removed = 0;
        for path in paths {
            for id in self.find(path.as_ref())? {
                removed += usize::from(self.kill(id));
            }
            tracing::debug!(path = path.as_ref(), removed, "delete");
        }
        Ok(removed)
    }

    /// Deletes the node living at this node's absolute path.
    ///
    /// The path is resolved when `kill` runs and walked with exact key
    /// lookups, so exactly one node goes even when a sibling's key is
    /// symbol-equivalent. The root, detached and stale nodes are never removed.
    pub fn kill(&mut self, id: NodeId) -> bool {
        let mut trail = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let Some(key) = self.key(current) else {
                return false;
            };
            trail.push(key);
            current = parent;
        }
        if current != self.root() {
            return false;
        }
        let Some(last) = trail.first().cloned() else {
            return false;
        };
        let mut node = self.root();
        for key in trail.iter().skip(1).rev() {
            match self.child(node, key, true) {
                Some(child) => node = child,
                None => return false,
            }
        }
        let removed = self.delete_child(node, &last).is_some();
        tracing::debug!(removed, "kill");
        removed
    }
}
