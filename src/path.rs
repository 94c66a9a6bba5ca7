//! Path expressions.
//!
//! A path is a `.`-separated list of segments. Each segment selects children
//! of the current candidates:
//!
//! | token            | selects                                         |
//! |------------------|-------------------------------------------------|
//! | `key`            | map key (`\.` for a literal dot)                |
//! | `[N]`            | sequence index                                  |
//! | `[a..b]` `[a...b]` | inclusive / exclusive index range             |
//! | `/re/flags`      | keys matching a regular expression              |
//! | `*`              | every child                                     |
//! | `{op:args}`      | result of a registered operation                |
//! | `..seg`          | `seg` at any depth                              |
//!
//! Any segment may end in a `(formula)` that filters candidates.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::errors::{Error, Result};
use crate::formula::Formula;
use crate::parser::Parser;
use crate::split::{multi_split, Delimiter};
use crate::tree::{Key, Kind, NodeId, Tree};

#[derive(Debug, Clone)]
pub enum Selector {
    Any,
    Key(String),
    Index(i64),
    Range { start: i64, end: i64, exclusive: bool },
    Pattern(Regex),
    Special { name: String, args: Vec<Value> },
}

#[derive(Debug, Clone)]
pub struct PathSegment {
    raw: String,
    selector: Selector,
    formula: Option<Formula>,
    recursive: bool,
}

impl PathSegment {
    pub fn parse(token: &str, recursive: bool) -> Result<Self> {
        let (body, formula) = match trailing_group(token) {
            Some(open) => (&token[..open], Some(Formula::compile(&token[open + 1..token.len() - 1]))),
            None => (token, None),
        };
        let selector = parse_selector(body)?;
        Ok(Self { raw: token.to_string(), selector, formula, recursive })
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn formula(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Whether `key`, a child of `parent`, satisfies the selector.
    pub fn key_match(&self, tree: &Tree, parent: NodeId, key: &Key) -> bool {
        match &self.selector {
            Selector::Any => true,
            Selector::Key(name) => {
                let rendered = key.to_string();
                rendered == *name || key.normalized() == Key::Name(name.clone()).normalized()
            }
            Selector::Index(i) => key.as_int() == Some(*i),
            Selector::Range { start, end, exclusive } => {
                let Some(k) = key.as_int() else {
                    return false;
                };
                let len = tree.children(parent).len() as i64;
                let resolve = |b: i64| if b < 0 { len + b } else { b };
                in_range(k, *start, *end, *exclusive)
                    || in_range(k, resolve(*start), resolve(*end), *exclusive)
            }
            Selector::Pattern(re) => re.is_match(&key.to_string()),
            Selector::Special { .. } => false,
        }
    }

    /// Runs the formula against the node's value. Failures are reported and
    /// count as a non-match.
    pub fn evaluates(&self, tree: &Tree, node: NodeId) -> bool {
        let Some(formula) = &self.formula else {
            return true;
        };
        match formula.test(&tree.value(node)) {
            Ok(pass) => pass,
            Err(e) => {
                tree.context().report(&self.raw, e.to_string());
                false
            }
        }
    }

    /// Candidates selected below `node`, in document order.
    pub fn matches(&self, tree: &mut Tree, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect(tree, node, &mut out);
        out
    }

    fn collect(&self, tree: &mut Tree, node: NodeId, out: &mut Vec<NodeId>) {
        if let Selector::Special { name, args } = &self.selector {
            if let Some(found) = self.special(tree, node, name, args) {
                out.push(found);
            }
        }
        let children = tree.children(node).to_vec();
        for (key, child) in children {
            if !matches!(self.selector, Selector::Special { .. })
                && self.key_match(tree, node, &key)
                && self.evaluates(tree, child)
            {
                out.push(child);
            }
            if self.recursive && tree.has_children(child) {
                self.collect(tree, child, out);
            }
        }
    }

    /// Runs a `{name:args}` operation on the node's value. An operation that
    /// picks one of the node's own children yields that child; any other
    /// result becomes a scratch node outside the document.
    fn special(&self, tree: &mut Tree, node: NodeId, name: &str, args: &[Value]) -> Option<NodeId> {
        let subject = tree.value(node);
        let registry = tree.context().registry();
        let picked = match registry.select(name, &subject, args) {
            Ok(key) => key.and_then(|k| tree.child(node, &k, true)),
            Err(e) => {
                tree.context().report(&self.raw, e.to_string());
                return None;
            }
        };
        let found = match picked {
            Some(child) => child,
            None => match registry.call(name, &subject, args) {
                Ok(result) => tree.adopt_scratch(result),
                Err(e) => {
                    tree.context().report(&self.raw, e.to_string());
                    return None;
                }
            },
        };
        self.evaluates(tree, found).then_some(found)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recursive {
            f.write_str("..")?;
        }
        f.write_str(&self.raw)
    }
}

fn in_range(k: i64, start: i64, end: i64, exclusive: bool) -> bool {
    if exclusive {
        start <= k && k < end
    } else {
        start <= k && k <= end
    }
}

fn parse_selector(body: &str) -> Result<Selector> {
    if body.is_empty() || body == "*" {
        return Ok(Selector::Any);
    }
    if body.len() >= 2 && body.starts_with('[') && body.ends_with(']') {
        return parse_bracket(&body[1..body.len() - 1]);
    }
    if body.len() >= 2 && body.starts_with('{') && body.ends_with('}') {
        let inner = &body[1..body.len() - 1];
        let (name, args) = inner.split_once(':').unwrap_or((inner, ""));
        let args = multi_split(args, &[Delimiter::Literal(",".into())])
            .into_iter()
            .map(|a| parse_argument(&a))
            .collect();
        return Ok(Selector::Special { name: name.trim().to_string(), args });
    }
    if body.starts_with('/') {
        return parse_pattern(body);
    }
    Ok(Selector::Key(unescape(body)))
}

fn parse_bracket(inner: &str) -> Result<Selector> {
    let trimmed = inner.trim();
    if matches!(trimmed.chars().next(), Some('"') | Some('\'')) {
        let mut p = Parser::new(trimmed);
        let key = p.parse_quoted_string()?;
        p.skip_ws();
        if !p.eof() {
            return Err(Error::Parse(format!("unexpected input after key in [{inner}]")));
        }
        return Ok(Selector::Key(key));
    }
    let mut p = Parser::new(trimmed);
    let Ok(start) = p.parse_int() else {
        return Ok(Selector::Key(unescape(trimmed)));
    };
    if p.eof() {
        return Ok(Selector::Index(start));
    }
    let exclusive = if p.consume_str("...") {
        true
    } else if p.consume_str("..") {
        false
    } else {
        return Ok(Selector::Key(unescape(trimmed)));
    };
    let end = p.parse_int()?;
    if !p.eof() {
        return Err(Error::Parse(format!("bad range [{inner}]")));
    }
    Ok(Selector::Range { start, end, exclusive })
}

fn parse_pattern(body: &str) -> Result<Selector> {
    let close = body
        .rfind('/')
        .filter(|i| *i > 0)
        .ok_or_else(|| Error::Parse(format!("unterminated pattern {body}")))?;
    let pattern = &body[1..close];
    let mut builder = RegexBuilder::new(pattern);
    for flag in body[close + 1..].chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(Error::Parse(format!("unknown pattern flag `{other}`"))),
        };
    }
    let re = builder
        .build()
        .map_err(|source| Error::Pattern { pattern: pattern.to_string(), source })?;
    Ok(Selector::Pattern(re))
}

/// Selector arguments are JSON when they parse as JSON, plain text otherwise.
fn parse_argument(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    Value::String(raw.to_string())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Byte offset of the `(` opening a group that closes at the token's last
/// character, if there is one.
fn trailing_group(token: &str) -> Option<usize> {
    if !token.ends_with(')') {
        return None;
    }
    let mut depth = 0usize;
    let mut open_at = None;
    let mut quote: Option<char> = None;
    let mut in_pattern = false;
    let mut escaped = false;
    for (i, c) in token.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if in_pattern {
            in_pattern = c != '/';
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '/' if i == 0 => in_pattern = true,
            '\'' | '"' if depth > 0 => quote = Some(c),
            '(' | '[' | '{' => {
                if depth == 0 && c == '(' {
                    open_at = Some(i);
                }
                depth += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && c == ')' && i + 1 == token.len() {
                    return open_at;
                }
                if depth == 0 {
                    open_at = None;
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a raw path on unescaped dots. Brackets, parentheses, braces and a
/// leading `/pattern/` are atomic.
fn tokenize(raw: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut closers: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut in_pattern = false;
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
            continue;
        }
        if in_pattern {
            current.push(c);
            in_pattern = c != '/';
            continue;
        }
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '.' if closers.is_empty() => tokens.push(std::mem::take(&mut current)),
            '/' if closers.is_empty() && current.is_empty() => {
                in_pattern = true;
                current.push(c);
            }
            '[' => {
                closers.push(']');
                current.push(c);
            }
            '(' => {
                closers.push(')');
                current.push(c);
            }
            '{' => {
                closers.push('}');
                current.push(c);
            }
            ']' | ')' | '}' => {
                if closers.pop() != Some(c) {
                    return Err(Error::Parse(format!("unbalanced `{c}` in path {raw:?}")));
                }
                current.push(c);
            }
            '\'' | '"' if !closers.is_empty() => {
                quote = Some(c);
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    if in_pattern {
        return Err(Error::Parse(format!("unterminated pattern in path {raw:?}")));
    }
    if quote.is_some() {
        return Err(Error::Parse(format!("unterminated string in path {raw:?}")));
    }
    if let Some(missing) = closers.pop() {
        return Err(Error::Parse(format!("missing `{missing}` in path {raw:?}")));
    }
    tokens.push(current);
    Ok(tokens)
}

/// A parsed path: an ordered list of segments.
#[derive(Debug, Clone)]
pub struct PathExpression {
    raw: String,
    segments: Vec<PathSegment>,
}

impl PathExpression {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut recursive = false;
        for (i, token) in tokenize(raw)?.into_iter().enumerate() {
            if token.is_empty() {
                // a lone leading dot is just a separator
                recursive = i > 0;
                continue;
            }
            segments.push(PathSegment::parse(&token, recursive)?);
            recursive = false;
        }
        tracing::debug!(path = raw, segments = segments.len(), "parsed path");
        Ok(Self { raw: raw.to_string(), segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Expands the candidate set segment by segment, starting at `start`.
    ///
    /// Computed results of `{op}` segments stay readable until the next query
    /// on the same tree.
    pub fn find(&self, tree: &mut Tree, start: NodeId) -> Vec<NodeId> {
        tree.release_scratch(&[start]);
        if !tree.contains(start) {
            return Vec::new();
        }
        let mut candidates = vec![start];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in candidates {
                next.extend(segment.matches(tree, node));
            }
            tracing::trace!(segment = %segment, matched = next.len(), "expanded segment");
            tree.release_scratch(&next);
            if next.is_empty() {
                return next;
            }
            candidates = next;
        }
        candidates
    }
}

impl std::str::FromStr for PathExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Container kind a segment needs its parent to be when creating children.
pub(crate) fn container_for(segment: &PathSegment) -> Kind {
    match segment.selector {
        Selector::Index(_) => Kind::Sequence,
        _ => Kind::Map,
    }
}

/// Concrete key a literal segment names under `parent`, if any.
pub(crate) fn literal_key(segment: &PathSegment, tree: &Tree, parent: NodeId) -> Option<Key> {
    if segment.recursive || segment.formula.is_some() {
        return None;
    }
    let kind = tree.kind(parent)?;
    match (&segment.selector, kind) {
        (Selector::Key(name), Kind::Map) => Some(Key::Name(name.clone())),
        (Selector::Key(name), Kind::Sequence) => name.parse::<usize>().ok().map(Key::Index),
        (Selector::Index(i), Kind::Map) => Some(Key::Name(i.to_string())),
        (Selector::Index(i), Kind::Sequence) => {
            let len = tree.children(parent).len() as i64;
            let i = if *i < 0 { len + i } else { *i };
            usize::try_from(i).ok().map(Key::Index)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tokens(raw: &str) -> Vec<String> {
        tokenize(raw).unwrap()
    }

    #[test]
    fn tokenizer_keeps_groups_atomic() {
        assert_eq!(tokens("a.[0..2].b"), vec!["a", "[0..2]", "b"]);
        assert_eq!(tokens("a($.x > 1.5).b"), vec!["a($.x > 1.5)", "b"]);
        assert_eq!(tokens(r"/a\.b/i.c"), vec![r"/a\.b/i", "c"]);
        assert_eq!(tokens(r"x\.y.z"), vec![r"x\.y", "z"]);
        assert_eq!(tokens("..e"), vec!["", "", "e"]);
        assert_eq!(tokens("{fetch:'a.b'}.c"), vec!["{fetch:'a.b'}", "c"]);
    }

    #[test]
    fn tokenizer_rejects_unbalanced_groups() {
        assert!(tokenize("a.[0").is_err());
        assert!(tokenize("a.b)").is_err());
        assert!(tokenize("/abc").is_err());
        assert!(tokenize("a($ == 'x)").is_err());
    }

    #[test]
    fn recursive_flag_folds_into_next_segment() {
        let expr = PathExpression::parse("a..b.c").unwrap();
        let flags: Vec<bool> = expr.segments().iter().map(|s| s.is_recursive()).collect();
        assert_eq!(flags, vec![false, true, false]);
        let leading = PathExpression::parse(".a").unwrap();
        assert!(!leading.segments()[0].is_recursive());
        assert!(PathExpression::parse("").unwrap().segments().is_empty());
    }

    #[test]
    fn selectors_classify() {
        let sel = |t: &str| PathSegment::parse(t, false).unwrap().selector;
        assert!(matches!(sel("[3]"), Selector::Index(3)));
        assert!(matches!(sel("[-1]"), Selector::Index(-1)));
        assert!(matches!(sel("[1..3]"), Selector::Range { start: 1, end: 3, exclusive: false }));
        assert!(matches!(sel("[1...3]"), Selector::Range { exclusive: true, .. }));
        assert!(matches!(sel("/^a/i"), Selector::Pattern(_)));
        assert!(matches!(sel("*"), Selector::Any));
        assert!(matches!(sel("['a.b']"), Selector::Key(k) if k == "a.b"));
        assert!(matches!(sel(r"a\.b"), Selector::Key(k) if k == "a.b"));
        assert!(matches!(sel(r"\*"), Selector::Key(k) if k == "*"));
        match sel("{fetch:name, 2}") {
            Selector::Special { name, args } => {
                assert_eq!(name, "fetch");
                assert_eq!(args, vec![json!("name"), json!(2)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn trailing_formula_is_split_off() {
        let seg = PathSegment::parse("[0..-1]($cost > 10)", false).unwrap();
        assert_eq!(seg.formula().unwrap().source(), "$cost > 10");
        assert!(matches!(seg.selector(), Selector::Range { start: 0, end: -1, .. }));
        let escaped = PathSegment::parse(r"f\(x\)", false).unwrap();
        assert!(escaped.formula().is_none());
        assert!(matches!(escaped.selector(), Selector::Key(k) if k == "f(x)"));
    }

    #[test]
    fn bad_patterns_fail_to_parse() {
        assert!(PathSegment::parse("/(/", false).is_err());
        assert!(PathSegment::parse("/a/q", false).is_err());
    }

    #[test]
    fn range_matches_resolved_negative_bounds() {
        let tree = Tree::new(json!([0, 1, 2, 3]));
        let seg = PathSegment::parse("[1..-2]", false).unwrap();
        let hits: Vec<_> = (0..4).filter(|i| seg.key_match(&tree, tree.root(), &Key::Index(*i))).collect();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn find_walks_segments() {
        let mut tree = Tree::new(json!({"a": {"b": [1, 2]}, "c": 3}));
        let root = tree.root();
        let hits = PathExpression::parse("a.b.[1]").unwrap().find(&mut tree, root);
        assert_eq!(hits.iter().map(|n| tree.value(*n)).collect::<Vec<_>>(), vec![json!(2)]);
        assert!(PathExpression::parse("x.y").unwrap().find(&mut tree, root).is_empty());
        assert_eq!(PathExpression::parse("").unwrap().find(&mut tree, root), vec![root]);
    }
}
