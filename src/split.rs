//! Delimiter-aware splitting for selector arguments.

use regex::Regex;

#[derive(Debug, Clone)]
pub enum Delimiter {
    Literal(String),
    Pattern(Regex),
}

impl Delimiter {
    /// Length of the delimiter match starting exactly at the front of `rest`.
    fn match_len(&self, rest: &str) -> Option<usize> {
        match self {
            Delimiter::Literal(lit) if !lit.is_empty() => rest.starts_with(lit.as_str()).then(|| lit.len()),
            Delimiter::Literal(_) => None,
            Delimiter::Pattern(re) => re
                .find(rest)
                .filter(|m| m.start() == 0 && !m.as_str().is_empty())
                .map(|m| m.end()),
        }
    }
}

/// Splits `input` on any of `delimiters`, never inside single or double
/// quotes. Pieces are trimmed; an empty input yields no pieces.
pub fn multi_split(input: &str, delimiters: &[Delimiter]) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < input.len() {
        let rest = &input[i..];
        let Some(c) = rest.chars().next() else { break };
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(next) = rest[1..].chars().next() {
                    current.push(next);
                    i += 1 + next.len_utf8();
                    continue;
                }
            } else if c == q {
                quote = None;
            }
            i += c.len_utf8();
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
            current.push(c);
            i += 1;
            continue;
        }
        if let Some(len) = delimiters.iter().find_map(|d| d.match_len(rest)) {
            pieces.push(current.trim().to_string());
            current.clear();
            i += len;
            continue;
        }
        current.push(c);
        i += c.len_utf8();
    }
    pieces.push(current.trim().to_string());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn quotes_protect_delimiters() {
        let parts = multi_split(r#"a, "b,c" ,'d'"#, &[Delimiter::Literal(",".into())]);
        assert_eq!(parts, vec!["a", "\"b,c\"", "'d'"]);
    }

    #[test]
    fn mixed_literal_and_pattern() {
        let delims = [
            Delimiter::Literal(";".into()),
            Delimiter::Pattern(Regex::new(r"\s*\|\s*").unwrap()),
        ];
        assert_eq!(multi_split("a;b | c", &delims), vec!["a", "b", "c"]);
        assert!(multi_split("  ", &delims).is_empty());
    }
}
