//! Filter formulas: the `(...)` suffix of a path segment.
//!
//! A formula is compiled once into an expression tree and evaluated against
//! each candidate, with `$` bound to the candidate's value:
//!
//! ```text
//! $cost > 10 && !contains(lower($title), "draft")
//! ```

use serde_json::{Number, Value};

use crate::comparison::{compare, values_equal};
use crate::errors::{Error, Result};
use crate::parser::Parser;

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Subject(Vec<Access>), // $, $a, $.a[0]['b']
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum Access {
    Key(String),
    Index(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// A compiled formula. Compilation errors are kept and resurface on every
/// evaluation, so a bad formula never fails path parsing.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    compiled: std::result::Result<Expr, String>,
}

impl Formula {
    pub fn compile(source: &str) -> Self {
        let compiled = parse_formula(source).map_err(|e| e.to_string());
        Self { source: source.to_string(), compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_ok()
    }

    pub fn evaluate(&self, subject: &Value) -> Result<Value> {
        match &self.compiled {
            Ok(expr) => eval(expr, subject),
            Err(msg) => Err(Error::Formula(format!("`{}`: {msg}", self.source))),
        }
    }

    /// Truthiness of the formula for `subject`.
    pub fn test(&self, subject: &Value) -> Result<bool> {
        self.evaluate(subject).map(|v| truthy(&v))
    }
}

pub fn parse_formula(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input);
    let expr = parse_or(&mut parser)?;
    parser.skip_ws();
    if !parser.eof() {
        return Err(Error::Parse("trailing input in formula".into()));
    }
    Ok(expr)
}

fn parse_or(parser: &mut Parser) -> Result<Expr> {
    let mut left = parse_and(parser)?;
    loop {
        parser.skip_ws();
        if parser.consume_str("||") {
            let right = parse_and(parser)?;
            left = Expr::Or(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_and(parser: &mut Parser) -> Result<Expr> {
    let mut left = parse_not(parser)?;
    loop {
        parser.skip_ws();
        if parser.consume_str("&&") {
            let right = parse_not(parser)?;
            left = Expr::And(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_not(parser: &mut Parser) -> Result<Expr> {
    parser.skip_ws();
    if parser.peek_char() == Some('!') && !parser.peek_str("!=") {
        parser.consume_char('!');
        let inner = parse_not(parser)?;
        Ok(Expr::Not(Box::new(inner)))
    } else {
        parse_compare(parser)
    }
}

fn parse_compare(parser: &mut Parser) -> Result<Expr> {
    let left = parse_additive(parser)?;
    parser.skip_ws();
    let op = if parser.consume_str("==") {
        Some(CmpOp::Eq)
    } else if parser.consume_str("!=") {
        Some(CmpOp::Ne)
    } else if parser.consume_str("<=") {
        Some(CmpOp::Lte)
    } else if parser.consume_str(">=") {
        Some(CmpOp::Gte)
    } else if parser.consume_char('<') {
        Some(CmpOp::Lt)
    } else if parser.consume_char('>') {
        Some(CmpOp::Gt)
    } else {
        None
    };
    match op {
        Some(op) => {
            let right = parse_additive(parser)?;
            Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
        }
        None => Ok(left),
    }
}

fn parse_additive(parser: &mut Parser) -> Result<Expr> {
    let mut left = parse_multiplicative(parser)?;
    loop {
        parser.skip_ws();
        let op = if parser.consume_char('+') {
            ArithOp::Add
        } else if parser.consume_char('-') {
            ArithOp::Sub
        } else {
            break;
        };
        let right = parse_multiplicative(parser)?;
        left = Expr::Arith(op, Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_multiplicative(parser: &mut Parser) -> Result<Expr> {
    let mut left = parse_unary(parser)?;
    loop {
        parser.skip_ws();
        let op = if parser.consume_char('*') {
            ArithOp::Mul
        } else if parser.consume_char('/') {
            ArithOp::Div
        } else if parser.consume_char('%') {
            ArithOp::Rem
        } else {
            break;
        };
        let right = parse_unary(parser)?;
        left = Expr::Arith(op, Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_unary(parser: &mut Parser) -> Result<Expr> {
    parser.skip_ws();
    if parser.consume_char('-') {
        let inner = parse_unary(parser)?;
        return Ok(Expr::Neg(Box::new(inner)));
    }
    parse_primary(parser)
}

fn parse_primary(parser: &mut Parser) -> Result<Expr> {
    parser.skip_ws();
    match parser.peek_char() {
        Some('(') => {
            parser.consume_char('(');
            let inner = parse_or(parser)?;
            parser.skip_ws();
            parser.expect(')')?;
            Ok(inner)
        }
        Some('"') | Some('\'') => Ok(Expr::Literal(Value::String(parser.parse_quoted_string()?))),
        Some('$') => {
            parser.consume_char('$');
            parse_subject(parser)
        }
        Some(c) if c.is_ascii_digit() => Ok(Expr::Literal(parser.parse_number_literal()?)),
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            let name = parser.parse_identifier()?;
            match name.as_str() {
                "true" => return Ok(Expr::Literal(Value::Bool(true))),
                "false" => return Ok(Expr::Literal(Value::Bool(false))),
                "null" | "nil" => return Ok(Expr::Literal(Value::Null)),
                _ => {}
            }
            parser.skip_ws();
            parser.expect('(')?;
            let mut args = Vec::new();
            parser.skip_ws();
            if !parser.consume_char(')') {
                loop {
                    args.push(parse_or(parser)?);
                    parser.skip_ws();
                    if parser.consume_char(',') {
                        continue;
                    }
                    parser.expect(')')?;
                    break;
                }
            }
            Ok(Expr::Call(name, args))
        }
        _ => Err(Error::Parse("invalid operand".into())),
    }
}

fn parse_subject(parser: &mut Parser) -> Result<Expr> {
    let mut path = Vec::new();
    // `$cost` reads a key straight away
    if matches!(parser.peek_char(), Some(c) if c == '_' || c.is_ascii_alphanumeric()) {
        path.push(Access::Key(parser.parse_identifier()?));
    }
    loop {
        if parser.consume_char('.') {
            path.push(Access::Key(parser.parse_identifier()?));
        } else if parser.consume_char('[') {
            parser.skip_ws();
            if matches!(parser.peek_char(), Some('"') | Some('\'')) {
                path.push(Access::Key(parser.parse_quoted_string()?));
            } else {
                path.push(Access::Index(parser.parse_int()?));
            }
            parser.skip_ws();
            parser.expect(']')?;
        } else {
            break;
        }
    }
    Ok(Expr::Subject(path))
}

/// Filter truthiness: null, false, zero, `""`, `[]` and `{}` are false.
/// Empty values fail a filter so `($tags)` and `($count)` read naturally.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn eval(expr: &Expr, subject: &Value) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Subject(path) => Ok(read(subject, path)),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, subject)?))),
        Expr::Neg(inner) => match eval(inner, subject)? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                    Ok(Value::from(i))
                } else {
                    Ok(float(-n.as_f64().unwrap_or(0.0))?)
                }
            }
            other => Err(Error::Formula(format!("cannot negate {other}"))),
        },
        Expr::And(l, r) => {
            if !truthy(&eval(l, subject)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(r, subject)?)))
        }
        Expr::Or(l, r) => {
            if truthy(&eval(l, subject)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(r, subject)?)))
        }
        Expr::Compare(op, l, r) => {
            let (a, b) = (eval(l, subject)?, eval(r, subject)?);
            let result = match op {
                CmpOp::Eq => values_equal(&a, &b),
                CmpOp::Ne => !values_equal(&a, &b),
                _ => {
                    let ord = compare(&a, &b)
                        .ok_or_else(|| Error::Formula(format!("cannot compare {a} with {b}")))?;
                    match op {
                        CmpOp::Lt => ord.is_lt(),
                        CmpOp::Lte => ord.is_le(),
                        CmpOp::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    }
                }
            };
            Ok(Value::Bool(result))
        }
        Expr::Arith(op, l, r) => arith(*op, eval(l, subject)?, eval(r, subject)?),
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|a| eval(a, subject))
                .collect::<Result<Vec<_>>>()?;
            call(name, &args)
        }
    }
}

fn read(subject: &Value, path: &[Access]) -> Value {
    let mut current = subject;
    for access in path {
        let next = match (access, current) {
            (Access::Key(k), Value::Object(m)) => m.get(k),
            (Access::Key(k), Value::Array(a)) => k.parse::<usize>().ok().and_then(|i| a.get(i)),
            (Access::Index(i), Value::Array(a)) => {
                let len = a.len() as i64;
                let i = if *i < 0 { len + i } else { *i };
                usize::try_from(i).ok().and_then(|i| a.get(i))
            }
            (Access::Index(i), Value::Object(m)) => m.get(&i.to_string()),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn float(f: f64) -> Result<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Error::Formula(format!("{f} is not a finite number")))
}

fn arith(op: ArithOp, a: Value, b: Value) -> Result<Value> {
    if let (ArithOp::Add, Value::String(x), Value::String(y)) = (op, &a, &b) {
        return Ok(Value::String(format!("{x}{y}")));
    }
    let (Value::Number(x), Value::Number(y)) = (&a, &b) else {
        return Err(Error::Formula(format!("cannot apply {op:?} to {a} and {b}")));
    };
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        let exact = match op {
            ArithOp::Add => x.checked_add(y),
            ArithOp::Sub => x.checked_sub(y),
            ArithOp::Mul => x.checked_mul(y),
            ArithOp::Div if y != 0 && x.checked_rem(y) == Some(0) => x.checked_div(y),
            ArithOp::Rem if y != 0 => x.checked_rem(y),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::from(v));
        }
    }
    let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
    if matches!(op, ArithOp::Div | ArithOp::Rem) && y == 0.0 {
        return Err(Error::Formula("division by zero".into()));
    }
    float(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Rem => x % y,
    })
}

fn call(name: &str, args: &[Value]) -> Result<Value> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(Error::Formula(format!("{name}() takes {n} arguments, got {}", args.len())))
        }
    };
    let text = |v: &Value| -> Result<String> {
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Formula(format!("{name}() expects a string, got {v}")))
    };
    match name {
        "lower" => {
            arity(1)?;
            Ok(Value::String(text(&args[0])?.to_lowercase()))
        }
        "upper" => {
            arity(1)?;
            Ok(Value::String(text(&args[0])?.to_uppercase()))
        }
        "length" => {
            arity(1)?;
            let len = match &args[0] {
                Value::Array(a) => a.len(),
                Value::Object(m) => m.len(),
                Value::String(s) => s.chars().count(),
                other => return Err(Error::Formula(format!("length() of {other}"))),
            };
            Ok(Value::from(len))
        }
        "contains" => {
            arity(2)?;
            let found = match (&args[0], &args[1]) {
                (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
                (Value::Array(a), needle) => a.iter().any(|v| values_equal(v, needle)),
                (Value::Object(m), Value::String(k)) => m.contains_key(k),
                (h, n) => return Err(Error::Formula(format!("contains({h}, {n})"))),
            };
            Ok(Value::Bool(found))
        }
        "starts_with" => {
            arity(2)?;
            Ok(Value::Bool(text(&args[0])?.starts_with(&text(&args[1])?)))
        }
        "ends_with" => {
            arity(2)?;
            Ok(Value::Bool(text(&args[0])?.ends_with(&text(&args[1])?)))
        }
        "matches" => {
            arity(2)?;
            let pattern = text(&args[1])?;
            let re = regex::Regex::new(&pattern)
                .map_err(|e| Error::Formula(format!("bad pattern `{pattern}`: {e}")))?;
            Ok(Value::Bool(re.is_match(&text(&args[0])?)))
        }
        _ => Err(Error::Formula(format!("unknown function `{name}`"))),
    }
}
