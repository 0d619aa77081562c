//! Evaluator for the expression subset used in generated templates.
//!
//! Supports property paths with `[i]` indexing, string/number/boolean/null literals,
//! comparison, `and`/`or`/`!`, arithmetic with string concatenation on `+`, the conditional
//! operator and a handful of method calls (`isEmpty`, `size`, `length`, `replace`,
//! `toLowerCase`, `toUpperCase`, `trim`, `contains`, `startsWith`, `endsWith`, `equals`).

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::{CompileError, CompileResult};

use super::ExpressionEvaluator;

/// Built-in [`ExpressionEvaluator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEvaluator;

impl ExpressionEvaluator for SimpleEvaluator {
    fn evaluate(&self, expr: &str, scope: &Value) -> CompileResult<Value> {
        let tokens = tokenize(expr)?;
        let mut parser = Parser {
            source: expr,
            tokens,
            pos: 0,
        };
        let ast = parser.expression(0)?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        eval(expr, &ast, scope)
    }
}

/// MyBatis truthiness: null is false, numbers are compared against zero, everything else
/// that is not a boolean is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(Value),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%", "?", ":", "(",
    ")", ".", ",", "[", "]",
];

fn tokenize(expr: &str) -> CompileResult<Vec<Tok>> {
    let err = |message: &str| CompileError::expression(expr, message);
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' || c == '"' {
            let mut out = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(err("unterminated string literal")),
                    Some(&q) if q == c => break,
                    Some('\\') => {
                        let escaped = chars.get(i + 1).ok_or_else(|| err("dangling escape"))?;
                        out.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => *other,
                        });
                        i += 2;
                    }
                    Some(&other) => {
                        out.push(other);
                        i += 1;
                    }
                }
            }
            i += 1;
            tokens.push(Tok::Str(out));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                // `a[0].b` style member access after an index is not a number
                if chars[i] == '.' && !chars.get(i + 1).is_some_and(char::is_ascii_digit) {
                    break;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = match text.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => text
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| err("invalid number"))?,
            };
            tokens.push(Tok::Num(value));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while chars
                .get(i)
                .is_some_and(|&c| c.is_alphanumeric() || c == '_' || c == '$')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "and" => Tok::Op("&&"),
                "or" => Tok::Op("||"),
                "not" => Tok::Op("!"),
                "eq" => Tok::Op("=="),
                "neq" => Tok::Op("!="),
                "lt" => Tok::Op("<"),
                "lte" => Tok::Op("<="),
                "gt" => Tok::Op(">"),
                "gte" => Tok::Op(">="),
                _ => Tok::Ident(word),
            });
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| err(&format!("unexpected character '{c}'")))?;
            i += op.chars().count();
            tokens.push(Tok::Op(*op));
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Ast {
    Lit(Value),
    Var(String),
    Member(Box<Ast>, String),
    Index(Box<Ast>, Box<Ast>),
    Call(Box<Ast>, String, Vec<Ast>),
    Not(Box<Ast>),
    Neg(Box<Ast>),
    Binary(&'static str, Box<Ast>, Box<Ast>),
    Cond(Box<Ast>, Box<Ast>, Box<Ast>),
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Tok>,
    pos: usize,
}

fn binding_power(op: &str) -> Option<u8> {
    Some(match op {
        "?" => 1,
        "||" => 2,
        "&&" => 3,
        "==" | "!=" => 4,
        "<" | "<=" | ">" | ">=" => 5,
        "+" | "-" => 6,
        "*" | "/" | "%" => 7,
        _ => return None,
    })
}

impl Parser<'_> {
    fn error(&self, message: &str) -> CompileError {
        CompileError::expression(self.source, message)
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, op: &str) -> CompileResult<()> {
        match self.next() {
            Some(Tok::Op(found)) if found == op => Ok(()),
            _ => Err(self.error(&format!("expected '{op}'"))),
        }
    }

    fn expression(&mut self, min: u8) -> CompileResult<Ast> {
        let mut lhs = self.prefix()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op(op)) => *op,
                _ => break,
            };
            let Some(bp) = binding_power(op) else {
                break;
            };
            if bp <= min {
                break;
            }
            self.pos += 1;
            if op == "?" {
                let then = self.expression(0)?;
                self.expect(":")?;
                // right associative
                let otherwise = self.expression(bp - 1)?;
                lhs = Ast::Cond(Box::new(lhs), Box::new(then), Box::new(otherwise));
            } else {
                let rhs = self.expression(bp)?;
                lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
            }
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> CompileResult<Ast> {
        let atom = match self.next() {
            Some(Tok::Op("!")) => return Ok(Ast::Not(Box::new(self.prefix()?))),
            Some(Tok::Op("-")) => return Ok(Ast::Neg(Box::new(self.prefix()?))),
            Some(Tok::Op("(")) => {
                let inner = self.expression(0)?;
                self.expect(")")?;
                inner
            }
            Some(Tok::Str(s)) => Ast::Lit(Value::String(s)),
            Some(Tok::Num(n)) => Ast::Lit(n),
            Some(Tok::Ident(word)) => match word.as_str() {
                "null" => Ast::Lit(Value::Null),
                "true" => Ast::Lit(Value::Bool(true)),
                "false" => Ast::Lit(Value::Bool(false)),
                _ => Ast::Var(word),
            },
            _ => return Err(self.error("expected an operand")),
        };
        self.postfix(atom)
    }

    fn postfix(&mut self, mut target: Ast) -> CompileResult<Ast> {
        loop {
            match self.peek() {
                Some(Tok::Op(".")) => {
                    self.pos += 1;
                    let Some(Tok::Ident(name)) = self.next() else {
                        return Err(self.error("expected a member name after '.'"));
                    };
                    if self.peek() == Some(&Tok::Op("(")) {
                        self.pos += 1;
                        let mut args = Vec::new();
                        if self.peek() != Some(&Tok::Op(")")) {
                            loop {
                                args.push(self.expression(0)?);
                                if self.peek() == Some(&Tok::Op(",")) {
                                    self.pos += 1;
                                } else {
                                    break;
                                }
                            }
                        }
                        self.expect(")")?;
                        target = Ast::Call(Box::new(target), name, args);
                    } else {
                        target = Ast::Member(Box::new(target), name);
                    }
                }
                Some(Tok::Op("[")) => {
                    self.pos += 1;
                    let index = self.expression(0)?;
                    self.expect("]")?;
                    target = Ast::Index(Box::new(target), Box::new(index));
                }
                _ => return Ok(target),
            }
        }
    }
}

fn eval(source: &str, ast: &Ast, scope: &Value) -> CompileResult<Value> {
    let err = |message: String| CompileError::expression(source, message);
    Ok(match ast {
        Ast::Lit(value) => value.clone(),
        Ast::Var(name) => scope.get(name).cloned().unwrap_or(Value::Null),
        Ast::Member(target, name) => {
            let target = eval(source, target, scope)?;
            target.get(name).cloned().unwrap_or(Value::Null)
        }
        Ast::Index(target, index) => {
            let target = eval(source, target, scope)?;
            match eval(source, index, scope)? {
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|i| target.get(i as usize).cloned())
                    .unwrap_or(Value::Null),
                Value::String(key) => target.get(&key).cloned().unwrap_or(Value::Null),
                other => return Err(err(format!("cannot index with {other}"))),
            }
        }
        Ast::Call(target, method, args) => {
            let target = eval(source, target, scope)?;
            let args = args
                .iter()
                .map(|a| eval(source, a, scope))
                .collect::<CompileResult<Vec<_>>>()?;
            call(&target, method, &args).map_err(err)?
        }
        Ast::Not(inner) => Value::Bool(!truthy(&eval(source, inner, scope)?)),
        Ast::Neg(inner) => match eval(source, inner, scope)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Value::from(-i),
                None => float(-n.as_f64().unwrap_or(0.0)),
            },
            other => return Err(err(format!("cannot negate {other}"))),
        },
        Ast::Cond(test, then, otherwise) => {
            if truthy(&eval(source, test, scope)?) {
                eval(source, then, scope)?
            } else {
                eval(source, otherwise, scope)?
            }
        }
        Ast::Binary("&&", lhs, rhs) => {
            Value::Bool(truthy(&eval(source, lhs, scope)?) && truthy(&eval(source, rhs, scope)?))
        }
        Ast::Binary("||", lhs, rhs) => {
            Value::Bool(truthy(&eval(source, lhs, scope)?) || truthy(&eval(source, rhs, scope)?))
        }
        Ast::Binary(op, lhs, rhs) => {
            let lhs = eval(source, lhs, scope)?;
            let rhs = eval(source, rhs, scope)?;
            binary(op, &lhs, &rhs).map_err(err)?
        }
    })
}

fn binary(op: &str, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    match op {
        "==" => Ok(Value::Bool(loose_eq(lhs, rhs))),
        "!=" => Ok(Value::Bool(!loose_eq(lhs, rhs))),
        "<" | "<=" | ">" | ">=" => {
            let ordering = compare(lhs, rhs)
                .ok_or_else(|| format!("cannot compare {lhs} and {rhs}"))?;
            Ok(Value::Bool(match op {
                "<" => ordering == Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        "+" if lhs.is_string() || rhs.is_string() => {
            Ok(Value::String(format!("{}{}", display(lhs), display(rhs))))
        }
        _ => arithmetic(op, lhs, rhs),
    }
}

fn arithmetic(op: &str, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    let (Some(a), Some(b)) = (number(lhs), number(rhs)) else {
        return Err(format!("'{op}' needs numbers, got {lhs} and {rhs}"));
    };
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let value = match op {
            "+" => a.checked_add(b),
            "-" => a.checked_sub(b),
            "*" => a.checked_mul(b),
            "/" => a.checked_div(b),
            "%" => a.checked_rem(b),
            _ => None,
        };
        return value
            .map(Value::from)
            .ok_or_else(|| format!("integer overflow or division by zero in '{op}'"));
    }
    let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
    Ok(float(match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" => a / b,
        _ => a % b,
    }))
}

fn call(target: &Value, method: &str, args: &[Value]) -> Result<Value, String> {
    let arg = |i: usize| args.get(i).ok_or_else(|| format!("{method}() is missing an argument"));
    let text = || {
        target
            .as_str()
            .ok_or_else(|| format!("{method}() needs a string, got {target}"))
    };
    Ok(match method {
        "isEmpty" => Value::Bool(match target {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }),
        "size" | "length" => Value::from(match target {
            Value::String(s) => s.chars().count(),
            Value::Array(a) => a.len(),
            Value::Object(o) => o.len(),
            other => return Err(format!("{method}() is undefined on {other}")),
        }),
        "replace" => {
            let from = display(arg(0)?);
            let to = display(arg(1)?);
            Value::String(text()?.replace(&from, &to))
        }
        "toLowerCase" => Value::String(text()?.to_lowercase()),
        "toUpperCase" => Value::String(text()?.to_uppercase()),
        "trim" => Value::String(text()?.trim().to_string()),
        "startsWith" => Value::Bool(text()?.starts_with(&display(arg(0)?))),
        "endsWith" => Value::Bool(text()?.ends_with(&display(arg(0)?))),
        "contains" => {
            let needle = arg(0)?;
            Value::Bool(match target {
                Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
                _ => text()?.contains(&display(needle)),
            })
        }
        "equals" => Value::Bool(loose_eq(target, arg(0)?)),
        "toString" => Value::String(display(target)),
        _ => return Err(format!("unknown method {method}()")),
    })
}

fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s
            .parse::<i64>()
            .map(Number::from)
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64)),
        _ => None,
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!(compare(lhs, rhs), Some(Ordering::Equal))
        }
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            let a = number(lhs)?.as_f64()?;
            let b = number(rhs)?.as_f64()?;
            a.partial_cmp(&b)
        }
    }
}

/// String form used for concatenation and bound text.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
