//! Parameter binding parser for declared query strings.
//!
//! [`parse`] extracts `?N`, `:name`, `?#{expr}` and `:#{expr}` placeholders in a single pass,
//! classifies LIKE and IN usage, and produces a cleaned query plus an ordered list of
//! [`ParameterBinding`]s. [`ParsedQuery::into_fragment`] turns the result into fragments
//! where every value goes through a placeholder.
//!
//! ```
//! use mapperc::binding::{parse, BindingKind, LikeKind};
//!
//! let parsed = parse("SELECT * FROM t_user WHERE name LIKE %:name% AND age > :age")?;
//! assert_eq!(parsed.query, "SELECT * FROM t_user WHERE name LIKE :name AND age > :age");
//! assert_eq!(parsed.bindings[0].kind, BindingKind::Like(LikeKind::Contains));
//! assert_eq!(parsed.bindings[1].kind, BindingKind::Plain);
//! # Ok::<(), mapperc::CompileError>(())
//! ```

mod parser;


pub use parser::{orders_at_top_level, parse};

use serde_json::{Map, Value};

use crate::error::CompileResult;
use crate::fragment::{Fragment, in_list, xml};
use crate::preview::ExpressionEvaluator;

/// Prefix of names generated for expression placeholders.
pub const SYNTHETIC_PREFIX: &str = "__$synthetic$";

/// Wildcard placement of a LIKE parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeKind {
    StartsWith,
    EndsWith,
    Contains,
    /// The caller supplies the full pattern.
    Plain,
}

impl LikeKind {
    /// Kind from `%` markers found before and after a placeholder.
    pub fn from_markers(leading: bool, trailing: bool) -> Self {
        match (leading, trailing) {
            (true, true) => LikeKind::Contains,
            (true, false) => LikeKind::EndsWith,
            (false, true) => LikeKind::StartsWith,
            (false, false) => LikeKind::Plain,
        }
    }

    /// `(leading, trailing)` wildcard flags.
    pub fn wildcards(self) -> (bool, bool) {
        match self {
            LikeKind::StartsWith => (false, true),
            LikeKind::EndsWith => (true, false),
            LikeKind::Contains => (true, true),
            LikeKind::Plain => (false, false),
        }
    }

    /// Template expression producing the LIKE pattern for `param`.
    ///
    /// With an escape character, occurrences of the escape character, `%` and `_` in the
    /// value are escaped before the wildcards are added.
    pub fn pattern(self, param: &str, escape: Option<char>) -> String {
        let value = match escape {
            Some(c) => escaped_value(param, c),
            None => param.to_string(),
        };
        match self.wildcards() {
            (true, true) => format!("'%' + {value} + '%'"),
            (true, false) => format!("'%' + {value}"),
            (false, true) => format!("{value} + '%'"),
            (false, false) => value,
        }
    }
}

/// Template expression escaping LIKE metacharacters in `param`.
pub fn escaped_value(param: &str, escape: char) -> String {
    format!(
        "{param}.replace({}, {}).replace('%', {}).replace('_', {})",
        string_literal(&escape.to_string()),
        string_literal(&format!("{escape}{escape}")),
        string_literal(&format!("{escape}%")),
        string_literal(&format!("{escape}_")),
    )
}

/// Single-quoted expression string literal with `\` escapes.
pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// How a placeholder's value is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Plain,
    Like(LikeKind),
    /// Collection expanded into an IN list.
    In,
}

/// Name or 1-based position of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingKey {
    Named(String),
    Position(usize),
}

/// One placeholder occurrence in a declared query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub key: BindingKey,
    /// Deferred expression for `?#{...}` / `:#{...}` placeholders.
    pub expression: Option<String>,
    pub kind: BindingKind,
}

impl ParameterBinding {
    pub fn name(&self) -> Option<&str> {
        match &self.key {
            BindingKey::Named(name) => Some(name),
            BindingKey::Position(_) => None,
        }
    }

    pub fn position(&self) -> Option<usize> {
        match self.key {
            BindingKey::Position(position) => Some(position),
            BindingKey::Named(_) => None,
        }
    }

    /// Name the value is bound under in the compiled statement (`name` or `pN`).
    pub fn parameter(&self) -> String {
        match &self.key {
            BindingKey::Named(name) => name.clone(),
            BindingKey::Position(position) => format!("p{position}"),
        }
    }

    /// Marker as it appears in the cleaned query (`:name` or `?N`).
    pub fn marker(&self) -> String {
        match &self.key {
            BindingKey::Named(name) => format!(":{name}"),
            BindingKey::Position(position) => format!("?{position}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Text(String),
    Binding(usize),
}

/// Result of [`parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Query text with LIKE wildcards and IN parentheses stripped and expressions replaced.
    pub query: String,
    /// Placeholder occurrences in query order.
    pub bindings: Vec<ParameterBinding>,
    pieces: Vec<Piece>,
}

impl ParsedQuery {
    pub(crate) fn new(bindings: Vec<ParameterBinding>, pieces: Vec<Piece>) -> Self {
        let mut query = String::new();
        for piece in &pieces {
            match piece {
                Piece::Text(text) => query.push_str(text),
                Piece::Binding(i) => query.push_str(&bindings[*i].marker()),
            }
        }
        Self {
            query,
            bindings,
            pieces,
        }
    }

    /// Whether the query has no placeholders.
    pub fn is_static(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Expression bindings in query order.
    pub fn expressions(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.bindings.iter().filter(|b| b.expression.is_some())
    }

    /// Build the fragment tree for the cleaned query.
    ///
    /// Plain bindings become placeholders, LIKE bindings a `<bind>` carrying the wildcards
    /// followed by a placeholder, IN bindings an [`in_list`]. Text that already carries mapper
    /// markup is kept verbatim so compiling an already compiled query is a no-op.
    pub fn into_fragment(&self) -> CompileResult<Fragment> {
        let mut body = Vec::with_capacity(self.pieces.len());
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if parser::contains_markup(text) {
                        body.push(Fragment::markup(parser::escape_stray_lt(text)));
                    } else {
                        body.push(Fragment::literal(xml::unescape(text)));
                    }
                }
                Piece::Binding(i) => {
                    let binding = &self.bindings[*i];
                    let param = binding.parameter();
                    match binding.kind {
                        BindingKind::Plain | BindingKind::Like(LikeKind::Plain) => {
                            body.push(Fragment::placeholder(param)?);
                        }
                        BindingKind::Like(kind) => {
                            let bound = format!("__{param}_like");
                            body.push(Fragment::bind(bound.as_str(), kind.pattern(&param, None))?);
                            body.push(Fragment::placeholder(bound)?);
                        }
                        BindingKind::In => body.push(in_list(&param)?),
                    }
                }
            }
        }
        Ok(Fragment::group(body))
    }

    /// Evaluate every expression binding once and merge the results into `params` under the
    /// binding's synthetic name.
    pub fn evaluate_expressions(
        &self,
        evaluator: &dyn ExpressionEvaluator,
        params: &Map<String, Value>,
    ) -> CompileResult<Map<String, Value>> {
        let scope = Value::Object(params.clone());
        let mut merged = params.clone();
        for binding in self.expressions() {
            if let Some(expr) = &binding.expression {
                let value = evaluator.evaluate(expr, &scope)?;
                merged.insert(binding.parameter(), value);
            }
        }
        Ok(merged)
    }
}
