//! Template preview: resolve a fragment tree against parameter values.
//!
//! The result is the SQL the execution engine would send, with `?` markers, plus the bound
//! values in marker order. Dynamic tags are evaluated the way the engine evaluates them:
//! `<if>`/`<choose>` through the [`ExpressionEvaluator`], `<foreach>` over arrays and
//! objects, `<bind>` into the scope, `<where>`/`<set>`/`<trim>` with their prefix and
//! suffix overrides.
//!
//! ```
//! use mapperc::fragment::Fragment;
//! use mapperc::preview::Previewer;
//! use serde_json::json;
//!
//! let template = Fragment::group(vec![
//!     Fragment::literal("SELECT * FROM t_user"),
//!     Fragment::where_(vec![Fragment::if_(
//!         "name != null",
//!         vec![Fragment::literal("AND name ="), Fragment::placeholder("name")?],
//!     )?]),
//! ]);
//! let preview = Previewer::new().preview(&template, &json!({"name": "jo"}))?;
//! assert_eq!(preview.sql, "SELECT * FROM t_user WHERE name = ?");
//! assert_eq!(preview.parameters, vec![json!("jo")]);
//! # Ok::<(), mapperc::CompileError>(())
//! ```

mod expr;
mod markup;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

pub use expr::{SimpleEvaluator, display, truthy};
pub use markup::parse_markup;

use crate::error::{CompileError, CompileResult};
use crate::fragment::{Fragment, Repeat, Trim};

/// Evaluates template expressions (`test` attributes, `<bind>` values, `?#{...}` bodies).
pub trait ExpressionEvaluator {
    fn evaluate(&self, expr: &str, scope: &Value) -> CompileResult<Value>;
}

/// Resolved statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub sql: String,
    pub parameters: Vec<Value>,
}

/// Resolves fragments against parameter values.
pub struct Previewer<'e> {
    evaluator: &'e dyn ExpressionEvaluator,
    includes: HashMap<String, Fragment>,
}

impl Default for Previewer<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Previewer<'static> {
    pub fn new() -> Self {
        Self {
            evaluator: &SimpleEvaluator,
            includes: HashMap::new(),
        }
    }
}

impl<'e> Previewer<'e> {
    pub fn with_evaluator(evaluator: &'e dyn ExpressionEvaluator) -> Self {
        Self {
            evaluator,
            includes: HashMap::new(),
        }
    }

    /// Register the target of `<include refid="...">`.
    pub fn with_include(mut self, id: impl Into<String>, fragment: Fragment) -> Self {
        self.includes.insert(id.into(), fragment);
        self
    }

    /// Resolve `fragment` with `params` as the root scope. Non-object params are exposed as
    /// `_parameter`.
    ///
    /// A tree holding verbatim markup is rendered and read back as a whole first, since a
    /// declared query may open a tag in one markup piece and close it in another.
    pub fn preview(&self, fragment: &Fragment, params: &Value) -> CompileResult<Preview> {
        let reparsed;
        let fragment = if has_markup(fragment) {
            reparsed = Fragment::group(parse_markup(&fragment.render())?);
            &reparsed
        } else {
            fragment
        };
        let mut scope = match params {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("_parameter".to_string(), other.clone());
                map
            }
        };
        let mut parameters = Vec::new();
        let mut out = String::new();
        self.resolve(fragment, &mut scope, &mut parameters, &mut out, 0)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "mapperc.preview", parameters = parameters.len(), "resolved template");

        Ok(Preview {
            sql: out.split_whitespace().collect::<Vec<_>>().join(" "),
            parameters,
        })
    }

    fn eval(&self, expr: &str, scope: &Map<String, Value>) -> CompileResult<Value> {
        self.evaluator.evaluate(expr, &Value::Object(scope.clone()))
    }

    fn resolve(
        &self,
        fragment: &Fragment,
        scope: &mut Map<String, Value>,
        parameters: &mut Vec<Value>,
        out: &mut String,
        depth: usize,
    ) -> CompileResult<()> {
        if depth > 64 {
            return Err(CompileError::fragment("include nesting too deep"));
        }
        match fragment {
            Fragment::Literal(text) => push(out, text),
            Fragment::Column(_) | Fragment::Table(_) => push(out, &fragment.render()),
            Fragment::Function(f) => {
                let mut args = Vec::with_capacity(f.args.len());
                for arg in &f.args {
                    let rendered = self.capture(std::slice::from_ref(arg), scope, parameters, depth)?;
                    if !rendered.trim().is_empty() {
                        args.push(rendered.trim().to_string());
                    }
                }
                push(out, &format!("{}({})", f.name, args.join(", ")));
            }
            Fragment::Placeholder(p) => {
                parameters.push(self.eval(&p.property, scope)?);
                push(out, "?");
            }
            Fragment::Raw(expr) => push(out, &display(&self.eval(expr, scope)?)),
            Fragment::If(c) => {
                if truthy(&self.eval(&c.test, scope)?) {
                    self.body(&c.body, scope, parameters, out, depth)?;
                }
            }
            Fragment::Choose(c) => {
                let branch = if truthy(&self.eval(&c.test, scope)?) {
                    &c.when
                } else {
                    &c.otherwise
                };
                self.resolve(branch, scope, parameters, out, depth)?;
            }
            Fragment::Foreach(r) => self.foreach(r, scope, parameters, out, depth)?,
            Fragment::Trim(t) => {
                let inner = self.capture(&t.body, scope, parameters, depth)?;
                push(out, &apply_trim(t, &inner));
            }
            Fragment::Where(body) => {
                let trim = Trim::new(Vec::new())
                    .prefix("WHERE")
                    .prefix_overrides("AND |OR |AND\n|OR\n|AND\t|OR\t");
                let inner = self.capture(body, scope, parameters, depth)?;
                push(out, &apply_trim(&trim, &inner));
            }
            Fragment::Set(body) => {
                let trim = Trim::new(Vec::new()).prefix("SET").suffix_overrides(",");
                let inner = self.capture(body, scope, parameters, depth)?;
                push(out, &apply_trim(&trim, &inner));
            }
            Fragment::Bind(b) => {
                let value = self.eval(&b.value, scope)?;
                scope.insert(b.name.clone(), value);
            }
            Fragment::Comment(_) => {}
            Fragment::Group(body) => self.body(body, scope, parameters, out, depth)?,
            Fragment::Paren(body) => {
                let inner = self.capture(body, scope, parameters, depth)?;
                if !inner.trim().is_empty() {
                    push(out, &format!("({})", inner.trim()));
                }
            }
            Fragment::Include(refid) => {
                let target = self
                    .includes
                    .get(refid)
                    .ok_or_else(|| CompileError::fragment(format!("unknown include '{refid}'")))?;
                self.resolve(target, scope, parameters, out, depth + 1)?;
            }
            Fragment::Markup(text) => {
                for node in parse_markup(text)? {
                    self.resolve(&node, scope, parameters, out, depth)?;
                }
            }
        }
        Ok(())
    }

    fn body(
        &self,
        body: &[Fragment],
        scope: &mut Map<String, Value>,
        parameters: &mut Vec<Value>,
        out: &mut String,
        depth: usize,
    ) -> CompileResult<()> {
        for child in body {
            self.resolve(child, scope, parameters, out, depth)?;
        }
        Ok(())
    }

    fn capture(
        &self,
        body: &[Fragment],
        scope: &mut Map<String, Value>,
        parameters: &mut Vec<Value>,
        depth: usize,
    ) -> CompileResult<String> {
        let mut inner = String::new();
        self.body(body, scope, parameters, &mut inner, depth)?;
        Ok(inner)
    }

    fn foreach(
        &self,
        repeat: &Repeat,
        scope: &mut Map<String, Value>,
        parameters: &mut Vec<Value>,
        out: &mut String,
        depth: usize,
    ) -> CompileResult<()> {
        let items: Vec<(Value, Value)> = match self.eval(&repeat.collection, scope)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            other => {
                return Err(CompileError::expression(
                    &repeat.collection,
                    format!("cannot iterate over {other}"),
                ));
            }
        };
        if items.is_empty() {
            return Ok(());
        }

        let saved: Vec<(String, Option<Value>)> = [&repeat.item, &repeat.index]
            .into_iter()
            .flatten()
            .map(|name| (name.clone(), scope.get(name).cloned()))
            .collect();

        let mut inner = String::new();
        if let Some(open) = &repeat.open {
            inner.push_str(open);
        }
        for (i, (key, value)) in items.into_iter().enumerate() {
            if i > 0 {
                if let Some(separator) = &repeat.separator {
                    inner.push_str(separator);
                }
            }
            if let Some(item) = &repeat.item {
                scope.insert(item.clone(), value);
            }
            if let Some(index) = &repeat.index {
                scope.insert(index.clone(), key);
            }
            let body = self.capture(&repeat.body, scope, parameters, depth)?;
            inner.push_str(body.trim());
        }
        if let Some(close) = &repeat.close {
            inner.push_str(close);
        }

        for (name, previous) in saved {
            match previous {
                Some(value) => scope.insert(name, value),
                None => scope.remove(&name),
            };
        }
        push(out, &inner);
        Ok(())
    }
}

fn has_markup(fragment: &Fragment) -> bool {
    match fragment {
        Fragment::Markup(_) => true,
        Fragment::If(c) => c.body.iter().any(has_markup),
        Fragment::Choose(c) => has_markup(&c.when) || has_markup(&c.otherwise),
        Fragment::Foreach(r) => r.body.iter().any(has_markup),
        Fragment::Trim(t) => t.body.iter().any(has_markup),
        Fragment::Function(f) => f.args.iter().any(has_markup),
        Fragment::Where(body)
        | Fragment::Set(body)
        | Fragment::Group(body)
        | Fragment::Paren(body) => body.iter().any(has_markup),
        _ => false,
    }
}

fn push(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(text);
}

/// `<trim>` semantics: drop one matching override (case-insensitive) from each end of the
/// trimmed body, then add the prefix and suffix. An empty body yields nothing.
fn apply_trim(trim: &Trim, body: &str) -> String {
    let mut body = body.trim().to_string();
    if body.is_empty() {
        return body;
    }
    if let Some(overrides) = &trim.prefix_overrides {
        let upper = body.to_uppercase();
        if let Some(found) = overrides
            .split('|')
            .filter(|o| !o.is_empty())
            .find(|o| upper.starts_with(&o.to_uppercase()))
        {
            body = body[found.len()..].trim_start().to_string();
        }
    }
    if let Some(overrides) = &trim.suffix_overrides {
        let upper = body.to_uppercase();
        if let Some(found) = overrides
            .split('|')
            .filter(|o| !o.is_empty())
            .find(|o| upper.ends_with(&o.to_uppercase()))
        {
            body = body[..body.len() - found.len()].trim_end().to_string();
        }
    }
    let mut out = String::new();
    if let Some(prefix) = &trim.prefix {
        out.push_str(prefix);
        out.push(' ');
    }
    out.push_str(&body);
    if let Some(suffix) = &trim.suffix {
        out.push(' ');
        out.push_str(suffix);
    }
    out
}
