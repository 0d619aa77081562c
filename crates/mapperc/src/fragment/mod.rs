//! SQL fragment AST.
//!
//! A [`Fragment`] is one renderable node of a compiled statement. Leaves carry SQL text,
//! column/table references, function calls and bound parameter markers; composites carry
//! the dynamic tags of the mapper templating language (`<if>`, `<choose>`, `<foreach>`,
//! `<trim>`, `<where>`, `<set>`).
//!
//! Rendering is pure: the same tree always renders to the same text, and values only ever
//! enter SQL through [`Placeholder`] markers (`#{name}`), which the execution engine binds
//! as statement parameters.
//!
//! # Example
//!
//! ```
//! use mapperc::fragment::{Fragment, Placeholder};
//!
//! let cond = Fragment::group(vec![
//!     Fragment::column(Some("u"), "age")?,
//!     Fragment::literal(">"),
//!     Placeholder::new("p1")?.into(),
//! ]);
//! assert_eq!(cond.render(), "u.age > #{p1}");
//! # Ok::<(), mapperc::CompileError>(())
//! ```

pub mod xml;

#[cfg(test)]
mod tests;

use crate::error::{CompileError, CompileResult};
use xml::{attr, comment_text, escape_attr, escape_text};

/// One node of the SQL rendering tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Plain SQL text.
    Literal(String),
    /// `alias.column`
    Column(ColumnRef),
    /// `qualifier.table alias`
    Table(TableRef),
    /// `NAME(arg, ...)`
    Function(FunctionCall),
    /// Bound parameter marker `#{...}`.
    Placeholder(Placeholder),
    /// Raw interpolation `${expr}`; identifiers only.
    Raw(String),
    /// `<if test="...">`
    If(Conditional),
    /// `<choose><when>...<otherwise>...`
    Choose(Choice),
    /// `<foreach>`
    Foreach(Repeat),
    /// `<trim>`
    Trim(Trim),
    /// `<where>`
    Where(Vec<Fragment>),
    /// `<set>`
    Set(Vec<Fragment>),
    /// `<bind name="..." value="..."/>`
    Bind(Bind),
    /// `<!-- ... -->`
    Comment(String),
    /// Anonymous sequence of fragments.
    Group(Vec<Fragment>),
    /// Sequence wrapped in parentheses.
    Paren(Vec<Fragment>),
    /// `<include refid="..."/>`
    Include(String),
    /// Template text that already contains mapper markup; emitted verbatim.
    Markup(String),
}

/// Column reference, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(alias: Option<&str>, name: impl Into<String>) -> CompileResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CompileError::fragment("column name cannot be empty"));
        }
        Ok(Self {
            alias: non_empty(alias),
            name,
        })
    }

    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{alias}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Table reference: optional qualifier (schema), name, optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub qualifier: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(qualifier: Option<&str>, name: impl Into<String>) -> CompileResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CompileError::fragment("table name cannot be empty"));
        }
        Ok(Self {
            qualifier: non_empty(qualifier),
            name,
            alias: None,
        })
    }

    /// Attach a correlation alias (`FROM t_user u`).
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.alias = (!alias.is_empty()).then_some(alias);
        self
    }

    fn render(&self) -> String {
        let mut out = match &self.qualifier {
            Some(q) => format!("{q}.{}", self.name),
            None => self.name.clone(),
        };
        if let Some(alias) = &self.alias {
            out.push(' ');
            out.push_str(alias);
        }
        out
    }
}

/// SQL function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Fragment>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<Fragment>) -> CompileResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CompileError::fragment("function name cannot be empty"));
        }
        Ok(Self { name, args })
    }
}

/// Bound parameter marker with optional type metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub property: String,
    pub java_type: Option<String>,
    pub jdbc_type: Option<String>,
    pub type_handler: Option<String>,
}

impl Placeholder {
    pub fn new(property: impl Into<String>) -> CompileResult<Self> {
        let property = property.into();
        if property.trim().is_empty() {
            return Err(CompileError::fragment("placeholder property cannot be empty"));
        }
        if property.contains(['{', '}', ',']) {
            return Err(CompileError::fragment(format!(
                "placeholder property '{property}' contains reserved characters"
            )));
        }
        Ok(Self {
            property,
            java_type: None,
            jdbc_type: None,
            type_handler: None,
        })
    }

    pub fn with_java_type(mut self, ty: Option<&str>) -> Self {
        self.java_type = non_empty(ty);
        self
    }

    pub fn with_jdbc_type(mut self, ty: Option<&str>) -> Self {
        self.jdbc_type = non_empty(ty);
        self
    }

    pub fn with_type_handler(mut self, handler: Option<&str>) -> Self {
        self.type_handler = non_empty(handler);
        self
    }

    fn render(&self) -> String {
        let mut out = String::from("#{");
        out.push_str(&self.property);
        for (key, value) in [
            ("javaType", &self.java_type),
            ("jdbcType", &self.jdbc_type),
            ("typeHandler", &self.type_handler),
        ] {
            if let Some(value) = value {
                out.push(',');
                out.push_str(key);
                out.push('=');
                out.push_str(value);
            }
        }
        out.push('}');
        out
    }
}

impl From<Placeholder> for Fragment {
    fn from(p: Placeholder) -> Self {
        Fragment::Placeholder(p)
    }
}

/// `<if test="...">body</if>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    pub test: String,
    pub body: Vec<Fragment>,
}

/// `<choose>` with a single `<when>` branch and an `<otherwise>` branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub test: String,
    pub when: Box<Fragment>,
    pub otherwise: Box<Fragment>,
}

/// `<foreach>` over a collection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repeat {
    pub collection: String,
    pub item: Option<String>,
    pub index: Option<String>,
    pub open: Option<String>,
    pub close: Option<String>,
    pub separator: Option<String>,
    pub body: Vec<Fragment>,
}

impl Repeat {
    pub fn new(
        collection: impl Into<String>,
        item: impl Into<String>,
        body: Vec<Fragment>,
    ) -> CompileResult<Self> {
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(CompileError::fragment("foreach collection cannot be empty"));
        }
        let item = item.into();
        Ok(Self {
            collection,
            item: (!item.is_empty()).then_some(item),
            index: None,
            open: None,
            close: None,
            separator: None,
            body,
        })
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = Some(open.into());
        self
    }

    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = Some(close.into());
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }
}

/// `<trim>` with prefix/suffix handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trim {
    pub prefix: Option<String>,
    pub prefix_overrides: Option<String>,
    pub suffix: Option<String>,
    pub suffix_overrides: Option<String>,
    pub body: Vec<Fragment>,
}

impl Trim {
    pub fn new(body: Vec<Fragment>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn prefix_overrides(mut self, overrides: impl Into<String>) -> Self {
        self.prefix_overrides = Some(overrides.into());
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn suffix_overrides(mut self, overrides: impl Into<String>) -> Self {
        self.suffix_overrides = Some(overrides.into());
        self
    }
}

/// `<bind name="..." value="..."/>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub name: String,
    pub value: String,
}

impl Fragment {
    /// Plain SQL text.
    pub fn literal(text: impl Into<String>) -> Self {
        Fragment::Literal(text.into())
    }

    pub fn column(alias: Option<&str>, name: impl Into<String>) -> CompileResult<Self> {
        Ok(Fragment::Column(ColumnRef::new(alias, name)?))
    }

    pub fn table(qualifier: Option<&str>, name: impl Into<String>) -> CompileResult<Self> {
        Ok(Fragment::Table(TableRef::new(qualifier, name)?))
    }

    pub fn function(name: impl Into<String>, args: Vec<Fragment>) -> CompileResult<Self> {
        Ok(Fragment::Function(FunctionCall::new(name, args)?))
    }

    pub fn placeholder(property: impl Into<String>) -> CompileResult<Self> {
        Ok(Fragment::Placeholder(Placeholder::new(property)?))
    }

    /// Raw `${expr}` interpolation. Only dotted identifier paths are accepted.
    pub fn raw(expr: impl Into<String>) -> CompileResult<Self> {
        let expr = expr.into();
        if !is_identifier_path(&expr) {
            return Err(CompileError::fragment(format!(
                "raw interpolation '{expr}' is not an identifier path"
            )));
        }
        Ok(Fragment::Raw(expr))
    }

    pub fn if_(test: impl Into<String>, body: Vec<Fragment>) -> CompileResult<Self> {
        let test = non_blank(test.into(), "if test")?;
        Ok(Fragment::If(Conditional { test, body }))
    }

    pub fn choose(
        test: impl Into<String>,
        when: Fragment,
        otherwise: Fragment,
    ) -> CompileResult<Self> {
        let test = non_blank(test.into(), "when test")?;
        Ok(Fragment::Choose(Choice {
            test,
            when: Box::new(when),
            otherwise: Box::new(otherwise),
        }))
    }

    pub fn foreach(repeat: Repeat) -> Self {
        Fragment::Foreach(repeat)
    }

    pub fn trim(trim: Trim) -> Self {
        Fragment::Trim(trim)
    }

    pub fn where_(body: Vec<Fragment>) -> Self {
        Fragment::Where(body)
    }

    pub fn set(body: Vec<Fragment>) -> Self {
        Fragment::Set(body)
    }

    pub fn bind(name: impl Into<String>, value: impl Into<String>) -> CompileResult<Self> {
        let name = name.into();
        if !is_identifier_path(&name) || name.contains('.') {
            return Err(CompileError::fragment(format!(
                "bind name '{name}' is not a plain identifier"
            )));
        }
        let value = non_blank(value.into(), "bind value")?;
        Ok(Fragment::Bind(Bind { name, value }))
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Fragment::Comment(text.into())
    }

    pub fn group(body: Vec<Fragment>) -> Self {
        Fragment::Group(body)
    }

    pub fn paren(body: Vec<Fragment>) -> Self {
        Fragment::Paren(body)
    }

    pub fn include(refid: impl Into<String>) -> CompileResult<Self> {
        let refid = non_blank(refid.into(), "include refid")?;
        Ok(Fragment::Include(refid))
    }

    /// Pre-rendered template text (hand-written `<if>` tags in a declared query, or the
    /// output of an earlier compile). Emitted as is.
    pub fn markup(text: impl Into<String>) -> Self {
        Fragment::Markup(text.into())
    }

    /// An empty sequence; renders to the empty string.
    pub fn empty() -> Self {
        Fragment::Group(Vec::new())
    }

    /// Render this node into the mapper templating language.
    pub fn render(&self) -> String {
        match self {
            Fragment::Literal(text) => escape_text(text),
            Fragment::Column(c) => c.render(),
            Fragment::Table(t) => t.render(),
            Fragment::Function(f) => {
                let args: Vec<String> = f
                    .args
                    .iter()
                    .map(Fragment::render)
                    .filter(|s| !s.is_empty())
                    .collect();
                format!("{}({})", f.name, args.join(", "))
            }
            Fragment::Placeholder(p) => p.render(),
            Fragment::Raw(expr) => format!("${{{expr}}}"),
            Fragment::If(c) => {
                let body = join(&c.body);
                if body.is_empty() {
                    return body;
                }
                let mut out = String::from("<if");
                attr(&mut out, "test", Some(&c.test));
                out.push('>');
                out.push_str(&body);
                out.push_str("</if>");
                out
            }
            Fragment::Choose(c) => {
                let when = c.when.render();
                let otherwise = c.otherwise.render();
                if when.is_empty() && otherwise.is_empty() {
                    return String::new();
                }
                let mut out = String::from("<choose><when");
                attr(&mut out, "test", Some(&c.test));
                out.push('>');
                out.push_str(&when);
                out.push_str("</when>");
                if !otherwise.is_empty() {
                    out.push_str("<otherwise>");
                    out.push_str(&otherwise);
                    out.push_str("</otherwise>");
                }
                out.push_str("</choose>");
                out
            }
            Fragment::Foreach(r) => {
                let body = join(&r.body);
                if body.is_empty() {
                    return body;
                }
                let mut out = String::from("<foreach");
                attr(&mut out, "collection", Some(&r.collection));
                attr(&mut out, "item", r.item.as_deref());
                attr(&mut out, "index", r.index.as_deref());
                attr(&mut out, "open", r.open.as_deref());
                attr(&mut out, "close", r.close.as_deref());
                attr(&mut out, "separator", r.separator.as_deref());
                out.push('>');
                out.push_str(&body);
                out.push_str("</foreach>");
                out
            }
            Fragment::Trim(t) => {
                let body = join(&t.body);
                if body.is_empty() {
                    return body;
                }
                let mut out = String::from("<trim");
                attr(&mut out, "prefix", t.prefix.as_deref());
                attr(&mut out, "prefixOverrides", t.prefix_overrides.as_deref());
                attr(&mut out, "suffix", t.suffix.as_deref());
                attr(&mut out, "suffixOverrides", t.suffix_overrides.as_deref());
                out.push('>');
                out.push_str(&body);
                out.push_str("</trim>");
                out
            }
            Fragment::Where(body) => wrap_tag("where", body),
            Fragment::Set(body) => wrap_tag("set", body),
            Fragment::Bind(b) => format!(
                "<bind name=\"{}\" value=\"{}\"/>",
                escape_attr(&b.name),
                escape_attr(&b.value)
            ),
            Fragment::Comment(text) => format!("<!-- {} -->", comment_text(text)),
            Fragment::Group(body) => join(body),
            Fragment::Paren(body) => {
                let inner = join(body);
                if inner.is_empty() {
                    inner
                } else {
                    format!("({inner})")
                }
            }
            Fragment::Include(refid) => format!("<include refid=\"{}\"/>", escape_attr(refid)),
            Fragment::Markup(text) => text.trim().to_string(),
        }
    }

    /// Whether this node renders to the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Fragment::Literal(text) => text.is_empty(),
            Fragment::Markup(text) => text.trim().is_empty(),
            Fragment::Group(body) | Fragment::Paren(body) | Fragment::Where(body)
            | Fragment::Set(body) => body.iter().all(Fragment::is_empty),
            Fragment::If(c) => c.body.iter().all(Fragment::is_empty),
            Fragment::Foreach(r) => r.body.iter().all(Fragment::is_empty),
            Fragment::Trim(t) => t.body.iter().all(Fragment::is_empty),
            Fragment::Choose(c) => c.when.is_empty() && c.otherwise.is_empty(),
            _ => false,
        }
    }

    /// Direct children of a composite node, in render order.
    pub fn children(&self) -> Vec<&Fragment> {
        match self {
            Fragment::Function(f) => f.args.iter().collect(),
            Fragment::If(c) => c.body.iter().collect(),
            Fragment::Choose(c) => vec![&*c.when, &*c.otherwise],
            Fragment::Foreach(r) => r.body.iter().collect(),
            Fragment::Trim(t) => t.body.iter().collect(),
            Fragment::Where(body)
            | Fragment::Set(body)
            | Fragment::Group(body)
            | Fragment::Paren(body) => body.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Names of all bound parameters referenced by placeholders, depth-first.
    pub fn placeholder_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_placeholders(&mut names);
        names
    }

    fn collect_placeholders(&self, out: &mut Vec<String>) {
        if let Fragment::Placeholder(p) = self {
            out.push(p.property.clone());
        }
        for child in self.children() {
            child.collect_placeholders(out);
        }
    }
}

/// `IN` operand over a collection parameter.
///
/// Renders `(NULL)` when the collection is null or empty so the predicate stays valid SQL and
/// matches nothing; otherwise one placeholder per element.
pub fn in_list(collection: &str) -> CompileResult<Fragment> {
    let each = Repeat::new(collection, "__item", vec![Fragment::placeholder("__item")?])?
        .open("(")
        .separator(",")
        .close(")");
    Fragment::choose(
        format!("{collection} == null or {collection}.isEmpty()"),
        Fragment::literal("(NULL)"),
        Fragment::foreach(each),
    )
}

/// Render a body: children space-joined, empty renders skipped.
pub fn join(body: &[Fragment]) -> String {
    let mut out = String::new();
    for child in body {
        let rendered = child.render();
        if rendered.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&rendered);
    }
    out
}

fn wrap_tag(tag: &str, body: &[Fragment]) -> String {
    let inner = join(body);
    if inner.is_empty() {
        return inner;
    }
    format!("<{tag}>{inner}</{tag}>")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn non_blank(value: String, what: &str) -> CompileResult<String> {
    if value.trim().is_empty() {
        return Err(CompileError::fragment(format!("{what} cannot be empty")));
    }
    Ok(value)
}

/// `[A-Za-z_][A-Za-z0-9_$]*` segments joined by `.`.
pub fn is_identifier_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(c) if c == '_' || c.is_ascii_alphabetic() => {
                    chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
                }
                _ => false,
            }
        })
}
