//! Pagination idioms.
//!
//! Every handler keeps the select's own pieces in their original order and only adds SQL
//! around them or right after the leading `SELECT`, so the unpaged statement can always be
//! recovered from the paged one.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CompileError, CompileResult};
use crate::fragment::Fragment;

/// Bind name used when a handler needs `offset + limit` and the request does not carry it.
pub const OFFSET_END_BIND: &str = "__offset_end";

/// Order that makes a window function or OFFSET deterministic enough for SQL Server when
/// the select has none.
pub const NEUTRAL_ORDER: &str = "ORDER BY (SELECT NULL)";

/// Offset or limit value: a bound parameter or a compile-time constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageExpr {
    /// Bound parameter path, rendered as `#{name}`.
    Param(String),
    /// Constant, rendered as an integer literal.
    Fixed(u64),
}

impl PageExpr {
    pub fn param(name: impl Into<String>) -> Self {
        PageExpr::Param(name.into())
    }

    pub fn to_fragment(&self) -> CompileResult<Fragment> {
        match self {
            PageExpr::Param(name) => Fragment::placeholder(name.as_str()),
            PageExpr::Fixed(value) => Ok(Fragment::literal(value.to_string())),
        }
    }

    /// The value as a template expression (`page.offset`, `10`).
    pub fn expression(&self) -> String {
        match self {
            PageExpr::Param(name) => name.clone(),
            PageExpr::Fixed(value) => value.to_string(),
        }
    }

    pub fn is_fixed(&self, value: u64) -> bool {
        matches!(self, PageExpr::Fixed(v) if *v == value)
    }
}

/// Offset/limit window applied to a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingRequest {
    pub offset: PageExpr,
    pub limit: PageExpr,
    /// Exclusive end row (`offset + limit`); computed when absent.
    pub offset_end: Option<PageExpr>,
}

impl PagingRequest {
    pub fn new(offset: PageExpr, limit: PageExpr) -> Self {
        Self {
            offset,
            limit,
            offset_end: None,
        }
    }

    /// Both values known at compile time.
    pub fn fixed(offset: u64, limit: u64) -> Self {
        Self::new(PageExpr::Fixed(offset), PageExpr::Fixed(limit))
    }

    /// Both values bound from parameters.
    pub fn params(offset: impl Into<String>, limit: impl Into<String>) -> Self {
        Self::new(PageExpr::param(offset), PageExpr::param(limit))
    }

    pub fn with_offset_end(mut self, end: PageExpr) -> Self {
        self.offset_end = Some(end);
        self
    }

    /// The end row expression plus the `<bind>` needed to compute it, if any.
    pub fn end(&self) -> CompileResult<(Option<Fragment>, PageExpr)> {
        if let Some(end) = &self.offset_end {
            return Ok((None, end.clone()));
        }
        match (&self.offset, &self.limit) {
            (PageExpr::Fixed(o), PageExpr::Fixed(l)) => Ok((None, PageExpr::Fixed(o.saturating_add(*l)))),
            (offset, limit) => {
                let bind = Fragment::bind(
                    OFFSET_END_BIND,
                    format!("{} + {}", offset.expression(), limit.expression()),
                )?;
                Ok((Some(bind), PageExpr::param(OFFSET_END_BIND)))
            }
        }
    }
}

/// A select handed to a pagination idiom, with its ORDER BY clause kept apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedSelect {
    /// The select without its ORDER BY, unless `inline_order` is set.
    pub query: Fragment,
    /// `ORDER BY ...`, or a dynamic tag producing it.
    pub order: Option<Fragment>,
    /// `query` ends with an ORDER BY of its own that cannot be separated (a declared query).
    pub inline_order: bool,
}

impl PagedSelect {
    pub fn new(query: Fragment) -> Self {
        Self {
            query,
            order: None,
            inline_order: false,
        }
    }

    pub fn with_order(mut self, order: Option<Fragment>) -> Self {
        self.order = order;
        self
    }

    pub fn with_inline_order(mut self, inline: bool) -> Self {
        self.inline_order = inline;
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.inline_order || self.order.is_some()
    }

    /// The select as written: query then order.
    pub fn into_fragment(self) -> Fragment {
        match self.order {
            Some(order) => Fragment::group(vec![self.query, order]),
            None => self.query,
        }
    }
}

impl From<Fragment> for PagedSelect {
    fn from(query: Fragment) -> Self {
        PagedSelect::new(query)
    }
}

/// Pagination handler of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT l OFFSET o`
    LimitOffset,
    /// `LIMIT o, l`
    MySqlLimit,
    /// `OFFSET o ROWS FETCH NEXT l ROWS ONLY`
    OffsetFetch,
    /// [`Pagination::OffsetFetch`] on SQL Server, which rejects OFFSET without ORDER BY.
    SqlServerOffsetFetch,
    /// `ROW_NUMBER()` numbered inside a `TOP` select, filtered outside.
    RowNumber,
    /// Nested `ROWNUM` filter.
    RowNum,
    /// `SELECT TOP (l)`; only a zero offset.
    Top,
    Unsupported,
}

impl Pagination {
    /// Wrap `select` with the window described by `request`.
    pub fn wrap(self, select: PagedSelect, request: &PagingRequest) -> CompileResult<Fragment> {
        let offset = request.offset.to_fragment()?;
        let limit = request.limit.to_fragment()?;

        let wrapped = match self {
            Pagination::LimitOffset => {
                let mut parts = vec![select.into_fragment(), Fragment::literal("LIMIT"), limit];
                if !request.offset.is_fixed(0) {
                    parts.push(Fragment::literal("OFFSET"));
                    parts.push(offset);
                }
                Fragment::group(parts)
            }
            Pagination::MySqlLimit => {
                if request.offset.is_fixed(0) {
                    Fragment::group(vec![select.into_fragment(), Fragment::literal("LIMIT"), limit])
                } else {
                    Fragment::group(vec![
                        select.into_fragment(),
                        Fragment::literal("LIMIT"),
                        offset,
                        Fragment::literal(","),
                        limit,
                    ])
                }
            }
            Pagination::OffsetFetch | Pagination::SqlServerOffsetFetch => {
                let filler = self == Pagination::SqlServerOffsetFetch && !select.is_ordered();
                let mut parts = vec![select.into_fragment()];
                if filler {
                    parts.push(Fragment::literal(NEUTRAL_ORDER));
                }
                parts.extend([
                    Fragment::literal("OFFSET"),
                    offset,
                    Fragment::literal("ROWS FETCH NEXT"),
                    limit,
                    Fragment::literal("ROWS ONLY"),
                ]);
                Fragment::group(parts)
            }
            Pagination::RowNumber => {
                if select.inline_order {
                    return Err(CompileError::pagination(
                        "row-number",
                        "ROW_NUMBER() paging needs the sort apart from the query text",
                    ));
                }
                let (bind, end) = request.end()?;
                let over = select
                    .order
                    .clone()
                    .unwrap_or_else(|| Fragment::literal(NEUTRAL_ORDER));
                let numbered = after_select(
                    select.query,
                    vec![
                        Fragment::literal("TOP"),
                        Fragment::paren(vec![end.to_fragment()?]),
                        Fragment::literal("ROW_NUMBER() OVER"),
                        Fragment::paren(vec![over]),
                        Fragment::literal("AS row_num,"),
                    ],
                )
                .ok_or_else(|| not_a_select("row-number"))?;
                let mut parts = vec![
                    bind.unwrap_or_else(Fragment::empty),
                    Fragment::literal("SELECT * FROM ("),
                    numbered,
                ];
                parts.extend(select.order);
                parts.extend([
                    Fragment::literal(") row_paged WHERE row_num >"),
                    offset,
                    Fragment::literal("ORDER BY row_num"),
                ]);
                Fragment::group(parts)
            }
            Pagination::RowNum => {
                let (bind, end) = request.end()?;
                Fragment::group(vec![
                    bind.unwrap_or_else(Fragment::empty),
                    Fragment::literal("SELECT * FROM (SELECT row_inner.*, ROWNUM row_num FROM ("),
                    select.into_fragment(),
                    Fragment::literal(") row_inner WHERE ROWNUM <="),
                    end.to_fragment()?,
                    Fragment::literal(") WHERE row_num >"),
                    offset,
                ])
            }
            Pagination::Top => {
                if !request.offset.is_fixed(0) {
                    return Err(CompileError::pagination(
                        "top",
                        "TOP pagination cannot skip rows; the offset must be a constant 0",
                    ));
                }
                let mut parts = vec![
                    after_select(
                        select.query,
                        vec![Fragment::literal("TOP"), Fragment::paren(vec![limit])],
                    )
                    .ok_or_else(|| not_a_select("top"))?,
                ];
                parts.extend(select.order);
                Fragment::group(parts)
            }
            Pagination::Unsupported => {
                return Err(CompileError::pagination(
                    "unknown",
                    "no pagination idiom is known for this database",
                ));
            }
        };
        Ok(wrapped)
    }

    /// Whether the offset is bound before the window size in the rendered SQL.
    pub fn reverses_binding_order(self) -> bool {
        matches!(
            self,
            Pagination::MySqlLimit | Pagination::OffsetFetch | Pagination::SqlServerOffsetFetch
        )
    }

    /// Whether the idiom needs an ORDER BY that is present on every execution.
    pub fn requires_order_by(self) -> bool {
        matches!(
            self,
            Pagination::SqlServerOffsetFetch | Pagination::RowNumber
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Pagination::LimitOffset => "limit-offset",
            Pagination::MySqlLimit => "mysql-limit",
            Pagination::OffsetFetch => "offset-fetch",
            Pagination::SqlServerOffsetFetch => "sqlserver-offset-fetch",
            Pagination::RowNumber => "row-number",
            Pagination::RowNum => "rownum",
            Pagination::Top => "top",
            Pagination::Unsupported => "unsupported",
        }
    }
}

fn not_a_select(idiom: &str) -> CompileError {
    CompileError::pagination(idiom, "the paged query must start with SELECT")
}

fn select_head() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*SELECT(?:\s+DISTINCT)?\b").expect("invalid built-in SELECT regex")
    })
}

/// Insert `inject` right after the leading `SELECT` (or `SELECT DISTINCT`) of `query`.
///
/// Only the first non-empty leaf is inspected; `None` when it does not open a select.
fn after_select(query: Fragment, inject: Vec<Fragment>) -> Option<Fragment> {
    match query {
        Fragment::Group(mut body) => {
            let first = body.iter().position(|f| !f.is_empty())?;
            let head = after_select(body.remove(first), inject)?;
            body.insert(first, head);
            Some(Fragment::Group(body))
        }
        Fragment::Literal(text) => {
            let (head, rest) = split_select(&text)?;
            Some(spliced(head, inject, (!rest.is_empty()).then(|| Fragment::literal(rest))))
        }
        Fragment::Markup(text) => {
            let (head, rest) = split_select(&text)?;
            Some(spliced(head, inject, (!rest.is_empty()).then(|| Fragment::markup(rest))))
        }
        _ => None,
    }
}

fn split_select(text: &str) -> Option<(&str, &str)> {
    let head = select_head().find(text)?;
    Some((text[..head.end()].trim(), text[head.end()..].trim()))
}

fn spliced(head: &str, inject: Vec<Fragment>, rest: Option<Fragment>) -> Fragment {
    let mut body = vec![Fragment::literal(head)];
    body.extend(inject);
    body.extend(rest);
    Fragment::group(body)
}
