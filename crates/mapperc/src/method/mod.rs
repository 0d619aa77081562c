//! Derived queries: method-token streams folded into predicates.
//!
//! A query method is described either by an explicit token list or by its name, parsed with
//! [`PartTree`]. [`build`] validates the argument count, compiles every token through the
//! [`PredicateCompiler`], folds the results into one chain and works out paging.

mod part_tree;


pub use part_tree::{PartTree, resolve_path};

use std::fmt;

use serde::Deserialize;

use crate::dialect::{PageExpr, PagingRequest};
use crate::error::{CompileError, CompileResult};
use crate::fragment::Fragment;
use crate::predicate::{Conjunction, IgnoreCase, Operator, Predicate, PredicateCompiler};

/// Bind holding the shifted offset of a limited, paged query.
pub const LIMIT_OFFSET_BIND: &str = "__limit_offset";

/// One `(property, operator, conjunction)` element of a derived query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub property: String,
    pub operator: Operator,
    /// Link to the previous token; ignored on the first one.
    pub conjunction: Option<Conjunction>,
    pub ignore_case: IgnoreCase,
}

impl Token {
    pub fn new(property: impl Into<String>, operator: Operator) -> Self {
        Self {
            property: property.into(),
            operator,
            conjunction: None,
            ignore_case: IgnoreCase::Never,
        }
    }

    pub fn and(mut self) -> Self {
        self.conjunction = Some(Conjunction::And);
        self
    }

    pub fn or(mut self) -> Self {
        self.conjunction = Some(Conjunction::Or);
        self
    }

    pub fn ignore_case(mut self, policy: IgnoreCase) -> Self {
        self.ignore_case = policy;
        self
    }
}

/// What a derived query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryShape {
    #[default]
    Select,
    Count,
    Exists,
    Delete,
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryShape::Select => "select",
            QueryShape::Count => "count",
            QueryShape::Exists => "exists",
            QueryShape::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Static sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

/// Subject and ordering of a derived query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    pub shape: QueryShape,
    pub distinct: bool,
    /// `First<N>` / `Top<N>` limit.
    pub limit: Option<u64>,
    pub sort: Vec<Order>,
}

/// Role of a method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterRole {
    #[default]
    Value,
    /// Page request exposing `offset`, `pageSize` and `sort`.
    Page,
    /// Dynamic sort.
    Sort,
}

/// One parameter of a repository method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MethodParameter {
    /// Explicit binding name; positional `pN` when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Simple type name, used in statement ids.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub role: ParameterRole,
}

impl MethodParameter {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            name: None,
            type_name: type_name.into(),
            role: ParameterRole::Value,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn page(type_name: impl Into<String>) -> Self {
        Self {
            role: ParameterRole::Page,
            ..Self::new(type_name)
        }
    }

    pub fn sort(type_name: impl Into<String>) -> Self {
        Self {
            role: ParameterRole::Sort,
            ..Self::new(type_name)
        }
    }

    /// Binding name of the parameter at 0-based `index`.
    pub fn binding_name(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("p{}", index + 1))
    }

    pub fn is_bindable(&self) -> bool {
        self.role == ParameterRole::Value
    }
}

/// Result of [`build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodQuery {
    pub predicate: Option<Predicate>,
    pub shape: QueryShape,
    pub sort: Vec<Order>,
    /// Expression of the dynamic sort value, if the method takes one.
    pub dynamic_sort: Option<String>,
    pub limit: Option<u64>,
    pub distinct: bool,
    pub paging: Option<PagingRequest>,
    /// `<bind>` nodes the paging expressions depend on.
    pub binds: Vec<Fragment>,
}

/// Fold `tokens` into a predicate chain and derive paging.
///
/// `AND` links chain into the current conjunction and `OR` starts a new disjunct; rendering
/// relies on SQL precedence (`AND` before `OR`) to keep the disjunction of conjunctions.
pub fn build(
    compiler: &PredicateCompiler<'_>,
    method: &str,
    tokens: &[Token],
    spec: &QuerySpec,
    parameters: &[MethodParameter],
) -> CompileResult<MethodQuery> {
    let bindable: Vec<String> = parameters
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_bindable())
        .map(|(i, p)| p.binding_name(i))
        .collect();
    let expected: usize = tokens.iter().map(|t| t.operator.arity()).sum();
    if expected != bindable.len() {
        return Err(CompileError::ArgumentCountMismatch {
            method: method.to_string(),
            expected,
            actual: bindable.len(),
        });
    }

    let mut slots = bindable.iter();
    let mut predicate: Option<Predicate> = None;
    for token in tokens {
        let values: Vec<String> = slots.by_ref().take(token.operator.arity()).cloned().collect();
        let node = compiler.compile(&token.property, token.operator, token.ignore_case, &values)?;
        predicate = Some(match predicate {
            None => node,
            Some(chain) => chain.chain(token.conjunction.unwrap_or(Conjunction::And), node),
        });
    }

    let page = parameters
        .iter()
        .enumerate()
        .find(|(_, p)| p.role == ParameterRole::Page)
        .map(|(i, p)| p.binding_name(i));
    let sort_param = parameters
        .iter()
        .enumerate()
        .find(|(_, p)| p.role == ParameterRole::Sort)
        .map(|(i, p)| p.binding_name(i));

    let mut binds = Vec::new();
    let paging = match spec.shape {
        QueryShape::Select => paging(page.as_deref(), spec.limit, &mut binds)?,
        _ => None,
    };
    let dynamic_sort = match (spec.shape, sort_param, &page) {
        (QueryShape::Select, Some(sort), _) => Some(sort),
        (QueryShape::Select, None, Some(page)) => Some(format!("{page}.sort")),
        _ => None,
    };

    Ok(MethodQuery {
        predicate,
        shape: spec.shape,
        sort: spec.sort.clone(),
        dynamic_sort,
        limit: spec.limit,
        distinct: spec.distinct,
        paging,
        binds,
    })
}

/// Paging window from an optional page parameter and an optional `First<N>` limit.
///
/// A limit without a page request reads the first `N` rows. With a page request the window
/// size becomes `N`; when the requested size is larger, the offset moves left by the
/// difference (never below 0) so the window still ends where the page would have ended.
fn paging(
    page: Option<&str>,
    limit: Option<u64>,
    binds: &mut Vec<Fragment>,
) -> CompileResult<Option<PagingRequest>> {
    let request = match (page, limit) {
        (None, None) => None,
        (None, Some(n)) => Some(PagingRequest::fixed(0, n)),
        (Some(page), None) => Some(PagingRequest::params(
            format!("{page}.offset"),
            format!("{page}.pageSize"),
        )),
        (Some(page), Some(n)) => {
            let shifted = format!("{page}.offset - ({page}.pageSize - {n})");
            binds.push(Fragment::bind(
                LIMIT_OFFSET_BIND,
                format!(
                    "{page}.pageSize > {n} ? ({shifted} > 0 ? {shifted} : 0) : {page}.offset"
                ),
            )?);
            Some(PagingRequest::new(
                PageExpr::param(LIMIT_OFFSET_BIND),
                PageExpr::Fixed(n),
            ))
        }
    };
    Ok(request)
}
