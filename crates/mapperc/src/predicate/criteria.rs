use crate::error::CompileResult;
use crate::fragment::{Fragment, Trim};

use super::{Conjunction, IgnoreCase, Operator, Predicate, PredicateCompiler};

#[derive(Debug, Clone)]
enum Criterion {
    Part {
        conjunction: Conjunction,
        path: String,
        operator: Operator,
        ignore_case: IgnoreCase,
        values: Vec<String>,
        optional: bool,
    },
    Group {
        conjunction: Conjunction,
        criteria: Criteria,
    },
}

/// Programmatic predicate builder.
///
/// Conditions are compiled through the same [`PredicateCompiler`] as derived queries.
/// Optional conditions (`and_if_present`) are only included when their parameter is not
/// null at execution time.
///
/// # Example
///
/// ```ignore
/// let criteria = Criteria::new()
///     .and("status", Operator::SimpleProperty, ["status"])
///     .and_if_present("name", Operator::Containing, "name")
///     .or_group(Criteria::new().and("age", Operator::GreaterThan, ["minAge"]));
/// let predicate = criteria.compile(&compiler)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    items: Vec<Criterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn part<I, S>(
        mut self,
        conjunction: Conjunction,
        path: &str,
        operator: Operator,
        ignore_case: IgnoreCase,
        values: I,
        optional: bool,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items.push(Criterion::Part {
            conjunction,
            path: path.to_string(),
            operator,
            ignore_case,
            values: values.into_iter().map(Into::into).collect(),
            optional,
        });
        self
    }

    pub fn and<I, S>(self, path: &str, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.part(Conjunction::And, path, operator, IgnoreCase::Never, values, false)
    }

    pub fn or<I, S>(self, path: &str, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.part(Conjunction::Or, path, operator, IgnoreCase::Never, values, false)
    }

    /// AND condition comparing case-insensitively where the property allows it.
    pub fn and_ignoring_case<I, S>(self, path: &str, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.part(Conjunction::And, path, operator, IgnoreCase::WhenPossible, values, false)
    }

    /// AND condition included only when `param` is not null.
    pub fn and_if_present(self, path: &str, operator: Operator, param: &str) -> Self {
        self.part(Conjunction::And, path, operator, IgnoreCase::Never, [param], true)
    }

    pub fn and_group(mut self, criteria: Criteria) -> Self {
        self.items.push(Criterion::Group {
            conjunction: Conjunction::And,
            criteria,
        });
        self
    }

    pub fn or_group(mut self, criteria: Criteria) -> Self {
        self.items.push(Criterion::Group {
            conjunction: Conjunction::Or,
            criteria,
        });
        self
    }

    /// Compile into a predicate chain; `None` when there are no conditions.
    pub fn compile(&self, compiler: &PredicateCompiler<'_>) -> CompileResult<Option<Predicate>> {
        let mut chain: Option<Predicate> = None;
        for item in &self.items {
            let (conjunction, node) = match item {
                Criterion::Part {
                    conjunction,
                    path,
                    operator,
                    ignore_case,
                    values,
                    optional,
                } => {
                    let mut node = compiler.compile(path, *operator, *ignore_case, values)?;
                    if *optional {
                        let test = values
                            .iter()
                            .map(|v| format!("{v} != null"))
                            .collect::<Vec<_>>()
                            .join(" and ");
                        node = node.guarded(test);
                    }
                    (*conjunction, node)
                }
                Criterion::Group {
                    conjunction,
                    criteria,
                } => match criteria.compile(compiler)? {
                    Some(inner) => (*conjunction, group(inner)),
                    None => continue,
                },
            };
            chain = Some(match chain {
                Some(chain) => chain.chain(conjunction, node),
                None => node,
            });
        }
        Ok(chain)
    }
}

/// Collapse a chain into a single parenthesized node.
///
/// A group whose members are all optional is itself optional; a group with optional members
/// trims the dangling conjunction of its first included member.
fn group(inner: Predicate) -> Predicate {
    let connectors = inner.all_connectors();
    let nodes = inner.nodes();
    let tests: Option<Vec<String>> = nodes
        .iter()
        .map(|(_, node)| node.test().map(|t| format!("({t})")))
        .collect();

    let body = if inner.needs_wrapping() {
        Fragment::trim(
            Trim::new(vec![inner.to_fragment()])
                .prefix("(")
                .suffix(")")
                .prefix_overrides("AND |OR "),
        )
    } else {
        Fragment::paren(vec![inner.to_fragment()])
    };

    let node = Predicate::new(vec![body]).with_connectors(connectors);
    match tests {
        Some(tests) => node.guarded(tests.join(" or ")),
        None => node,
    }
}
