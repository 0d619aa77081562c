use crate::binding::{LikeKind, escaped_value};
use crate::config::{CompilerConfig, LikeBinding};
use crate::dialect::Dialect;
use crate::error::{CompileError, CompileResult};
use crate::fragment::{Fragment, Placeholder, TableRef, in_list};
use crate::metadata::{EntityResolver, PropertyDescriptor, PropertyKind};

use super::Predicate;

/// Comparison operators of derived queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    SimpleProperty,
    NegatingSimpleProperty,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Before,
    After,
    Between,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    NotContaining,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    True,
    False,
    Regex,
    IsEmpty,
    IsNotEmpty,
    Near,
    Within,
    Exists,
}

impl Operator {
    /// Number of bound values the operator consumes.
    pub fn arity(self) -> usize {
        match self {
            Operator::Between => 2,
            Operator::IsNull
            | Operator::IsNotNull
            | Operator::True
            | Operator::False
            | Operator::IsEmpty
            | Operator::IsNotEmpty
            | Operator::Exists => 0,
            _ => 1,
        }
    }

    /// Parse a name such as `GREATER_THAN` or `greaterThan`.
    pub fn parse(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        let op = match key.as_str() {
            "simpleproperty" | "equals" | "is" | "eq" => Operator::SimpleProperty,
            "negatingsimpleproperty" | "not" | "isnot" | "ne" => Operator::NegatingSimpleProperty,
            "lessthan" | "lt" => Operator::LessThan,
            "lessthanequal" | "lte" => Operator::LessThanEqual,
            "greaterthan" | "gt" => Operator::GreaterThan,
            "greaterthanequal" | "gte" => Operator::GreaterThanEqual,
            "before" => Operator::Before,
            "after" => Operator::After,
            "between" => Operator::Between,
            "like" => Operator::Like,
            "notlike" => Operator::NotLike,
            "startingwith" | "startswith" => Operator::StartingWith,
            "endingwith" | "endswith" => Operator::EndingWith,
            "containing" | "contains" => Operator::Containing,
            "notcontaining" | "notcontains" => Operator::NotContaining,
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            "isnull" | "null" => Operator::IsNull,
            "isnotnull" | "notnull" => Operator::IsNotNull,
            "true" | "istrue" => Operator::True,
            "false" | "isfalse" => Operator::False,
            "regex" | "matches" | "matchesregex" => Operator::Regex,
            "isempty" | "empty" => Operator::IsEmpty,
            "isnotempty" | "notempty" => Operator::IsNotEmpty,
            "near" => Operator::Near,
            "within" => Operator::Within,
            "exists" => Operator::Exists,
            _ => return None,
        };
        Some(op)
    }

    fn like_kind(self) -> Option<LikeKind> {
        match self {
            Operator::StartingWith => Some(LikeKind::StartsWith),
            Operator::EndingWith => Some(LikeKind::EndsWith),
            Operator::Containing | Operator::NotContaining => Some(LikeKind::Contains),
            _ => None,
        }
    }
}

/// Case folding policy for a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IgnoreCase {
    #[default]
    Never,
    /// Fold; fails on non-textual properties.
    Always,
    /// Fold textual properties only.
    WhenPossible,
}

/// Compiles one `(property, operator)` pair into a [`Predicate`].
pub struct PredicateCompiler<'a> {
    resolver: &'a dyn EntityResolver,
    dialect: &'a dyn Dialect,
    config: &'a CompilerConfig,
    alias: Option<String>,
}

impl<'a> PredicateCompiler<'a> {
    /// Compiler qualifying root columns with the entity alias (or the configured default).
    pub fn new(
        resolver: &'a dyn EntityResolver,
        dialect: &'a dyn Dialect,
        config: &'a CompilerConfig,
    ) -> Self {
        let alias = config
            .default_alias
            .clone()
            .unwrap_or_else(|| resolver.entity().alias.clone());
        Self {
            resolver,
            dialect,
            config,
            alias: (!alias.is_empty()).then_some(alias),
        }
    }

    /// Override the root alias; `None` renders unqualified columns.
    pub fn with_alias(mut self, alias: Option<&str>) -> Self {
        self.alias = alias.filter(|a| !a.is_empty()).map(str::to_string);
        self
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn resolver(&self) -> &'a dyn EntityResolver {
        self.resolver
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Resolve a property path or fail with [`CompileError::UnknownProperty`].
    pub fn property(&self, path: &str) -> CompileResult<PropertyDescriptor> {
        self.resolver
            .property(path)
            .ok_or_else(|| CompileError::UnknownProperty {
                entity: self.resolver.entity().name.clone(),
                path: path.to_string(),
            })
    }

    /// Compile `path <operator> values`.
    ///
    /// `values` are the names of the bound parameters feeding the operator, in slot order.
    pub fn compile(
        &self,
        path: &str,
        operator: Operator,
        ignore_case: IgnoreCase,
        values: &[String],
    ) -> CompileResult<Predicate> {
        let property = self.property(path)?;
        if values.len() != operator.arity() {
            return Err(CompileError::ArgumentCountMismatch {
                method: format!("{path} {operator:?}"),
                expected: operator.arity(),
                actual: values.len(),
            });
        }

        let fold = match ignore_case {
            IgnoreCase::Never => false,
            IgnoreCase::Always if !property.ty.is_textual() => {
                return Err(CompileError::UnsupportedIgnoreCase {
                    property: path.to_string(),
                });
            }
            IgnoreCase::Always => true,
            IgnoreCase::WhenPossible => property.ty.is_textual(),
        };

        let body = match &property.kind {
            PropertyKind::Scalar => self.scalar(&property, operator, fold, values)?,
            PropertyKind::Composite(parts) => self.composite(path, parts, operator, values)?,
            PropertyKind::ToMany(_) => self.to_many(&property, operator, values)?,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(target: "mapperc.compile", path, ?operator, fold, "compiled predicate");

        Ok(Predicate::new(body).with_connectors(self.resolver.connectors(path)))
    }

    fn column(&self, property: &PropertyDescriptor) -> CompileResult<Fragment> {
        let alias = property.table_alias.as_deref().or(self.alias.as_deref());
        Fragment::column(alias, property.column.as_str())
    }

    fn value(&self, property: &PropertyDescriptor, name: &str) -> CompileResult<Fragment> {
        Ok(Placeholder::new(name)?
            .with_java_type(property.java_type.as_deref())
            .with_jdbc_type(property.jdbc_type.as_deref())
            .with_type_handler(property.type_handler.as_deref())
            .into())
    }

    fn lower(&self, fragment: Fragment, fold: bool) -> CompileResult<Fragment> {
        if fold {
            Fragment::function(self.dialect.lowercase_function(), vec![fragment])
        } else {
            Ok(fragment)
        }
    }

    fn scalar(
        &self,
        property: &PropertyDescriptor,
        operator: Operator,
        fold: bool,
        values: &[String],
    ) -> CompileResult<Vec<Fragment>> {
        let column = self.lower(self.column(property)?, fold)?;
        let value = |i: usize| -> CompileResult<Fragment> {
            self.lower(self.value(property, &values[i])?, fold)
        };
        let op = |text: &str| Fragment::literal(text);

        let body = match operator {
            Operator::SimpleProperty | Operator::NegatingSimpleProperty => {
                let negated = operator == Operator::NegatingSimpleProperty;
                let compare = Fragment::group(vec![
                    column.clone(),
                    op(if negated { "<>" } else { "=" }),
                    value(0)?,
                ]);
                if property.nullable {
                    let null_check = Fragment::group(vec![
                        self.column(property)?,
                        op(if negated { "IS NOT NULL" } else { "IS NULL" }),
                    ]);
                    vec![Fragment::choose(
                        format!("{} == null", values[0]),
                        null_check,
                        compare,
                    )?]
                } else {
                    vec![compare]
                }
            }
            Operator::LessThan | Operator::Before => vec![column, op("<"), value(0)?],
            Operator::LessThanEqual => vec![column, op("<="), value(0)?],
            Operator::GreaterThan | Operator::After => vec![column, op(">"), value(0)?],
            Operator::GreaterThanEqual => vec![column, op(">="), value(0)?],
            Operator::Between => vec![column, op("BETWEEN"), value(0)?, op("AND"), value(1)?],
            Operator::Like | Operator::NotLike => vec![
                column,
                op(if operator == Operator::Like { "LIKE" } else { "NOT LIKE" }),
                value(0)?,
                Fragment::literal(self.dialect.like_escape(self.config.escape_char)),
            ],
            Operator::StartingWith
            | Operator::EndingWith
            | Operator::Containing
            | Operator::NotContaining => {
                let kind = operator.like_kind().unwrap_or(LikeKind::Plain);
                self.like(property, column, operator == Operator::NotContaining, kind, &values[0], fold)?
            }
            Operator::In | Operator::NotIn => vec![
                self.column(property)?,
                op(if operator == Operator::In { "IN" } else { "NOT IN" }),
                in_list(&values[0])?,
            ],
            Operator::IsNull => vec![self.column(property)?, op("IS NULL")],
            Operator::IsNotNull => vec![self.column(property)?, op("IS NOT NULL")],
            Operator::True | Operator::False => {
                let truth = operator == Operator::True;
                let literal = match (self.dialect.supports_boolean(), truth) {
                    (true, true) => "TRUE",
                    (true, false) => "FALSE",
                    (false, true) => "1",
                    (false, false) => "0",
                };
                vec![self.column(property)?, op("="), op(literal)]
            }
            Operator::Regex => {
                let Some(regex) = self.dialect.regex_operator() else {
                    return Err(CompileError::shape(format!(
                        "regex matching is not available on {}",
                        self.dialect.name()
                    )));
                };
                vec![column, op(regex), value(0)?]
            }
            Operator::IsEmpty
            | Operator::IsNotEmpty
            | Operator::Near
            | Operator::Within
            | Operator::Exists => {
                return Err(CompileError::shape(format!(
                    "{operator:?} is not supported on property '{}'",
                    property.path
                )));
            }
        };
        Ok(body)
    }

    fn like(
        &self,
        property: &PropertyDescriptor,
        column: Fragment,
        negated: bool,
        kind: LikeKind,
        param: &str,
        fold: bool,
    ) -> CompileResult<Vec<Fragment>> {
        let escape = self.config.escape_char;
        let bound = format!("__{}_like", param.replace('.', "_"));
        let (bind_value, pattern) = match self.config.like_binding {
            LikeBinding::Bind => (
                kind.pattern(param, Some(escape)),
                self.value(property, &bound)?,
            ),
            LikeBinding::Concat => {
                let (leading, trailing) = kind.wildcards();
                let mut parts = Vec::with_capacity(3);
                if leading {
                    parts.push(Fragment::literal("'%'"));
                }
                parts.push(self.value(property, &bound)?);
                if trailing {
                    parts.push(Fragment::literal("'%'"));
                }
                (escaped_value(param, escape), self.dialect.concat(parts)?)
            }
        };
        Ok(vec![
            Fragment::bind(bound.as_str(), bind_value)?,
            column,
            Fragment::literal(if negated { "NOT LIKE" } else { "LIKE" }),
            self.lower(pattern, fold)?,
            Fragment::literal(self.dialect.like_escape(escape)),
        ])
    }

    /// Component-wise comparison of an embedded value.
    fn composite(
        &self,
        path: &str,
        parts: &[PropertyDescriptor],
        operator: Operator,
        values: &[String],
    ) -> CompileResult<Vec<Fragment>> {
        let negated = match operator {
            Operator::SimpleProperty => false,
            Operator::NegatingSimpleProperty => true,
            other => {
                return Err(CompileError::shape(format!(
                    "{other:?} is not supported on composite property '{path}'"
                )));
            }
        };
        let prefix = format!("{path}.");
        let mut body = Vec::with_capacity(parts.len() * 4);
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                body.push(Fragment::literal("AND"));
            }
            let component = part.path.strip_prefix(&prefix).unwrap_or(part.name());
            body.push(self.column(part)?);
            body.push(Fragment::literal("="));
            body.push(self.value(part, &format!("{}.{component}", values[0]))?);
        }
        let compared = Fragment::paren(body);
        Ok(if negated {
            vec![Fragment::literal("NOT"), compared]
        } else {
            vec![compared]
        })
    }

    /// Membership test against the join table of a to-many association.
    fn to_many(
        &self,
        property: &PropertyDescriptor,
        operator: Operator,
        values: &[String],
    ) -> CompileResult<Vec<Fragment>> {
        let negated = match operator {
            Operator::Containing => false,
            Operator::NotContaining => true,
            other => {
                return Err(CompileError::shape(format!(
                    "{other:?} is not supported on collection property '{}'",
                    property.path
                )));
            }
        };
        let PropertyKind::ToMany(Some(join)) = &property.kind else {
            return Err(CompileError::shape(format!(
                "collection property '{}' has no join table metadata",
                property.path
            )));
        };
        let id = self
            .resolver
            .id()
            .filter(|id| !id.is_composite())
            .ok_or_else(|| {
                CompileError::shape(format!(
                    "collection property '{}' needs a single-column id on the owner",
                    property.path
                ))
            })?;

        let subquery = Fragment::paren(vec![
            Fragment::literal("SELECT 1 FROM"),
            Fragment::Table(TableRef::new(None, join.table.as_str())?),
            Fragment::literal("WHERE"),
            Fragment::column(Some(join.table.as_str()), join.owner_column.as_str())?,
            Fragment::literal("="),
            self.column(&id)?,
            Fragment::literal("AND"),
            Fragment::column(Some(join.table.as_str()), join.inverse_column.as_str())?,
            Fragment::literal("="),
            Fragment::placeholder(values[0].as_str())?,
        ]);
        Ok(vec![
            Fragment::literal(if negated { "NOT EXISTS" } else { "EXISTS" }),
            subquery,
        ])
    }
}
