use std::collections::BTreeSet;

use crate::binding::{self, string_literal};
use crate::compile::{DeclaredQuery, QueryMethod};
use crate::config::CompilerConfig;
use crate::dialect::{Dialect, NEUTRAL_ORDER, PagedSelect, PagingRequest};
use crate::error::{CompileError, CompileResult};
use crate::fragment::{Fragment, Placeholder, Repeat, TableRef, Trim};
use crate::metadata::{EntityResolver, IdGeneration, PropertyDescriptor};
use crate::method::{self, MethodParameter, MethodQuery, Order, ParameterRole, PartTree, QueryShape};
use crate::predicate::{Predicate, PredicateCompiler};

use super::{
    KeyStrategy, QueryKind, ResultKind, ResultMapping, Statement, StatementKind, StatementMeta,
};

/// Id of the entity's `<resultMap>`.
pub const RESULT_MAP_ID: &str = "BaseResultMap";
/// Id of the `<sql>` fragment listing the entity's columns.
pub const COLUMNS_ID: &str = "Base_Column_List";
/// Loop variable of dynamic ORDER BY clauses.
pub const SORT_ITEM: &str = "__order";

/// Statement id for a method: the name, followed by the simple name of each parameter type.
///
/// ```
/// use mapperc::method::MethodParameter;
/// use mapperc::statement::statement_id;
///
/// let params = [
///     MethodParameter::new("java.lang.String"),
///     MethodParameter::page("org.springframework.data.domain.Pageable"),
/// ];
/// assert_eq!(statement_id("findByName", &params), "findByName_String_Pageable");
/// assert_eq!(statement_id("findAll", &[]), "findAll");
/// ```
pub fn statement_id(name: &str, parameters: &[MethodParameter]) -> String {
    let mut id = name.to_string();
    for parameter in parameters {
        id.push('_');
        id.push_str(&simple_type_name(&parameter.type_name));
    }
    id
}

fn simple_type_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name).trim();
    let array = base.ends_with("[]");
    let base = base.trim_end_matches("[]");
    let simple = base.rsplit('.').next().unwrap_or(base);
    if array {
        format!("{simple}Array")
    } else {
        simple.to_string()
    }
}

/// Builds complete statements for one entity.
pub struct Assembler<'a> {
    resolver: &'a dyn EntityResolver,
    dialect: &'a dyn Dialect,
    config: &'a CompilerConfig,
}

impl<'a> Assembler<'a> {
    pub fn new(
        resolver: &'a dyn EntityResolver,
        dialect: &'a dyn Dialect,
        config: &'a CompilerConfig,
    ) -> Self {
        Self {
            resolver,
            dialect,
            config,
        }
    }

    fn compiler(&self) -> PredicateCompiler<'a> {
        PredicateCompiler::new(self.resolver, self.dialect, self.config)
    }

    fn meta(&self, id: &str, parameter_type: Option<&str>) -> StatementMeta {
        let database_id = if self.config.database_id {
            self.dialect.database_id()
        } else {
            None
        };
        StatementMeta::new(id)
            .parameter_type(parameter_type)
            .database_id(database_id)
    }

    /// Replace a statement that failed with a recoverable error by a placeholder.
    fn recover(&self, id: &str, result: CompileResult<Statement>) -> CompileResult<Statement> {
        match result {
            Ok(statement) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    target: "mapperc.compile",
                    id = statement.id(),
                    derived = statement.derived.len(),
                    "assembled statement"
                );
                Ok(statement)
            }
            Err(err) if err.is_recoverable() => {
                #[cfg(feature = "tracing")]
                tracing::warn!(target: "mapperc.compile", id, error = %err, "emitting placeholder statement");
                Ok(Statement::placeholder(id, err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Statement for a derived query method.
    ///
    /// Unsupported shapes become placeholders; unknown properties, argument mismatches and
    /// pagination failures propagate.
    pub fn query_method(&self, method: &QueryMethod) -> CompileResult<Statement> {
        let id = statement_id(&method.name, &method.parameters);
        let result = self.derived(method, &id);
        self.recover(&id, result)
    }

    fn derived(&self, method: &QueryMethod, id: &str) -> CompileResult<Statement> {
        let (tokens, spec) = match &method.derivation {
            Some((tokens, spec)) => (tokens.clone(), spec.clone()),
            None => {
                let tree = PartTree::parse(&method.name, self.resolver)?;
                let spec = tree.spec();
                (tree.tokens, spec)
            }
        };
        let compiler = match spec.shape {
            QueryShape::Delete => self.compiler().with_alias(None),
            _ => self.compiler(),
        };
        let query = method::build(&compiler, &method.name, &tokens, &spec, &method.parameters)?;
        let meta = self.meta(id, (!method.parameters.is_empty()).then_some("map"));
        let result_type = method.result_type.as_deref();

        match query.shape {
            QueryShape::Select => {
                let pageable = method
                    .parameters
                    .iter()
                    .any(|p| p.role == ParameterRole::Page);
                self.select(&compiler, meta, &query, result_type, pageable)
            }
            QueryShape::Count => self.count(&compiler, meta, &query, result_type.unwrap_or("long")),
            QueryShape::Exists => {
                self.count(&compiler, meta, &query, result_type.unwrap_or("boolean"))
            }
            QueryShape::Delete => self.delete(meta, &query),
        }
    }

    fn select(
        &self,
        compiler: &PredicateCompiler<'_>,
        meta: StatementMeta,
        query: &MethodQuery,
        result_type: Option<&str>,
        pageable: bool,
    ) -> CompileResult<Statement> {
        let mut connectors = connectors_of(query.predicate.as_ref());
        for order in &query.sort {
            connectors.extend(self.resolver.connectors(&order.property));
        }
        let source = self.source(compiler, query.predicate.as_ref(), &connectors)?;

        let mut base = vec![
            Fragment::literal(if query.distinct {
                "SELECT DISTINCT"
            } else {
                "SELECT"
            }),
            self.select_list(compiler.alias())?,
        ];
        base.extend(source.iter().cloned());
        let dynamic = query
            .dynamic_sort
            .as_deref()
            .filter(|_| self.config.dynamic_sort);
        let order = self.order_by(compiler, &query.sort, dynamic, query.paging.is_some())?;

        let body = match &query.paging {
            Some(request) => {
                let select = PagedSelect::new(Fragment::group(base)).with_order(order);
                let paged = self.dialect.paginate(select, request)?;
                if query.binds.is_empty() {
                    paged
                } else {
                    let mut body = query.binds.clone();
                    body.push(paged);
                    Fragment::group(body)
                }
            }
            None => {
                base.extend(order);
                Fragment::group(base)
            }
        };
        let statement = Statement::new(
            meta.clone(),
            StatementKind::Select {
                result: Some(self.result(result_type)),
                body,
            },
        );
        if !(pageable && self.config.derive_count) {
            return Ok(statement);
        }

        let mut count = vec![self.count_head(compiler.alias(), query.distinct)?];
        count.extend(source);
        Ok(statement.with_derived(self.count_statement(meta, Fragment::group(count))))
    }

    fn count(
        &self,
        compiler: &PredicateCompiler<'_>,
        meta: StatementMeta,
        query: &MethodQuery,
        result_type: &str,
    ) -> CompileResult<Statement> {
        let connectors = connectors_of(query.predicate.as_ref());
        let mut body = vec![self.count_head(compiler.alias(), query.distinct)?];
        body.extend(self.source(compiler, query.predicate.as_ref(), &connectors)?);
        Ok(Statement::new(
            meta,
            StatementKind::Select {
                result: Some(ResultKind::Type(result_type.to_string())),
                body: Fragment::group(body),
            },
        ))
    }

    fn delete(&self, meta: StatementMeta, query: &MethodQuery) -> CompileResult<Statement> {
        let connectors = connectors_of(query.predicate.as_ref());
        if !connectors.is_empty() {
            let joined: Vec<&str> = connectors.iter().map(String::as_str).collect();
            return Err(CompileError::shape(format!(
                "derived deletes cannot reach joined properties ({})",
                joined.join(", ")
            )));
        }
        let mut body = vec![
            Fragment::literal("DELETE FROM"),
            Fragment::Table(self.table(None)?),
        ];
        if let Some(predicate) = &query.predicate {
            body.push(where_clause(predicate));
        }
        Ok(Statement::new(
            meta,
            StatementKind::Delete {
                body: Fragment::group(body),
            },
        ))
    }

    fn count_statement(&self, parent: StatementMeta, body: Fragment) -> Statement {
        Statement::new(
            StatementMeta {
                id: self.config.count_id(&parent.id),
                ..parent
            },
            StatementKind::Select {
                result: Some(ResultKind::Type("long".to_string())),
                body,
            },
        )
    }

    fn result(&self, result_type: Option<&str>) -> ResultKind {
        match result_type {
            Some(ty) => ResultKind::Type(ty.to_string()),
            None if self.config.simple_statements => ResultKind::Map(RESULT_MAP_ID.to_string()),
            None => ResultKind::Type(self.resolver.entity().type_name.clone()),
        }
    }

    fn table(&self, alias: Option<&str>) -> CompileResult<TableRef> {
        let entity = self.resolver.entity();
        let table = TableRef::new(entity.schema.as_deref(), entity.table.as_str())?;
        Ok(match alias {
            Some(alias) => table.aliased(alias),
            None => table,
        })
    }

    fn column(&self, alias: Option<&str>, property: &PropertyDescriptor) -> CompileResult<Fragment> {
        Fragment::column(
            property.table_alias.as_deref().or(alias),
            property.column.as_str(),
        )
    }

    fn placeholder(&self, property: &PropertyDescriptor, name: &str) -> CompileResult<Fragment> {
        Ok(Placeholder::new(name)?
            .with_java_type(property.java_type.as_deref())
            .with_jdbc_type(property.jdbc_type.as_deref())
            .with_type_handler(property.type_handler.as_deref())
            .into())
    }

    /// `FROM`, joins and `WHERE`.
    fn source(
        &self,
        compiler: &PredicateCompiler<'_>,
        predicate: Option<&Predicate>,
        connectors: &BTreeSet<String>,
    ) -> CompileResult<Vec<Fragment>> {
        let mut parts = vec![
            Fragment::literal("FROM"),
            Fragment::Table(self.table(compiler.alias())?),
        ];
        parts.extend(self.joins(compiler.alias(), connectors)?);
        if let Some(predicate) = predicate {
            parts.push(where_clause(predicate));
        }
        Ok(parts)
    }

    /// One `LEFT OUTER JOIN` per connector, owners before the joins that hang off them.
    fn joins(
        &self,
        root_alias: Option<&str>,
        connectors: &BTreeSet<String>,
    ) -> CompileResult<Vec<Fragment>> {
        let mut pending = Vec::with_capacity(connectors.len());
        for connector in connectors {
            let join = self.resolver.join(connector).ok_or_else(|| {
                CompileError::shape(format!("no join metadata for connector '{connector}'"))
            })?;
            pending.push(join);
        }

        let mut placed = BTreeSet::new();
        let mut clauses = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|join| match &join.owner_alias {
                None => true,
                Some(owner) => {
                    placed.contains(owner) || !pending.iter().any(|other| &other.alias == owner)
                }
            });
            let Some(index) = ready else {
                return Err(CompileError::shape("joins reference each other in a cycle"));
            };
            let join = pending.remove(index);
            if join.on.is_empty() {
                return Err(CompileError::shape(format!(
                    "join '{}' has no ON columns",
                    join.name
                )));
            }

            let owner = join.owner_alias.as_deref().or(root_alias);
            let mut clause = vec![
                Fragment::literal("LEFT OUTER JOIN"),
                Fragment::Table(TableRef::new(None, join.table.as_str())?.aliased(&join.alias)),
                Fragment::literal("ON"),
            ];
            for (i, (joined, owning)) in join.on.iter().enumerate() {
                if i > 0 {
                    clause.push(Fragment::literal("AND"));
                }
                clause.push(Fragment::column(Some(&join.alias), joined.as_str())?);
                clause.push(Fragment::literal("="));
                clause.push(Fragment::column(owner, owning.as_str())?);
            }
            clauses.push(Fragment::group(clause));
            placed.insert(join.alias);
        }
        Ok(clauses)
    }

    fn select_list(&self, alias: Option<&str>) -> CompileResult<Fragment> {
        if self.config.simple_statements {
            Fragment::include(COLUMNS_ID)
        } else {
            self.column_list(alias)
        }
    }

    fn column_list(&self, alias: Option<&str>) -> CompileResult<Fragment> {
        let mut columns = Vec::new();
        for property in self.resolver.properties() {
            for column in property.columns() {
                columns.push(self.column(alias, column)?.render());
            }
        }
        if columns.is_empty() {
            return Err(CompileError::shape(format!(
                "entity {} has no columns",
                self.resolver.entity().name
            )));
        }
        Ok(Fragment::literal(columns.join(", ")))
    }

    fn count_head(&self, alias: Option<&str>, distinct: bool) -> CompileResult<Fragment> {
        if distinct {
            if let Some(id) = self.resolver.id() {
                let columns = id.columns();
                if let [column] = columns.as_slice() {
                    let column = self.column(alias, column)?.render();
                    return Ok(Fragment::literal(format!("SELECT COUNT(DISTINCT {column})")));
                }
            }
        }
        Ok(Fragment::literal("SELECT COUNT(*)"))
    }

    /// Static orders first, then the dynamic sort held by `dynamic`.
    fn order_by(
        &self,
        compiler: &PredicateCompiler<'_>,
        statics: &[Order],
        dynamic: Option<&str>,
        paged: bool,
    ) -> CompileResult<Option<Fragment>> {
        let mut keys = Vec::new();
        for order in statics {
            let property = compiler.property(&order.property)?;
            for column in property.columns() {
                keys.push(format!(
                    "{} {}",
                    self.column(compiler.alias(), column)?.render(),
                    order.direction.keyword()
                ));
            }
        }

        let Some(expr) = dynamic else {
            return Ok((!keys.is_empty())
                .then(|| Fragment::literal(format!("ORDER BY {}", keys.join(", ")))));
        };
        let items = self.sort_items(compiler.alias(), expr)?;
        let test = format!("{expr} != null and !{expr}.isEmpty()");

        let order = if keys.is_empty() {
            let clause = Fragment::group(vec![Fragment::literal("ORDER BY"), items]);
            if paged && self.dialect.pagination().requires_order_by() {
                Fragment::choose(test, clause, Fragment::literal(NEUTRAL_ORDER))?
            } else {
                Fragment::if_(test, vec![clause])?
            }
        } else {
            Fragment::group(vec![
                Fragment::literal(format!("ORDER BY {}", keys.join(", "))),
                Fragment::if_(test, vec![Fragment::literal(","), items])?,
            ])
        };
        Ok(Some(order))
    }

    /// `<foreach>` over sort orders. Property names are matched against the entity's columns,
    /// unknown names fall back to the id column; nothing from the sort value reaches SQL text.
    fn sort_items(&self, alias: Option<&str>, collection: &str) -> CompileResult<Fragment> {
        let mut whitelist = Vec::new();
        for property in self.resolver.properties() {
            for column in property.columns() {
                whitelist.push((column.path.clone(), self.column(alias, column)?.render()));
            }
        }
        let fallback = match self.resolver.id() {
            Some(id) => match id.columns().first() {
                Some(column) => Some(self.column(alias, column)?.render()),
                None => None,
            },
            None => None,
        };
        let Some(fallback) = fallback.or_else(|| whitelist.first().map(|(_, c)| c.clone())) else {
            return Err(CompileError::shape(format!(
                "entity {} has no sortable columns",
                self.resolver.entity().name
            )));
        };

        let mut column = Fragment::literal(fallback);
        for (path, rendered) in whitelist.into_iter().rev() {
            column = Fragment::choose(
                format!("{SORT_ITEM}.property == {}", string_literal(&path)),
                Fragment::literal(rendered),
                column,
            )?;
        }
        let direction = Fragment::choose(
            format!("{SORT_ITEM}.direction == 'DESC' or {SORT_ITEM}.direction == 'desc'"),
            Fragment::literal("DESC"),
            Fragment::literal("ASC"),
        )?;
        let repeat = Repeat::new(collection, SORT_ITEM, vec![column, direction])?.separator(",");
        Ok(Fragment::foreach(repeat))
    }

    /// Statement for a query string.
    pub fn declared_query(&self, query: &DeclaredQuery) -> CompileResult<Statement> {
        let id = statement_id(&query.method, &query.parameters);
        let result = self.declared(query, &id);
        self.recover(&id, result)
    }

    fn declared(&self, query: &DeclaredQuery, id: &str) -> CompileResult<Statement> {
        let Some(kind) = query.kind.or_else(|| QueryKind::detect(&query.query)) else {
            let keyword = query.query.split_whitespace().next().unwrap_or_default();
            return Err(CompileError::shape(format!(
                "cannot tell the statement kind of a query starting with '{keyword}'"
            )));
        };
        let body = binding::parse(&query.query)?.into_fragment()?;
        let meta = self.meta(id, (!query.parameters.is_empty()).then_some("map"));

        let kind = match kind {
            QueryKind::Select => return self.declared_select(query, meta, body),
            QueryKind::Insert => StatementKind::Insert { key: None, body },
            QueryKind::Update => StatementKind::Update { body },
            QueryKind::Delete => StatementKind::Delete { body },
        };
        Ok(Statement::new(meta, kind))
    }

    fn declared_select(
        &self,
        query: &DeclaredQuery,
        meta: StatementMeta,
        body: Fragment,
    ) -> CompileResult<Statement> {
        let result = Some(self.result(query.result_type.as_deref()));
        let page = query
            .parameters
            .iter()
            .enumerate()
            .find(|(_, p)| p.role == ParameterRole::Page)
            .map(|(i, p)| p.binding_name(i));
        let Some(page) = page else {
            return Ok(Statement::new(meta, StatementKind::Select { result, body }));
        };

        let request = PagingRequest::params(format!("{page}.offset"), format!("{page}.pageSize"));
        let select = PagedSelect::new(body.clone())
            .with_inline_order(binding::orders_at_top_level(&query.query));
        let paged = self.dialect.paginate(select, &request)?;
        let statement = Statement::new(
            meta.clone(),
            StatementKind::Select {
                result,
                body: paged,
            },
        );
        if !self.config.derive_count {
            return Ok(statement);
        }
        let count = match &query.count_query {
            Some(count) => binding::parse(count)?.into_fragment()?,
            None => Fragment::group(vec![
                Fragment::literal("SELECT COUNT(*) FROM ("),
                body,
                Fragment::literal(") count_inner"),
            ]),
        };
        Ok(statement.with_derived(self.count_statement(meta, count)))
    }

    /// CRUD statements for the entity, in a fixed order.
    pub fn simple_statements(&self) -> CompileResult<Vec<Statement>> {
        let compiler = self.compiler();
        let alias = compiler.alias();
        let mut statements = vec![
            self.result_map(),
            Statement::new(
                self.meta(COLUMNS_ID, None),
                StatementKind::Fragment {
                    body: self.column_list(alias)?,
                },
            ),
        ];

        let mut built = vec![
            ("insert".to_string(), self.insert("insert", false)),
            (
                "insertSelective".to_string(),
                self.insert("insertSelective", true),
            ),
        ];
        if let Some(id) = self.resolver.id() {
            built.push((
                "updateById".to_string(),
                self.update_by_id("updateById", &id, false),
            ));
            built.push((
                "updateByIdSelective".to_string(),
                self.update_by_id("updateByIdSelective", &id, true),
            ));
            built.push(("deleteById".to_string(), self.delete_by_id(&id)));
            built.push(("findById".to_string(), self.find_by_id(alias, &id, false)));
            built.push(("existsById".to_string(), self.find_by_id(alias, &id, true)));
        }
        for (sort, page) in [(None, None), (Some("p1"), None), (Some("p1.sort"), Some("p1"))] {
            let parameters: Vec<MethodParameter> = match (sort, page) {
                (_, Some(_)) => vec![MethodParameter::page("Pageable")],
                (Some(_), None) => vec![MethodParameter::sort("Sort")],
                (None, None) => Vec::new(),
            };
            let id = statement_id("findAll", &parameters);
            let statement = self.find_all(&compiler, &id, sort, page);
            built.push((id, statement));
        }
        built.push(("count".to_string(), self.count_all(alias)));
        built.push(("deleteAll".to_string(), self.delete_all()));

        for (id, result) in built {
            statements.push(self.recover(&id, result)?);
        }
        Ok(statements)
    }

    fn result_map(&self) -> Statement {
        let mut mappings = Vec::new();
        for property in self.resolver.properties() {
            for column in property.columns() {
                mappings.push(ResultMapping {
                    property: column.path.clone(),
                    column: column.column.clone(),
                    java_type: column.java_type.clone(),
                    jdbc_type: column.jdbc_type.clone(),
                    type_handler: column.type_handler.clone(),
                    id: property.is_id,
                });
            }
        }
        Statement::new(
            StatementMeta::new(RESULT_MAP_ID),
            StatementKind::ResultMap {
                type_name: self.resolver.entity().type_name.clone(),
                mappings,
            },
        )
    }

    fn key_strategy(&self) -> CompileResult<Option<KeyStrategy>> {
        let Some(id) = self.resolver.id() else {
            return Ok(None);
        };
        match &id.generation {
            IdGeneration::Assigned => Ok(None),
            IdGeneration::Identity => {
                if !self.dialect.identity_supported() {
                    return Err(CompileError::shape(format!(
                        "{} has no identity columns",
                        self.dialect.name()
                    )));
                }
                let columns = id.columns();
                let [column] = columns.as_slice() else {
                    return Err(CompileError::shape("identity keys must map to a single column"));
                };
                Ok(Some(KeyStrategy::Generated {
                    property: column.path.clone(),
                    column: column.column.clone(),
                }))
            }
            IdGeneration::Sequence(sequence) => {
                let query = self.dialect.sequence_next_value(sequence).ok_or_else(|| {
                    CompileError::shape(format!("{} has no sequences", self.dialect.name()))
                })?;
                Ok(Some(KeyStrategy::SelectKey {
                    property: id.path.clone(),
                    result_type: id.java_type.clone(),
                    query,
                }))
            }
        }
    }

    fn insert(&self, id: &str, selective: bool) -> CompileResult<Statement> {
        let key = self.key_strategy()?;
        let properties = self.resolver.properties();
        let columns: Vec<&PropertyDescriptor> = properties
            .iter()
            .filter(|p| !(p.is_id && matches!(p.generation, IdGeneration::Identity)))
            .flat_map(|p| p.columns())
            .collect();
        if columns.is_empty() {
            return Err(CompileError::shape(format!(
                "entity {} has no insertable columns",
                self.resolver.entity().name
            )));
        }

        let mut body = vec![
            Fragment::literal("INSERT INTO"),
            Fragment::Table(self.table(None)?),
        ];
        if selective {
            let mut names = Vec::with_capacity(columns.len());
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                let test = format!("{} != null", column.path);
                names.push(Fragment::if_(
                    test.clone(),
                    vec![Fragment::literal(format!(
                        "{},",
                        self.column(None, column)?.render()
                    ))],
                )?);
                values.push(Fragment::if_(
                    test,
                    vec![
                        self.placeholder(column, &column.path)?,
                        Fragment::literal(","),
                    ],
                )?);
            }
            body.push(Fragment::trim(
                Trim::new(names).prefix("(").suffix(")").suffix_overrides(","),
            ));
            body.push(Fragment::trim(
                Trim::new(values)
                    .prefix("VALUES (")
                    .suffix(")")
                    .suffix_overrides(","),
            ));
        } else {
            let mut names = Vec::with_capacity(columns.len());
            let mut values = Vec::with_capacity(columns.len() * 2);
            for (i, column) in columns.iter().enumerate() {
                names.push(self.column(None, column)?.render());
                if i > 0 {
                    values.push(Fragment::literal(","));
                }
                values.push(self.placeholder(column, &column.path)?);
            }
            body.push(Fragment::paren(vec![Fragment::literal(names.join(", "))]));
            body.push(Fragment::literal("VALUES"));
            body.push(Fragment::paren(values));
        }

        let meta = self.meta(id, Some(self.resolver.entity().type_name.as_str()));
        Ok(Statement::new(
            meta,
            StatementKind::Insert {
                key,
                body: Fragment::group(body),
            },
        ))
    }

    /// `column = #{param}` for every id column. By-id statements receive `{id: ...}`; entity
    /// statements read the id from the entity itself.
    fn id_condition(
        &self,
        alias: Option<&str>,
        id: &PropertyDescriptor,
        from_entity: bool,
    ) -> CompileResult<Fragment> {
        let mut body = Vec::new();
        for (i, column) in id.columns().into_iter().enumerate() {
            if i > 0 {
                body.push(Fragment::literal("AND"));
            }
            let param = if from_entity {
                column.path.clone()
            } else if id.is_composite() {
                format!("id.{}", column.name())
            } else {
                "id".to_string()
            };
            body.push(self.column(alias, column)?);
            body.push(Fragment::literal("="));
            body.push(self.placeholder(column, &param)?);
        }
        Ok(Fragment::group(body))
    }

    fn update_by_id(
        &self,
        id: &str,
        id_property: &PropertyDescriptor,
        selective: bool,
    ) -> CompileResult<Statement> {
        let properties = self.resolver.properties();
        let columns: Vec<&PropertyDescriptor> = properties
            .iter()
            .filter(|p| !p.is_id)
            .flat_map(|p| p.columns())
            .collect();
        if columns.is_empty() {
            return Err(CompileError::shape(format!(
                "entity {} has nothing to update besides its id",
                self.resolver.entity().name
            )));
        }

        let set = if selective {
            let mut assignments = Vec::with_capacity(columns.len());
            for column in &columns {
                assignments.push(Fragment::if_(
                    format!("{} != null", column.path),
                    vec![
                        Fragment::literal(format!("{} =", self.column(None, column)?.render())),
                        self.placeholder(column, &column.path)?,
                        Fragment::literal(","),
                    ],
                )?);
            }
            Fragment::set(assignments)
        } else {
            let mut assignments = vec![Fragment::literal("SET")];
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    assignments.push(Fragment::literal(","));
                }
                assignments.push(Fragment::literal(format!(
                    "{} =",
                    self.column(None, column)?.render()
                )));
                assignments.push(self.placeholder(column, &column.path)?);
            }
            Fragment::group(assignments)
        };

        let body = Fragment::group(vec![
            Fragment::literal("UPDATE"),
            Fragment::Table(self.table(None)?),
            set,
            Fragment::literal("WHERE"),
            self.id_condition(None, id_property, true)?,
        ]);
        let meta = self.meta(id, Some(self.resolver.entity().type_name.as_str()));
        Ok(Statement::new(meta, StatementKind::Update { body }))
    }

    fn delete_by_id(&self, id: &PropertyDescriptor) -> CompileResult<Statement> {
        let body = Fragment::group(vec![
            Fragment::literal("DELETE FROM"),
            Fragment::Table(self.table(None)?),
            Fragment::literal("WHERE"),
            self.id_condition(None, id, false)?,
        ]);
        Ok(Statement::new(
            self.meta("deleteById", Some("map")),
            StatementKind::Delete { body },
        ))
    }

    /// `findById`, or `existsById` when `exists` is set.
    fn find_by_id(
        &self,
        alias: Option<&str>,
        id: &PropertyDescriptor,
        exists: bool,
    ) -> CompileResult<Statement> {
        let (statement_id, head, result) = if exists {
            (
                "existsById",
                Fragment::literal("SELECT COUNT(*)"),
                ResultKind::Type("boolean".to_string()),
            )
        } else {
            (
                "findById",
                Fragment::group(vec![Fragment::literal("SELECT"), self.select_list(alias)?]),
                self.result(None),
            )
        };
        let body = Fragment::group(vec![
            head,
            Fragment::literal("FROM"),
            Fragment::Table(self.table(alias)?),
            Fragment::literal("WHERE"),
            self.id_condition(alias, id, false)?,
        ]);
        Ok(Statement::new(
            self.meta(statement_id, Some("map")),
            StatementKind::Select {
                result: Some(result),
                body,
            },
        ))
    }

    /// `findAll`, sorted by the `sort` expression and paged through the `page` parameter.
    fn find_all(
        &self,
        compiler: &PredicateCompiler<'_>,
        id: &str,
        sort: Option<&str>,
        page: Option<&str>,
    ) -> CompileResult<Statement> {
        let source = self.source(compiler, None, &BTreeSet::new())?;
        let mut body = vec![
            Fragment::literal("SELECT"),
            self.select_list(compiler.alias())?,
        ];
        body.extend(source.iter().cloned());
        let dynamic = sort.filter(|_| self.config.dynamic_sort);
        let order = self.order_by(compiler, &[], dynamic, page.is_some())?;
        let body = match page {
            Some(page) => {
                let request =
                    PagingRequest::params(format!("{page}.offset"), format!("{page}.pageSize"));
                let select = PagedSelect::new(Fragment::group(body)).with_order(order);
                self.dialect.paginate(select, &request)?
            }
            None => {
                body.extend(order);
                Fragment::group(body)
            }
        };

        let meta = self.meta(id, sort.or(page).map(|_| "map"));
        let statement = Statement::new(
            meta.clone(),
            StatementKind::Select {
                result: Some(self.result(None)),
                body,
            },
        );
        if page.is_none() || !self.config.derive_count {
            return Ok(statement);
        }
        let mut count = vec![Fragment::literal("SELECT COUNT(*)")];
        count.extend(source);
        Ok(statement.with_derived(self.count_statement(meta, Fragment::group(count))))
    }

    fn count_all(&self, alias: Option<&str>) -> CompileResult<Statement> {
        let body = Fragment::group(vec![
            Fragment::literal("SELECT COUNT(*) FROM"),
            Fragment::Table(self.table(alias)?),
        ]);
        Ok(Statement::new(
            self.meta("count", None),
            StatementKind::Select {
                result: Some(ResultKind::Type("long".to_string())),
                body,
            },
        ))
    }

    fn delete_all(&self) -> CompileResult<Statement> {
        let body = Fragment::group(vec![
            Fragment::literal("DELETE FROM"),
            Fragment::Table(self.table(None)?),
        ]);
        Ok(Statement::new(
            self.meta("deleteAll", None),
            StatementKind::Delete { body },
        ))
    }
}

fn connectors_of(predicate: Option<&Predicate>) -> BTreeSet<String> {
    predicate.map(Predicate::all_connectors).unwrap_or_default()
}

/// Guarded chains go inside `<where>` so the engine can drop a dangling conjunction.
fn where_clause(predicate: &Predicate) -> Fragment {
    if predicate.needs_wrapping() {
        Fragment::where_(vec![predicate.to_fragment()])
    } else {
        Fragment::group(vec![Fragment::literal("WHERE"), predicate.to_fragment()])
    }
}
