//! Compilation entry point.
//!
//! A [`RepositoryDefinition`] lists the query methods and declared queries of one repository.
//! [`RepositoryCompiler::compile`] assembles every statement, registers them under the
//! repository namespace and returns the finalized [`Document`].
//!
//! ```
//! use mapperc::compile::{QueryMethod, RepositoryCompiler, RepositoryDefinition};
//! use mapperc::config::CompilerConfig;
//! use mapperc::dialect::DatabaseFamily;
//! use mapperc::metadata::{EntityDescriptor, EntityModel, IdGeneration, PropertyDescriptor, PropertyType};
//! use mapperc::method::MethodParameter;
//! use mapperc::registry::StatementRegistry;
//!
//! let user = EntityModel::new(EntityDescriptor::new("User", "t_user").alias("u"))
//!     .with_property(PropertyDescriptor::new("id", "id", PropertyType::Integer).id(IdGeneration::Identity))
//!     .with_property(PropertyDescriptor::new("age", "age", PropertyType::Integer).not_null());
//! let definition = RepositoryDefinition::new("com.example.UserRepository")
//!     .method(QueryMethod::new("findByAgeGreaterThan").parameter(MethodParameter::new("Integer")));
//!
//! let config = CompilerConfig::new().with_simple_statements(false);
//! let dialect = DatabaseFamily::Postgres.dialect();
//! let registry = StatementRegistry::new();
//! let document = RepositoryCompiler::new(&config, dialect.as_ref(), &user).compile(&definition, &registry)?;
//!
//! let statement = document.statement("findByAgeGreaterThan_Integer").unwrap();
//! assert!(statement.render().contains("FROM t_user u WHERE (u.age > #{p1})"));
//! # Ok::<(), mapperc::CompileError>(())
//! ```

use serde::Deserialize;

use crate::config::CompilerConfig;
use crate::dialect::Dialect;
use crate::error::CompileResult;
use crate::metadata::EntityResolver;
use crate::method::{MethodParameter, QuerySpec, Token};
use crate::registry::{Document, StatementRegistry};
use crate::statement::{Assembler, QueryKind};

/// A derived query method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryMethod {
    /// Method name; parsed for the query unless `derivation` is set.
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<MethodParameter>,
    /// `resultType` overriding the entity result map.
    #[serde(default)]
    pub result_type: Option<String>,
    /// Explicit tokens and subject, bypassing name parsing.
    #[serde(skip)]
    pub derivation: Option<(Vec<Token>, QuerySpec)>,
}

impl QueryMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            result_type: None,
            derivation: None,
        }
    }

    pub fn parameter(mut self, parameter: MethodParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn result_type(mut self, result_type: impl Into<String>) -> Self {
        self.result_type = Some(result_type.into());
        self
    }

    /// Describe the query with explicit tokens instead of the method name.
    pub fn tokens(mut self, tokens: Vec<Token>, spec: QuerySpec) -> Self {
        self.derivation = Some((tokens, spec));
        self
    }
}

/// A method backed by a query string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeclaredQuery {
    pub method: String,
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<MethodParameter>,
    /// Statement kind; detected from the leading keyword when absent.
    #[serde(default)]
    pub kind: Option<QueryKind>,
    /// Count query used for pageable selects instead of wrapping the query.
    #[serde(default)]
    pub count_query: Option<String>,
    #[serde(default)]
    pub result_type: Option<String>,
}

impl DeclaredQuery {
    pub fn new(method: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            query: query.into(),
            parameters: Vec::new(),
            kind: None,
            count_query: None,
            result_type: None,
        }
    }

    pub fn parameter(mut self, parameter: MethodParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn kind(mut self, kind: QueryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn count_query(mut self, query: impl Into<String>) -> Self {
        self.count_query = Some(query.into());
        self
    }

    pub fn result_type(mut self, result_type: impl Into<String>) -> Self {
        self.result_type = Some(result_type.into());
        self
    }
}

/// Everything compiled into one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryDefinition {
    pub namespace: String,
    #[serde(default)]
    pub methods: Vec<QueryMethod>,
    #[serde(default)]
    pub queries: Vec<DeclaredQuery>,
}

impl RepositoryDefinition {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            methods: Vec::new(),
            queries: Vec::new(),
        }
    }

    pub fn method(mut self, method: QueryMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn query(mut self, query: DeclaredQuery) -> Self {
        self.queries.push(query);
        self
    }
}

/// Compiles repository definitions for one entity and dialect.
pub struct RepositoryCompiler<'a> {
    config: &'a CompilerConfig,
    dialect: &'a dyn Dialect,
    resolver: &'a dyn EntityResolver,
}

impl<'a> RepositoryCompiler<'a> {
    pub fn new(
        config: &'a CompilerConfig,
        dialect: &'a dyn Dialect,
        resolver: &'a dyn EntityResolver,
    ) -> Self {
        Self {
            config,
            dialect,
            resolver,
        }
    }

    /// Assemble and register every statement of `definition`, then finalize its namespace.
    ///
    /// Declared queries register first, then query methods, then the CRUD statements, so an
    /// explicitly declared statement wins over a generated one with the same id.
    pub fn compile(
        &self,
        definition: &RepositoryDefinition,
        registry: &StatementRegistry,
    ) -> CompileResult<Document> {
        let assembler = Assembler::new(self.resolver, self.dialect, self.config);
        let namespace = definition.namespace.as_str();

        let mut statements = Vec::new();
        for query in &definition.queries {
            statements.push(assembler.declared_query(query)?);
        }
        for method in &definition.methods {
            statements.push(assembler.query_method(method)?);
        }
        if self.config.simple_statements {
            statements.extend(assembler.simple_statements()?);
        }

        let mut registered = 0usize;
        for statement in statements {
            if registry.register(namespace, statement) {
                registered += 1;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "mapperc.compile",
            namespace,
            entity = %self.resolver.entity().name,
            dialect = self.dialect.name(),
            registered,
            "compiled repository"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = registered;

        Ok(registry
            .finalize(namespace)
            .unwrap_or_else(|| Document::new(namespace, Vec::new())))
    }
}
