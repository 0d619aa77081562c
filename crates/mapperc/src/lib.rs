//! # mapperc
//!
//! Compiles repository query descriptions into dialect-aware dynamic SQL mapper documents.
//!
//! ## Features
//!
//! - **Derived queries**: `findDistinctFirst3ByNameLikeAndAgeGreaterThanOrderByAgeDesc` becomes a
//!   predicate chain, joins, ordering and pagination
//! - **Declared queries**: `:name`, `?1`, `:#{expr}` placeholders, `LIKE %:x%` and `IN :xs`
//!   are rewritten into placeholders, binds and `<foreach>` lists
//! - **Dialects**: LIMIT/OFFSET, OFFSET/FETCH, ROW_NUMBER, ROWNUM and TOP pagination
//! - **No string interpolation**: every value goes through `#{...}`; dynamic sorts are
//!   whitelisted with `<choose>`
//! - **Preview**: resolve any compiled template against JSON parameters to see the final SQL
//!
//! ## Example
//!
//! ```
//! use mapperc::{CompilerConfig, DatabaseFamily, Fragment, PagingRequest};
//! use mapperc::metadata::{EntityDescriptor, EntityModel, PropertyDescriptor, PropertyType};
//! use mapperc::predicate::{IgnoreCase, Operator, PredicateCompiler};
//!
//! let user = EntityModel::new(EntityDescriptor::new("User", "t_user").alias("u"))
//!     .with_property(PropertyDescriptor::new("age", "age", PropertyType::Integer).not_null());
//! let dialect = DatabaseFamily::H2.dialect();
//! let config = CompilerConfig::new();
//!
//! let compiler = PredicateCompiler::new(&user, dialect.as_ref(), &config);
//! let adults = compiler.compile("age", Operator::GreaterThanEqual, IgnoreCase::Never, &["age".into()])?;
//! assert_eq!(adults.render(), "(u.age >= #{age})");
//!
//! let select = Fragment::group(vec![
//!     Fragment::literal("SELECT * FROM t_user u WHERE"),
//!     adults.to_fragment(),
//! ]);
//! let paged = dialect.paginate(select.into(), &PagingRequest::fixed(0, 10))?;
//! assert_eq!(paged.render(), "SELECT * FROM t_user u WHERE (u.age >= #{age}) LIMIT 10");
//! # Ok::<(), mapperc::CompileError>(())
//! ```

pub mod binding;
pub mod compile;
pub mod config;
pub mod dialect;
pub mod error;
pub mod fragment;
pub mod metadata;
pub mod method;
pub mod predicate;
pub mod preview;
pub mod registry;
pub mod statement;

#[cfg(test)]
mod fixtures;

pub use compile::{DeclaredQuery, QueryMethod, RepositoryCompiler, RepositoryDefinition};
pub use config::{CompilerConfig, LikeBinding};
pub use dialect::{DatabaseFamily, Dialect, PagedSelect, PagingRequest, Pagination};
pub use error::{CompileError, CompileResult};
pub use fragment::Fragment;
pub use metadata::{EntityModel, EntityResolver};
pub use predicate::{Predicate, PredicateCompiler};
pub use preview::{Preview, Previewer};
pub use registry::{Document, StatementRegistry};
pub use statement::{Assembler, Statement};
