//! Database dialects.
//!
//! A [`Dialect`] answers the few questions the compiler needs about the target database:
//! boolean literals, case folding, string concatenation, LIKE escaping, regex matching,
//! sequences, and pagination. [`DatabaseFamily`] enumerates the supported families and
//! builds their dialect; nothing is registered globally, the dialect is always passed in.
//!
//! ```
//! use mapperc::dialect::{DatabaseFamily, PagingRequest};
//! use mapperc::fragment::Fragment;
//!
//! let dialect = DatabaseFamily::H2.dialect();
//! let select = Fragment::literal("SELECT * FROM t_user").into();
//! let paged = dialect.paginate(select, &PagingRequest::fixed(10, 5))?;
//! assert_eq!(paged.render(), "SELECT * FROM t_user LIMIT 5 OFFSET 10");
//! # Ok::<(), mapperc::CompileError>(())
//! ```

mod pagination;


pub use pagination::{NEUTRAL_ORDER, OFFSET_END_BIND, PageExpr, PagedSelect, Pagination, PagingRequest};

use std::fmt;
use std::str::FromStr;

use crate::error::{CompileError, CompileResult};
use crate::fragment::Fragment;

/// Database capabilities consumed by the compiler.
pub trait Dialect: fmt::Debug + Send + Sync {
    fn family(&self) -> DatabaseFamily;

    /// Human readable name used in diagnostics.
    fn name(&self) -> &'static str {
        self.family().name()
    }

    /// `databaseId` attribute for emitted statements.
    fn database_id(&self) -> Option<&'static str> {
        self.family().database_id()
    }

    /// Whether `TRUE`/`FALSE` literals exist; otherwise `1`/`0` are used.
    fn supports_boolean(&self) -> bool {
        true
    }

    fn lowercase_function(&self) -> &'static str {
        "LOWER"
    }

    /// Variadic concat function, or `None` to use [`Dialect::concat_operator`].
    fn concat_function(&self) -> Option<&'static str> {
        None
    }

    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Concatenate string-valued fragments.
    fn concat(&self, parts: Vec<Fragment>) -> CompileResult<Fragment> {
        if let Some(function) = self.concat_function() {
            return Fragment::function(function, parts);
        }
        let mut body = Vec::with_capacity(parts.len() * 2);
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                body.push(Fragment::literal(self.concat_operator()));
            }
            body.push(part);
        }
        Ok(Fragment::paren(body))
    }

    /// `ESCAPE '<c>'` clause for LIKE predicates.
    fn like_escape(&self, escape: char) -> String {
        if escape == '\'' {
            return "ESCAPE ''''".to_string();
        }
        format!("ESCAPE '{escape}'")
    }

    /// Infix regex match operator, if the database has one.
    fn regex_operator(&self) -> Option<&'static str> {
        None
    }

    fn pagination(&self) -> Pagination;

    /// Apply the dialect's pagination idiom to `select`.
    fn paginate(&self, select: PagedSelect, request: &PagingRequest) -> CompileResult<Fragment> {
        self.pagination()
            .wrap(select, request)
            .map_err(|err| match err {
                CompileError::UnsupportedPagination { reason, .. } => {
                    CompileError::pagination(self.name(), reason)
                }
                other => other,
            })
    }

    /// Query returning the next value of `sequence`, if sequences are supported.
    fn sequence_next_value(&self, _sequence: &str) -> Option<String> {
        None
    }

    /// Whether identity / auto-increment key generation is available.
    fn identity_supported(&self) -> bool {
        true
    }
}

/// Supported database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatabaseFamily {
    #[default]
    H2,
    Hsqldb,
    Postgres,
    Sqlite,
    MariaDb,
    MySql,
    /// SQL Server 2012 and later.
    SqlServer,
    SqlServer2005,
    /// Oracle 12c and later.
    Oracle,
    OracleLegacy,
    Db2,
    Derby,
    Sybase,
    /// Anything else; pagination is unavailable.
    Generic,
}

impl DatabaseFamily {
    pub const ALL: [DatabaseFamily; 14] = [
        DatabaseFamily::H2,
        DatabaseFamily::Hsqldb,
        DatabaseFamily::Postgres,
        DatabaseFamily::Sqlite,
        DatabaseFamily::MariaDb,
        DatabaseFamily::MySql,
        DatabaseFamily::SqlServer,
        DatabaseFamily::SqlServer2005,
        DatabaseFamily::Oracle,
        DatabaseFamily::OracleLegacy,
        DatabaseFamily::Db2,
        DatabaseFamily::Derby,
        DatabaseFamily::Sybase,
        DatabaseFamily::Generic,
    ];

    pub fn dialect(self) -> Box<dyn Dialect> {
        Box::new(FamilyDialect { family: self })
    }

    pub fn name(self) -> &'static str {
        match self {
            DatabaseFamily::H2 => "h2",
            DatabaseFamily::Hsqldb => "hsqldb",
            DatabaseFamily::Postgres => "postgres",
            DatabaseFamily::Sqlite => "sqlite",
            DatabaseFamily::MariaDb => "mariadb",
            DatabaseFamily::MySql => "mysql",
            DatabaseFamily::SqlServer => "sqlserver",
            DatabaseFamily::SqlServer2005 => "sqlserver2005",
            DatabaseFamily::Oracle => "oracle",
            DatabaseFamily::OracleLegacy => "oracle-legacy",
            DatabaseFamily::Db2 => "db2",
            DatabaseFamily::Derby => "derby",
            DatabaseFamily::Sybase => "sybase",
            DatabaseFamily::Generic => "generic",
        }
    }

    pub fn database_id(self) -> Option<&'static str> {
        let id = match self {
            DatabaseFamily::H2 => "h2",
            DatabaseFamily::Hsqldb => "hsql",
            DatabaseFamily::Postgres => "postgresql",
            DatabaseFamily::Sqlite => "sqlite",
            DatabaseFamily::MariaDb => "mariadb",
            DatabaseFamily::MySql => "mysql",
            DatabaseFamily::SqlServer | DatabaseFamily::SqlServer2005 => "sqlserver",
            DatabaseFamily::Oracle | DatabaseFamily::OracleLegacy => "oracle",
            DatabaseFamily::Db2 => "db2",
            DatabaseFamily::Derby => "derby",
            DatabaseFamily::Sybase => "sybase",
            DatabaseFamily::Generic => return None,
        };
        Some(id)
    }
}

impl fmt::Display for DatabaseFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let family = match s.trim().to_ascii_lowercase().as_str() {
            "h2" => DatabaseFamily::H2,
            "hsql" | "hsqldb" => DatabaseFamily::Hsqldb,
            "postgres" | "postgresql" | "pg" => DatabaseFamily::Postgres,
            "sqlite" => DatabaseFamily::Sqlite,
            "mariadb" => DatabaseFamily::MariaDb,
            "mysql" => DatabaseFamily::MySql,
            "sqlserver" | "mssql" => DatabaseFamily::SqlServer,
            "sqlserver2005" => DatabaseFamily::SqlServer2005,
            "oracle" => DatabaseFamily::Oracle,
            "oracle-legacy" | "oracle11" => DatabaseFamily::OracleLegacy,
            "db2" => DatabaseFamily::Db2,
            "derby" => DatabaseFamily::Derby,
            "sybase" => DatabaseFamily::Sybase,
            "generic" => DatabaseFamily::Generic,
            other => return Err(format!("unknown database family '{other}'")),
        };
        Ok(family)
    }
}

/// Dialect backed by a [`DatabaseFamily`] capability table.
#[derive(Debug, Clone, Copy)]
struct FamilyDialect {
    family: DatabaseFamily,
}

impl Dialect for FamilyDialect {
    fn family(&self) -> DatabaseFamily {
        self.family
    }

    fn supports_boolean(&self) -> bool {
        !matches!(
            self.family,
            DatabaseFamily::SqlServer
                | DatabaseFamily::SqlServer2005
                | DatabaseFamily::Oracle
                | DatabaseFamily::OracleLegacy
                | DatabaseFamily::Db2
                | DatabaseFamily::Sybase
        )
    }

    fn concat_function(&self) -> Option<&'static str> {
        match self.family {
            DatabaseFamily::MySql
            | DatabaseFamily::MariaDb
            | DatabaseFamily::SqlServer
            | DatabaseFamily::SqlServer2005 => Some("CONCAT"),
            _ => None,
        }
    }

    fn concat_operator(&self) -> &'static str {
        match self.family {
            DatabaseFamily::Sybase => "+",
            _ => "||",
        }
    }

    fn like_escape(&self, escape: char) -> String {
        match (self.family, escape) {
            (DatabaseFamily::MySql | DatabaseFamily::MariaDb, '\\') => "ESCAPE '\\\\'".to_string(),
            (_, '\'') => "ESCAPE ''''".to_string(),
            (_, c) => format!("ESCAPE '{c}'"),
        }
    }

    fn regex_operator(&self) -> Option<&'static str> {
        match self.family {
            DatabaseFamily::Postgres => Some("~"),
            DatabaseFamily::MySql
            | DatabaseFamily::MariaDb
            | DatabaseFamily::H2
            | DatabaseFamily::Sqlite => Some("REGEXP"),
            _ => None,
        }
    }

    fn pagination(&self) -> Pagination {
        match self.family {
            DatabaseFamily::H2
            | DatabaseFamily::Hsqldb
            | DatabaseFamily::Postgres
            | DatabaseFamily::Sqlite
            | DatabaseFamily::MariaDb => Pagination::LimitOffset,
            DatabaseFamily::MySql => Pagination::MySqlLimit,
            DatabaseFamily::Oracle | DatabaseFamily::Db2 | DatabaseFamily::Derby => {
                Pagination::OffsetFetch
            }
            DatabaseFamily::SqlServer => Pagination::SqlServerOffsetFetch,
            DatabaseFamily::SqlServer2005 => Pagination::RowNumber,
            DatabaseFamily::OracleLegacy => Pagination::RowNum,
            DatabaseFamily::Sybase => Pagination::Top,
            DatabaseFamily::Generic => Pagination::Unsupported,
        }
    }

    fn sequence_next_value(&self, sequence: &str) -> Option<String> {
        let query = match self.family {
            DatabaseFamily::Postgres => format!("SELECT nextval('{sequence}')"),
            DatabaseFamily::Oracle | DatabaseFamily::OracleLegacy => {
                format!("SELECT {sequence}.NEXTVAL FROM DUAL")
            }
            DatabaseFamily::H2
            | DatabaseFamily::SqlServer
            | DatabaseFamily::MariaDb => format!("SELECT NEXT VALUE FOR {sequence}"),
            DatabaseFamily::Hsqldb => {
                format!("CALL NEXT VALUE FOR {sequence}")
            }
            DatabaseFamily::Db2 | DatabaseFamily::Derby => {
                format!("VALUES NEXT VALUE FOR {sequence}")
            }
            DatabaseFamily::MySql
            | DatabaseFamily::Sqlite
            | DatabaseFamily::SqlServer2005
            | DatabaseFamily::Sybase
            | DatabaseFamily::Generic => return None,
        };
        Some(query)
    }

    fn identity_supported(&self) -> bool {
        !matches!(self.family, DatabaseFamily::OracleLegacy)
    }
}
