//! Complete mapper statements and their rendering.
//!
//! A [`Statement`] wraps a fragment body with its identifier, parameter type and database
//! id, plus statements derived from it (the count companion of a paged select). The
//! [`Assembler`] builds statements from query methods, declared queries and entity metadata.

mod assembler;

#[cfg(test)]
mod tests;

pub use assembler::{Assembler, COLUMNS_ID, RESULT_MAP_ID, SORT_ITEM, statement_id};

use serde::Deserialize;

use crate::fragment::Fragment;
use crate::fragment::xml::{attr, escape_attr, escape_text};

/// Attributes shared by every statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementMeta {
    /// Unique within the namespace.
    pub id: String,
    pub database_id: Option<String>,
    pub parameter_type: Option<String>,
}

impl StatementMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            database_id: None,
            parameter_type: None,
        }
    }

    pub fn database_id(mut self, database_id: Option<&str>) -> Self {
        self.database_id = database_id.map(str::to_string);
        self
    }

    pub fn parameter_type(mut self, parameter_type: Option<&str>) -> Self {
        self.parameter_type = parameter_type.map(str::to_string);
        self
    }
}

/// Statement kind of a declared query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    /// Kind implied by the leading keyword of `query`.
    ///
    /// ```
    /// use mapperc::statement::QueryKind;
    ///
    /// assert_eq!(QueryKind::detect("  with x as (select 1) select * from x"), Some(QueryKind::Select));
    /// assert_eq!(QueryKind::detect("MERGE INTO t_user ..."), Some(QueryKind::Update));
    /// assert_eq!(QueryKind::detect("CALL refresh()"), None);
    /// ```
    pub fn detect(query: &str) -> Option<Self> {
        let start = query.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        let keyword: String = start
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => Some(Self::Select),
            "INSERT" => Some(Self::Insert),
            "UPDATE" | "MERGE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// How a select maps its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultKind {
    /// `resultMap="..."`
    Map(String),
    /// `resultType="..."`
    Type(String),
}

/// Generated-key strategy of an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Identity column read back through `useGeneratedKeys`.
    Generated { property: String, column: String },
    /// Value fetched before the insert with `<selectKey>`.
    SelectKey {
        property: String,
        result_type: Option<String>,
        query: String,
    },
}

/// One `<id>`/`<result>` line of a result map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMapping {
    pub property: String,
    pub column: String,
    pub java_type: Option<String>,
    pub jdbc_type: Option<String>,
    pub type_handler: Option<String>,
    pub id: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Select {
        result: Option<ResultKind>,
        body: Fragment,
    },
    Insert {
        key: Option<KeyStrategy>,
        body: Fragment,
    },
    Update {
        body: Fragment,
    },
    Delete {
        body: Fragment,
    },
    /// Reusable `<sql>` fragment.
    Fragment {
        body: Fragment,
    },
    ResultMap {
        type_name: String,
        mappings: Vec<ResultMapping>,
    },
    /// A statement that could not be compiled; rendered as a comment.
    Placeholder {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub meta: StatementMeta,
    pub kind: StatementKind,
    pub derived: Vec<Statement>,
}

impl Statement {
    pub fn new(meta: StatementMeta, kind: StatementKind) -> Self {
        Self {
            meta,
            kind,
            derived: Vec::new(),
        }
    }

    pub fn placeholder(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            StatementMeta::new(id),
            StatementKind::Placeholder {
                reason: reason.into(),
            },
        )
    }

    pub fn with_derived(mut self, statement: Statement) -> Self {
        self.derived.push(statement);
        self
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, StatementKind::Placeholder { .. })
    }

    /// The fragment body, for kinds that have one.
    pub fn body(&self) -> Option<&Fragment> {
        match &self.kind {
            StatementKind::Select { body, .. }
            | StatementKind::Insert { body, .. }
            | StatementKind::Update { body }
            | StatementKind::Delete { body }
            | StatementKind::Fragment { body } => Some(body),
            StatementKind::ResultMap { .. } | StatementKind::Placeholder { .. } => None,
        }
    }

    /// This statement followed by its derived statements, depth-first.
    pub fn flatten(&self) -> Vec<&Statement> {
        let mut out = vec![self];
        for derived in &self.derived {
            out.extend(derived.flatten());
        }
        out
    }

    /// Render this statement alone, without derived statements.
    pub fn render(&self) -> String {
        let meta = &self.meta;
        match &self.kind {
            StatementKind::Select { result, body } => {
                let mut open = String::from("<select");
                attr(&mut open, "id", Some(&meta.id));
                match result {
                    Some(ResultKind::Map(map)) => attr(&mut open, "resultMap", Some(map)),
                    Some(ResultKind::Type(ty)) => attr(&mut open, "resultType", Some(ty)),
                    None => {}
                }
                self.common_attrs(&mut open);
                element(open, "select", &body.render())
            }
            StatementKind::Insert { key, body } => {
                let mut open = String::from("<insert");
                attr(&mut open, "id", Some(&meta.id));
                self.common_attrs(&mut open);
                let mut inner = String::new();
                match key {
                    Some(KeyStrategy::Generated { property, column }) => {
                        attr(&mut open, "useGeneratedKeys", Some("true"));
                        attr(&mut open, "keyProperty", Some(property));
                        attr(&mut open, "keyColumn", Some(column));
                    }
                    Some(KeyStrategy::SelectKey {
                        property,
                        result_type,
                        query,
                    }) => {
                        inner.push_str("<selectKey");
                        attr(&mut inner, "keyProperty", Some(property));
                        attr(&mut inner, "resultType", result_type.as_deref());
                        attr(&mut inner, "order", Some("BEFORE"));
                        inner.push('>');
                        inner.push_str(&escape_text(query));
                        inner.push_str("</selectKey> ");
                    }
                    None => {}
                }
                inner.push_str(&body.render());
                element(open, "insert", &inner)
            }
            StatementKind::Update { body } => {
                let mut open = String::from("<update");
                attr(&mut open, "id", Some(&meta.id));
                self.common_attrs(&mut open);
                element(open, "update", &body.render())
            }
            StatementKind::Delete { body } => {
                let mut open = String::from("<delete");
                attr(&mut open, "id", Some(&meta.id));
                self.common_attrs(&mut open);
                element(open, "delete", &body.render())
            }
            StatementKind::Fragment { body } => {
                let mut open = String::from("<sql");
                attr(&mut open, "id", Some(&meta.id));
                attr(&mut open, "databaseId", meta.database_id.as_deref());
                element(open, "sql", &body.render())
            }
            StatementKind::ResultMap {
                type_name,
                mappings,
            } => {
                let mut out = String::from("<resultMap");
                attr(&mut out, "id", Some(&meta.id));
                attr(&mut out, "type", Some(type_name));
                out.push('>');
                for m in mappings {
                    out.push_str(if m.id { "<id" } else { "<result" });
                    attr(&mut out, "property", Some(&m.property));
                    attr(&mut out, "column", Some(&m.column));
                    attr(&mut out, "javaType", m.java_type.as_deref());
                    attr(&mut out, "jdbcType", m.jdbc_type.as_deref());
                    attr(&mut out, "typeHandler", m.type_handler.as_deref());
                    out.push_str("/>");
                }
                out.push_str("</resultMap>");
                out
            }
            StatementKind::Placeholder { reason } => format!(
                "<!-- {}: {} -->",
                escape_attr(&meta.id),
                reason.replace("--", "- -")
            ),
        }
    }

    fn common_attrs(&self, open: &mut String) {
        attr(open, "parameterType", self.meta.parameter_type.as_deref());
        attr(open, "databaseId", self.meta.database_id.as_deref());
    }
}

fn element(mut open: String, tag: &str, body: &str) -> String {
    open.push('>');
    open.push_str(body);
    open.push_str("</");
    open.push_str(tag);
    open.push('>');
    open
}
