//! Statement registry and mapper documents.
//!
//! The registry is the only shared state of the compiler. Namespaces live in a map behind an
//! `RwLock`; each namespace has its own `Mutex`, so registrations into different namespaces
//! never contend. Registration is insert-if-absent: the first statement with a given id wins
//! and later ones are dropped with a `DuplicateStatement` warning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use crate::fragment::Fragment;
use crate::fragment::xml::escape_attr;
use crate::statement::{Statement, StatementKind};

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const DOCTYPE: &str = r#"<!DOCTYPE mapper PUBLIC "-//mybatis.org//DTD Mapper 3.0//EN" "https://mybatis.org/dtd/mybatis-3-mapper.dtd">"#;

type Namespace = Arc<Mutex<Vec<Statement>>>;

/// Statements registered per namespace, in registration order.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static StatementRegistry {
        static GLOBAL: OnceLock<StatementRegistry> = OnceLock::new();
        GLOBAL.get_or_init(StatementRegistry::new)
    }

    fn namespace(&self, namespace: &str) -> Namespace {
        {
            let namespaces = self.namespaces.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = namespaces.get(namespace) {
                return Arc::clone(slot);
            }
        }
        let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(namespaces.entry(namespace.to_string()).or_default())
    }

    /// Register `statement` under `namespace` unless one of its ids is already taken.
    ///
    /// Returns whether the statement was added. Derived statements count: a paged select
    /// whose count id collides with an existing statement is dropped as a whole.
    pub fn register(&self, namespace: &str, statement: Statement) -> bool {
        let slot = self.namespace(namespace);
        let mut statements = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let taken = statement.flatten().into_iter().find_map(|candidate| {
            statements
                .iter()
                .flat_map(Statement::flatten)
                .any(|existing| existing.id() == candidate.id())
                .then(|| candidate.id().to_string())
        });
        if let Some(id) = taken {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                target: "mapperc.registry",
                namespace,
                id = %id,
                "DuplicateStatement: keeping the first registration"
            );
            #[cfg(not(feature = "tracing"))]
            let _ = id;
            return false;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "mapperc.registry", namespace, id = statement.id(), "registered statement");
        statements.push(statement);
        true
    }

    /// Snapshot of `namespace`, or `None` if nothing was ever registered there.
    pub fn finalize(&self, namespace: &str) -> Option<Document> {
        let slot = {
            let namespaces = self.namespaces.read().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(namespaces.get(namespace)?)
        };
        let statements = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Some(Document::new(namespace, statements))
    }

    /// Registered namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let namespaces = self.namespaces.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = namespaces.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A finalized mapper document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub namespace: String,
    pub statements: Vec<Statement>,
}

impl Document {
    pub fn new(namespace: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            namespace: namespace.into(),
            statements,
        }
    }

    /// Every statement, derived ones right after their parent.
    pub fn all(&self) -> Vec<&Statement> {
        self.statements.iter().flat_map(Statement::flatten).collect()
    }

    /// Look up a statement (derived ones included) by id.
    pub fn statement(&self, id: &str) -> Option<&Statement> {
        self.all().into_iter().find(|s| s.id() == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.all().into_iter().map(|s| s.id().to_string()).collect()
    }

    /// `<sql>` fragments by id, for resolving `<include>`.
    pub fn fragments(&self) -> Vec<(String, Fragment)> {
        self.all()
            .into_iter()
            .filter_map(|s| match &s.kind {
                StatementKind::Fragment { body } => Some((s.id().to_string(), body.clone())),
                _ => None,
            })
            .collect()
    }

    /// The mapper XML document.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(XML_HEADER);
        out.push('\n');
        out.push_str(DOCTYPE);
        out.push('\n');
        out.push_str(&format!(
            "<mapper namespace=\"{}\">\n",
            escape_attr(&self.namespace)
        ));
        for statement in self.all() {
            out.push_str("  ");
            out.push_str(&statement.render());
            out.push('\n');
        }
        out.push_str("</mapper>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::statement::StatementMeta;
    use pretty_assertions::assert_eq;

    fn select(id: &str, sql: &str) -> Statement {
        Statement::new(
            StatementMeta::new(id),
            StatementKind::Select {
                result: None,
                body: Fragment::literal(sql),
            },
        )
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = StatementRegistry::new();
        let first = registry.register("UserMapper", select("findAll", "SELECT 1"));
        let second = registry.register("UserMapper", select("findAll", "SELECT 2"));
        assert_eq!((first, second), (true, false));

        let document = registry.finalize("UserMapper").unwrap();
        assert_eq!(document.statements.len(), 1);
        assert_eq!(document.statements[0].render(), r#"<select id="findAll">SELECT 1</select>"#);
    }

    #[test]
    fn derived_ids_take_part_in_duplicate_checks() {
        let registry = StatementRegistry::new();
        let paged = select("findAll", "SELECT 1").with_derived(select("findAll__count", "SELECT 2"));
        assert!(registry.register("UserMapper", paged));
        assert!(!registry.register("UserMapper", select("findAll__count", "SELECT 3")));
        assert_eq!(
            registry.finalize("UserMapper").unwrap().ids(),
            vec!["findAll".to_string(), "findAll__count".to_string()]
        );
    }

    #[test]
    fn unknown_namespace_finalizes_to_none() {
        assert!(StatementRegistry::new().finalize("Nope").is_none());
    }

    #[test]
    fn namespaces_are_independent() {
        let registry = Arc::new(StatementRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let namespace = format!("Mapper{}", i % 2);
                    registry.register(&namespace, select(&format!("s{i}"), "SELECT 1"))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(registry.namespaces(), vec!["Mapper0", "Mapper1"]);
        assert_eq!(registry.finalize("Mapper0").unwrap().statements.len(), 4);
    }

    #[test]
    fn concurrent_duplicates_keep_one_winner() {
        let registry = Arc::new(StatementRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.register("UserMapper", select("findAll", &format!("SELECT {i}")))
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.finalize("UserMapper").unwrap().statements.len(), 1);
    }

    #[test]
    fn document_renders_one_statement_per_line() {
        let document = Document::new(
            "com.example.UserMapper",
            vec![
                select("findAll", "SELECT * FROM t_user")
                    .with_derived(select("findAll__count", "SELECT COUNT(*) FROM t_user")),
                Statement::placeholder("findByLocationNear", "unsupported: Near"),
            ],
        );
        let expected = format!(
            "{XML_HEADER}\n{DOCTYPE}\n<mapper namespace=\"com.example.UserMapper\">\n  \
             <select id=\"findAll\">SELECT * FROM t_user</select>\n  \
             <select id=\"findAll__count\">SELECT COUNT(*) FROM t_user</select>\n  \
             <!-- findByLocationNear: unsupported: Near -->\n\
             </mapper>\n"
        );
        assert_eq!(document.render(), expected);
    }

    #[test]
    fn global_registry_is_shared() {
        let a = StatementRegistry::global() as *const StatementRegistry;
        let b = StatementRegistry::global() as *const StatementRegistry;
        assert_eq!(a, b);
    }
}
