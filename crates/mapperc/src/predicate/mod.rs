//! Predicates: chains of fragment groups combined with AND / OR.
//!
//! A [`Predicate`] is produced by the [`PredicateCompiler`] (one property, one operator),
//! chained by the method builder or by [`Criteria`], and finally rendered inside a WHERE
//! clause. Each node remembers the optional joins ("connectors") its property path needs.

mod compiler;
mod criteria;

#[cfg(test)]
mod tests;

pub use compiler::{IgnoreCase, Operator, PredicateCompiler};
pub use criteria::Criteria;

use std::collections::BTreeSet;
use std::fmt;

use crate::fragment::{Conditional, Fragment};

/// Link between two chained predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn keyword(self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One node of a predicate chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    body: Vec<Fragment>,
    link: Option<(Conjunction, Box<Predicate>)>,
    connectors: BTreeSet<String>,
    test: Option<String>,
}

impl Predicate {
    pub fn new(body: Vec<Fragment>) -> Self {
        Self {
            body,
            link: None,
            connectors: BTreeSet::new(),
            test: None,
        }
    }

    pub fn with_connectors<I, S>(mut self, connectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connectors.extend(connectors.into_iter().map(Into::into));
        self
    }

    /// Include this node only when `test` holds at execution time.
    pub fn guarded(mut self, test: impl Into<String>) -> Self {
        let test = test.into();
        self.test = (!test.trim().is_empty()).then_some(test);
        self
    }

    pub fn body(&self) -> &[Fragment] {
        &self.body
    }

    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }

    /// Connectors of this node only.
    pub fn connectors(&self) -> &BTreeSet<String> {
        &self.connectors
    }

    pub fn link(&self) -> Option<(Conjunction, &Predicate)> {
        self.link.as_ref().map(|(c, p)| (*c, p.as_ref()))
    }

    /// Append `next` at the end of the chain.
    pub fn chain(mut self, conjunction: Conjunction, next: Predicate) -> Self {
        self.link = Some(match self.link.take() {
            Some((c, tail)) => (c, Box::new((*tail).chain(conjunction, next))),
            None => (conjunction, Box::new(next)),
        });
        self
    }

    pub fn and(self, next: Predicate) -> Self {
        self.chain(Conjunction::And, next)
    }

    pub fn or(self, next: Predicate) -> Self {
        self.chain(Conjunction::Or, next)
    }

    /// Nodes of the chain with the conjunction linking each to its predecessor.
    pub fn nodes(&self) -> Vec<(Option<Conjunction>, &Predicate)> {
        let mut nodes = vec![(None, self)];
        let mut current = self;
        while let Some((conjunction, next)) = current.link() {
            nodes.push((Some(conjunction), next));
            current = next;
        }
        nodes
    }

    /// Union of the connectors of every node in the chain.
    pub fn all_connectors(&self) -> BTreeSet<String> {
        let mut all = self.connectors.clone();
        if let Some((_, next)) = self.link() {
            all.extend(next.all_connectors());
        }
        all
    }

    /// Whether any node is guarded, so the chain must sit inside `<where>` (or a trimming
    /// tag) for the engine to strip a dangling leading conjunction.
    pub fn needs_wrapping(&self) -> bool {
        self.nodes().iter().any(|(_, node)| node.test.is_some())
    }

    /// The chain as a flat fragment sequence.
    ///
    /// Each node renders parenthesized; guarded nodes carry their leading conjunction inside
    /// the `<if>` so an excluded node takes its keyword with it.
    pub fn to_fragment(&self) -> Fragment {
        let mut parts = Vec::new();
        for (conjunction, node) in self.nodes() {
            let body = node.grouped_body();
            match (&node.test, conjunction) {
                (Some(test), conjunction) => {
                    let mut inner = Vec::with_capacity(2);
                    if let Some(c) = conjunction {
                        inner.push(Fragment::literal(c.keyword()));
                    }
                    inner.push(body);
                    parts.push(Fragment::If(Conditional {
                        test: test.clone(),
                        body: inner,
                    }));
                }
                (None, Some(c)) => {
                    parts.push(Fragment::literal(c.keyword()));
                    parts.push(body);
                }
                (None, None) => parts.push(body),
            }
        }
        Fragment::group(parts)
    }

    pub fn render(&self) -> String {
        self.to_fragment().render()
    }

    fn grouped_body(&self) -> Fragment {
        match self.body.as_slice() {
            [single @ (Fragment::Paren(_) | Fragment::Trim(_))] => single.clone(),
            body => Fragment::paren(body.to_vec()),
        }
    }
}
