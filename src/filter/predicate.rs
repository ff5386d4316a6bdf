//! Compiled filter predicates and their evaluation

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::types::{Packet, PacketKind};

/// Packet field a text term inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    From,
    To,
    /// Either `from` or `to`
    Call,
    Text,
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchOp {
    Exact,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expr {
    All,
    Kinds(BTreeSet<PacketKind>),
    Match { field: Field, op: MatchOp, values: Vec<String> },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub(crate) fn eval(&self, packet: &Packet) -> bool {
        match self {
            Expr::All => true,
            Expr::Kinds(kinds) => kinds.contains(&packet.kind()),
            Expr::Match { field, op, values } => {
                values.iter().any(|value| field_matches(*field, *op, value, packet))
            }
            Expr::Not(inner) => !inner.eval(packet),
            Expr::And(terms) => terms.iter().all(|t| t.eval(packet)),
            Expr::Or(terms) => terms.iter().any(|t| t.eval(packet)),
        }
    }
}

fn field_matches(field: Field, op: MatchOp, value: &str, packet: &Packet) -> bool {
    let test = |candidate: &str| match op {
        MatchOp::Exact => candidate.eq_ignore_ascii_case(value),
        MatchOp::Contains => contains_ignore_ascii_case(candidate, value),
    };

    match field {
        Field::From => test(packet.source.as_str()),
        Field::To => test(packet.addressee()),
        Field::Call => test(packet.source.as_str()) || test(packet.addressee()),
        Field::Text => test(packet.payload.text()),
        Field::Path => packet.path.iter().any(|hop| test(hop)),
    }
}

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let (haystack, needle) = (haystack.as_bytes(), needle.as_bytes());
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window.eq_ignore_ascii_case(needle))
}

/// A compiled, immutable filter.
///
/// Cheap to clone and safe to evaluate from any number of threads at once;
/// evaluation has no hidden state. Replacing the active filter means swapping
/// in a different `FilterPredicate`, never editing one.
#[derive(Clone)]
pub struct FilterPredicate {
    expression: Arc<str>,
    root: Arc<Expr>,
}

impl FilterPredicate {
    pub(crate) fn new(expression: &str, root: Expr) -> Self {
        Self { expression: Arc::from(expression.trim()), root: Arc::new(root) }
    }

    /// The predicate that admits every packet.
    pub fn match_all() -> Self {
        Self::new("", Expr::All)
    }

    /// Whether the packet satisfies this predicate.
    pub fn matches(&self, packet: &Packet) -> bool {
        self.root.eval(packet)
    }

    /// The source expression this predicate was compiled from.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether this predicate admits every packet.
    pub fn is_match_all(&self) -> bool {
        matches!(*self.root, Expr::All)
    }
}

impl Default for FilterPredicate {
    fn default() -> Self {
        Self::match_all()
    }
}

impl fmt::Debug for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterPredicate").field("expression", &self.expression).finish()
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expression.is_empty() { f.write_str("*") } else { f.write_str(&self.expression) }
    }
}

impl PartialEq for FilterPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}
