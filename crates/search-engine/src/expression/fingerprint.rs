//! Value-insensitive equality and hashing, and query fingerprints.
//!
//! Two expressions with the same shape but different literal values compare
//! equal and hash identically here. Literals are the operands of `Binary`,
//! `String` and `In` nodes and compartment ids; everything else, including
//! operators, fields and parameter names, is part of the shape.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::{Expression, ExpressionKind};

impl Expression {
    /// Structural equality ignoring literal values.
    pub fn value_insensitive_eq(&self, other: &Expression) -> bool {
        match (self, other) {
            (Expression::SearchParameter(a), Expression::SearchParameter(b)) => {
                a.param == b.param && a.inner.value_insensitive_eq(&b.inner)
            }
            (Expression::Binary(a), Expression::Binary(b)) => {
                a.op == b.op && a.field == b.field && a.component_index == b.component_index
            }
            (Expression::String(a), Expression::String(b)) => {
                a.op == b.op
                    && a.field == b.field
                    && a.component_index == b.component_index
                    && a.ignore_case == b.ignore_case
            }
            (Expression::Multiary(a), Expression::Multiary(b)) => {
                a.op == b.op && children_eq(&a.children, &b.children)
            }
            (Expression::Not(a), Expression::Not(b)) => a.inner.value_insensitive_eq(&b.inner),
            (Expression::Union(a), Expression::Union(b)) => {
                children_eq(&a.children, &b.children)
            }
            (Expression::Chained(a), Expression::Chained(b)) => {
                a.resource_types == b.resource_types
                    && a.reference_param == b.reference_param
                    && a.target_types == b.target_types
                    && a.reversed == b.reversed
                    && a.inner.value_insensitive_eq(&b.inner)
            }
            (Expression::Compartment(a), Expression::Compartment(b)) => {
                a.compartment_type == b.compartment_type
            }
            (Expression::Include(a), Expression::Include(b)) => a == b,
            (Expression::MissingField(a), Expression::MissingField(b)) => a == b,
            (Expression::MissingSearchParameter(a), Expression::MissingSearchParameter(b)) => {
                a == b
            }
            (Expression::In(a), Expression::In(b)) => {
                a.field == b.field && a.component_index == b.component_index
            }
            (Expression::Sort(a), Expression::Sort(b)) => a == b,
            _ => false,
        }
    }

    /// Hash consistent with [`Expression::value_insensitive_eq`].
    pub fn value_insensitive_hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Expression::SearchParameter(e) => {
                e.param.hash(state);
                e.inner.value_insensitive_hash(state);
            }
            Expression::Binary(e) => {
                e.op.hash(state);
                e.field.hash(state);
                e.component_index.hash(state);
            }
            Expression::String(e) => {
                e.op.hash(state);
                e.field.hash(state);
                e.component_index.hash(state);
                e.ignore_case.hash(state);
            }
            Expression::Multiary(e) => {
                e.op.hash(state);
                hash_children(&e.children, state);
            }
            Expression::Not(e) => e.inner.value_insensitive_hash(state),
            Expression::Union(e) => hash_children(&e.children, state),
            Expression::Chained(e) => {
                e.resource_types.hash(state);
                e.reference_param.hash(state);
                e.target_types.hash(state);
                e.reversed.hash(state);
                e.inner.value_insensitive_hash(state);
            }
            Expression::Compartment(e) => e.compartment_type.hash(state),
            Expression::Include(e) => {
                e.source_type.hash(state);
                e.reference_param.hash(state);
                e.target_type.hash(state);
                e.reversed.hash(state);
                e.iterate.hash(state);
                e.wildcard.hash(state);
            }
            Expression::MissingField(e) => {
                e.field.hash(state);
                e.component_index.hash(state);
            }
            Expression::MissingSearchParameter(e) => {
                e.param.hash(state);
                e.is_missing.hash(state);
            }
            Expression::In(e) => {
                e.field.hash(state);
                e.component_index.hash(state);
            }
            Expression::Sort(e) => {
                e.param.hash(state);
                e.field.hash(state);
                e.descending.hash(state);
            }
        }
    }
}

fn children_eq(a: &[Expression], b: &[Expression]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.value_insensitive_eq(y))
}

fn hash_children<H: Hasher>(children: &[Expression], state: &mut H) {
    children.len().hash(state);
    for child in children {
        child.value_insensitive_hash(state);
    }
}

/// Borrowed expression keyed by shape, for use in hash maps and sets.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionShape<'a>(pub &'a Expression);

impl PartialEq for ExpressionShape<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.value_insensitive_eq(other.0)
    }
}

impl Eq for ExpressionShape<'_> {}

impl Hash for ExpressionShape<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.value_insensitive_hash(state);
    }
}

/// Stable identifier of a query's shape, the key of the plan-cache selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryFingerprint(pub u64);

impl QueryFingerprint {
    /// Fingerprints a query over `resource_types` with an optional filter.
    pub fn compute(resource_types: &[String], filter: Option<&Expression>) -> Self {
        let mut hasher = DefaultHasher::new();
        resource_types.hash(&mut hasher);
        match filter {
            Some(expr) => expr.value_insensitive_hash(&mut hasher),
            None => ExpressionKind::Multiary.hash(&mut hasher),
        }
        QueryFingerprint(hasher.finish())
    }

    /// Adds a further structural component, such as a sort clause or page size.
    pub fn combine(self, component: impl Hash) -> Self {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        component.hash(&mut hasher);
        QueryFingerprint(hasher.finish())
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for QueryFingerprint {
    fn from(value: u64) -> Self {
        QueryFingerprint(value)
    }
}
