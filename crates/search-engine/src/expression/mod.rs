//! The search expression intermediate representation.
//!
//! An [`Expression`] is an immutable tree built by the request layer and lowered
//! by a backend compiler through [`ExpressionVisitor`]. Nodes never carry
//! backend state; per-compile information such as the current search parameter
//! travels in the visitor context instead.

mod fingerprint;
mod visitor;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Comparable, CompartmentType};

pub use fingerprint::{ExpressionShape, QueryFingerprint};
pub use visitor::ExpressionVisitor;

/// Synthetic parameter matching the resource's own type.
pub const TYPE_PARAMETER: &str = "_type";

/// Synthetic parameter matching the resource's own id.
pub const ID_PARAMETER: &str = "_id";

/// Comparison operators for [`BinaryExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    /// `=`
    Equal,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// `!=`
    NotEqual,
    /// `>=`
    GreaterThanOrEqual,
    /// `<=`
    LessThanOrEqual,
}

impl BinaryOperator {
    /// Every operator.
    pub const ALL: [BinaryOperator; 6] = [
        BinaryOperator::Equal,
        BinaryOperator::GreaterThan,
        BinaryOperator::LessThan,
        BinaryOperator::NotEqual,
        BinaryOperator::GreaterThanOrEqual,
        BinaryOperator::LessThanOrEqual,
    ];

    /// Returns true if `lhs.cmp(rhs) == ordering` satisfies `lhs <op> rhs`.
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            BinaryOperator::Equal => ordering == Ordering::Equal,
            BinaryOperator::GreaterThan => ordering == Ordering::Greater,
            BinaryOperator::LessThan => ordering == Ordering::Less,
            BinaryOperator::NotEqual => ordering != Ordering::Equal,
            BinaryOperator::GreaterThanOrEqual => ordering != Ordering::Less,
            BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }

    /// The infix symbol, also valid SQL.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::LessThan => "<",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThanOrEqual => "<=",
        }
    }
}

/// Operators for [`StringExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringOperator {
    /// Prefix match.
    StartsWith,
    /// Exact match.
    Equals,
    /// Substring match.
    Contains,
}

/// Operators for [`MultiaryExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiaryOperator {
    /// Every child must match.
    And,
    /// At least one child must match.
    Or,
}

/// The index field a leaf expression targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldName {
    /// Start of a date/time range.
    DateTimeStart,
    /// End of a date/time range.
    DateTimeEnd,
    /// A number.
    Number,
    /// A quantity's value.
    Quantity,
    /// A quantity's unit code.
    QuantityCode,
    /// A quantity's unit system.
    QuantitySystem,
    /// A reference's base URI.
    ReferenceBaseUri,
    /// A reference's target type.
    ReferenceResourceType,
    /// A reference's target id.
    ReferenceResourceId,
    /// A string.
    String,
    /// A token's code.
    TokenCode,
    /// A token's system.
    TokenSystem,
    /// A token's display text.
    TokenText,
    /// A URI.
    Uri,
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The kind of an expression node, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionKind {
    /// [`Expression::SearchParameter`]
    SearchParameter,
    /// [`Expression::Binary`]
    Binary,
    /// [`Expression::String`]
    String,
    /// [`Expression::Multiary`]
    Multiary,
    /// [`Expression::Not`]
    Not,
    /// [`Expression::Union`]
    Union,
    /// [`Expression::Chained`]
    Chained,
    /// [`Expression::Compartment`]
    Compartment,
    /// [`Expression::Include`]
    Include,
    /// [`Expression::MissingField`]
    MissingField,
    /// [`Expression::MissingSearchParameter`]
    MissingSearchParameter,
    /// [`Expression::In`]
    In,
    /// [`Expression::Sort`]
    Sort,
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Binds its inner expression to a named search parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParameterExpression {
    /// Parameter code.
    pub param: String,
    /// Expression evaluated against that parameter's index entries.
    pub inner: Box<Expression>,
}

/// Compares an index field with a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    /// Operator.
    pub op: BinaryOperator,
    /// Target field.
    pub field: FieldName,
    /// Component of a composite parameter, if any.
    pub component_index: Option<usize>,
    /// Right-hand operand.
    pub value: Comparable,
}

/// Matches an index field against a string literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringExpression {
    /// Operator.
    pub op: StringOperator,
    /// Target field.
    pub field: FieldName,
    /// Component of a composite parameter, if any.
    pub component_index: Option<usize>,
    /// Literal.
    pub value: String,
    /// Case-insensitive matching.
    pub ignore_case: bool,
}

/// Logical combination of children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiaryExpression {
    /// Operator.
    pub op: MultiaryOperator,
    /// Children, in order.
    pub children: Vec<Expression>,
}

/// Negation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotExpression {
    /// Negated expression.
    pub inner: Box<Expression>,
}

/// Concatenation of independently evaluated result sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionExpression {
    /// Children, in order.
    pub children: Vec<Expression>,
}

/// A forward or reverse reference hop.
///
/// `resource_types` are the types this node filters. `target_types` are the
/// types the sub-query runs against. For a forward chain `reference_param` is
/// defined on `resource_types` and points at `target_types`; for a reverse
/// chain it is defined on `target_types` and points back at `resource_types`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedExpression {
    /// Types filtered by this node.
    pub resource_types: Vec<String>,
    /// The reference parameter linking the two sides.
    pub reference_param: String,
    /// Types queried by the sub-query.
    pub target_types: Vec<String>,
    /// Reverse (`_has`) chain.
    pub reversed: bool,
    /// Filter applied to the sub-query.
    pub inner: Box<Expression>,
}

/// Restricts results to one compartment instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompartmentExpression {
    /// Compartment type.
    pub compartment_type: CompartmentType,
    /// Owner id.
    pub compartment_id: String,
}

/// Requests related resources alongside matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeExpression {
    /// Type carrying the reference.
    pub source_type: String,
    /// Reference parameter.
    pub reference_param: String,
    /// Restricts targets to one type.
    pub target_type: Option<String>,
    /// `_revinclude`
    pub reversed: bool,
    /// `:iterate`
    pub iterate: bool,
    /// `*`
    pub wildcard: bool,
}

/// Matches entries lacking a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingFieldExpression {
    /// Field that must be absent.
    pub field: FieldName,
    /// Component of a composite parameter, if any.
    pub component_index: Option<usize>,
}

/// `:missing=true|false`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingSearchParameterExpression {
    /// Parameter code.
    pub param: String,
    /// True to match resources without the parameter.
    pub is_missing: bool,
}

/// Matches a field against a set of literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InExpression {
    /// Target field.
    pub field: FieldName,
    /// Component of a composite parameter, if any.
    pub component_index: Option<usize>,
    /// Accepted values.
    pub values: BTreeSet<String>,
}

/// Orders results by a parameter field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortExpression {
    /// Parameter code.
    pub param: String,
    /// Field of that parameter to order by.
    pub field: FieldName,
    /// Descending order.
    pub descending: bool,
}

/// A node of the search expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Expression {
    /// See [`SearchParameterExpression`].
    SearchParameter(SearchParameterExpression),
    /// See [`BinaryExpression`].
    Binary(BinaryExpression),
    /// See [`StringExpression`].
    String(StringExpression),
    /// See [`MultiaryExpression`].
    Multiary(MultiaryExpression),
    /// See [`NotExpression`].
    Not(NotExpression),
    /// See [`UnionExpression`].
    Union(UnionExpression),
    /// See [`ChainedExpression`].
    Chained(ChainedExpression),
    /// See [`CompartmentExpression`].
    Compartment(CompartmentExpression),
    /// See [`IncludeExpression`].
    Include(IncludeExpression),
    /// See [`MissingFieldExpression`].
    MissingField(MissingFieldExpression),
    /// See [`MissingSearchParameterExpression`].
    MissingSearchParameter(MissingSearchParameterExpression),
    /// See [`InExpression`].
    In(InExpression),
    /// See [`SortExpression`].
    Sort(SortExpression),
}

impl Expression {
    /// Returns the node kind.
    pub fn kind(&self) -> ExpressionKind {
        match self {
            Expression::SearchParameter(_) => ExpressionKind::SearchParameter,
            Expression::Binary(_) => ExpressionKind::Binary,
            Expression::String(_) => ExpressionKind::String,
            Expression::Multiary(_) => ExpressionKind::Multiary,
            Expression::Not(_) => ExpressionKind::Not,
            Expression::Union(_) => ExpressionKind::Union,
            Expression::Chained(_) => ExpressionKind::Chained,
            Expression::Compartment(_) => ExpressionKind::Compartment,
            Expression::Include(_) => ExpressionKind::Include,
            Expression::MissingField(_) => ExpressionKind::MissingField,
            Expression::MissingSearchParameter(_) => ExpressionKind::MissingSearchParameter,
            Expression::In(_) => ExpressionKind::In,
            Expression::Sort(_) => ExpressionKind::Sort,
        }
    }

    /// Dispatches to the visitor method matching this node.
    pub fn accept<C, V>(&self, visitor: &mut V, context: &C) -> crate::SearchResult<V::Output>
    where
        V: ExpressionVisitor<C> + ?Sized,
    {
        match self {
            Expression::SearchParameter(e) => visitor.visit_search_parameter(e, context),
            Expression::Binary(e) => visitor.visit_binary(e, context),
            Expression::String(e) => visitor.visit_string(e, context),
            Expression::Multiary(e) => visitor.visit_multiary(e, context),
            Expression::Not(e) => visitor.visit_not(e, context),
            Expression::Union(e) => visitor.visit_union(e, context),
            Expression::Chained(e) => visitor.visit_chained(e, context),
            Expression::Compartment(e) => visitor.visit_compartment(e, context),
            Expression::Include(e) => visitor.visit_include(e, context),
            Expression::MissingField(e) => visitor.visit_missing_field(e, context),
            Expression::MissingSearchParameter(e) => {
                visitor.visit_missing_search_parameter(e, context)
            }
            Expression::In(e) => visitor.visit_in(e, context),
            Expression::Sort(e) => visitor.visit_sort(e, context),
        }
    }

    /// Returns true if any node of the tree is a chain.
    pub fn contains_chained(&self) -> bool {
        match self {
            Expression::Chained(_) => true,
            Expression::SearchParameter(e) => e.inner.contains_chained(),
            Expression::Not(e) => e.inner.contains_chained(),
            Expression::Multiary(e) => e.children.iter().any(Expression::contains_chained),
            Expression::Union(e) => e.children.iter().any(Expression::contains_chained),
            _ => false,
        }
    }

    // ===== constructors =====

    /// `And` over the children. An empty list matches everything.
    pub fn and(children: Vec<Expression>) -> Self {
        Expression::Multiary(MultiaryExpression {
            op: MultiaryOperator::And,
            children,
        })
    }

    /// `Or` over the children. An empty list matches nothing.
    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Multiary(MultiaryExpression {
            op: MultiaryOperator::Or,
            children,
        })
    }

    /// Negates an expression.
    pub fn not(inner: Expression) -> Self {
        Expression::Not(NotExpression {
            inner: Box::new(inner),
        })
    }

    /// Union of independently evaluated children.
    pub fn union(children: Vec<Expression>) -> Self {
        Expression::Union(UnionExpression { children })
    }

    /// Binds `inner` to a search parameter.
    pub fn search_parameter(param: impl Into<String>, inner: Expression) -> Self {
        Expression::SearchParameter(SearchParameterExpression {
            param: param.into(),
            inner: Box::new(inner),
        })
    }

    /// Compares a field with a literal.
    pub fn binary(op: BinaryOperator, field: FieldName, value: impl Into<Comparable>) -> Self {
        Expression::Binary(BinaryExpression {
            op,
            field,
            component_index: None,
            value: value.into(),
        })
    }

    /// String match with an explicit operator.
    pub fn string(
        op: StringOperator,
        field: FieldName,
        value: impl Into<String>,
        ignore_case: bool,
    ) -> Self {
        Expression::String(StringExpression {
            op,
            field,
            component_index: None,
            value: value.into(),
            ignore_case,
        })
    }

    /// Exact string match.
    pub fn string_equals(field: FieldName, value: impl Into<String>, ignore_case: bool) -> Self {
        Self::string(StringOperator::Equals, field, value, ignore_case)
    }

    /// Prefix string match.
    pub fn starts_with(field: FieldName, value: impl Into<String>, ignore_case: bool) -> Self {
        Self::string(StringOperator::StartsWith, field, value, ignore_case)
    }

    /// Substring match.
    pub fn contains(field: FieldName, value: impl Into<String>, ignore_case: bool) -> Self {
        Self::string(StringOperator::Contains, field, value, ignore_case)
    }

    /// Set membership.
    pub fn in_values<I, S>(field: FieldName, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expression::In(InExpression {
            field,
            component_index: None,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Forward chain: `resource_types` whose `reference_param` points at a
    /// `target_types` resource matching `inner`.
    pub fn chained(
        resource_types: Vec<String>,
        reference_param: impl Into<String>,
        target_types: Vec<String>,
        inner: Expression,
    ) -> Self {
        Expression::Chained(ChainedExpression {
            resource_types,
            reference_param: reference_param.into(),
            target_types,
            reversed: false,
            inner: Box::new(inner),
        })
    }

    /// Reverse chain: `resource_types` referenced through `reference_param` by a
    /// `target_types` resource matching `inner`.
    pub fn reverse_chained(
        resource_types: Vec<String>,
        reference_param: impl Into<String>,
        target_types: Vec<String>,
        inner: Expression,
    ) -> Self {
        Expression::Chained(ChainedExpression {
            resource_types,
            reference_param: reference_param.into(),
            target_types,
            reversed: true,
            inner: Box::new(inner),
        })
    }

    /// Compartment restriction.
    pub fn compartment(compartment_type: CompartmentType, compartment_id: impl Into<String>) -> Self {
        Expression::Compartment(CompartmentExpression {
            compartment_type,
            compartment_id: compartment_id.into(),
        })
    }

    /// `_include` of `source_type:reference_param[:target_type]`.
    pub fn include(
        source_type: impl Into<String>,
        reference_param: impl Into<String>,
        target_type: Option<&str>,
    ) -> Self {
        Expression::Include(IncludeExpression {
            source_type: source_type.into(),
            reference_param: reference_param.into(),
            target_type: target_type.map(String::from),
            reversed: false,
            iterate: false,
            wildcard: false,
        })
    }

    /// Field absence.
    pub fn missing_field(field: FieldName) -> Self {
        Expression::MissingField(MissingFieldExpression {
            field,
            component_index: None,
        })
    }

    /// `param:missing=is_missing`
    pub fn missing_parameter(param: impl Into<String>, is_missing: bool) -> Self {
        Expression::MissingSearchParameter(MissingSearchParameterExpression {
            param: param.into(),
            is_missing,
        })
    }

    /// Sort clause.
    pub fn sort(param: impl Into<String>, field: FieldName, descending: bool) -> Self {
        Expression::Sort(SortExpression {
            param: param.into(),
            field,
            descending,
        })
    }

    /// Targets a composite component. Nodes without a component slot are
    /// returned unchanged.
    pub fn with_component_index(mut self, index: usize) -> Self {
        match &mut self {
            Expression::Binary(e) => e.component_index = Some(index),
            Expression::String(e) => e.component_index = Some(index),
            Expression::In(e) => e.component_index = Some(index),
            Expression::MissingField(e) => e.component_index = Some(index),
            _ => {}
        }
        self
    }

    /// Separates sort clauses from the filter.
    ///
    /// Sorts are taken from the top level or from the children of a top-level
    /// `And`; sorts nested anywhere else stay in the filter.
    pub fn split_sorts(&self) -> (Option<Expression>, Vec<SortExpression>) {
        match self {
            Expression::Sort(sort) => (None, vec![sort.clone()]),
            Expression::Multiary(e) if e.op == MultiaryOperator::And => {
                let (sorts, rest): (Vec<_>, Vec<_>) = e
                    .children
                    .iter()
                    .partition(|child| matches!(child, Expression::Sort(_)));
                if sorts.is_empty() {
                    return (Some(self.clone()), Vec::new());
                }
                let sorts = sorts
                    .into_iter()
                    .filter_map(|child| match child {
                        Expression::Sort(sort) => Some(sort.clone()),
                        _ => None,
                    })
                    .collect();
                (Some(Expression::and(rest.into_iter().cloned().collect())), sorts)
            }
            other => (Some(other.clone()), Vec::new()),
        }
    }
}

fn write_field(f: &mut fmt::Formatter<'_>, field: FieldName, component: Option<usize>) -> fmt::Result {
    match component {
        Some(i) => write!(f, "{}[{}]", field, i),
        None => write!(f, "{}", field),
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, children: &[Expression]) -> fmt::Result {
    for child in children {
        write!(f, " {}", child)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::SearchParameter(e) => write!(f, "(Param {} {})", e.param, e.inner),
            Expression::Binary(e) => {
                write!(f, "({} ", e.op.symbol())?;
                write_field(f, e.field, e.component_index)?;
                write!(f, " {})", e.value)
            }
            Expression::String(e) => {
                let op = match e.op {
                    StringOperator::StartsWith => "StartsWith",
                    StringOperator::Equals => "Equals",
                    StringOperator::Contains => "Contains",
                };
                write!(f, "({} ", op)?;
                write_field(f, e.field, e.component_index)?;
                write!(f, " {:?}", e.value)?;
                if e.ignore_case {
                    f.write_str(" IgnoreCase")?;
                }
                f.write_str(")")
            }
            Expression::Multiary(e) => {
                let op = match e.op {
                    MultiaryOperator::And => "And",
                    MultiaryOperator::Or => "Or",
                };
                write!(f, "({}", op)?;
                write_children(f, &e.children)?;
                f.write_str(")")
            }
            Expression::Not(e) => write!(f, "(Not {})", e.inner),
            Expression::Union(e) => {
                f.write_str("(Union")?;
                write_children(f, &e.children)?;
                f.write_str(")")
            }
            Expression::Chained(e) => write!(
                f,
                "({} {}:{}:{} {})",
                if e.reversed { "ReverseChain" } else { "Chain" },
                e.resource_types.join(","),
                e.reference_param,
                e.target_types.join(","),
                e.inner
            ),
            Expression::Compartment(e) => {
                write!(f, "(Compartment {}/{})", e.compartment_type, e.compartment_id)
            }
            Expression::Include(e) => {
                write!(
                    f,
                    "({} {}:{}",
                    if e.reversed { "RevInclude" } else { "Include" },
                    e.source_type,
                    if e.wildcard { "*" } else { e.reference_param.as_str() }
                )?;
                if let Some(target) = &e.target_type {
                    write!(f, ":{}", target)?;
                }
                if e.iterate {
                    f.write_str(" Iterate")?;
                }
                f.write_str(")")
            }
            Expression::MissingField(e) => {
                f.write_str("(MissingField ")?;
                write_field(f, e.field, e.component_index)?;
                f.write_str(")")
            }
            Expression::MissingSearchParameter(e) => {
                write!(f, "(Missing {} {})", e.param, e.is_missing)
            }
            Expression::In(e) => {
                f.write_str("(In ")?;
                write_field(f, e.field, e.component_index)?;
                let values: Vec<&str> = e.values.iter().map(String::as_str).collect();
                write!(f, " [{}])", values.join(","))
            }
            Expression::Sort(e) => write!(
                f,
                "(Sort {} {} {})",
                e.param,
                e.field,
                if e.descending { "desc" } else { "asc" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_binary_operator_accepts() {
        use BinaryOperator::*;
        assert!(Equal.accepts(Ordering::Equal));
        assert!(!Equal.accepts(Ordering::Less));
        assert!(NotEqual.accepts(Ordering::Greater));
        assert!(GreaterThanOrEqual.accepts(Ordering::Equal));
        assert!(!GreaterThanOrEqual.accepts(Ordering::Less));
        assert!(LessThanOrEqual.accepts(Ordering::Less));
        assert!(!LessThan.accepts(Ordering::Equal));
    }

    #[test]
    fn test_display_prefix_form() {
        let expr = Expression::and(vec![
            Expression::search_parameter(
                "name",
                Expression::starts_with(FieldName::String, "Smi", true),
            ),
            Expression::search_parameter(
                "value-quantity",
                Expression::binary(
                    BinaryOperator::GreaterThan,
                    FieldName::Quantity,
                    Decimal::new(5, 0),
                ),
            ),
        ]);
        assert_eq!(
            expr.to_string(),
            "(And (Param name (StartsWith String \"Smi\" IgnoreCase)) (Param value-quantity (> Quantity 5)))"
        );
    }

    #[test]
    fn test_contains_chained() {
        let leaf = Expression::string_equals(FieldName::String, "x", false);
        assert!(!leaf.contains_chained());

        let chain = Expression::chained(
            vec!["Observation".into()],
            "subject",
            vec!["Patient".into()],
            Expression::search_parameter("name", leaf),
        );
        assert!(Expression::or(vec![Expression::not(chain)]).contains_chained());
    }

    #[test]
    fn test_with_component_index() {
        let expr = Expression::in_values(FieldName::TokenCode, ["a", "b"]).with_component_index(1);
        let Expression::In(in_expr) = &expr else {
            panic!("expected In");
        };
        assert_eq!(in_expr.component_index, Some(1));
        assert_eq!(expr.to_string(), "(In TokenCode[1] [a,b])");

        let sort = Expression::sort("date", FieldName::DateTimeStart, true);
        assert_eq!(sort.clone().with_component_index(2), sort);
    }

    #[test]
    fn test_split_sorts() {
        let filter = Expression::search_parameter("name", Expression::string_equals(FieldName::String, "x", false));
        let sort = Expression::sort("birthdate", FieldName::DateTimeStart, false);

        let (rest, sorts) = Expression::and(vec![filter.clone(), sort.clone()]).split_sorts();
        assert_eq!(rest, Some(Expression::and(vec![filter.clone()])));
        assert_eq!(sorts.len(), 1);
        assert_eq!(sorts[0].param, "birthdate");

        let (rest, sorts) = sort.split_sorts();
        assert!(rest.is_none());
        assert_eq!(sorts.len(), 1);

        let nested = Expression::or(vec![sort]);
        assert_eq!(nested.split_sorts(), (Some(nested.clone()), vec![]));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ExpressionKind::MissingSearchParameter.to_string(), "MissingSearchParameter");
        assert_eq!(
            Expression::compartment(CompartmentType::Patient, "p1").kind(),
            ExpressionKind::Compartment
        );
    }
}
