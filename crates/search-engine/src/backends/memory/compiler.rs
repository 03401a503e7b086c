//! Reference compiler from [`Expression`] to an in-memory [`Predicate`].
//!
//! Predicates work on positions in the input slice. Every child of a logical
//! node is evaluated against the same original input and the resulting
//! position sets are combined, so `And` is an intersection and `Or` a union
//! rather than a sequential narrowing.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::SearchResult;
use crate::expression::{
    BinaryExpression, Expression, ExpressionVisitor, FieldName, MultiaryExpression,
    MultiaryOperator, NotExpression, SearchParameterExpression, StringExpression, StringOperator,
    TYPE_PARAMETER,
};
use crate::types::{ComparisonVisitor, IndexedResource, SearchValue};

type Matcher = dyn Fn(&[IndexedResource]) -> BTreeSet<usize> + Send + Sync;

/// A compiled filter over a slice of indexed resources.
#[derive(Clone)]
pub struct Predicate {
    matcher: Arc<Matcher>,
}

impl Predicate {
    fn new<F>(matcher: F) -> Self
    where
        F: Fn(&[IndexedResource]) -> BTreeSet<usize> + Send + Sync + 'static,
    {
        Self {
            matcher: Arc::new(matcher),
        }
    }

    fn per_resource<F>(test: F) -> Self
    where
        F: Fn(&IndexedResource) -> bool + Send + Sync + 'static,
    {
        Self::new(move |input| {
            input
                .iter()
                .enumerate()
                .filter(|(_, resource)| test(resource))
                .map(|(i, _)| i)
                .collect()
        })
    }

    /// Matches every resource.
    pub fn match_all() -> Self {
        Self::new(|input| (0..input.len()).collect())
    }

    /// Matches no resource.
    pub fn match_none() -> Self {
        Self::new(|_| BTreeSet::new())
    }

    /// Positions in `input` that match.
    pub fn matching_indices(&self, input: &[IndexedResource]) -> BTreeSet<usize> {
        (self.matcher)(input)
    }

    /// The matching resources, in input order.
    pub fn apply<'r>(&self, input: &'r [IndexedResource]) -> Vec<&'r IndexedResource> {
        self.matching_indices(input)
            .into_iter()
            .map(|i| &input[i])
            .collect()
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").finish_non_exhaustive()
    }
}

/// Context threaded through compilation.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    /// The search parameter leaf nodes apply to.
    pub parameter_name: Option<String>,
}

impl MemoryContext {
    /// A context bound to `parameter_name`.
    pub fn for_parameter(parameter_name: impl Into<String>) -> Self {
        Self {
            parameter_name: Some(parameter_name.into()),
        }
    }
}

/// Compiles expressions for the in-memory reference backend.
///
/// Chains, compartments, includes, unions, sorts, `In` and missing-value
/// nodes have no in-memory semantics and fail to compile.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryExpressionCompiler;

impl MemoryExpressionCompiler {
    /// Creates a compiler.
    pub fn new() -> Self {
        Self
    }

    /// Compiles `expression` with an unbound context.
    pub fn compile(&mut self, expression: &Expression) -> SearchResult<Predicate> {
        expression.accept(self, &MemoryContext::default())
    }
}

/// Values of `value` a leaf compares against: the whole value, or the values of
/// one component of a composite.
fn leaf_values(value: &SearchValue, component_index: Option<usize>) -> Vec<&SearchValue> {
    match (component_index, value) {
        (None, _) => vec![value],
        (Some(i), SearchValue::Composite(c)) => {
            c.components.get(i).map(|v| v.iter().collect()).unwrap_or_default()
        }
        (Some(_), _) => Vec::new(),
    }
}

/// The text a string expression sees on a value, if any.
fn text_of(value: &SearchValue, field: FieldName) -> Option<&str> {
    match value {
        SearchValue::String(s) => Some(&s.text),
        SearchValue::Token(t) => match field {
            FieldName::TokenSystem => t.system.as_deref(),
            FieldName::TokenText => t.text.as_deref(),
            _ => t.code.as_deref(),
        },
        SearchValue::Uri(u) => Some(&u.value),
        SearchValue::Reference(r) => match field {
            FieldName::ReferenceResourceType => r.resource_type.as_deref(),
            FieldName::ReferenceBaseUri => r.base_uri.as_deref(),
            _ => Some(&r.resource_id),
        },
        _ => None,
    }
}

fn string_matches(op: StringOperator, candidate: &str, value: &str, ignore_case: bool) -> bool {
    let (candidate, value) = if ignore_case {
        (candidate.to_lowercase(), value.to_lowercase())
    } else {
        (candidate.to_string(), value.to_string())
    };
    match op {
        StringOperator::Equals => candidate == value,
        StringOperator::StartsWith => candidate.starts_with(&value),
        StringOperator::Contains => candidate.contains(&value),
    }
}

impl ExpressionVisitor<MemoryContext> for MemoryExpressionCompiler {
    type Output = Predicate;

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    fn visit_search_parameter(
        &mut self,
        expr: &SearchParameterExpression,
        _context: &MemoryContext,
    ) -> SearchResult<Predicate> {
        expr.inner
            .accept(self, &MemoryContext::for_parameter(expr.param.clone()))
    }

    fn visit_binary(
        &mut self,
        expr: &BinaryExpression,
        context: &MemoryContext,
    ) -> SearchResult<Predicate> {
        let Some(param) = context.parameter_name.clone() else {
            return Ok(Predicate::match_none());
        };
        let op = expr.op;
        let operand = expr.value.clone();
        let component_index = expr.component_index;

        Ok(Predicate::per_resource(move |resource| {
            resource.entries_for(&param).any(|entry| {
                leaf_values(&entry.value, component_index)
                    .into_iter()
                    .any(|value| ComparisonVisitor::matches(op, &operand, value))
            })
        }))
    }

    fn visit_string(
        &mut self,
        expr: &StringExpression,
        context: &MemoryContext,
    ) -> SearchResult<Predicate> {
        let Some(param) = context.parameter_name.clone() else {
            return Ok(Predicate::match_none());
        };
        let StringExpression {
            op,
            field,
            component_index,
            ignore_case,
            ..
        } = *expr;
        let value = expr.value.clone();

        if param == TYPE_PARAMETER {
            return Ok(Predicate::per_resource(move |resource| {
                string_matches(op, &resource.location.resource_type, &value, ignore_case)
            }));
        }

        Ok(Predicate::per_resource(move |resource| {
            resource.entries_for(&param).any(|entry| {
                leaf_values(&entry.value, component_index)
                    .into_iter()
                    .filter_map(|v| text_of(v, field))
                    .any(|text| string_matches(op, text, &value, ignore_case))
            })
        }))
    }

    fn visit_multiary(
        &mut self,
        expr: &MultiaryExpression,
        context: &MemoryContext,
    ) -> SearchResult<Predicate> {
        let children = expr
            .children
            .iter()
            .map(|child| child.accept(self, context))
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(match expr.op {
            MultiaryOperator::And => Predicate::new(move |input| {
                let mut matched: BTreeSet<usize> = (0..input.len()).collect();
                for child in &children {
                    let child_matches = child.matching_indices(input);
                    matched.retain(|i| child_matches.contains(i));
                }
                matched
            }),
            MultiaryOperator::Or => Predicate::new(move |input| {
                children
                    .iter()
                    .flat_map(|child| child.matching_indices(input))
                    .collect()
            }),
        })
    }

    fn visit_not(&mut self, expr: &NotExpression, context: &MemoryContext) -> SearchResult<Predicate> {
        let inner = expr.inner.accept(self, context)?;
        Ok(Predicate::new(move |input| {
            let excluded = inner.matching_indices(input);
            (0..input.len()).filter(|i| !excluded.contains(i)).collect()
        }))
    }
}
