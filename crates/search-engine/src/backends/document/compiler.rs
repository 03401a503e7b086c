//! Elasticsearch Query DSL compiler.
//!
//! Index entries live in the nested `search_params` array of each document.
//! A [`SearchParameterExpression`] becomes a `nested` query that pins
//! `search_params.name`; leaves below it query fields of that nested object.
//! Composite components live one level deeper, under
//! `search_params.components`.

use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};

use crate::error::SearchResult;
use crate::expression::{
    BinaryExpression, BinaryOperator, CompartmentExpression, Expression, ExpressionVisitor,
    FieldName, ID_PARAMETER, InExpression, MissingFieldExpression,
    MissingSearchParameterExpression, MultiaryExpression, MultiaryOperator, NotExpression,
    SearchParameterExpression, StringExpression, StringOperator, TYPE_PARAMETER, UnionExpression,
};
use crate::types::Comparable;

/// Nested path of index entries.
pub const SEARCH_PARAMS_PATH: &str = "search_params";

/// Nested path of composite components.
pub const COMPONENTS_PATH: &str = "search_params.components";

/// The field name of `field` inside an index entry.
pub fn field_key(field: FieldName) -> &'static str {
    match field {
        FieldName::DateTimeStart => "date_start",
        FieldName::DateTimeEnd => "date_end",
        FieldName::Number => "number",
        FieldName::Quantity => "quantity",
        FieldName::QuantityCode => "quantity_code",
        FieldName::QuantitySystem => "quantity_system",
        FieldName::ReferenceBaseUri => "reference_base",
        FieldName::ReferenceResourceType => "reference_type",
        FieldName::ReferenceResourceId => "reference_id",
        FieldName::String => "string",
        FieldName::TokenCode => "token_code",
        FieldName::TokenSystem => "token_system",
        FieldName::TokenText => "token_text",
        FieldName::Uri => "uri",
    }
}

/// What leaf nodes query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentScope {
    /// Outside any search parameter. Leaves match nothing.
    Root,
    /// Inside the `search_params` nested query.
    Entry,
    /// A top-level document field (`_type`, `_id`).
    Field(&'static str),
}

/// Compiles expressions into Query DSL JSON.
///
/// Documents have no joins, so chained expressions must be resolved before
/// compiling. Include nodes are not filters and sorts are emitted by the planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentQueryCompiler;

impl DocumentQueryCompiler {
    /// Creates a compiler.
    pub fn new() -> Self {
        Self
    }

    /// Compiles `expression` into a query clause.
    pub fn compile(&mut self, expression: &Expression) -> SearchResult<Value> {
        expression.accept(self, &DocumentScope::Root)
    }
}

pub(crate) fn match_all() -> Value {
    json!({ "match_all": {} })
}

fn match_none() -> Value {
    json!({ "match_none": {} })
}

fn comparable_json(value: &Comparable) -> Value {
    match value {
        Comparable::Decimal(d) => d.to_f64().map(Value::from).unwrap_or(Value::Null),
        Comparable::DateTime(dt) => json!(dt.to_rfc3339()),
        Comparable::String(s) => json!(s),
    }
}

/// Escapes wildcard query metacharacters.
fn wildcard_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn binary_clause(path: &str, op: BinaryOperator, value: Value) -> Value {
    let range_op = match op {
        BinaryOperator::Equal => return json!({ "term": { path: value } }),
        BinaryOperator::NotEqual => {
            return json!({ "bool": { "must_not": [{ "term": { path: value } }] } });
        }
        BinaryOperator::GreaterThan => "gt",
        BinaryOperator::GreaterThanOrEqual => "gte",
        BinaryOperator::LessThan => "lt",
        BinaryOperator::LessThanOrEqual => "lte",
    };
    json!({ "range": { path: { range_op: value } } })
}

fn string_clause(path: &str, op: StringOperator, value: &str, ignore_case: bool) -> Value {
    match op {
        StringOperator::Equals => json!({
            "term": { path: { "value": value, "case_insensitive": ignore_case } }
        }),
        StringOperator::StartsWith => json!({
            "prefix": { path: { "value": value, "case_insensitive": ignore_case } }
        }),
        StringOperator::Contains => json!({
            "wildcard": {
                path: {
                    "value": format!("*{}*", wildcard_escape(value)),
                    "case_insensitive": ignore_case
                }
            }
        }),
    }
}

/// Applies `clause_for(path)` to the entry field, or to a component of it.
fn entry_leaf<F>(field: FieldName, component_index: Option<usize>, clause_for: F) -> Value
where
    F: FnOnce(&str) -> Value,
{
    let key = field_key(field);
    match component_index {
        None => clause_for(&format!("{SEARCH_PARAMS_PATH}.{key}")),
        Some(index) => json!({
            "nested": {
                "path": COMPONENTS_PATH,
                "query": {
                    "bool": {
                        "must": [
                            { "term": { format!("{COMPONENTS_PATH}.component_index"): index } },
                            clause_for(&format!("{COMPONENTS_PATH}.{key}"))
                        ]
                    }
                }
            }
        }),
    }
}

fn leaf<F>(scope: DocumentScope, field: FieldName, component_index: Option<usize>, clause_for: F) -> Value
where
    F: FnOnce(&str) -> Value,
{
    match scope {
        DocumentScope::Root => match_none(),
        DocumentScope::Field(name) => clause_for(name),
        DocumentScope::Entry => entry_leaf(field, component_index, clause_for),
    }
}

fn parameter_query(param: &str, condition: Value) -> Value {
    json!({
        "nested": {
            "path": SEARCH_PARAMS_PATH,
            "query": {
                "bool": {
                    "must": [
                        { "term": { format!("{SEARCH_PARAMS_PATH}.name"): param } },
                        condition
                    ]
                }
            }
        }
    })
}

impl ExpressionVisitor<DocumentScope> for DocumentQueryCompiler {
    type Output = Value;

    fn backend_name(&self) -> &'static str {
        "document"
    }

    fn visit_search_parameter(
        &mut self,
        expr: &SearchParameterExpression,
        _scope: &DocumentScope,
    ) -> SearchResult<Value> {
        match expr.param.as_str() {
            TYPE_PARAMETER => expr.inner.accept(self, &DocumentScope::Field("resource_type")),
            ID_PARAMETER => expr.inner.accept(self, &DocumentScope::Field("resource_id")),
            param => Ok(parameter_query(
                param,
                expr.inner.accept(self, &DocumentScope::Entry)?,
            )),
        }
    }

    fn visit_binary(&mut self, expr: &BinaryExpression, scope: &DocumentScope) -> SearchResult<Value> {
        let value = comparable_json(&expr.value);
        Ok(leaf(*scope, expr.field, expr.component_index, |path| {
            binary_clause(path, expr.op, value)
        }))
    }

    fn visit_string(&mut self, expr: &StringExpression, scope: &DocumentScope) -> SearchResult<Value> {
        Ok(leaf(*scope, expr.field, expr.component_index, |path| {
            string_clause(path, expr.op, &expr.value, expr.ignore_case)
        }))
    }

    fn visit_multiary(&mut self, expr: &MultiaryExpression, scope: &DocumentScope) -> SearchResult<Value> {
        let clauses = expr
            .children
            .iter()
            .map(|child| child.accept(self, scope))
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(match (expr.op, clauses.is_empty()) {
            (MultiaryOperator::And, true) => match_all(),
            (MultiaryOperator::Or, true) => match_none(),
            (MultiaryOperator::And, false) => json!({ "bool": { "must": clauses } }),
            (MultiaryOperator::Or, false) => json!({
                "bool": { "should": clauses, "minimum_should_match": 1 }
            }),
        })
    }

    fn visit_not(&mut self, expr: &NotExpression, scope: &DocumentScope) -> SearchResult<Value> {
        let inner = expr.inner.accept(self, scope)?;
        Ok(json!({ "bool": { "must_not": [inner] } }))
    }

    fn visit_union(&mut self, expr: &UnionExpression, scope: &DocumentScope) -> SearchResult<Value> {
        let clauses = expr
            .children
            .iter()
            .map(|child| child.accept(self, scope))
            .collect::<SearchResult<Vec<_>>>()?;
        if clauses.is_empty() {
            return Ok(match_none());
        }
        Ok(json!({ "bool": { "should": clauses, "minimum_should_match": 1 } }))
    }

    fn visit_compartment(
        &mut self,
        expr: &CompartmentExpression,
        _scope: &DocumentScope,
    ) -> SearchResult<Value> {
        let field = format!("compartments.{}", expr.compartment_type.resource_type());
        Ok(json!({ "term": { field: expr.compartment_id } }))
    }

    fn visit_missing_field(
        &mut self,
        expr: &MissingFieldExpression,
        scope: &DocumentScope,
    ) -> SearchResult<Value> {
        if *scope != DocumentScope::Entry {
            return Ok(match_none());
        }
        let present = entry_leaf(expr.field, expr.component_index, |path| {
            json!({ "exists": { "field": path } })
        });
        Ok(json!({ "bool": { "must_not": [present] } }))
    }

    fn visit_missing_search_parameter(
        &mut self,
        expr: &MissingSearchParameterExpression,
        _scope: &DocumentScope,
    ) -> SearchResult<Value> {
        let present = parameter_query(&expr.param, match_all());
        Ok(if expr.is_missing {
            json!({ "bool": { "must_not": [present] } })
        } else {
            present
        })
    }

    fn visit_in(&mut self, expr: &InExpression, scope: &DocumentScope) -> SearchResult<Value> {
        if expr.values.is_empty() {
            return Ok(match_none());
        }
        Ok(leaf(*scope, expr.field, expr.component_index, |path| {
            json!({ "terms": { path: expr.values } })
        }))
    }
}
