//! Lowers [`Expression`] trees to SQL `WHERE` predicates.
//!
//! A predicate is compiled against a resource alias bound to a row of
//! `resources`. A [`SearchParameterExpression`] opens a correlated `EXISTS`
//! over that resource's `search_index` rows, and the leaves below it are
//! predicates on that one row:
//!
//! ```text
//! (Param name (StartsWith String "Smi" IgnoreCase))
//!
//! EXISTS (SELECT 1 FROM search_index si1
//!         WHERE si1.resource_type = r.resource_type AND si1.resource_id = r.id
//!           AND si1.param_name = ? AND (si1.value_string LIKE ? ESCAPE '\'))
//! ```
//!
//! Negations and disjunctions below a parameter are taken over whole
//! resources instead, so `(Param name (Not ...))` becomes `NOT (EXISTS ...)`.
//! `_type` and `_id` read the resource row itself. Chains become nested
//! correlated subqueries.

use rust_decimal::prelude::ToPrimitive;

use crate::error::SearchResult;
use crate::expression::{
    BinaryExpression, ChainedExpression, CompartmentExpression, Expression, ExpressionVisitor,
    FieldName, ID_PARAMETER, InExpression, MissingFieldExpression,
    MissingSearchParameterExpression, MultiaryExpression, MultiaryOperator, NotExpression,
    SearchParameterExpression, StringExpression, StringOperator, TYPE_PARAMETER, UnionExpression,
};
use crate::types::Comparable;

use super::fragment::{SqlFragment, SqlParam};
use super::schema::{column_for, date_text};

/// What leaf nodes are compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlScope {
    /// Outside any search parameter. Leaves match nothing.
    Resource,
    /// A `search_index` row under the given alias.
    IndexRow(String),
    /// A column of the resource row (`_type`, `_id`).
    ResourceColumn(&'static str),
}

/// Context threaded through compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlContext {
    /// Alias of the `resources` row being filtered.
    pub resource_alias: String,
    /// Where leaves read their values.
    pub scope: SqlScope,
}

impl SqlContext {
    /// A resource-scoped context for `resource_alias`.
    pub fn resource(resource_alias: impl Into<String>) -> Self {
        Self {
            resource_alias: resource_alias.into(),
            scope: SqlScope::Resource,
        }
    }

    fn with_scope(&self, scope: SqlScope) -> Self {
        Self {
            resource_alias: self.resource_alias.clone(),
            scope,
        }
    }
}

/// Compiles expressions into SQLite predicates.
///
/// Include nodes are not filters and fail to compile; sort nodes are turned
/// into `ORDER BY` by the planner before compilation.
#[derive(Debug, Default)]
pub struct SqlExpressionCompiler {
    aliases: usize,
}

impl SqlExpressionCompiler {
    /// Creates a compiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `expression` as a predicate over the `resources` row `resource_alias`.
    pub fn compile(&mut self, expression: &Expression, resource_alias: &str) -> SearchResult<SqlFragment> {
        expression.accept(self, &SqlContext::resource(resource_alias))
    }

    fn alias(&mut self, prefix: &str) -> String {
        self.aliases += 1;
        format!("{}{}", prefix, self.aliases)
    }

    /// `EXISTS` over the index rows of `param` for the context's resource,
    /// with `predicate` built against the new row alias.
    fn index_exists<F>(&mut self, context: &SqlContext, param: &str, predicate: F) -> SearchResult<SqlFragment>
    where
        F: FnOnce(&mut Self, &SqlContext) -> SearchResult<SqlFragment>,
    {
        let si = self.alias("si");
        let r = &context.resource_alias;
        let mut sql = SqlFragment::new(format!(
            "EXISTS (SELECT 1 FROM search_index {si} WHERE {si}.resource_type = {r}.resource_type \
             AND {si}.resource_id = {r}.id AND {si}.param_name = "
        ));
        sql.push_param(SqlParam::string(param));
        let inner = predicate(self, &context.with_scope(SqlScope::IndexRow(si)))?;
        sql.push_sql(" AND (").push_fragment(inner).push_sql("))");
        Ok(sql)
    }

    /// Compiles `inner` under `param` as a predicate over the resource.
    ///
    /// Leaves and conjunctions of leaves share one index row, so a token's system
    /// and code must come from the same value. `Not` and `Or` combine the
    /// resource-level results of their children: `Not` keeps resources with no
    /// matching row at all, including those without any `param` row.
    fn parameter_predicate(
        &mut self,
        context: &SqlContext,
        param: &str,
        inner: &Expression,
    ) -> SearchResult<SqlFragment> {
        match inner {
            Expression::Not(not) => Ok(self.parameter_predicate(context, param, &not.inner)?.negate()),
            Expression::Multiary(multiary) => match multiary.op {
                MultiaryOperator::Or => {
                    let children = multiary
                        .children
                        .iter()
                        .map(|child| self.parameter_predicate(context, param, child))
                        .collect::<SearchResult<Vec<_>>>()?;
                    Ok(SqlFragment::any(children))
                }
                MultiaryOperator::And => {
                    let (row_local, combined): (Vec<&Expression>, Vec<&Expression>) =
                        multiary.children.iter().partition(|child| is_row_local(child));
                    let mut parts = Vec::new();
                    if !row_local.is_empty() {
                        parts.push(self.index_exists(context, param, |compiler, row_context| {
                            let predicates = row_local
                                .iter()
                                .map(|child| child.accept(compiler, row_context))
                                .collect::<SearchResult<Vec<_>>>()?;
                            Ok(SqlFragment::all(predicates))
                        })?);
                    }
                    for child in combined {
                        parts.push(self.parameter_predicate(context, param, child)?);
                    }
                    Ok(SqlFragment::all(parts))
                }
            },
            other => self.index_exists(context, param, |compiler, row_context| {
                other.accept(compiler, row_context)
            }),
        }
    }

    /// Wraps a column predicate so it applies to one component of the
    /// composite entry `row` belongs to.
    fn on_component<F>(&mut self, row: &str, component_index: Option<usize>, column_predicate: F) -> SqlFragment
    where
        F: FnOnce(&str) -> SqlFragment,
    {
        let Some(index) = component_index else {
            return column_predicate(row);
        };
        let c = self.alias("c");
        let mut sql = SqlFragment::new(format!(
            "EXISTS (SELECT 1 FROM search_index {c} WHERE {c}.resource_type = {row}.resource_type \
             AND {c}.resource_id = {row}.resource_id AND {c}.param_name = {row}.param_name \
             AND {c}.entry_index = {row}.entry_index AND {c}.component_index = "
        ));
        sql.push_param(SqlParam::integer(index as i64));
        sql.push_sql(" AND (")
            .push_fragment(column_predicate(&c))
            .push_sql("))");
        sql
    }

    /// Builds a leaf predicate over the column `field` maps to in the current scope.
    fn leaf<F>(
        &mut self,
        context: &SqlContext,
        field: FieldName,
        component_index: Option<usize>,
        predicate: F,
    ) -> SqlFragment
    where
        F: FnOnce(&str) -> SqlFragment,
    {
        match &context.scope {
            SqlScope::Resource => SqlFragment::never(),
            SqlScope::ResourceColumn(column) => {
                predicate(&format!("{}.{}", context.resource_alias, column))
            }
            SqlScope::IndexRow(row) => {
                let column = column_for(field);
                self.on_component(row, component_index, |alias| {
                    predicate(&format!("{alias}.{column}"))
                })
            }
        }
    }
}

/// Leaves that read a single index row.
fn is_row_local(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Binary(_) | Expression::String(_) | Expression::In(_) | Expression::MissingField(_)
    )
}

fn comparable_param(value: &Comparable) -> SqlParam {
    match value {
        Comparable::Decimal(d) => d.to_f64().map(SqlParam::Float).unwrap_or(SqlParam::Null),
        Comparable::DateTime(dt) => SqlParam::String(date_text(dt)),
        Comparable::String(s) => SqlParam::String(s.clone()),
    }
}

/// Escapes LIKE wildcards with `\`.
fn like_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn string_predicate(column: &str, op: StringOperator, value: &str, ignore_case: bool) -> SqlFragment {
    let mut sql = SqlFragment::new(column);
    match (op, ignore_case) {
        (StringOperator::Equals, false) => {
            sql.push_sql(" = ").push_param(SqlParam::string(value));
        }
        (StringOperator::Equals, true) => {
            sql.push_sql(" = ")
                .push_param(SqlParam::string(value))
                .push_sql(" COLLATE NOCASE");
        }
        (StringOperator::StartsWith, false) => {
            sql = SqlFragment::new(format!("instr({column}, "));
            sql.push_param(SqlParam::string(value)).push_sql(") = 1");
        }
        (StringOperator::Contains, false) => {
            sql = SqlFragment::new(format!("instr({column}, "));
            sql.push_param(SqlParam::string(value)).push_sql(") > 0");
        }
        (StringOperator::StartsWith, true) => {
            sql.push_sql(" LIKE ")
                .push_param(SqlParam::string(format!("{}%", like_escape(value))))
                .push_sql(" ESCAPE '\\'");
        }
        (StringOperator::Contains, true) => {
            sql.push_sql(" LIKE ")
                .push_param(SqlParam::string(format!("%{}%", like_escape(value))))
                .push_sql(" ESCAPE '\\'");
        }
    }
    sql
}

impl ExpressionVisitor<SqlContext> for SqlExpressionCompiler {
    type Output = SqlFragment;

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn visit_search_parameter(
        &mut self,
        expr: &SearchParameterExpression,
        context: &SqlContext,
    ) -> SearchResult<SqlFragment> {
        match expr.param.as_str() {
            TYPE_PARAMETER => expr
                .inner
                .accept(self, &context.with_scope(SqlScope::ResourceColumn("resource_type"))),
            ID_PARAMETER => expr
                .inner
                .accept(self, &context.with_scope(SqlScope::ResourceColumn("id"))),
            param => self.parameter_predicate(context, param, &expr.inner),
        }
    }

    fn visit_binary(&mut self, expr: &BinaryExpression, context: &SqlContext) -> SearchResult<SqlFragment> {
        let param = comparable_param(&expr.value);
        Ok(self.leaf(context, expr.field, expr.component_index, |column| {
            let mut sql = SqlFragment::new(format!("{column} {} ", expr.op.symbol()));
            sql.push_param(param);
            sql
        }))
    }

    fn visit_string(&mut self, expr: &StringExpression, context: &SqlContext) -> SearchResult<SqlFragment> {
        Ok(self.leaf(context, expr.field, expr.component_index, |column| {
            string_predicate(column, expr.op, &expr.value, expr.ignore_case)
        }))
    }

    fn visit_multiary(
        &mut self,
        expr: &MultiaryExpression,
        context: &SqlContext,
    ) -> SearchResult<SqlFragment> {
        let children = expr
            .children
            .iter()
            .map(|child| child.accept(self, context))
            .collect::<SearchResult<Vec<_>>>()?;
        Ok(match expr.op {
            MultiaryOperator::And => SqlFragment::all(children),
            MultiaryOperator::Or => SqlFragment::any(children),
        })
    }

    fn visit_not(&mut self, expr: &NotExpression, context: &SqlContext) -> SearchResult<SqlFragment> {
        Ok(expr.inner.accept(self, context)?.negate())
    }

    fn visit_union(&mut self, expr: &UnionExpression, context: &SqlContext) -> SearchResult<SqlFragment> {
        let children = expr
            .children
            .iter()
            .map(|child| child.accept(self, context))
            .collect::<SearchResult<Vec<_>>>()?;
        Ok(SqlFragment::any(children))
    }

    fn visit_chained(
        &mut self,
        expr: &ChainedExpression,
        context: &SqlContext,
    ) -> SearchResult<SqlFragment> {
        let r = context.resource_alias.clone();
        let mut parts = Vec::new();
        if !expr.resource_types.is_empty() {
            let mut scope = SqlFragment::new(format!("{r}.resource_type IN "));
            scope.push_list(expr.resource_types.iter().map(SqlParam::string));
            parts.push(scope);
        }

        let si = self.alias("si");
        let target = self.alias("r");
        let inner = expr.inner.accept(self, &SqlContext::resource(target.clone()))?;

        let mut sql = if expr.reversed {
            // resources of target_types pointing at r through reference_param
            let mut sql = SqlFragment::new(format!(
                "EXISTS (SELECT 1 FROM resources {target} JOIN search_index {si} \
                 ON {si}.resource_type = {target}.resource_type AND {si}.resource_id = {target}.id \
                 WHERE {si}.param_name = "
            ));
            sql.push_param(SqlParam::string(&expr.reference_param));
            sql.push_sql(&format!(
                " AND {si}.value_reference_type = {r}.resource_type AND {si}.value_reference_id = {r}.id"
            ));
            if !expr.target_types.is_empty() {
                sql.push_sql(&format!(" AND {target}.resource_type IN "))
                    .push_list(expr.target_types.iter().map(SqlParam::string));
            }
            sql
        } else {
            // r's reference_param values pointing at a target_types resource
            let mut sql = SqlFragment::new(format!(
                "EXISTS (SELECT 1 FROM search_index {si} JOIN resources {target} \
                 ON {target}.resource_type = {si}.value_reference_type AND {target}.id = {si}.value_reference_id \
                 WHERE {si}.resource_type = {r}.resource_type AND {si}.resource_id = {r}.id \
                 AND {si}.param_name = "
            ));
            sql.push_param(SqlParam::string(&expr.reference_param));
            if !expr.target_types.is_empty() {
                sql.push_sql(&format!(" AND {target}.resource_type IN "))
                    .push_list(expr.target_types.iter().map(SqlParam::string));
            }
            sql
        };
        sql.push_sql(" AND (").push_fragment(inner).push_sql("))");
        parts.push(sql);

        Ok(SqlFragment::all(parts))
    }

    fn visit_compartment(
        &mut self,
        expr: &CompartmentExpression,
        context: &SqlContext,
    ) -> SearchResult<SqlFragment> {
        let ca = self.alias("ca");
        let r = &context.resource_alias;
        let mut sql = SqlFragment::new(format!(
            "EXISTS (SELECT 1 FROM compartment_assignment {ca} WHERE {ca}.resource_type = {r}.resource_type \
             AND {ca}.resource_id = {r}.id AND {ca}.compartment_type = "
        ));
        sql.push_param(SqlParam::string(expr.compartment_type.resource_type()))
            .push_sql(&format!(" AND {ca}.compartment_id = "))
            .push_param(SqlParam::string(&expr.compartment_id))
            .push_sql(")");
        Ok(sql)
    }

    fn visit_missing_field(
        &mut self,
        expr: &MissingFieldExpression,
        context: &SqlContext,
    ) -> SearchResult<SqlFragment> {
        let SqlScope::IndexRow(row) = &context.scope else {
            return Ok(SqlFragment::never());
        };
        let column = column_for(expr.field);
        let row = row.clone();
        if expr.component_index.is_none() {
            return Ok(SqlFragment::new(format!("{row}.{column} IS NULL")));
        }
        let present = self.on_component(&row, expr.component_index, |alias| {
            SqlFragment::new(format!("{alias}.{column} IS NOT NULL"))
        });
        Ok(present.negate())
    }

    fn visit_missing_search_parameter(
        &mut self,
        expr: &MissingSearchParameterExpression,
        context: &SqlContext,
    ) -> SearchResult<SqlFragment> {
        let present = self.index_exists(context, &expr.param, |_, _| Ok(SqlFragment::always()))?;
        Ok(if expr.is_missing {
            present.negate()
        } else {
            present
        })
    }

    fn visit_in(&mut self, expr: &InExpression, context: &SqlContext) -> SearchResult<SqlFragment> {
        if expr.values.is_empty() {
            return Ok(SqlFragment::never());
        }
        Ok(self.leaf(context, expr.field, expr.component_index, |column| {
            let mut sql = SqlFragment::new(format!("{column} IN "));
            sql.push_list(expr.values.iter().map(SqlParam::string));
            sql
        }))
    }
}
