//! Builds complete `SELECT` statements for a [`BackendQuery`].

use std::sync::Arc;

use crate::core::BackendQuery;
use crate::error::SearchResult;
use crate::expression::{ID_PARAMETER, QueryFingerprint, SortExpression, TYPE_PARAMETER};
use crate::plan_cache::QueryPlanCachePolicy;

use super::compiler::SqlExpressionCompiler;
use super::fragment::{SqlFragment, SqlParam};
use super::schema::column_for;

const RESOURCE_ALIAS: &str = "r";

/// A statement ready to execute.
#[derive(Debug, Clone)]
pub struct SqlPlan {
    /// The statement text.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<SqlParam>,
    /// Value-insensitive identity of the query.
    pub fingerprint: QueryFingerprint,
    /// Whether to run through the connection's prepared statement cache.
    pub use_cached_plan: bool,
    /// Rows requested for the page, excluding the look-ahead row.
    pub page_size: usize,
    /// Rows skipped.
    pub offset: usize,
}

/// Turns backend queries into [`SqlPlan`]s.
///
/// The statement selects `resource_type, id, version_id` from `resources`,
/// restricted to the query's types and filter, ordered by the filter's sort
/// clauses and then insertion order. One row past `page_size` is fetched so the
/// caller can tell whether another page exists.
#[derive(Debug, Clone)]
pub struct SqlSearchPlanner {
    policy: Arc<QueryPlanCachePolicy>,
}

impl SqlSearchPlanner {
    /// Creates a planner that asks `policy` whether to reuse cached plans.
    pub fn new(policy: Arc<QueryPlanCachePolicy>) -> Self {
        Self { policy }
    }

    /// The plan cache policy.
    pub fn policy(&self) -> &QueryPlanCachePolicy {
        &self.policy
    }

    /// Plans one page of `query`.
    pub fn plan(&self, query: &BackendQuery, offset: usize, page_size: usize) -> SearchResult<SqlPlan> {
        let (filter, sorts) = match &query.filter {
            Some(filter) => filter.split_sorts(),
            None => (None, Vec::new()),
        };

        let mut conditions = Vec::new();
        if !query.resource_types.is_empty() {
            let mut types = SqlFragment::new(format!("{RESOURCE_ALIAS}.resource_type IN "));
            types.push_list(query.resource_types.iter().map(SqlParam::string));
            conditions.push(types);
        }
        if let Some(filter) = filter {
            conditions.push(SqlExpressionCompiler::new().compile(&filter, RESOURCE_ALIAS)?);
        }

        let mut statement = SqlFragment::new(format!(
            "SELECT {RESOURCE_ALIAS}.resource_type, {RESOURCE_ALIAS}.id, {RESOURCE_ALIAS}.version_id \
             FROM resources {RESOURCE_ALIAS} WHERE "
        ));
        statement.push_fragment(SqlFragment::all(conditions));
        statement.push_sql(" ORDER BY ");
        for sort in &sorts {
            statement.push_fragment(order_term(sort)).push_sql(", ");
        }
        statement
            .push_sql(&format!("{RESOURCE_ALIAS}.rowid LIMIT "))
            .push_param(SqlParam::integer(page_size as i64 + 1))
            .push_sql(" OFFSET ")
            .push_param(SqlParam::integer(offset as i64));

        let fingerprint = query.fingerprint();
        Ok(SqlPlan {
            sql: statement.sql,
            params: statement.params,
            fingerprint,
            use_cached_plan: self.policy.should_cache(fingerprint),
            page_size,
            offset,
        })
    }
}

/// One `ORDER BY` term. Multi-valued parameters sort on their lowest value
/// ascending and their highest descending.
fn order_term(sort: &SortExpression) -> SqlFragment {
    let direction = if sort.descending { "DESC" } else { "ASC" };
    match sort.param.as_str() {
        TYPE_PARAMETER => SqlFragment::new(format!("{RESOURCE_ALIAS}.resource_type {direction}")),
        ID_PARAMETER => SqlFragment::new(format!("{RESOURCE_ALIAS}.id {direction}")),
        param => {
            let aggregate = if sort.descending { "MAX" } else { "MIN" };
            let column = column_for(sort.field);
            let mut term = SqlFragment::new(format!(
                "(SELECT {aggregate}(s.{column}) FROM search_index s \
                 WHERE s.resource_type = {RESOURCE_ALIAS}.resource_type \
                 AND s.resource_id = {RESOURCE_ALIAS}.id AND s.param_name = "
            ));
            term.push_param(SqlParam::string(param))
                .push_sql(&format!(") {direction}"));
            term
        }
    }
}
