//! Innermost-first resolution of chained expressions.
//!
//! Each chain level becomes a backend sub-query whose hits are folded back
//! into a plain reference or id filter for the level above:
//!
//! ```text
//! Observation?subject:Patient.general-practitioner.name=Smith
//!
//!   Practitioner?name=Smith                    -> {pr1, pr2}
//!   Patient?general-practitioner=pr1,pr2       -> {p1}
//!   Observation?subject=Patient/p1
//! ```
//!
//! A level that matches nothing resolves to `None` and no further sub-queries
//! are issued.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{AccessAction, AccessGuard, BackendQuery, ReferenceProjection, SearchBackend};
use crate::error::{ChainError, SearchResult};
use crate::expression::{
    ChainedExpression, Expression, FieldName, ID_PARAMETER, MultiaryOperator, TYPE_PARAMETER,
};

use super::ChainConfig;
use super::pager::ChainedPages;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves [`ChainedExpression`]s into filters a backend can run directly.
pub struct ChainedExpressionResolver<B: ?Sized> {
    backend: Arc<B>,
    config: ChainConfig,
    access: Option<Arc<dyn AccessGuard>>,
}

impl<B: SearchBackend + ?Sized> ChainedExpressionResolver<B> {
    /// Creates a resolver with the default configuration.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            config: ChainConfig::default(),
            access: None,
        }
    }

    /// Sets the chain configuration.
    pub fn with_config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    /// Restricts sub-queries to resource types the guard allows searching.
    pub fn with_access_guard(mut self, guard: Arc<dyn AccessGuard>) -> Self {
        self.access = Some(guard);
        self
    }

    /// The chain configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Resolves one chain, including chains nested inside it.
    ///
    /// Returns `None` when some level matched nothing.
    pub async fn resolve(
        &self,
        chain: &ChainedExpression,
        cancellation: &CancellationToken,
    ) -> SearchResult<Option<Expression>> {
        self.check_depth(&Expression::Chained(chain.clone()))?;
        self.resolve_level(chain, cancellation).await
    }

    /// Rewrites every chain in `expression`.
    ///
    /// `And` with an unsatisfiable child is unsatisfiable, `Or` and `Union`
    /// drop unsatisfiable children, and `Not` of an unsatisfiable expression
    /// matches everything. `None` means the whole expression matches nothing.
    pub async fn resolve_expression(
        &self,
        expression: &Expression,
        cancellation: &CancellationToken,
    ) -> SearchResult<Option<Expression>> {
        self.check_depth(expression)?;
        self.rewrite(expression, cancellation).await
    }

    fn check_depth(&self, expression: &Expression) -> SearchResult<()> {
        let forward = chain_depth(expression, false);
        if forward > self.config.max_forward_depth {
            return Err(ChainError::MaxDepthExceeded {
                direction: "forward",
                depth: forward,
                max: self.config.max_forward_depth,
            }
            .into());
        }

        let reverse = chain_depth(expression, true);
        if reverse > self.config.max_reverse_depth {
            return Err(ChainError::MaxDepthExceeded {
                direction: "reverse",
                depth: reverse,
                max: self.config.max_reverse_depth,
            }
            .into());
        }
        Ok(())
    }

    fn rewrite<'a>(
        &'a self,
        expression: &'a Expression,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, SearchResult<Option<Expression>>> {
        Box::pin(async move {
            if !expression.contains_chained() {
                return Ok(Some(expression.clone()));
            }

            match expression {
                Expression::Chained(chain) => self.resolve_level(chain, cancellation).await,
                Expression::SearchParameter(e) => Ok(self
                    .rewrite(&e.inner, cancellation)
                    .await?
                    .map(|inner| Expression::search_parameter(e.param.clone(), inner))),
                Expression::Not(e) => Ok(Some(match self.rewrite(&e.inner, cancellation).await? {
                    Some(inner) => Expression::not(inner),
                    None => Expression::and(vec![]),
                })),
                Expression::Multiary(e) if e.op == MultiaryOperator::And => {
                    let mut children = Vec::with_capacity(e.children.len());
                    for child in &e.children {
                        match self.rewrite(child, cancellation).await? {
                            Some(resolved) => children.push(resolved),
                            None => return Ok(None),
                        }
                    }
                    Ok(Some(Expression::and(children)))
                }
                Expression::Multiary(e) => Ok(self
                    .rewrite_alternatives(&e.children, cancellation)
                    .await?
                    .map(Expression::or)),
                Expression::Union(e) => Ok(self
                    .rewrite_alternatives(&e.children, cancellation)
                    .await?
                    .map(Expression::union)),
                other => Ok(Some(other.clone())),
            }
        })
    }

    async fn rewrite_alternatives(
        &self,
        children: &[Expression],
        cancellation: &CancellationToken,
    ) -> SearchResult<Option<Vec<Expression>>> {
        let mut resolved = Vec::with_capacity(children.len());
        for child in children {
            if let Some(child) = self.rewrite(child, cancellation).await? {
                resolved.push(child);
            }
        }
        Ok((!resolved.is_empty()).then_some(resolved))
    }

    fn resolve_level<'a>(
        &'a self,
        chain: &'a ChainedExpression,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, SearchResult<Option<Expression>>> {
        Box::pin(async move {
            if chain.target_types.is_empty() {
                return Err(ChainError::NoTargetTypes {
                    reference_param: chain.reference_param.clone(),
                }
                .into());
            }

            let Some(inner) = self.rewrite(&chain.inner, cancellation).await? else {
                debug!(
                    reference_param = %chain.reference_param,
                    "Nested chain matched nothing; skipping level"
                );
                return Ok(None);
            };

            let target_types = self.searchable(&chain.target_types);
            if target_types.is_empty() {
                debug!(
                    reference_param = %chain.reference_param,
                    "No searchable target types; chain matches nothing"
                );
                return Ok(None);
            }

            let mut query = BackendQuery::new(target_types)
                .with_filter(inner)
                .with_page_size(self.config.page_size);
            if chain.reversed {
                query = query.with_projection(ReferenceProjection::new(
                    chain.reference_param.clone(),
                    chain.resource_types.clone(),
                ));
            }

            debug!(
                reference_param = %chain.reference_param,
                reversed = chain.reversed,
                target_types = ?query.resource_types,
                "Resolving chain level"
            );

            let groups = self.collect_groups(chain, query, cancellation).await?;
            if groups.is_empty() {
                debug!(
                    reference_param = %chain.reference_param,
                    "Chain level matched nothing; short-circuiting"
                );
                return Ok(None);
            }

            Ok(Some(if chain.reversed {
                reverse_filter(groups)
            } else {
                forward_filter(&chain.reference_param, groups)
            }))
        })
    }

    async fn collect_groups(
        &self,
        chain: &ChainedExpression,
        query: BackendQuery,
        cancellation: &CancellationToken,
    ) -> SearchResult<BTreeMap<String, BTreeSet<String>>> {
        let limit = self.config.max_subquery_results;
        let mut pages = ChainedPages::new(Arc::clone(&self.backend), query, cancellation.clone());
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut collected = 0usize;

        while let Some(page) = pages.next_page().await? {
            for hit in page.hits {
                if chain.reversed {
                    for reference in hit.references {
                        if reference.reference_param == chain.reference_param
                            && groups
                                .entry(reference.target.resource_type)
                                .or_default()
                                .insert(reference.target.resource_id)
                        {
                            collected += 1;
                        }
                    }
                } else if groups
                    .entry(hit.location.resource_type)
                    .or_default()
                    .insert(hit.location.resource_id)
                {
                    collected += 1;
                }
            }

            if collected > limit {
                return Err(ChainError::SubqueryLimitExceeded {
                    resource_types: pages.query().resource_types.join(","),
                    limit,
                }
                .into());
            }
        }

        Ok(groups)
    }

    fn searchable(&self, resource_types: &[String]) -> Vec<String> {
        match &self.access {
            None => resource_types.to_vec(),
            Some(guard) => resource_types
                .iter()
                .filter(|t| {
                    let allowed = guard.is_allowed(AccessAction::Search, t);
                    if !allowed {
                        debug!(resource_type = %t, "Search not allowed; dropping chain target");
                    }
                    allowed
                })
                .cloned()
                .collect(),
        }
    }
}

/// Largest number of same-direction chain hops along any path.
fn chain_depth(expression: &Expression, reversed: bool) -> usize {
    match expression {
        Expression::Chained(c) => usize::from(c.reversed == reversed) + chain_depth(&c.inner, reversed),
        Expression::SearchParameter(e) => chain_depth(&e.inner, reversed),
        Expression::Not(e) => chain_depth(&e.inner, reversed),
        Expression::Multiary(e) => max_depth(&e.children, reversed),
        Expression::Union(e) => max_depth(&e.children, reversed),
        _ => 0,
    }
}

fn max_depth(children: &[Expression], reversed: bool) -> usize {
    children
        .iter()
        .map(|c| chain_depth(c, reversed))
        .max()
        .unwrap_or(0)
}

/// `reference_param` pointing at any of the matched resources.
fn forward_filter(reference_param: &str, groups: BTreeMap<String, BTreeSet<String>>) -> Expression {
    let alternatives = groups
        .into_iter()
        .map(|(resource_type, ids)| {
            Expression::and(vec![
                Expression::string_equals(FieldName::ReferenceResourceType, resource_type, false),
                Expression::in_values(FieldName::ReferenceResourceId, ids),
            ])
        })
        .collect();
    Expression::search_parameter(reference_param, Expression::or(alternatives))
}

/// The resources the matched resources point back at.
fn reverse_filter(groups: BTreeMap<String, BTreeSet<String>>) -> Expression {
    Expression::or(
        groups
            .into_iter()
            .map(|(resource_type, ids)| {
                Expression::and(vec![
                    Expression::search_parameter(
                        TYPE_PARAMETER,
                        Expression::string_equals(FieldName::TokenCode, resource_type, false),
                    ),
                    Expression::search_parameter(
                        ID_PARAMETER,
                        Expression::in_values(FieldName::TokenCode, ids),
                    ),
                ])
            })
            .collect(),
    )
}
