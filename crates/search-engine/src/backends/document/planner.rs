//! Query bodies and indexable documents for the document backend.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chain::ChainedExpressionResolver;
use crate::core::{BackendQuery, SearchBackend};
use crate::error::SearchResult;
use crate::expression::{ID_PARAMETER, QueryFingerprint, SortExpression, TYPE_PARAMETER};
use crate::types::{IndexedResource, SearchValue};

use super::compiler::{DocumentQueryCompiler, SEARCH_PARAMS_PATH, field_key, match_all};

/// A compiled search request.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    /// The complete request body.
    pub body: Value,
    /// Value-insensitive identity of the query the body was built from.
    pub fingerprint: QueryFingerprint,
}

/// Plans searches against a document store.
///
/// Chains are resolved first through sub-queries against `B`, then the
/// chain-free filter is compiled.
pub struct DocumentSearchPlanner<B: ?Sized> {
    resolver: ChainedExpressionResolver<B>,
    default_page_size: usize,
}

impl<B: SearchBackend + ?Sized> DocumentSearchPlanner<B> {
    /// Creates a planner resolving chains with `resolver`.
    pub fn new(resolver: ChainedExpressionResolver<B>) -> Self {
        let default_page_size = resolver.config().page_size;
        Self {
            resolver,
            default_page_size,
        }
    }

    /// Sets the page size used when a query does not specify one.
    pub fn with_default_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    /// Plans one page of `query`.
    ///
    /// Returns `None` when a chain in the filter matched nothing, so the search
    /// cannot match anything either.
    pub async fn plan(
        &self,
        query: &BackendQuery,
        offset: usize,
        cancellation: &CancellationToken,
    ) -> SearchResult<Option<DocumentQuery>> {
        let fingerprint = query.fingerprint();
        let mut resolved = query.clone();

        if let Some(filter) = &query.filter {
            if filter.contains_chained() {
                match self.resolver.resolve_expression(filter, cancellation).await? {
                    Some(filter) => resolved.filter = Some(filter),
                    None => {
                        debug!(fingerprint = %fingerprint, "Chain matched nothing; skipping search");
                        return Ok(None);
                    }
                }
            }
        }

        let page_size = query.page_size.unwrap_or(self.default_page_size).max(1);
        let mut planned = build_query(&resolved, offset, page_size)?;
        planned.fingerprint = fingerprint;
        Ok(Some(planned))
    }

    /// Builds the indexable document for a resource.
    ///
    /// ```text
    /// { "resource_type": "Observation", "resource_id": "o1", "version_id": "1",
    ///   "search_params": [ { "name": "subject", "reference_type": "Patient", ... } ],
    ///   "compartments": { "Patient": ["p1"] } }
    /// ```
    pub fn document_for(resource: &IndexedResource) -> Value {
        document_for(resource)
    }
}

/// Builds a request body for a chain-free query.
pub fn build_query(query: &BackendQuery, offset: usize, page_size: usize) -> SearchResult<DocumentQuery> {
    let (filter, sorts) = match &query.filter {
        Some(filter) => filter.split_sorts(),
        None => (None, Vec::new()),
    };

    let mut filters = Vec::new();
    if !query.resource_types.is_empty() {
        filters.push(json!({ "terms": { "resource_type": query.resource_types } }));
    }
    let must = match filter {
        Some(filter) => DocumentQueryCompiler::new().compile(&filter)?,
        None => match_all(),
    };

    let mut sort: Vec<Value> = sorts.iter().map(sort_clause).collect();
    sort.push(json!({ "resource_type": { "order": "asc" } }));
    sort.push(json!({ "resource_id": { "order": "asc" } }));

    let body = json!({
        "query": { "bool": { "filter": filters, "must": [must] } },
        "sort": sort,
        "size": page_size,
        "from": offset,
        "track_total_hits": true
    });

    Ok(DocumentQuery {
        body,
        fingerprint: query.fingerprint(),
    })
}

fn sort_clause(sort: &SortExpression) -> Value {
    let order = if sort.descending { "desc" } else { "asc" };
    match sort.param.as_str() {
        TYPE_PARAMETER => json!({ "resource_type": { "order": order } }),
        ID_PARAMETER => json!({ "resource_id": { "order": order } }),
        name => json!({
            format!("{SEARCH_PARAMS_PATH}.{}", field_key(sort.field)): {
                "order": order,
                "mode": if sort.descending { "max" } else { "min" },
                "nested": {
                    "path": SEARCH_PARAMS_PATH,
                    "filter": { "term": { format!("{SEARCH_PARAMS_PATH}.name"): name } }
                },
                "missing": if sort.descending { "_first" } else { "_last" }
            }
        }),
    }
}

fn decimal_json(value: Option<Decimal>) -> Option<Value> {
    value.and_then(|d| d.to_f64()).map(Value::from)
}

/// The fields of one scalar value, or `None` for composites.
fn value_fields(value: &SearchValue) -> Option<Map<String, Value>> {
    let mut fields = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            fields.insert(key.to_string(), value);
        }
    };

    match value {
        SearchValue::Composite(_) => return None,
        SearchValue::String(s) => put("string", Some(json!(s.text))),
        SearchValue::Token(t) => {
            put("token_system", t.system.as_ref().map(|v| json!(v)));
            put("token_code", t.code.as_ref().map(|v| json!(v)));
            put("token_text", t.text.as_ref().map(|v| json!(v)));
        }
        SearchValue::Uri(u) => put("uri", Some(json!(u.value))),
        SearchValue::DateTime(d) => {
            put("date_start", Some(json!(d.start.to_rfc3339())));
            put("date_end", Some(json!(d.end.to_rfc3339())));
        }
        SearchValue::Number(n) => {
            put("number_low", decimal_json(n.low));
            put("number", decimal_json(n.high));
        }
        SearchValue::Quantity(q) => {
            put("quantity_low", decimal_json(q.low));
            put("quantity", decimal_json(q.high));
            put("quantity_system", q.system.as_ref().map(|v| json!(v)));
            put("quantity_code", q.code.as_ref().map(|v| json!(v)));
        }
        SearchValue::Reference(r) => {
            put("reference_base", r.base_uri.as_ref().map(|v| json!(v)));
            put("reference_type", r.resource_type.as_ref().map(|v| json!(v)));
            put("reference_id", Some(json!(r.resource_id)));
        }
    }
    Some(fields)
}

fn document_for(resource: &IndexedResource) -> Value {
    let search_params: Vec<Value> = resource
        .entries
        .iter()
        .filter_map(|entry| {
            let mut fields = match &entry.value {
                SearchValue::Composite(composite) => {
                    let components: Vec<Value> = composite
                        .components
                        .iter()
                        .enumerate()
                        .flat_map(|(i, values)| {
                            values.iter().filter_map(move |v| {
                                let mut component = value_fields(v)?;
                                component.insert("component_index".to_string(), json!(i));
                                Some(Value::Object(component))
                            })
                        })
                        .collect();
                    let mut fields = Map::new();
                    fields.insert("components".to_string(), Value::Array(components));
                    fields
                }
                other => value_fields(other)?,
            };
            fields.insert("name".to_string(), json!(entry.parameter_name));
            Some(Value::Object(fields))
        })
        .collect();

    let mut compartments = Map::new();
    for (compartment, id) in resource.compartments.memberships() {
        let ids = compartments
            .entry(compartment.resource_type())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(ids) = ids {
            ids.push(json!(id));
        }
    }

    json!({
        "resource_type": resource.location.resource_type,
        "resource_id": resource.location.resource_id,
        "version_id": resource.location.version_id,
        "search_params": search_params,
        "compartments": compartments
    })
}
