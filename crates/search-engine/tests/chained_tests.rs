//! Chained and reverse-chained resolution tests.
//!
//! Single-hop resolution runs against the in-memory store. Multi-hop chains
//! feed `In` filters into the next level, so they run against SQLite.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use helios_search_engine::chain::{ChainConfig, ChainedExpressionResolver};
use helios_search_engine::error::{ChainError, SearchError};
use helios_search_engine::expression::{Expression, FieldName};

use common::*;

fn param(name: &str, inner: Expression) -> Expression {
    Expression::search_parameter(name, inner)
}

fn types(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

/// `Observation?subject:Patient.name=<name>`
fn observations_of_patient(name: &str) -> Expression {
    Expression::chained(
        types(&["Observation"]),
        "subject",
        types(&["Patient"]),
        param("name", Expression::string_equals(FieldName::String, name, false)),
    )
}

/// `Patient?general-practitioner:Practitioner.name:starts-with=<prefix>`
fn patients_of_practitioner(prefix: &str) -> Expression {
    Expression::chained(
        types(&["Patient"]),
        "general-practitioner",
        types(&["Practitioner"]),
        param("name", Expression::starts_with(FieldName::String, prefix, false)),
    )
}

/// `Patient?_has:Observation:subject:code=<code>`
fn patients_with_observation(code: &str) -> Expression {
    Expression::reverse_chained(
        types(&["Patient"]),
        "subject",
        types(&["Observation"]),
        param("code", Expression::string_equals(FieldName::TokenCode, code, false)),
    )
}

fn reference_to(param_name: &str, resource_type: &str, ids: &[&str]) -> Expression {
    param(
        param_name,
        Expression::or(vec![Expression::and(vec![
            Expression::string_equals(FieldName::ReferenceResourceType, resource_type, false),
            Expression::in_values(FieldName::ReferenceResourceId, ids.iter().copied()),
        ])]),
    )
}

// ============================================================================
// Single Level Tests
// ============================================================================

#[tokio::test]
async fn test_forward_chain_becomes_reference_filter() {
    let resolver = ChainedExpressionResolver::new(memory_store());

    let resolved = resolver
        .resolve_expression(&observations_of_patient("Alice"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolved, reference_to("subject", "Patient", &["p1"]));
}

#[tokio::test]
async fn test_resolve_single_chain() {
    let resolver = ChainedExpressionResolver::new(memory_store());
    let Expression::Chained(chain) = patients_of_practitioner("Smith") else {
        unreachable!()
    };

    let resolved = resolver
        .resolve(&chain, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        resolved,
        reference_to("general-practitioner", "Practitioner", &["pr1", "pr2"])
    );
}

#[tokio::test]
async fn test_reverse_chain_projects_referenced_resources() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));

    let resolved = resolver
        .resolve_expression(&patients_with_observation(SYSTOLIC_BP), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    let expected = Expression::or(vec![Expression::and(vec![
        param("_type", Expression::string_equals(FieldName::TokenCode, "Patient", false)),
        param("_id", Expression::in_values(FieldName::TokenCode, ["p1", "p3"])),
    ])]);
    assert_eq!(resolved, expected);

    let queries = backend.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].resource_types, types(&["Observation"]));
    assert_eq!(queries[0].projections.len(), 1);
    assert_eq!(queries[0].projections[0].reference_param, "subject");
}

#[tokio::test]
async fn test_chain_free_expression_is_untouched() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));
    let plain = param("name", Expression::string_equals(FieldName::String, "Alice", false));

    let resolved = resolver
        .resolve_expression(&plain, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resolved, Some(plain));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_missing_target_types_is_an_error() {
    let resolver = ChainedExpressionResolver::new(memory_store());
    let chain = Expression::chained(
        types(&["Observation"]),
        "subject",
        vec![],
        param("name", Expression::string_equals(FieldName::String, "Alice", false)),
    );

    let err = resolver
        .resolve_expression(&chain, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::Chain(ChainError::NoTargetTypes { ref reference_param }) if reference_param == "subject"
    ));
}

// ============================================================================
// Short-Circuit Tests
// ============================================================================

#[tokio::test]
async fn test_empty_level_short_circuits_and() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));

    let filter = Expression::and(vec![
        observations_of_patient("Nobody"),
        observations_of_patient("Alice"),
    ]);
    let resolved = resolver
        .resolve_expression(&filter, &CancellationToken::new())
        .await
        .unwrap();

    assert!(resolved.is_none());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_or_drops_empty_alternatives() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));

    let filter = Expression::or(vec![
        observations_of_patient("Nobody"),
        observations_of_patient("Alice"),
    ]);
    let resolved = resolver
        .resolve_expression(&filter, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        resolved,
        Expression::or(vec![reference_to("subject", "Patient", &["p1"])])
    );
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_not_of_empty_level_matches_everything() {
    let resolver = ChainedExpressionResolver::new(memory_store());
    let resolved = resolver
        .resolve_expression(
            &Expression::not(observations_of_patient("Nobody")),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(resolved, Some(Expression::and(vec![])));
}

#[tokio::test]
async fn test_empty_inner_level_skips_outer_query() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));

    let filter = Expression::chained(
        types(&["Observation"]),
        "subject",
        types(&["Patient"]),
        patients_of_practitioner("Nobody"),
    );
    let resolved = resolver
        .resolve_expression(&filter, &CancellationToken::new())
        .await
        .unwrap();

    assert!(resolved.is_none());
    assert_eq!(backend.calls(), 1);
    assert_eq!(backend.queries()[0].resource_types, types(&["Practitioner"]));
}

// ============================================================================
// Limit Tests
// ============================================================================

#[tokio::test]
async fn test_forward_depth_limit() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend)).with_config(ChainConfig {
        max_forward_depth: 1,
        ..ChainConfig::default()
    });

    let filter = Expression::chained(
        types(&["Observation"]),
        "subject",
        types(&["Patient"]),
        patients_of_practitioner("Smith"),
    );
    let err = resolver
        .resolve_expression(&filter, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SearchError::Chain(ChainError::MaxDepthExceeded {
            direction: "forward",
            depth: 2,
            max: 1
        })
    ));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_reverse_depth_is_counted_separately() {
    let resolver = ChainedExpressionResolver::new(memory_store()).with_config(ChainConfig::new(1, 0));

    let forward = resolver
        .resolve_expression(&observations_of_patient("Alice"), &CancellationToken::new())
        .await;
    assert!(forward.is_ok());

    let err = resolver
        .resolve_expression(&patients_with_observation(HEART_RATE), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::Chain(ChainError::MaxDepthExceeded { direction: "reverse", .. })
    ));
}

#[tokio::test]
async fn test_subquery_result_limit() {
    let resolver = ChainedExpressionResolver::new(memory_store()).with_config(ChainConfig {
        max_subquery_results: 1,
        ..ChainConfig::default()
    });

    let err = resolver
        .resolve_expression(&patients_of_practitioner("Smith"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::Chain(ChainError::SubqueryLimitExceeded { limit: 1, .. })
    ));
}

#[tokio::test]
async fn test_subquery_pages_are_followed() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend)).with_config(ChainConfig {
        page_size: 1,
        ..ChainConfig::default()
    });

    let resolved = resolver
        .resolve_expression(&patients_of_practitioner("Smith"), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        resolved,
        reference_to("general-practitioner", "Practitioner", &["pr1", "pr2"])
    );
    assert_eq!(backend.calls(), 2);
    assert!(backend.queries().iter().all(|q| q.page_size == Some(1)));
}

#[tokio::test]
async fn test_access_guard_removes_target_types() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend))
        .with_access_guard(Arc::new(DenySearch::types(&["Practitioner"])));

    let resolved = resolver
        .resolve_expression(&patients_of_practitioner("Smith"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(resolved.is_none());
    assert_eq!(backend.calls(), 0);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_cancelled_token_issues_no_queries() {
    let backend = Arc::new(CountingBackend::new(memory_store()));
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));
    let token = CancellationToken::new();
    token.cancel();

    let err = resolver
        .resolve_expression(&observations_of_patient("Alice"), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Cancelled));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_interrupts_pending_subquery() {
    let backend = Arc::new(StallingBackend::default());
    let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));
    let token = CancellationToken::new();
    let canceller = token.clone();
    let chain = observations_of_patient("Alice");

    let (result, ()) = tokio::join!(resolver.resolve_expression(&chain, &token), async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    assert!(matches!(result, Err(SearchError::Cancelled)));
    assert_eq!(backend.calls(), 1);
}

// ============================================================================
// Multi-Hop Tests (SQLite)
// ============================================================================

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;

    fn observations_of_practitioner_patients(prefix: &str) -> Expression {
        Expression::chained(
            types(&["Observation"]),
            "subject",
            types(&["Patient"]),
            patients_of_practitioner(prefix),
        )
    }

    #[tokio::test]
    async fn test_two_hop_chain_resolves_level_by_level() {
        let sqlite = sqlite_backend();
        let backend = Arc::new(CountingBackend::new(Arc::clone(&sqlite)));
        let resolver = ChainedExpressionResolver::new(Arc::clone(&backend));

        let resolved = resolver
            .resolve_expression(
                &observations_of_practitioner_patients("Smith"),
                &CancellationToken::new(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved, reference_to("subject", "Patient", &["p1", "p3"]));
        let queries = backend.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].resource_types, types(&["Practitioner"]));
        assert_eq!(queries[1].resource_types, types(&["Patient"]));

        let hits = search_all(&*sqlite, &query(&["Observation"]).with_filter(resolved))
            .await
            .unwrap();
        assert_eq!(
            hits,
            vec!["Observation/o1", "Observation/o3", "Observation/o4"]
        );
    }

    #[tokio::test]
    async fn test_resolved_chain_matches_native_subquery() {
        let sqlite = sqlite_backend();
        let resolver = ChainedExpressionResolver::new(Arc::clone(&sqlite));

        for prefix in ["Smith", "Smithers", "Jones"] {
            let chain = observations_of_practitioner_patients(prefix);
            let native = search_all(&*sqlite, &query(&["Observation"]).with_filter(chain.clone()))
                .await
                .unwrap();
            let resolved = match resolver
                .resolve_expression(&chain, &CancellationToken::new())
                .await
                .unwrap()
            {
                Some(filter) => search_all(&*sqlite, &query(&["Observation"]).with_filter(filter))
                    .await
                    .unwrap(),
                None => Vec::new(),
            };
            assert_eq!(native, resolved, "prefix {prefix}");
        }
    }

    #[tokio::test]
    async fn test_reverse_chain_on_sqlite() {
        let sqlite = sqlite_backend();
        let resolver = ChainedExpressionResolver::new(Arc::clone(&sqlite));
        let chain = patients_with_observation(SYSTOLIC_BP);

        let resolved = resolver
            .resolve_expression(&chain, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        let hits = search_all(&*sqlite, &query(&["Patient"]).with_filter(resolved))
            .await
            .unwrap();
        assert_eq!(hits, vec!["Patient/p1", "Patient/p3"]);

        let native = search_all(&*sqlite, &query(&["Patient"]).with_filter(chain))
            .await
            .unwrap();
        assert_eq!(native, hits);
    }

    #[tokio::test]
    async fn test_nested_reverse_chains() {
        let sqlite = sqlite_backend();
        let resolver = ChainedExpressionResolver::new(Arc::clone(&sqlite));

        // Practitioners whose patients have a heart rate observation
        let chain = Expression::reverse_chained(
            types(&["Practitioner"]),
            "general-practitioner",
            types(&["Patient"]),
            Expression::reverse_chained(
                types(&["Patient"]),
                "subject",
                types(&["Observation"]),
                param("code", Expression::string_equals(FieldName::TokenCode, HEART_RATE, false)),
            ),
        );

        let resolved = resolver
            .resolve_expression(&chain, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        let hits = search_all(&*sqlite, &query(&["Practitioner"]).with_filter(resolved))
            .await
            .unwrap();
        // o1 -> p1 -> pr1, o2 -> p2 -> pr3; o6 has an untyped subject
        assert_eq!(hits, vec!["Practitioner/pr1", "Practitioner/pr3"]);
    }
}
