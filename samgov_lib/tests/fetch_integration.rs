use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use samgov_lib::codes::StaticCodeSource;
use samgov_lib::fetcher::OpportunityFetcher;
use samgov_lib::resolver::ParameterResolver;
use samgov_lib::samgov_api::{Client, RetryConfig};
use samgov_lib::state::StateFileManager;
use samgov_lib::{OpportunitiesCache, OpportunityService, RunStatus};

fn body_with(notice_id: &str, last_modified: &str) -> String {
    json!({
        "totalRecords": 1,
        "opportunitiesData": [{
            "noticeId": notice_id,
            "title": "Bearing, Ball",
            "type": "Solicitation",
            "postedDate": "2025-01-10",
            "lastModifiedDate": last_modified
        }]
    })
    .to_string()
}

fn fetcher_for(server: &MockServer) -> OpportunityFetcher {
    let client = Client::with_base_url(&server.uri()).with_retry_config(RetryConfig {
        max_retries: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    });
    OpportunityFetcher::new(client, OpportunitiesCache::in_memory())
        .with_inter_call_delay(Duration::ZERO)
}

fn resolver() -> ParameterResolver {
    ParameterResolver::new(Arc::new(StaticCodeSource::empty()))
}

fn spec_for(params: serde_json::Value) -> samgov_lib::ResolvedQuerySpec {
    resolver().resolve(&params).unwrap()
}

#[tokio::test]
async fn one_failing_code_does_not_abort_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .and(query_param("ncode", "111110"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("a", "2025-01-01")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .and(query_param("ncode", "222220"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .and(query_param("ncode", "333330"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("b", "2025-01-02")))
        .mount(&server)
        .await;

    let codes: Vec<String> = ["111110", "222220", "333330"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let spec = spec_for(json!({"naics_override": ["111110", "222220", "333330"]}));
    let outcome = fetcher_for(&server).fetch_all(&codes, &spec, "test-key").await;

    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results[0].success);
    assert!(!outcome.results[1].success);
    assert_eq!(outcome.results[1].status_code, Some(401));
    assert!(outcome.results[2].success);
    // Output order matches input order.
    let codes_out: Vec<_> = outcome.results.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes_out, vec!["111110", "222220", "333330"]);
    assert_eq!(outcome.failed_codes(), vec!["222220".to_string()]);

    let summary = outcome.summary();
    assert_eq!(summary.codes_succeeded, 2);
    assert_eq!(summary.codes_failed, 1);
    assert_eq!(summary.cache_misses, 3);
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("a", "2025-01-01")))
        .expect(1)
        .mount(&server)
        .await;

    let codes = vec!["111110".to_string()];
    let spec = spec_for(json!({"naics_override": ["111110"]}));
    let fetcher = fetcher_for(&server);

    let first = fetcher.fetch_all(&codes, &spec, "test-key").await;
    assert_eq!(first.performance.cache_misses, 1);
    assert!(!first.results[0].cached);

    let second = fetcher.fetch_all(&codes, &spec, "test-key").await;
    assert_eq!(second.performance.cache_hits, 1);
    assert_eq!(second.performance.cache_misses, 0);
    assert!(second.results[0].cached);
    assert_eq!(second.results[0].count, first.results[0].count);
}

#[tokio::test]
async fn failures_are_never_cached() {
    let server = MockServer::start().await;

    // First call: server error. After that, healthy responses.
    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("a", "2025-01-01")))
        .mount(&server)
        .await;

    let codes = vec!["111110".to_string()];
    let spec = spec_for(json!({"naics_override": ["111110"]}));
    let fetcher = fetcher_for(&server);

    let first = fetcher.fetch_all(&codes, &spec, "test-key").await;
    assert!(!first.results[0].success);

    // The failure was not cached, so the next run goes back out and
    // succeeds without waiting for any TTL.
    let second = fetcher.fetch_all(&codes, &spec, "test-key").await;
    assert!(second.results[0].success);
    assert_eq!(second.performance.cache_misses, 1);
}

#[tokio::test]
async fn bypass_cache_always_calls_the_api() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("a", "2025-01-01")))
        .expect(2)
        .mount(&server)
        .await;

    let codes = vec!["111110".to_string()];
    let spec = spec_for(json!({"naics_override": ["111110"], "bypass_cache": true}));
    let fetcher = fetcher_for(&server);

    let first = fetcher.fetch_all(&codes, &spec, "test-key").await;
    let second = fetcher.fetch_all(&codes, &spec, "test-key").await;
    assert_eq!(first.performance.cache_misses, 1);
    assert_eq!(second.performance.cache_misses, 1);
    assert_eq!(second.performance.cache_hits, 0);
}

#[tokio::test]
async fn cancellation_keeps_already_collected_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("a", "2025-01-01")))
        .mount(&server)
        .await;

    let codes = vec!["111110".to_string(), "222220".to_string()];
    let spec = spec_for(json!({"naics_override": ["111110", "222220"]}));
    let fetcher = fetcher_for(&server);

    // Pre-set flag: nothing is attempted.
    let cancel = AtomicBool::new(true);
    let outcome = fetcher
        .fetch_all_with_cancel(&codes, &spec, "test-key", &cancel)
        .await;
    assert!(outcome.cancelled);
    assert!(outcome.results.is_empty());

    // Unset flag: the run completes normally.
    cancel.store(false, Ordering::Relaxed);
    let outcome = fetcher
        .fetch_all_with_cancel(&codes, &spec, "test-key", &cancel)
        .await;
    assert!(!outcome.cancelled);
    assert_eq!(outcome.results.len(), 2);
}

#[tokio::test]
async fn service_returns_partial_success_with_usable_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .and(query_param("ncode", "111110"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("a", "2025-01-01")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .and(query_param("ncode", "222220"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let state_dir = tempfile::tempdir().unwrap();
    let state = StateFileManager::local(state_dir.path());
    let service = OpportunityService::new(resolver(), fetcher_for(&server), state, "test-key");

    let envelope = service
        .run(&json!({"naics_override": ["111110", "222220"], "days_back": 30}))
        .await;

    assert_eq!(envelope.status(), RunStatus::PartialSuccess);
    assert_eq!(envelope.opportunities().len(), 1);
    assert_eq!(envelope.metadata()["naicsSucceeded"], json!(1));
    assert_eq!(envelope.metadata()["naicsFailed"], json!(1));
    assert_eq!(envelope.metadata()["totalCount"], json!(1));
    assert_eq!(envelope.errors().len(), 1);
    assert_eq!(envelope.errors()[0].code, Some(403));

    // The run snapshot recorded the failed code for audit tooling.
    let state = StateFileManager::local(state_dir.path());
    let snapshot = state.load_latest().unwrap();
    assert_eq!(snapshot.failed_codes, vec!["222220".to_string()]);
    assert_eq!(snapshot.summary["codesSucceeded"], json!(1));
}

#[tokio::test]
async fn service_dedupes_across_codes() {
    let server = MockServer::start().await;

    // Both codes return the same notice; the second copy is newer.
    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .and(query_param("ncode", "111110"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("dup", "2025-01-01")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .and(query_param("ncode", "222220"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body_with("dup", "2025-02-01")))
        .mount(&server)
        .await;

    let state_dir = tempfile::tempdir().unwrap();
    let service = OpportunityService::new(
        resolver(),
        fetcher_for(&server),
        StateFileManager::local(state_dir.path()),
        "test-key",
    );

    let envelope = service
        .run(&json!({"naics_override": ["111110", "222220"], "limit": 50}))
        .await;

    assert_eq!(envelope.status(), RunStatus::Success);
    assert_eq!(envelope.opportunities().len(), 1);
    // The surviving copy is the newer one, tagged with its own source.
    assert_eq!(
        envelope.opportunities()[0].last_modified_date.as_deref(),
        Some("2025-02-01")
    );
    assert_eq!(
        envelope.opportunities()[0].source_code.as_deref(),
        Some("222220")
    );
    assert_eq!(
        envelope.metadata()["deduplication"]["duplicatesRemoved"],
        json!(1)
    );
}

#[tokio::test]
async fn service_turns_validation_errors_into_failure_envelopes() {
    let server = MockServer::start().await;
    let state_dir = tempfile::tempdir().unwrap();
    let service = OpportunityService::new(
        resolver(),
        fetcher_for(&server),
        StateFileManager::local(state_dir.path()),
        "test-key",
    );

    let envelope = service.run(&json!({"naics_override": ["123"]})).await;
    assert_eq!(envelope.status(), RunStatus::Failure);
    assert!(!envelope.has_opportunities_section());
    assert!(envelope.error().unwrap().contains("invalid NAICS code"));
}

#[tokio::test]
async fn all_codes_failing_is_a_failure_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/opportunities/v2/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let state_dir = tempfile::tempdir().unwrap();
    let service = OpportunityService::new(
        resolver(),
        fetcher_for(&server),
        StateFileManager::local(state_dir.path()),
        "test-key",
    );

    let envelope = service
        .run(&json!({"naics_override": ["111110", "222220"]}))
        .await;
    assert_eq!(envelope.status(), RunStatus::Failure);
    assert!(!envelope.has_opportunities_section());
    assert_eq!(envelope.errors().len(), 2);
    assert!(envelope.error().is_some());
}
