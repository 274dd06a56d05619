//! Behaviour tests for two-stage proxy validation and the soft early stop.

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{full_quote, Reply, ScriptedHttpClient, PROBE_URL, QUOTE_URL};
use tickharvest_core::validator::ValidationStage;
use tickharvest_core::{
    CancelSignal, ErrorKind, ProxyAddress, ProxyCandidate, ProxyValidator, QuoteEndpoint,
    ValidatorConfig,
};

fn validator(client: Arc<ScriptedHttpClient>, concurrency: usize, min_working: usize) -> ProxyValidator {
    ProxyValidator::new(
        client,
        QuoteEndpoint::new(QUOTE_URL),
        ValidatorConfig {
            probe_url: String::from(PROBE_URL),
            timeout: Duration::from_millis(200),
            concurrency,
            min_working,
            ..ValidatorConfig::default()
        },
    )
}

/// Script `proxy` as fully working: probe answers and the target returns a
/// real quote document.
fn working(client: ScriptedHttpClient, proxy: &str) -> ScriptedHttpClient {
    client
        .route_via(proxy, "probe.test", vec![Reply::ok(r#"{"origin":"203.0.113.9"}"#)])
        .route_via(proxy, "api.test", vec![Reply::ok(full_quote("AAPL", 189.5))])
}

fn candidate(raw: &str) -> ProxyCandidate {
    ProxyCandidate::new(ProxyAddress::parse(raw).expect("valid address"), "https://lists.test/")
}

// =============================================================================
// Validation: stage classification
// =============================================================================

#[tokio::test]
async fn when_probe_fails_system_never_touches_target_api() {
    // Given: a proxy that refuses the reachability probe
    let client = Arc::new(
        ScriptedHttpClient::new().route_via("10.0.0.1:8080", "probe.test", vec![Reply::Refused]),
    );

    // When: the candidate is validated
    let outcome = validator(Arc::clone(&client), 4, 0)
        .validate_one(&ProxyAddress::parse("10.0.0.1:8080").expect("valid"))
        .await;

    // Then: it is rejected at stage 1 and the target API quota is untouched
    assert!(!outcome.working);
    assert_eq!(outcome.failed_stage, Some(ValidationStage::Probe));
    assert_eq!(
        outcome.error.map(|error| error.kind()),
        Some(ErrorKind::ValidationProbeFailed)
    );
    assert_eq!(client.calls_to("api.test"), 0);
}

#[tokio::test]
async fn when_proxy_injects_junk_with_status_200_system_rejects_it() {
    // Given: a proxy whose target response is a captive portal page
    let client = Arc::new(
        ScriptedHttpClient::new()
            .route_via("10.0.0.2:3128", "probe.test", vec![Reply::ok("{}")])
            .route_via(
                "10.0.0.2:3128",
                "api.test",
                vec![Reply::ok("<html>Please accept the terms of service</html>")],
            ),
    );

    // When: the candidate is validated
    let outcome = validator(client, 4, 0)
        .validate_one(&ProxyAddress::parse("10.0.0.2:3128").expect("valid"))
        .await;

    // Then: the marker check fails stage 2
    assert!(!outcome.working);
    assert_eq!(outcome.failed_stage, Some(ValidationStage::Target));
    assert_eq!(
        outcome.error.map(|error| error.kind()),
        Some(ErrorKind::MalformedResponse)
    );
}

#[tokio::test]
async fn when_target_rate_limits_the_proxy_system_rejects_it() {
    // Given: a reachable proxy that the target API answers with 429
    let client = Arc::new(
        ScriptedHttpClient::new()
            .route_via("10.0.0.3:80", "probe.test", vec![Reply::ok("{}")])
            .route_via("10.0.0.3:80", "api.test", vec![Reply::Status(429, String::new())]),
    );

    // When: the candidate is validated
    let outcome = validator(client, 4, 0)
        .validate_one(&ProxyAddress::parse("10.0.0.3:80").expect("valid"))
        .await;

    // Then: the status is recorded as a stage-2 failure
    assert_eq!(outcome.failed_stage, Some(ValidationStage::Target));
    assert_eq!(
        outcome.error.map(|error| error.kind()),
        Some(ErrorKind::HttpStatusError)
    );
}

#[tokio::test]
async fn when_proxy_works_system_records_latency_and_pool_entry() {
    // Given: a working proxy
    let client = Arc::new(working(ScriptedHttpClient::new(), "10.0.0.4:8080"));

    // When: the batch contains only that proxy
    let report = validator(client, 4, 0)
        .validate_all(vec![candidate("10.0.0.4:8080")], None)
        .await;

    // Then: it is confirmed with a clean failure counter
    assert_eq!(report.passed, 1);
    assert_eq!(report.working.len(), 1);
    assert_eq!(report.working[0].consecutive_failures, 0);
    assert_eq!(report.success_rate(), 100.0);
}

// =============================================================================
// Validation: early stop
// =============================================================================

fn mixed_candidates(valid: usize, invalid: usize, seed: u64) -> (ScriptedHttpClient, Vec<ProxyCandidate>) {
    let mut client = ScriptedHttpClient::new();
    let mut candidates = Vec::new();
    for index in 0..valid {
        let address = format!("10.1.0.{}:8080", index + 1);
        client = working(client, &address);
        candidates.push(candidate(&address));
    }
    for index in 0..invalid {
        // unscripted proxies get 404 from the probe
        candidates.push(candidate(&format!("10.2.0.{}:8080", index + 1)));
    }

    let mut rng = fastrand::Rng::with_seed(seed);
    rng.shuffle(&mut candidates);
    (client, candidates)
}

/// 1-based position of the `floor`-th working candidate.
fn floor_position(candidates: &[ProxyCandidate], floor: usize) -> usize {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.address.host().starts_with("10.1."))
        .nth(floor - 1)
        .map(|(index, _)| index + 1)
        .expect("enough working candidates")
}

#[tokio::test]
async fn when_floor_is_reached_with_one_worker_system_stops_dispatch_exactly() {
    // Given: 10 working and 10 broken candidates shuffled together
    let (client, candidates) = mixed_candidates(10, 10, 7);
    let position = floor_position(&candidates, 10);

    // When: a single worker validates with a floor of 10
    let report = validator(Arc::new(client), 1, 10)
        .validate_all(candidates, None)
        .await;

    // Then: dispatch stops right after the 10th working proxy
    assert!(report.early_stopped);
    assert_eq!(report.passed, 10);
    assert_eq!(report.dispatched, position);
    assert_eq!(report.tested, report.dispatched);
}

#[tokio::test]
async fn when_floor_is_reached_with_many_workers_in_flight_work_still_completes() {
    // Given: 10 working and 30 broken candidates shuffled together
    let concurrency = 4;
    let (client, candidates) = mixed_candidates(10, 30, 11);
    let position = floor_position(&candidates, 10);
    let total = candidates.len();

    // When: four workers validate with a floor of 10
    let report = validator(Arc::new(client), concurrency, 10)
        .validate_all(candidates, None)
        .await;

    // Then: the floor is met, every dispatched validation finished, and at
    // most one batch of slack was dispatched past the floor
    assert!(report.early_stopped);
    assert!(report.passed >= 10);
    assert_eq!(report.tested, report.dispatched);
    assert_eq!(report.passed + report.failed, report.tested);
    assert!(report.dispatched <= position + concurrency);
    assert!(report.dispatched <= total);
}

#[tokio::test]
async fn when_floor_is_never_reached_system_tests_every_candidate() {
    // Given: only 3 working proxies for a floor of 10
    let (client, candidates) = mixed_candidates(3, 5, 3);
    let client = Arc::new(client);

    // When: the batch is validated
    let report = validator(Arc::clone(&client), 4, 10)
        .validate_all(candidates, None)
        .await;

    // Then: all candidates are tested and the tallies add up
    assert!(!report.early_stopped);
    assert_eq!(report.tested, 8);
    assert_eq!(report.passed, 3);
    assert_eq!(report.stage1_failures, 5);
    assert_eq!(report.stage2_failures, 0);

    // And: the transport is told to drop state for every rejected proxy only
    let released = client.released();
    assert_eq!(released.len(), 5);
    assert!(released.iter().all(|proxy| proxy.host().starts_with("10.2.")));
}

#[tokio::test]
async fn when_candidates_exceed_cap_system_validates_only_the_cap() {
    // Given: 8 broken candidates and a cap of 5
    let (client, candidates) = mixed_candidates(0, 8, 5);
    let validator = ProxyValidator::new(
        Arc::new(client),
        QuoteEndpoint::new(QUOTE_URL),
        ValidatorConfig {
            probe_url: String::from(PROBE_URL),
            max_candidates: 5,
            min_working: 0,
            ..ValidatorConfig::default()
        },
    );

    // When: the batch is validated
    let report = validator.validate_all(candidates, None).await;

    // Then: only the first five are dispatched
    assert_eq!(report.dispatched, 5);
    assert_eq!(report.failed, 5);
}

#[tokio::test]
async fn when_run_is_cancelled_mid_batch_system_stops_dispatching() {
    // Given: slow probes and a cancel signal fired shortly after start
    let mut client = ScriptedHttpClient::new();
    let mut candidates = Vec::new();
    for index in 0..20 {
        let address = format!("10.3.0.{}:8080", index + 1);
        client = client.route_via(&address, "probe.test", vec![Reply::Stall(Duration::from_millis(40))]);
        candidates.push(candidate(&address));
    }
    let signal = CancelSignal::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    // When: two workers validate the batch
    let report = validator(Arc::new(client), 2, 0)
        .validate_all(candidates, Some(&signal))
        .await;

    // Then: dispatch stopped early and what was dispatched was still tested
    assert!(report.cancelled);
    assert!(report.dispatched < 20);
    assert_eq!(report.tested, report.dispatched);
}
