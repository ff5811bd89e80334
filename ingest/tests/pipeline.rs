#![cfg(feature = "test-utils")]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use config::shared::IngestConfig;
use ingest::client::memory::MemoryClient;
use ingest::error::{ErrorKind, IngestResult};
use ingest::pipeline::{IngestionPipeline, IngestionReport, RunBounds};
use ingest::session::IngestionSession;
use ingest::store::RecordStore;
use ingest::test_utils::client::{ScriptedSearchClient, page, page_with_next};
use ingest::test_utils::records::{pr_batch, pr_in_repo, utc};
use ingest::types::{AdaptiveFetchState, DAY_MS, MIN_INTERVAL_MS, PipelineId};
use rand::random;
use telemetry::tracing::init_test_tracing;

fn test_config() -> IngestConfig {
    IngestConfig::default()
}

fn config_with_interval(initial_interval_ms: i64) -> IngestConfig {
    IngestConfig {
        initial_interval_ms,
        ..IngestConfig::default()
    }
}

fn bounds(end: DateTime<Utc>, days_back: i64) -> RunBounds {
    RunBounds {
        end_date: end,
        start_date: end - Duration::days(days_back),
    }
}

async fn run_pipeline(
    config: IngestConfig,
    client: ScriptedSearchClient,
    store: RecordStore,
    scopes: &[&str],
    bounds: RunBounds,
    resume: Option<HashMap<String, AdaptiveFetchState>>,
) -> IngestResult<IngestionReport> {
    let pipeline_id: PipelineId = random();
    let mut pipeline = IngestionPipeline::new(
        pipeline_id,
        Arc::new(config),
        client,
        store,
        scopes.iter().map(|scope| scope.to_string()).collect(),
        bounds,
        resume,
    )
    .await;

    pipeline.start()?;
    pipeline.wait().await
}

#[tokio::test(flavor = "multi_thread")]
async fn single_window_scope_terminates_after_one_probe() {
    init_test_tracing();

    let client = ScriptedSearchClient::new();
    client.push_page("org:acme", page(pr_batch("PR", 3, utc(2024, 3, 9)), 3));

    let store = RecordStore::new();
    let report = run_pipeline(
        test_config(),
        client.clone(),
        store.clone(),
        &["org:acme"],
        bounds(utc(2024, 3, 10), 1),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert!(outcome.done);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.fetched, 3);

    // Exactly one window was probed.
    let calls = client.calls_for("org:acme");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].window_end, utc(2024, 3, 10));
    assert_eq!(calls[0].window_start, utc(2024, 3, 9));

    assert_eq!(store.len().await, 3);

    let state = report.resume_states["org:acme"];
    assert_eq!(state.oldest_fetched, utc(2024, 3, 9));
}

#[tokio::test(flavor = "multi_thread")]
async fn over_cap_window_shrinks_without_advancing() {
    init_test_tracing();

    let end = utc(2024, 3, 10);
    let client = ScriptedSearchClient::new();
    // The 2-day probe is over the cap and must be retried narrower, with no
    // data emitted for the failed attempt.
    client.push_page("org:acme", page(Vec::new(), 1500));
    client.push_page("org:acme", page(pr_batch("A", 4, utc(2024, 3, 9)), 800));
    client.push_page("org:acme", page(pr_batch("B", 2, utc(2024, 3, 8)), 300));

    let store = RecordStore::new();
    let report = run_pipeline(
        config_with_interval(2 * DAY_MS),
        client.clone(),
        store.clone(),
        &["org:acme"],
        bounds(end, 2),
        None,
    )
    .await
    .unwrap();

    let calls = client.calls_for("org:acme");
    assert_eq!(calls.len(), 3);

    // The cap retry keeps the window end in place and only narrows the start.
    assert_eq!(calls[0].window_end, end);
    assert_eq!(calls[0].window_start, utc(2024, 3, 8));
    assert_eq!(calls[1].window_end, end);
    assert_eq!(calls[1].window_start, utc(2024, 3, 9));

    // Only after an under-cap window does the end advance into the past.
    assert_eq!(calls[2].window_end, utc(2024, 3, 9));
    assert_eq!(calls[2].window_start, utc(2024, 3, 8));

    assert_eq!(report.outcomes[0].fetched, 6);
    assert_eq!(store.len().await, 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn still_capped_minimum_window_is_accepted() {
    init_test_tracing();

    let end = utc(2024, 3, 10);
    let client = ScriptedSearchClient::new();
    // 2-day window over cap, 1-day window still over cap: the fetcher must
    // accept the truncation risk instead of looping forever.
    client.push_page("org:acme", page(Vec::new(), 1500));
    client.push_page("org:acme", page(pr_batch("A", 5, utc(2024, 3, 9)), 1200));
    client.push_page("org:acme", page(pr_batch("B", 1, utc(2024, 3, 8)), 300));

    let store = RecordStore::new();
    let report = run_pipeline(
        config_with_interval(2 * DAY_MS),
        client.clone(),
        store.clone(),
        &["org:acme"],
        bounds(end, 2),
        None,
    )
    .await
    .unwrap();

    let calls = client.calls_for("org:acme");
    assert_eq!(calls.len(), 3);
    // Second probe runs at the minimum interval and is processed despite
    // reporting more matches than the cap.
    assert_eq!(calls[1].window_start, utc(2024, 3, 9));
    assert_eq!(calls[1].window_end, end);

    assert!(report.outcomes[0].error.is_none());
    assert_eq!(store.len().await, 6);

    // The resumed interval stays at the floor.
    assert_eq!(report.resume_states["org:acme"].interval_ms, MIN_INTERVAL_MS);
}

#[tokio::test(flavor = "multi_thread")]
async fn interval_adapts_to_match_density() {
    init_test_tracing();

    let end = utc(2024, 3, 20);
    let client = ScriptedSearchClient::new();
    // Dense window halves, sparse window doubles, moderate keeps width.
    client.push_page("org:acme", page(Vec::new(), 600));
    client.push_page("org:acme", page(Vec::new(), 150));
    client.push_page("org:acme", page(Vec::new(), 300));
    client.push_page("org:acme", page(Vec::new(), 300));

    let report = run_pipeline(
        config_with_interval(2 * DAY_MS),
        client.clone(),
        RecordStore::new(),
        &["org:acme"],
        bounds(end, 7),
        None,
    )
    .await
    .unwrap();

    let widths: Vec<i64> = client
        .calls_for("org:acme")
        .iter()
        .map(|call| (call.window_end - call.window_start).num_days())
        .collect();

    // 2 days, then halved to 1, then doubled to 2, then unchanged.
    assert_eq!(widths, vec![2, 1, 2, 2]);
    assert!(report.outcomes[0].done);
}

#[tokio::test(flavor = "multi_thread")]
async fn window_pages_follow_cursors() {
    init_test_tracing();

    let client = ScriptedSearchClient::new();
    client.push_page(
        "org:acme",
        page_with_next(pr_batch("P1", 2, utc(2024, 3, 9)), 5, "cursor-1"),
    );
    client.push_page(
        "org:acme",
        page_with_next(pr_batch("P2", 2, utc(2024, 3, 9)), 5, "cursor-2"),
    );
    client.push_page("org:acme", page(pr_batch("P3", 1, utc(2024, 3, 9)), 5));

    let store = RecordStore::new();
    let report = run_pipeline(
        test_config(),
        client.clone(),
        store.clone(),
        &["org:acme"],
        bounds(utc(2024, 3, 10), 1),
        None,
    )
    .await
    .unwrap();

    let cursors: Vec<Option<String>> = client
        .calls_for("org:acme")
        .into_iter()
        .map(|call| call.cursor)
        .collect();
    assert_eq!(
        cursors,
        vec![
            None,
            Some("cursor-1".to_owned()),
            Some("cursor-2".to_owned())
        ]
    );

    assert_eq!(report.outcomes[0].fetched, 5);
    assert_eq!(store.len().await, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn scope_failure_is_isolated_from_siblings() {
    init_test_tracing();

    let client = ScriptedSearchClient::new();
    client.push_error("org:failing", ErrorKind::TransportFailed, "Search request failed");
    client.push_page(
        "org:healthy",
        page(pr_batch("OK", 4, utc(2024, 3, 9)), 4),
    );

    let store = RecordStore::new();
    let report = run_pipeline(
        test_config(),
        client,
        store.clone(),
        &["org:failing", "org:healthy"],
        bounds(utc(2024, 3, 10), 1),
        None,
    )
    .await
    .unwrap();

    assert!(report.has_failures());
    assert_eq!(report.outcomes.len(), 2);

    let failed = report
        .outcomes
        .iter()
        .find(|outcome| outcome.scope == "org:failing")
        .unwrap();
    assert!(failed.done);
    assert_eq!(
        failed.error.as_ref().unwrap().kind(),
        ErrorKind::TransportFailed
    );

    let healthy = report
        .outcomes
        .iter()
        .find(|outcome| outcome.scope == "org:healthy")
        .unwrap();
    assert!(healthy.error.is_none());
    assert_eq!(healthy.fetched, 4);

    // The failing sibling rolled nothing back.
    assert_eq!(store.len().await, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn authentication_failure_halts_the_whole_run() {
    init_test_tracing();

    let client = ScriptedSearchClient::new();
    client.push_error(
        "org:acme",
        ErrorKind::AuthenticationFailed,
        "Credential rejected by the API",
    );
    // The sibling gets a deep script; it is cancelled rather than drained.
    for day in 0..60 {
        client.push_page(
            "org:other",
            page(Vec::new(), 50_u64.saturating_add(day)),
        );
    }

    let result = run_pipeline(
        test_config(),
        client,
        RecordStore::new(),
        &["org:acme", "org:other"],
        bounds(utc(2024, 3, 10), 60),
        None,
    )
    .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::AuthenticationFailed);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_before_start_prevents_any_fetch() {
    init_test_tracing();

    let client = ScriptedSearchClient::new();

    let pipeline_id: PipelineId = random();
    let mut pipeline = IngestionPipeline::new(
        pipeline_id,
        Arc::new(test_config()),
        client.clone(),
        RecordStore::new(),
        vec!["org:acme".to_owned()],
        bounds(utc(2024, 3, 10), 30),
        None,
    )
    .await;

    // Cancellation observed at the loop head: no window is ever probed.
    pipeline.shutdown();
    pipeline.start().unwrap();
    let report = pipeline.wait().await.unwrap();

    assert!(client.calls().is_empty());
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].done);
    assert_eq!(report.outcomes[0].fetched, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn resumption_continues_from_saved_state() {
    init_test_tracing();

    let end = utc(2024, 3, 20);
    let client = ScriptedSearchClient::new();
    client.push_page("org:acme", page(pr_batch("R", 2, utc(2024, 3, 8)), 300));

    let saved = AdaptiveFetchState {
        oldest_fetched: utc(2024, 3, 10),
        interval_ms: 3 * DAY_MS,
    };

    let report = run_pipeline(
        test_config(),
        client.clone(),
        RecordStore::new(),
        &["org:acme"],
        RunBounds {
            end_date: end,
            start_date: utc(2024, 3, 7),
        },
        Some(HashMap::from([("org:acme".to_owned(), saved)])),
    )
    .await
    .unwrap();

    let calls = client.calls_for("org:acme");
    // The first window starts at the checkpoint with the tuned interval,
    // not at the run's end date with the initial interval.
    assert_eq!(calls[0].window_end, utc(2024, 3, 10));
    assert_eq!(calls[0].window_start, utc(2024, 3, 7));

    assert_eq!(report.resume_states["org:acme"].oldest_fetched, utc(2024, 3, 7));
}

#[tokio::test(flavor = "multi_thread")]
async fn memory_backend_paginates_full_record_set() {
    init_test_tracing();

    let records: Vec<_> = (0..250)
        .map(|index| {
            pr_in_repo(
                &format!("MEM_{index}"),
                "acme/api",
                utc(2024, 3, 5) + Duration::minutes(index),
            )
        })
        .collect();
    let client = MemoryClient::new(records).with_page_size(100);

    let store = RecordStore::new();
    let pipeline_id: PipelineId = random();
    let mut pipeline = IngestionPipeline::new(
        pipeline_id,
        Arc::new(test_config()),
        client,
        store.clone(),
        vec![String::new()],
        bounds(utc(2024, 3, 6), 1),
        None,
    )
    .await;

    pipeline.start().unwrap();
    let report = pipeline.wait().await.unwrap();

    assert_eq!(report.outcomes[0].fetched, 250);
    assert_eq!(store.len().await, 250);
}

#[tokio::test(flavor = "multi_thread")]
async fn session_refresh_restarts_from_scratch() {
    init_test_tracing();

    let now = Utc::now();
    let records = vec![
        pr_in_repo("S_1", "acme/api", now - Duration::days(2)),
        pr_in_repo("S_2", "acme/api", now - Duration::days(3)),
    ];
    let client = MemoryClient::new(records);

    let mut session = IngestionSession::new(test_config(), client, vec![String::new()]);

    session.start().await.unwrap();
    let report = session.wait().await.unwrap();
    assert!(!report.has_failures());
    assert_eq!(session.store().len().await, 2);

    let generation_before = session.store().current_generation().await;

    session.refresh().await.unwrap();
    let report = session.wait().await.unwrap();
    assert!(!report.has_failures());

    // Fresh generation, same data re-fetched from scratch.
    assert!(session.store().current_generation().await > generation_before);
    assert_eq!(session.store().len().await, 2);
    assert!(!session.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn session_load_more_keeps_existing_records() {
    init_test_tracing();

    let now = Utc::now();
    let client = MemoryClient::new(vec![pr_in_repo("L_1", "acme/api", now - Duration::days(1))]);

    let mut session = IngestionSession::new(test_config(), client, vec![String::new()]);

    session.start().await.unwrap();
    session.wait().await.unwrap();
    assert_eq!(session.store().len().await, 1);

    let generation = session.store().current_generation().await;

    // Load-more digs further into the past without clearing anything.
    session.load_more().await.unwrap();
    session.wait().await.unwrap();

    assert_eq!(session.store().current_generation().await, generation);
    assert_eq!(session.store().len().await, 1);
}
