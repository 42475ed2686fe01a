//! Batch behavior of the fetch pipeline against in-memory transports.

use chrono::NaiveDate;
use darts_fetch::data_fetcher::api::{
    build_event_statistics_url, build_scheduled_events_url, date_range,
};
use darts_fetch::data_fetcher::retry::{RetryController, RetryPolicy};
use darts_fetch::data_fetcher::session::SessionManager;
use darts_fetch::data_fetcher::transport::{HeaderProfile, Transport, TransportKind};
use darts_fetch::data_fetcher::{AggregatedRows, DartsFetcher, OutputGrouping, aggregate};
use darts_fetch::error::AppError;
use darts_fetch::testing_utils::{ScriptedTransport, StaticSessionEstablisher, TestPayloads};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "https://api.test/api/v1";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(500),
        jitter: Duration::from_millis(100),
        politeness_delay: Duration::from_millis(200),
        politeness_jitter: Duration::from_millis(50),
        rate_limit_default: Duration::from_secs(60),
        max_delay: Duration::from_secs(5),
        max_rate_limit_waits: 3,
    }
}

fn build_fetcher(
    chain: Vec<Arc<dyn Transport>>,
    establisher: Arc<StaticSessionEstablisher>,
) -> DartsFetcher {
    build_fetcher_with(fast_policy(), chain, establisher)
}

fn build_fetcher_with(
    policy: RetryPolicy,
    chain: Vec<Arc<dyn Transport>>,
    establisher: Arc<StaticSessionEstablisher>,
) -> DartsFetcher {
    let session = Arc::new(SessionManager::new(establisher));
    let controller = RetryController::new(
        policy,
        chain.clone(),
        session,
        HeaderProfile::from_home_url("https://www.sofascore.com/"),
    );
    DartsFetcher::new(controller, &chain, BASE, Duration::from_millis(300), false)
}

#[tokio::test(start_paused = true)]
async fn test_one_failing_date_does_not_affect_others() {
    let good_a = date(2024, 3, 1);
    let bad = date(2024, 3, 2);
    let good_b = date(2024, 3, 3);

    let transport = Arc::new(
        ScriptedTransport::new(TransportKind::Direct)
            .always(
                build_scheduled_events_url(BASE, good_a),
                TestPayloads::scheduled_events(&[1, 2]),
            )
            .on(
                build_scheduled_events_url(BASE, bad),
                vec![Err(TestPayloads::network())],
            )
            .always(
                build_scheduled_events_url(BASE, good_b),
                TestPayloads::scheduled_events(&[3]),
            ),
    );
    let fetcher = build_fetcher(
        vec![transport.clone()],
        Arc::new(StaticSessionEstablisher::new("UA")),
    );

    let results = fetcher
        .fetch_range([good_a, bad, good_b], false, 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.values().filter(|r| r.is_success()).count(), 2);

    let failed = &results[&bad];
    assert!(failed.rows.is_empty());
    let reason = failed.error.as_deref().unwrap();
    assert!(reason.contains("gave up after 3 attempts"), "{reason}");

    assert_eq!(results[&good_a].rows.len(), 2);
    assert_eq!(results[&good_b].rows.len(), 1);
    assert_eq!(
        transport.calls_for(&build_scheduled_events_url(BASE, bad)),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_results_sorted_by_date_regardless_of_completion_order() {
    let first = date(2024, 1, 1);
    let second = date(2024, 1, 2);
    let third = date(2024, 1, 3);

    let first_url = build_scheduled_events_url(BASE, first);
    let second_url = build_scheduled_events_url(BASE, second);

    // the earliest date finishes last
    let transport = Arc::new(
        ScriptedTransport::new(TransportKind::Direct)
            .always(first_url.clone(), TestPayloads::scheduled_events(&[1]))
            .with_delay(first_url, Duration::from_secs(9))
            .always(second_url.clone(), TestPayloads::scheduled_events(&[2]))
            .with_delay(second_url, Duration::from_secs(5))
            .always(
                build_scheduled_events_url(BASE, third),
                TestPayloads::scheduled_events(&[3]),
            ),
    );
    let fetcher = build_fetcher(
        vec![transport.clone()],
        Arc::new(StaticSessionEstablisher::new("UA")),
    );

    let results = fetcher
        .fetch_range([third, first, second], false, 3)
        .await
        .unwrap();

    let order: Vec<NaiveDate> = results.keys().copied().collect();
    assert_eq!(order, vec![first, second, third]);

    let AggregatedRows::Combined(rows) = aggregate(&results, OutputGrouping::Combined) else {
        panic!("expected combined rows");
    };
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_two_day_range_without_statistics() {
    let day_one = date(2024, 6, 1);
    let day_two = date(2024, 6, 2);

    let transport = Arc::new(
        ScriptedTransport::new(TransportKind::Direct)
            .always(
                build_scheduled_events_url(BASE, day_one),
                TestPayloads::scheduled_events(&[100, 101]),
            )
            .always(
                build_scheduled_events_url(BASE, day_two),
                TestPayloads::scheduled_events(&[]),
            ),
    );
    let fetcher = build_fetcher(
        vec![transport.clone()],
        Arc::new(StaticSessionEstablisher::new("UA")),
    );

    let dates = date_range(day_one, day_two).unwrap();
    let results = fetcher.fetch_range(dates, false, 2).await.unwrap();

    assert!(results.values().all(|r| r.error.is_none()));
    assert!(results[&day_two].rows.is_empty());

    let aggregated = aggregate(&results, OutputGrouping::Combined);
    let AggregatedRows::Combined(rows) = &aggregated else {
        panic!("expected combined rows");
    };
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.event_date == day_one));

    let json = serde_json::to_value(&aggregated).unwrap();
    assert_eq!(json[0]["eventDate"], "2024-06-01");
    assert_eq!(json[1]["eventDate"], "2024-06-01");

    // statistics were not requested
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_statistics_merged_from_all_period() {
    let day = date(2024, 6, 1);
    let stats_payload = json!({
        "statistics": [
            {"period": "1ST", "groups": [{"statisticsItems": [
                {"key": "Thrown180", "home": 7, "away": 7},
                {"key": "CheckoutsOver100", "home": 1, "away": 0}
            ]}]},
            {"period": "ALL", "groups": [{"statisticsItems": [
                {"key": "Thrown180", "name": "Thrown 180", "home": 3, "away": 1}
            ]}]}
        ]
    });

    let transport = Arc::new(
        ScriptedTransport::new(TransportKind::Direct)
            .always(
                build_scheduled_events_url(BASE, day),
                TestPayloads::scheduled_events(&[100]),
            )
            .always(build_event_statistics_url(BASE, 100), stats_payload),
    );
    let fetcher = build_fetcher(
        vec![transport],
        Arc::new(StaticSessionEstablisher::new("UA")),
    );

    let results = fetcher.fetch_range([day], true, 1).await.unwrap();
    let row = &results[&day].rows[0];

    assert_eq!(row.id, 100);
    assert_eq!(row.statistics["Thrown180_home"], json!(3));
    assert_eq!(row.statistics["Thrown180_away"], json!(1));
    assert!(!row.statistics.contains_key("CheckoutsOver100_home"));
}

#[tokio::test(start_paused = true)]
async fn test_session_failure_fails_the_batch() {
    let transport = Arc::new(
        ScriptedTransport::new(TransportKind::Direct).always(
            build_scheduled_events_url(BASE, date(2024, 6, 1)),
            TestPayloads::scheduled_events(&[1]),
        ),
    );
    let establisher = Arc::new(StaticSessionEstablisher::new("UA"));
    establisher.fail_next(1);
    let fetcher = build_fetcher(vec![transport.clone()], establisher);

    let err = fetcher
        .fetch_range([date(2024, 6, 1)], false, 1)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Session(_)));
    assert!(err.is_batch_fatal());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_rejections_share_one_refresh() {
    let dates: Vec<NaiveDate> = (1..=3).map(|d| date(2024, 5, d)).collect();
    let mut transport = ScriptedTransport::new(TransportKind::Direct);
    for day in &dates {
        let url = build_scheduled_events_url(BASE, *day);
        transport = transport
            .on(
                url.clone(),
                vec![
                    Err(TestPayloads::forbidden()),
                    Ok(TestPayloads::scheduled_events(&[])),
                ],
            )
            .with_delay(url, Duration::from_millis(10));
    }
    let transport = Arc::new(transport);
    let establisher = Arc::new(StaticSessionEstablisher::new("UA"));
    // all three requests must be rejected while generation 1 is current
    let policy = RetryPolicy {
        politeness_jitter: Duration::ZERO,
        ..fast_policy()
    };
    let fetcher = build_fetcher_with(policy, vec![transport.clone()], establisher.clone());

    let results = fetcher.fetch_range(dates, false, 3).await.unwrap();

    assert!(results.values().all(|r| r.is_success()));
    // one bootstrap for the batch, one refresh for all three rejections
    assert_eq!(establisher.calls(), 2);

    let retried_with: Vec<String> = transport
        .recorded()
        .iter()
        .skip(3)
        .map(|c| c.headers["cookie"].to_str().unwrap().to_string())
        .collect();
    assert_eq!(retried_with, vec!["session=s2"; 3]);
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_escalates_to_rendered() {
    let day = date(2024, 6, 1);
    let url = build_scheduled_events_url(BASE, day);
    let direct = Arc::new(
        ScriptedTransport::new(TransportKind::Direct)
            .on(url.clone(), vec![Err(TestPayloads::forbidden())]),
    );
    let rendered = Arc::new(
        ScriptedTransport::new(TransportKind::Rendered)
            .always(url.clone(), TestPayloads::scheduled_events(&[5])),
    );
    let fetcher = build_fetcher(
        vec![direct.clone(), rendered.clone()],
        Arc::new(StaticSessionEstablisher::new("UA")),
    );

    let results = fetcher.fetch_range([day], false, 1).await.unwrap();

    assert_eq!(results[&day].rows.len(), 1);
    assert_eq!(direct.calls_for(&url), 1);
    assert_eq!(rendered.calls_for(&url), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_schedule_entry_keeps_the_rest_of_the_date() {
    let day = date(2024, 6, 1);
    let url = build_scheduled_events_url(BASE, day);
    let payload = json!({
        "events": [
            {"id": 1, "homeTeam": {"name": "Player 1A"}},
            {"slug": "no-id"},
            {"id": 2, "homeScore": {"display": "3"}},
            {"id": 3}
        ]
    });
    let transport = Arc::new(ScriptedTransport::new(TransportKind::Direct).always(url, payload));
    let fetcher = build_fetcher(
        vec![transport.clone()],
        Arc::new(StaticSessionEstablisher::new("UA")),
    );

    let results = fetcher.fetch_range([day], false, 1).await.unwrap();

    let result = &results[&day];
    assert!(result.is_success());
    let ids: Vec<i64> = result.rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3]);
}
