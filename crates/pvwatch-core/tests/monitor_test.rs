// End-to-end tests for `Monitor` against a wiremock gateway.
//
// Background tasks are not started: tests drive the heartbeat and poll
// cycles explicitly through `check_connection()` / `poll_now()` so each
// assertion observes a deterministic state.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pvwatch_core::{
    ConnectionState, CoreError, Monitor, MonitorConfig, PvName, PvStatus, TimeWindow,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn test_config(server: &MockServer) -> MonitorConfig {
    MonitorConfig {
        gateway_url: server.uri().parse().unwrap(),
        history_url: server.uri().parse().unwrap(),
        transport_timeout: Duration::from_secs(2),
        heartbeat_timeout: Duration::from_secs(1),
        fetch_timeout: Duration::from_secs(1),
        subscribe_timeout: Duration::from_secs(1),
        unsubscribe_timeout: Duration::from_millis(500),
        ..MonitorConfig::default()
    }
}

async fn connected_monitor(server: &MockServer, existing: &[&str]) -> Monitor {
    Mock::given(method("GET"))
        .and(path("/pvs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(existing)))
        .mount(server)
        .await;

    let monitor = Monitor::new(test_config(server)).unwrap();
    assert!(monitor.check_connection().await);
    assert_eq!(monitor.connection_state(), ConnectionState::Connected);
    monitor
}

fn pv(name: &str) -> PvName {
    PvName::new(name).unwrap()
}

fn reading(value: f64) -> serde_json::Value {
    json!({
        "value": value,
        "connectionStatus": "CONNECTED",
        "alarmSeverity": "NO_ALARM",
        "dataType": "Double",
        "units": "degC",
    })
}

// ── Subscription lifecycle ──────────────────────────────────────────

#[tokio::test]
async fn malformed_name_fails_validation_with_no_network_call() {
    let server = MockServer::start().await;

    // Zero subscribe calls may reach the gateway.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &[]).await;

    for bad in ["", "   ", "DEV TEMP", "DEV/TEMP"] {
        let err = monitor.subscribe(bad, None).await.unwrap_err();
        assert!(
            matches!(err, CoreError::Validation { .. }),
            "{bad:?} should fail validation"
        );
    }
}

#[tokio::test]
async fn subscribe_is_idempotent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/subscribe/DEV:TEMP"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &[]).await;

    monitor.subscribe("DEV:TEMP", None).await.unwrap();
    // Second call (with surrounding whitespace) is a local no-op.
    monitor.subscribe("  DEV:TEMP ", None).await.unwrap();

    assert_eq!(monitor.subscriptions().len(), 1);
}

#[tokio::test]
async fn subscribe_requires_connected_state() {
    let server = MockServer::start().await;
    let monitor = Monitor::new(test_config(&server)).unwrap();

    // Never checked: still Checking.
    let err = monitor.subscribe("DEV:TEMP", None).await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
}

#[tokio::test]
async fn cross_group_duplicate_is_rejected_without_network_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/subscribe/X:Y"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &[]).await;

    let report = monitor
        .bulk_subscribe("A", &["X:Y".to_owned()])
        .await
        .unwrap();
    assert_eq!(report.successful, vec![pv("X:Y")]);

    let err = monitor.subscribe("X:Y", Some("B")).await.unwrap_err();
    match err {
        CoreError::DuplicatePv { existing_group, .. } => assert_eq!(existing_group, "A"),
        other => panic!("expected DuplicatePv, got {other:?}"),
    }
    assert_eq!(monitor.group_of(&pv("X:Y")).as_deref(), Some("A"));
}

#[tokio::test]
async fn bulk_subscribe_isolates_failures_and_commits_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/subscribe/SYS:OK1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe/SYS:BAD"))
        .respond_with(ResponseTemplate::new(500).set_body_string("IOC unreachable"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe/SYS:OK2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &[]).await;

    let names = vec![
        "SYS:OK1".to_owned(),
        "SYS:BAD".to_owned(),
        "SYS:OK1".to_owned(), // repeated in input
        "SYS:OK2".to_owned(),
    ];
    let report = monitor.bulk_subscribe("SYS", &names).await.unwrap();

    assert_eq!(report.successful, vec![pv("SYS:OK1"), pv("SYS:OK2")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "SYS:BAD");
    assert_eq!(report.duplicates.len(), 1);

    // The failing entry never aborted the batch, and both successes are
    // claimed by the group.
    assert_eq!(monitor.group_of(&pv("SYS:OK1")).as_deref(), Some("SYS"));
    assert_eq!(monitor.group_of(&pv("SYS:OK2")).as_deref(), Some("SYS"));
    assert!(!monitor.subscriptions().contains(&pv("SYS:BAD")));
}

#[tokio::test]
async fn bulk_subscribe_skips_claimed_names_without_network_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/subscribe/X:Y"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1) // only the first batch may call out
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &[]).await;
    monitor.bulk_subscribe("A", &["X:Y".to_owned()]).await.unwrap();

    let report = monitor.bulk_subscribe("B", &["X:Y".to_owned()]).await.unwrap();
    assert!(report.successful.is_empty());
    assert_eq!(report.duplicates.len(), 1);
    assert!(report.duplicates[0].1.contains('A'));
    // Still owned by the first group.
    assert_eq!(monitor.group_of(&pv("X:Y")).as_deref(), Some("A"));
}

#[tokio::test]
async fn unsubscribe_removes_local_state_even_when_gateway_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/subscribe/DEV:TEMP"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/unsubscribe/DEV:TEMP"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &[]).await;
    monitor.subscribe("DEV:TEMP", None).await.unwrap();

    // The network failure is logged, never surfaced.
    monitor.unsubscribe("DEV:TEMP").await.unwrap();
    assert!(monitor.subscriptions().is_empty());
}

// ── Connection state machine ────────────────────────────────────────

#[tokio::test]
async fn reconnect_reconciles_from_gateway_list() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/subscribe/DEV:TEMP"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &[]).await;
    monitor.subscribe("DEV:TEMP", None).await.unwrap();
    assert_eq!(monitor.subscriptions().len(), 1);

    // Heartbeat failure: non-2xx flips the state to Error and clears
    // all local subscription state.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/pvs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(!monitor.check_connection().await);
    assert_eq!(monitor.connection_state(), ConnectionState::Error);
    assert!(monitor.subscriptions().is_empty());

    // Recovery: the gateway's reported list wins wholesale, including a
    // PV this client never subscribed locally.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/pvs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!(["DEV:TEMP", "DEV:PRESSURE"])),
        )
        .mount(&server)
        .await;

    assert!(monitor.check_connection().await);
    assert_eq!(monitor.connection_state(), ConnectionState::Connected);
    let subs = monitor.subscriptions();
    assert!(subs.contains(&pv("DEV:TEMP")));
    assert!(subs.contains(&pv("DEV:PRESSURE")));
}

#[tokio::test]
async fn unreachable_gateway_means_disconnected() {
    let server = MockServer::start().await;
    let monitor = connected_monitor(&server, &["DEV:TEMP"]).await;
    assert_eq!(monitor.subscriptions().len(), 1);

    // Kill the server: connection refused, not an HTTP error.
    drop(server);

    assert!(!monitor.check_connection().await);
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);
    assert!(monitor.subscriptions().is_empty());
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn poll_cycle_isolates_per_pv_failures_and_self_heals() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pv/DEV:GOOD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reading(42.5)))
        .mount(&server)
        .await;
    // First read fails, later reads succeed.
    Mock::given(method("GET"))
        .and(path("/pv/DEV:FLAKY"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CA timeout"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pv/DEV:FLAKY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reading(7.0)))
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &["DEV:GOOD", "DEV:FLAKY"]).await;

    assert!(monitor.poll_now().await);
    assert_eq!(monitor.cycles_completed(), 1);

    // The healthy PV came through untouched by its neighbor's failure.
    let samples = monitor.samples();
    assert_eq!(samples[&pv("DEV:GOOD")].numeric_value, Some(42.5));
    assert_eq!(monitor.table().status_of(&pv("DEV:GOOD")), PvStatus::Connected);

    // The failing PV got an error record and an error-status sample.
    assert_eq!(monitor.table().status_of(&pv("DEV:FLAKY")), PvStatus::Error);
    assert_eq!(monitor.errors().len(), 1);
    assert_eq!(samples[&pv("DEV:FLAKY")].formatted_value, "Error");

    // Next cycle: the error clears on its own.
    assert!(monitor.poll_now().await);
    assert_eq!(monitor.cycles_completed(), 2);
    assert!(monitor.errors().is_empty());
    assert_eq!(monitor.table().status_of(&pv("DEV:FLAKY")), PvStatus::Connected);
    assert_eq!(
        monitor.samples()[&pv("DEV:FLAKY")].numeric_value,
        Some(7.0)
    );
}

#[tokio::test]
async fn overlapping_poll_is_dropped_not_queued() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pv/DEV:SLOW"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(reading(1.0))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &["DEV:SLOW"]).await;

    // Two "ticks" while the first is still in flight: exactly one runs.
    let (first, second) = tokio::join!(monitor.poll_now(), monitor.poll_now());
    assert!(first != second, "exactly one of the two cycles may run");
    assert_eq!(monitor.cycles_completed(), 1);
}

#[tokio::test]
async fn per_pv_fetch_timeout_is_isolated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pv/DEV:STUCK"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(reading(1.0))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pv/DEV:FAST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reading(2.0)))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.fetch_timeout = Duration::from_millis(200);
    Mock::given(method("GET"))
        .and(path("/pvs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!(["DEV:STUCK", "DEV:FAST"])),
        )
        .mount(&server)
        .await;
    let monitor = Monitor::new(config).unwrap();
    assert!(monitor.check_connection().await);

    assert!(monitor.poll_now().await);
    assert_eq!(monitor.table().status_of(&pv("DEV:FAST")), PvStatus::Connected);
    assert_eq!(monitor.table().status_of(&pv("DEV:STUCK")), PvStatus::Error);
}

// ── Charting ────────────────────────────────────────────────────────

#[tokio::test]
async fn merged_series_combines_history_and_live() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pv/DEV:TEMP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reading(42.5)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/multiple"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "DEV:TEMP": [
                    { "time": "2000-01-01T00:00:00Z", "value": 40.0 },
                ]
            }
        })))
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &["DEV:TEMP"]).await;
    // Window wide enough that the archived point is inside it.
    monitor
        .set_window(TimeWindow::from_secs(2_000_000_000))
        .await
        .unwrap();
    monitor.select_for_chart(&[pv("DEV:TEMP")]).await.unwrap();
    assert!(monitor.poll_now().await);

    let merged = monitor.merged_series();
    let series = &merged[&pv("DEV:TEMP")];
    assert_eq!(series.len(), 2);
    assert!(series[0].is_historical);
    assert!(!series[1].is_historical);
    assert!(series[1].timestamp > series[0].timestamp);
}

#[tokio::test]
async fn window_change_refetches_history() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/multiple"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {}
        })))
        .expect(2) // selection + window change
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &["DEV:TEMP"]).await;
    monitor.select_for_chart(&[pv("DEV:TEMP")]).await.unwrap();
    monitor
        .set_window(TimeWindow::from_secs(3600))
        .await
        .unwrap();
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_unsubscribes_everything_with_settle_all() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/unsubscribe/DEV:TEMP"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    // One PV times out; shutdown completes anyway, bounded per call.
    Mock::given(method("DELETE"))
        .and(path("/unsubscribe/DEV:STUCK"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .expect(1)
        .mount(&server)
        .await;

    let monitor = connected_monitor(&server, &["DEV:TEMP", "DEV:STUCK"]).await;

    let started = std::time::Instant::now();
    monitor.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(monitor.subscriptions().is_empty());
    assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);
}
