//! Integration tests for fire-and-poll campaigns using wiremock.
//!
//! 1. POST queries/run → returns the campaign id
//! 2. GET campaigns/{id} → polled until status 2 (finished) or the deadline
//!
//! Poll intervals are shortened to milliseconds to keep the tests fast.

use std::time::Duration;

use fleet_api::FleetError;
use fleet_api::campaign::*;
use fleet_api::client::Connection;
use fleet_api::live_query::{QueryExecution, QuerySource, QueryTargets, RunOptions, run_query};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CAMPAIGN_ID: u64 = 11;

fn mock_connection(server: &MockServer) -> Connection {
    Connection::new(&server.uri(), "test-token").expect("mock server uri is valid")
}

fn fast_poll(timeout_ms: u64) -> PollConfig {
    PollConfig::new(Duration::from_millis(10), Duration::from_millis(timeout_ms))
}

fn campaign(status: u8) -> Value {
    json!({
        "id": CAMPAIGN_ID,
        "query_id": 3,
        "status": status,
        "totals": {"count": 2, "online": 2, "offline": 0, "missing_in_action": 0}
    })
}

async fn mount_launch(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/latest/fleet/queries/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"campaign": campaign(0)})))
        .expect(1)
        .mount(server)
        .await;
}

fn status_response(status: u8) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "campaign": campaign(status),
        "results": [{"host_id": 1, "rows": [{"version": "22.04"}]}],
        "errors": [{"host_id": 2, "error": "timeout"}]
    }))
}

fn status_path() -> String {
    format!("/api/latest/fleet/campaigns/{CAMPAIGN_ID}")
}

#[tokio::test]
async fn campaign_waits_until_finished() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    Mock::given(method("POST"))
        .and(path("/api/latest/fleet/queries/run"))
        .and(body_json(json!({
            "query": "SELECT version FROM os_version;",
            "selected": {"hosts": [1, 2], "labels": [6]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"campaign": campaign(0)})))
        .expect(1)
        .mount(&server)
        .await;
    // First poll: still running. Every later poll: finished.
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(status_response(1))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(status_response(2))
        .mount(&server)
        .await;

    let outcome = run_campaign(
        &conn,
        &QuerySource::Sql("SELECT version FROM os_version;".to_string()),
        &QueryTargets {
            hosts: vec![1, 2],
            labels: vec![6],
        },
        Some(&fast_poll(5_000)),
    )
    .await
    .unwrap();

    let report = match outcome {
        CampaignOutcome::Completed(report) => report,
        other => panic!("expected a completed campaign, got {other:?}"),
    };
    assert!(!report.partial);
    assert_eq!(report.campaign.status, CampaignStatus::Finished);
    assert_eq!(report.totals.count, 2);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].host_id, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].error, "timeout");
}

#[tokio::test]
async fn null_result_lists_do_not_stall_polling() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    mount_launch(&server).await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "campaign": campaign(2),
            "results": null,
            "errors": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = run_campaign(
        &conn,
        &QuerySource::Saved(3),
        &QueryTargets::hosts([1]),
        Some(&fast_poll(5_000)),
    )
    .await
    .unwrap();

    let report = match outcome {
        CampaignOutcome::Completed(report) => report,
        other => panic!("expected a completed campaign, got {other:?}"),
    };
    assert!(!report.partial, "a finished campaign with no rows is complete");
    assert_eq!(report.campaign.status, CampaignStatus::Finished);
    assert!(report.results.is_empty());
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn deadline_returns_partial_snapshot() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    mount_launch(&server).await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(status_response(1))
        .mount(&server)
        .await;

    let outcome = run_campaign(
        &conn,
        &QuerySource::Saved(3),
        &QueryTargets::labels([6]),
        Some(&fast_poll(60)),
    )
    .await
    .expect("a deadline is not an error");

    let report = match outcome {
        CampaignOutcome::Completed(report) => report,
        other => panic!("expected a report, got {other:?}"),
    };
    assert!(report.partial, "unfinished campaign must be marked partial");
    assert_eq!(report.campaign.status, CampaignStatus::Running);
    assert_eq!(report.results.len(), 1, "final fetch data is kept");
}

#[tokio::test]
async fn deadline_with_failing_polls_falls_back_to_launch_state() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    mount_launch(&server).await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = run_campaign(
        &conn,
        &QuerySource::Saved(3),
        &QueryTargets::hosts([1]),
        Some(&fast_poll(50)),
    )
    .await
    .unwrap();

    let report = match outcome {
        CampaignOutcome::Completed(report) => report,
        other => panic!("expected a report, got {other:?}"),
    };
    assert!(report.partial);
    assert_eq!(report.campaign.id, CAMPAIGN_ID);
    assert_eq!(report.campaign.status, CampaignStatus::Waiting);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn transient_poll_failure_is_retried() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    mount_launch(&server).await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "flaky"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(status_path()))
        .respond_with(status_response(2))
        .mount(&server)
        .await;

    let outcome = run_campaign(
        &conn,
        &QuerySource::Saved(3),
        &QueryTargets::hosts([1]),
        Some(&fast_poll(5_000)),
    )
    .await
    .unwrap();

    let report = match outcome {
        CampaignOutcome::Completed(report) => report,
        other => panic!("expected a report, got {other:?}"),
    };
    assert!(!report.partial);
}

#[tokio::test]
async fn no_wait_returns_launched_campaign_without_polling() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    Mock::given(method("POST"))
        .and(path("/api/latest/fleet/queries/run"))
        .and(body_json(json!({
            "query_id": 3,
            "selected": {"hosts": [], "labels": [6]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"campaign": campaign(0)})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(status_response(2))
        .expect(0)
        .mount(&server)
        .await;

    let execution = run_query(
        &conn,
        &QuerySource::Saved(3),
        &QueryTargets::labels([6]),
        &RunOptions {
            synchronous: true,
            poll: None,
        },
    )
    .await
    .unwrap();

    match execution {
        QueryExecution::Campaign(CampaignOutcome::Launched(c)) => assert_eq!(c.id, CAMPAIGN_ID),
        other => panic!("expected a launched campaign, got {other:?}"),
    }
}

#[tokio::test]
async fn launch_without_campaign_id_is_unacknowledged() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    Mock::given(method("POST"))
        .and(path("/api/latest/fleet/queries/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "accepted"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(status_response(2))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = run_campaign(
        &conn,
        &QuerySource::Saved(3),
        &QueryTargets::hosts([1]),
        Some(&fast_poll(1_000)),
    )
    .await
    .unwrap();

    match outcome {
        CampaignOutcome::Unacknowledged(raw) => assert_eq!(raw, json!({"status": "accepted"})),
        other => panic!("expected Unacknowledged, got {other:?}"),
    }
}

#[tokio::test]
async fn launch_failure_propagates() {
    let server = MockServer::start().await;
    let conn = mock_connection(&server);

    Mock::given(method("POST"))
        .and(path("/api/latest/fleet/queries/run"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Bad request",
            "errors": [{"name": "base", "reason": "Requires Fleet Premium license"}]
        })))
        .mount(&server)
        .await;

    let err = run_campaign(
        &conn,
        &QuerySource::Saved(3),
        &QueryTargets::labels([6]),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FleetError::PremiumRequired { .. }), "got {err:?}");
}
