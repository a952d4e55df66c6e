//! Usage ingestion and burn-down integration tests.

mod common;

use chrono::Duration;
use common::{t_base, TestHarness};
use meterd_core::SubjectId;
use serde_json::json;

fn subject() -> String {
    SubjectId::generate().to_string()
}

#[tokio::test]
async fn usage_burns_down_single_grant() {
    let harness = TestHarness::new();
    let ent = harness
        .create_metered_entitlement(&subject(), "api_requests")
        .await;

    let t0 = t_base();
    harness
        .add_grant(&ent, 100, 0, t0, t0 + Duration::days(30))
        .await;

    let response = harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "event_id": "evt_1",
            "entitlement_id": ent,
            "quantity": 60,
            "timestamp": (t0 + Duration::minutes(1)).to_rfc3339(),
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["accepted"], true);
    assert_eq!(body["usage_total"], 60);

    let value = harness.value_at(&ent, t0 + Duration::minutes(2)).await;
    assert_eq!(value["type"], "metered");
    assert_eq!(value["has_access"], true);
    assert_eq!(value["balance"], 40);
    assert_eq!(value["usage"], 60);
    assert_eq!(value["overage"], 0);
}

#[tokio::test]
async fn usage_burns_grants_in_priority_order() {
    let harness = TestHarness::new();
    let ent = harness
        .create_metered_entitlement(&subject(), "api_requests")
        .await;

    let t0 = t_base();
    harness
        .add_grant(&ent, 50, 0, t0, t0 + Duration::days(30))
        .await;
    harness
        .add_grant(&ent, 100, 1, t0, t0 + Duration::days(30))
        .await;

    harness
        .record_usage("evt_1", &ent, 70, t0 + Duration::minutes(1))
        .await;

    let value = harness.value_at(&ent, t0 + Duration::minutes(2)).await;
    assert_eq!(value["balance"], 80);
    assert_eq!(value["usage"], 70);
}

#[tokio::test]
async fn overage_reported_not_errored() {
    let harness = TestHarness::new();
    let ent = harness
        .create_metered_entitlement(&subject(), "api_requests")
        .await;

    let t0 = t_base();
    harness
        .add_grant(&ent, 50, 0, t0, t0 + Duration::days(30))
        .await;

    harness
        .record_usage("evt_1", &ent, 80, t0 + Duration::minutes(1))
        .await;

    let value = harness.value_at(&ent, t0 + Duration::minutes(2)).await;
    assert_eq!(value["has_access"], false);
    assert_eq!(value["balance"], 0);
    assert_eq!(value["usage"], 80);
    assert_eq!(value["overage"], 30);
}

#[tokio::test]
async fn duplicate_event_conflicts() {
    let harness = TestHarness::new();
    let ent = harness
        .create_metered_entitlement(&subject(), "api_requests")
        .await;

    let t0 = t_base();
    harness
        .add_grant(&ent, 100, 0, t0, t0 + Duration::days(30))
        .await;
    harness
        .record_usage("evt_1", &ent, 10, t0 + Duration::minutes(1))
        .await;

    let response = harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "event_id": "evt_1",
            "entitlement_id": ent,
            "quantity": 10,
            "timestamp": (t0 + Duration::minutes(2)).to_rfc3339(),
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "duplicate_event");

    // The replay did not double-charge.
    let value = harness.value_at(&ent, t0 + Duration::minutes(3)).await;
    assert_eq!(value["usage"], 10);
}

#[tokio::test]
async fn usage_rejects_negative_quantity() {
    let harness = TestHarness::new();
    let ent = harness
        .create_metered_entitlement(&subject(), "api_requests")
        .await;

    let response = harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "event_id": "evt_1",
            "entitlement_id": ent,
            "quantity": -5,
        }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn usage_without_api_key_fails() {
    let harness = TestHarness::new();
    let ent = harness
        .create_metered_entitlement(&subject(), "api_requests")
        .await;

    let response = harness
        .server
        .post("/v1/usage")
        .json(&json!({
            "event_id": "evt_1",
            "entitlement_id": ent,
            "quantity": 10,
        }))
        .await;
    response.assert_status_unauthorized();

    // The admin key does not authorize ingestion either.
    let response = harness
        .server
        .post("/v1/usage")
        .add_header("x-admin-key", &harness.admin_api_key)
        .json(&json!({
            "event_id": "evt_1",
            "entitlement_id": ent,
            "quantity": 10,
        }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn expired_grant_does_not_back_value() {
    let harness = TestHarness::new();
    let ent = harness
        .create_metered_entitlement(&subject(), "api_requests")
        .await;

    let t0 = t_base();
    harness
        .add_grant(&ent, 100, 0, t0, t0 + Duration::hours(1))
        .await;

    let value = harness.value_at(&ent, t0 + Duration::minutes(30)).await;
    assert_eq!(value["balance"], 100);

    let value = harness.value_at(&ent, t0 + Duration::hours(2)).await;
    assert_eq!(value["balance"], 0);
    assert_eq!(value["has_access"], false);
}
