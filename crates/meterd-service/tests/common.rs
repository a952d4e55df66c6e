//! Common test utilities for meterd integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tempfile::TempDir;

use meterd_service::{create_router, AppState, ServiceConfig};
use meterd_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// The service API key for usage ingestion.
    pub service_api_key: String,
    /// The admin API key for mutations.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        };

        let state = AppState::new(Arc::new(store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            _temp_dir: temp_dir,
            service_api_key,
            admin_api_key,
        }
    }

    /// Create a metered entitlement and return its ID.
    pub async fn create_metered_entitlement(&self, subject_id: &str, feature_key: &str) -> String {
        let response = self
            .server
            .post("/v1/entitlements")
            .add_header("x-admin-key", &self.admin_api_key)
            .json(&json!({
                "subject_id": subject_id,
                "feature_key": feature_key,
                "kind": { "type": "metered" }
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        body["id"].as_str().expect("entitlement id").to_string()
    }

    /// Add a grant and return its ID.
    pub async fn add_grant(
        &self,
        entitlement_id: &str,
        amount: i64,
        priority: u8,
        effective_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> String {
        let response = self
            .server
            .post(&format!("/v1/entitlements/{entitlement_id}/grants"))
            .add_header("x-admin-key", &self.admin_api_key)
            .json(&json!({
                "amount": amount,
                "priority": priority,
                "effective_at": effective_at.to_rfc3339(),
                "expires_at": expires_at.to_rfc3339(),
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        body["id"].as_str().expect("grant id").to_string()
    }

    /// Record a usage event through the ingestion endpoint.
    pub async fn record_usage(
        &self,
        event_id: &str,
        entitlement_id: &str,
        quantity: i64,
        at: DateTime<Utc>,
    ) {
        self.server
            .post("/v1/usage")
            .add_header("x-api-key", &self.service_api_key)
            .add_header("x-service-name", "metering-pipeline")
            .json(&json!({
                "event_id": event_id,
                "entitlement_id": entitlement_id,
                "quantity": quantity,
                "timestamp": at.to_rfc3339(),
            }))
            .await
            .assert_status_ok();
    }

    /// Query the entitlement value at an instant.
    pub async fn value_at(&self, entitlement_id: &str, at: DateTime<Utc>) -> serde_json::Value {
        let response = self
            .server
            .get(&format!("/v1/entitlements/{entitlement_id}/value"))
            .add_query_param("time", at.to_rfc3339())
            .add_header("x-api-key", &self.service_api_key)
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A base instant shortly after harness creation, so entitlements created
/// "now" cover it.
pub fn t_base() -> DateTime<Utc> {
    Utc::now() + Duration::seconds(1)
}
