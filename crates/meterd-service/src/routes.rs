//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{entitlements, grants, health, usage};
use crate::state::AppState;

/// Maximum concurrent requests for usage ingestion.
/// Metering pipelines are the highest-volume callers.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Entitlements (admin key for mutation, service or admin key for reads)
/// - `POST /v1/entitlements` - Create entitlement
/// - `GET /v1/entitlements/:id` - Get entitlement
/// - `DELETE /v1/entitlements/:id` - Soft-delete entitlement
/// - `GET /v1/entitlements/:id/value?time=` - Value query
/// - `POST /v1/entitlements/:id/reset` - Period reset
/// - `GET /v1/entitlements/:id/history?from=&to=&window_size=` - History
///
/// ## Grants
/// - `POST /v1/entitlements/:id/grants` - Add grant
/// - `GET /v1/entitlements/:id/grants?include_voided=` - List grants
/// - `DELETE /v1/grants/:id` - Void grant
///
/// ## Usage (service API key, concurrency-limited)
/// - `POST /v1/usage` - Record usage event
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Usage ingestion gets its own, higher concurrency limit.
    let usage_routes = Router::new()
        .route("/", post(usage::report_usage))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Entitlements
        .route("/entitlements", post(entitlements::create_entitlement))
        .route("/entitlements/:id", get(entitlements::get_entitlement))
        .route("/entitlements/:id", delete(entitlements::delete_entitlement))
        .route("/entitlements/:id/value", get(entitlements::get_value))
        .route("/entitlements/:id/reset", post(entitlements::reset_entitlement))
        .route("/entitlements/:id/history", get(entitlements::get_history))
        // Grants
        .route("/entitlements/:id/grants", post(grants::create_grant))
        .route("/entitlements/:id/grants", get(grants::list_grants))
        .route("/grants/:id", delete(grants::void_grant))
        // Usage routes (with their own concurrency limit)
        .nest("/usage", usage_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no limit)
        .route("/health", get(health::health))
        // API v1 routes
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
