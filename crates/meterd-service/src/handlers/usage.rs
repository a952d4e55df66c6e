//! Usage ingestion handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meterd_core::{EntitlementValue, UsageEvent};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Usage event request from metering pipelines.
#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    /// Unique event ID for idempotency.
    pub event_id: String,
    /// The entitlement the usage is attributed to.
    pub entitlement_id: String,
    /// Quantity used, in base units.
    pub quantity: i64,
    /// When the usage occurred (default: now).
    pub timestamp: Option<DateTime<Utc>>,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Usage response.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Whether the event was accepted.
    pub accepted: bool,
    /// Cumulative usage in the period covering the event.
    pub usage_total: i64,
}

/// Record a usage event.
pub async fn report_usage(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<UsageRequest>,
) -> Result<Json<UsageResponse>, ApiError> {
    tracing::debug!(
        service = %auth.service_name,
        event_id = %body.event_id,
        entitlement_id = %body.entitlement_id,
        quantity = %body.quantity,
        "Processing usage event"
    );

    let entitlement_id = body
        .entitlement_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid entitlement ID".into()))?;

    let at = body.timestamp.unwrap_or_else(Utc::now);
    let event = UsageEvent::new(body.event_id.clone(), entitlement_id, body.quantity)
        .at(at)
        .with_metadata(body.metadata);

    state.engine.record_usage(event).await?;

    let usage_total = match state.engine.entitlement_value(&entitlement_id, at)? {
        EntitlementValue::Metered { usage, .. } => usage,
        _ => 0,
    };

    tracing::info!(
        service = %auth.service_name,
        event_id = %body.event_id,
        entitlement_id = %entitlement_id,
        usage_total = %usage_total,
        "Usage recorded"
    );

    Ok(Json(UsageResponse {
        accepted: true,
        usage_total,
    }))
}
