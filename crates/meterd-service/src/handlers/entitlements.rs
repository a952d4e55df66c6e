//! Entitlement handlers: CRUD, value queries, resets, and history.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use meterd_core::{Entitlement, EntitlementId, EntitlementKind, EntitlementValue, WindowSize};
use meterd_engine::{BurndownSegment, UsageWindow};

use crate::auth::{AdminAuth, ReadAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Entitlement creation request.
#[derive(Debug, Deserialize)]
pub struct CreateEntitlementRequest {
    /// The subject (customer) the entitlement belongs to.
    pub subject_id: String,
    /// The feature the entitlement gates.
    pub feature_key: String,
    /// Kind-specific data.
    pub kind: EntitlementKind,
}

/// Create an entitlement.
pub async fn create_entitlement(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<CreateEntitlementRequest>,
) -> Result<(StatusCode, Json<Entitlement>), ApiError> {
    let subject_id = body
        .subject_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid subject ID".into()))?;

    if body.feature_key.is_empty() {
        return Err(ApiError::BadRequest("Feature key must not be empty".into()));
    }

    tracing::debug!(
        admin_id = %auth.admin_id,
        subject_id = %body.subject_id,
        feature_key = %body.feature_key,
        "Creating entitlement"
    );

    let entitlement = state
        .engine
        .create_entitlement(subject_id, body.feature_key, body.kind)
        .await?;

    Ok((StatusCode::CREATED, Json(entitlement)))
}

/// Get an entitlement by ID.
pub async fn get_entitlement(
    State(state): State<Arc<AppState>>,
    _auth: ReadAuth,
    Path(id): Path<String>,
) -> Result<Json<Entitlement>, ApiError> {
    let entitlement_id = parse_entitlement_id(&id)?;
    let entitlement = state.engine.get_entitlement(&entitlement_id)?;
    Ok(Json(entitlement))
}

/// Soft-delete an entitlement.
pub async fn delete_entitlement(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let entitlement_id = parse_entitlement_id(&id)?;

    tracing::debug!(
        admin_id = %auth.admin_id,
        entitlement_id = %entitlement_id,
        "Deleting entitlement"
    );

    state.engine.delete_entitlement(&entitlement_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Value query parameters.
#[derive(Debug, Deserialize)]
pub struct ValueQuery {
    /// The instant to evaluate at (default: now).
    pub time: Option<DateTime<Utc>>,
}

/// Compute an entitlement's value at an instant.
pub async fn get_value(
    State(state): State<Arc<AppState>>,
    _auth: ReadAuth,
    Path(id): Path<String>,
    Query(query): Query<ValueQuery>,
) -> Result<Json<EntitlementValue>, ApiError> {
    let entitlement_id = parse_entitlement_id(&id)?;
    let at = query.time.unwrap_or_else(Utc::now);

    let value = state.engine.entitlement_value(&entitlement_id, at)?;
    Ok(Json(value))
}

/// Reset request body.
#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    /// The reset instant (default: now).
    pub at: Option<DateTime<Utc>>,
    /// New period anchor, if moving it.
    pub anchor: Option<DateTime<Utc>>,
}

/// Reset an entitlement's usage period.
pub async fn reset_entitlement(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
    body: Option<Json<ResetRequest>>,
) -> Result<StatusCode, ApiError> {
    let entitlement_id = parse_entitlement_id(&id)?;
    let Json(body) = body.unwrap_or_default();

    tracing::debug!(
        admin_id = %auth.admin_id,
        entitlement_id = %entitlement_id,
        at = ?body.at,
        "Resetting entitlement period"
    );

    state
        .engine
        .reset_entitlement(&entitlement_id, body.at, body.anchor)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Start of the query range (inclusive).
    pub from: DateTime<Utc>,
    /// End of the query range (exclusive).
    pub to: DateTime<Utc>,
    /// Fixed window size; omit for burn-down segments.
    pub window_size: Option<WindowSize>,
    /// UTC offset for window alignment, e.g. `+02:00` (default: `Z`).
    pub window_time_zone: Option<String>,
}

/// History response: either burn-down segments or fixed windows.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Burn-down segments (present when no window size was requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<BurndownSegment>>,
    /// Fixed windows (present when a window size was requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows: Option<Vec<UsageWindow>>,
}

/// Reconstruct an entitlement's balance history.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    _auth: ReadAuth,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entitlement_id = parse_entitlement_id(&id)?;

    let response = match query.window_size {
        Some(window_size) => {
            let tz = parse_offset(query.window_time_zone.as_deref().unwrap_or("Z"))?;
            let windows = state.engine.windowed_history(
                &entitlement_id,
                query.from,
                query.to,
                window_size,
                tz,
            )?;
            HistoryResponse {
                segments: None,
                windows: Some(windows),
            }
        }
        None => {
            let segments = state
                .engine
                .burndown_history(&entitlement_id, query.from, query.to)?;
            HistoryResponse {
                segments: Some(segments),
                windows: None,
            }
        }
    };

    Ok(Json(response))
}

fn parse_entitlement_id(id: &str) -> Result<EntitlementId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest("Invalid entitlement ID".into()))
}

fn parse_offset(s: &str) -> Result<FixedOffset, ApiError> {
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| ApiError::Internal("UTC offset construction failed".into()));
    }
    // An unencoded `+02:00` arrives with the plus decoded to a space;
    // a bare `02:00` is treated as east of UTC too.
    let normalized = match s.strip_prefix(' ') {
        Some(rest) => format!("+{rest}"),
        None if !s.starts_with('+') && !s.starts_with('-') => format!("+{s}"),
        None => s.to_string(),
    };
    normalized
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid UTC offset: {s}")))
}
