//! Grant ledger handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use meterd_core::{Grant, GrantId, Recurrence, RolloverPolicy};
use meterd_engine::GrantParams;

use crate::auth::{AdminAuth, ReadAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Grant creation request.
#[derive(Debug, Deserialize)]
pub struct CreateGrantRequest {
    /// Granted quantity in base units.
    pub amount: i64,
    /// Start of the effective window (inclusive).
    pub effective_at: DateTime<Utc>,
    /// End of the effective window (exclusive).
    pub expires_at: DateTime<Utc>,
    /// Burn-down priority; lower is consumed first (default 0).
    #[serde(default)]
    pub priority: u8,
    /// Optional recurrence rule.
    pub recurrence: Option<Recurrence>,
    /// Optional rollover policy.
    pub rollover: Option<RolloverPolicy>,
}

/// Add a grant to a metered entitlement.
pub async fn create_grant(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
    Json(body): Json<CreateGrantRequest>,
) -> Result<(StatusCode, Json<Grant>), ApiError> {
    let entitlement_id = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid entitlement ID".into()))?;

    tracing::debug!(
        admin_id = %auth.admin_id,
        entitlement_id = %entitlement_id,
        amount = %body.amount,
        priority = %body.priority,
        "Creating grant"
    );

    let grant = state
        .engine
        .add_grant(
            &entitlement_id,
            GrantParams {
                amount: body.amount,
                effective_at: body.effective_at,
                expires_at: body.expires_at,
                priority: body.priority,
                recurrence: body.recurrence,
                rollover: body.rollover,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(grant)))
}

/// Grant listing parameters.
#[derive(Debug, Deserialize)]
pub struct ListGrantsQuery {
    /// Include voided grants in the listing.
    #[serde(default)]
    pub include_voided: bool,
}

/// List an entitlement's grants in burn-down order.
pub async fn list_grants(
    State(state): State<Arc<AppState>>,
    _auth: ReadAuth,
    Path(id): Path<String>,
    Query(query): Query<ListGrantsQuery>,
) -> Result<Json<Vec<Grant>>, ApiError> {
    let entitlement_id = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid entitlement ID".into()))?;

    let grants = state.engine.list_grants(&entitlement_id, query.include_voided)?;
    Ok(Json(grants))
}

/// Void a grant.
pub async fn void_grant(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let grant_id: GrantId = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid grant ID".into()))?;

    tracing::debug!(admin_id = %auth.admin_id, grant_id = %grant_id, "Voiding grant");

    state.engine.void_grant(&grant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
