//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use meterd_core::MeterError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - duplicate resource or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Duplicate usage event (idempotency).
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// Reset requested at or before the latest recorded reset.
    #[error("reset out of order: requested={requested}, latest={latest}")]
    ResetOutOfOrder {
        /// The requested reset instant.
        requested: String,
        /// The latest recorded reset instant.
        latest: String,
    },

    /// Precondition failed - the target is in a state that forbids the
    /// operation (e.g. soft-deleted).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Service unavailable (e.g. store not reachable).
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::DuplicateEvent(id) => (
                StatusCode::CONFLICT,
                "duplicate_event",
                format!("Event {id} already recorded"),
                None,
            ),
            Self::ResetOutOfOrder { requested, latest } => (
                StatusCode::CONFLICT,
                "reset_out_of_order",
                self.to_string(),
                Some(serde_json::json!({
                    "requested": requested,
                    "latest": latest
                })),
            ),
            Self::PreconditionFailed(msg) => (
                StatusCode::PRECONDITION_FAILED,
                "precondition_failed",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<MeterError> for ApiError {
    fn from(err: MeterError) -> Self {
        match err {
            MeterError::EntitlementNotFound { id } => {
                Self::NotFound(format!("entitlement not found: {id}"))
            }
            MeterError::GrantNotFound { id } => Self::NotFound(format!("grant not found: {id}")),
            MeterError::InvalidTimeRange { .. }
            | MeterError::InvalidAmount(_)
            | MeterError::InvalidQueryWindow { .. }
            | MeterError::InvalidId(_) => Self::BadRequest(err.to_string()),
            MeterError::NotMetered { id } => {
                Self::BadRequest(format!("entitlement {id} is not metered"))
            }
            MeterError::EntitlementDeleted { id } => {
                Self::PreconditionFailed(format!("entitlement {id} is deleted"))
            }
            MeterError::AlreadyVoided { id } => {
                Self::Conflict(format!("grant {id} is already voided"))
            }
            MeterError::DuplicateEntitlement {
                subject,
                feature_key,
            } => Self::Conflict(format!(
                "subject {subject} already holds an active entitlement for {feature_key}"
            )),
            MeterError::DuplicateEvent { event_id } => Self::DuplicateEvent(event_id),
            MeterError::ResetOutOfOrder { requested, latest } => Self::ResetOutOfOrder {
                requested: requested.to_rfc3339(),
                latest: latest.to_rfc3339(),
            },
            MeterError::NotAuthorized => Self::Forbidden,
            MeterError::Storage(msg) | MeterError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
