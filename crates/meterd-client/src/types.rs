//! Request and response types for the meterd client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage event request.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRequest {
    /// Unique event ID for idempotency.
    pub event_id: String,
    /// The entitlement the usage is attributed to.
    pub entitlement_id: String,
    /// Quantity used, in base units.
    pub quantity: i64,
    /// When the usage occurred (server uses now if omitted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Additional metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Usage response from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageResponse {
    /// Whether the event was accepted.
    pub accepted: bool,
    /// Cumulative usage in the period covering the event.
    pub usage_total: i64,
}

/// The computed value of an entitlement, keyed by the `type` discriminant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EntitlementValue {
    /// Metered value.
    Metered {
        /// Whether the subject has access.
        has_access: bool,
        /// Aggregate remaining balance across active grants.
        balance: i64,
        /// Usage accumulated since the period start.
        usage: i64,
        /// Usage beyond the total granted amount.
        overage: i64,
    },
    /// Boolean value.
    Boolean {
        /// Whether the subject has access.
        has_access: bool,
    },
    /// Static value.
    Static {
        /// Whether the subject has access.
        has_access: bool,
        /// The configured value.
        value: serde_json::Value,
    },
}

impl EntitlementValue {
    /// Whether the subject has access.
    #[must_use]
    pub const fn has_access(&self) -> bool {
        match self {
            Self::Metered { has_access, .. }
            | Self::Boolean { has_access }
            | Self::Static { has_access, .. } => *has_access,
        }
    }
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
