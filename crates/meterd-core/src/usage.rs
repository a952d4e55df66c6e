//! Usage event types.
//!
//! Metering pipelines report usage events against metered entitlements.
//! The `event_id` is the idempotency key: replaying an event is a conflict,
//! not a double charge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EntitlementId;

/// A usage event reported by a metering source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique event ID for idempotency.
    pub event_id: String,

    /// The entitlement the usage is attributed to.
    pub entitlement_id: EntitlementId,

    /// Quantity used, in base units. Non-negative.
    pub quantity: i64,

    /// When the usage occurred.
    pub at: DateTime<Utc>,

    /// Additional context (`source`, `request_id`, etc.).
    pub metadata: serde_json::Value,
}

impl UsageEvent {
    /// Create a usage event occurring now.
    #[must_use]
    pub fn new(event_id: String, entitlement_id: EntitlementId, quantity: i64) -> Self {
        Self {
            event_id,
            entitlement_id,
            quantity,
            at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the occurrence time.
    #[must_use]
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    /// Set metadata on the event.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
