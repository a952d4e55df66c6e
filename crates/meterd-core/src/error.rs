//! Error types for meterd.

use chrono::{DateTime, Utc};

use crate::ids::IdError;
use crate::{EntitlementId, GrantId};

/// Result type for meterd operations.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Errors that can occur in entitlement engine operations.
///
/// Every variant carries enough context (ids, timestamps) to diagnose a
/// failure without inspecting engine internals. Only `Storage` is safe to
/// retry; validation, not-found, and conflict errors are surfaced as-is.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// A grant's effective window is empty or inverted.
    #[error("invalid time range: effective_at={effective_at} must precede expires_at={expires_at}")]
    InvalidTimeRange {
        /// Start of the offending window.
        effective_at: DateTime<Utc>,
        /// End of the offending window.
        expires_at: DateTime<Utc>,
    },

    /// A negative amount or quantity was supplied.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Entitlement not found.
    #[error("entitlement not found: {id}")]
    EntitlementNotFound {
        /// The entitlement ID that was not found.
        id: EntitlementId,
    },

    /// Grant not found.
    #[error("grant not found: {id}")]
    GrantNotFound {
        /// The grant ID that was not found.
        id: GrantId,
    },

    /// The entitlement is not of metered kind.
    ///
    /// Boolean and static entitlements carry no grants or usage; grant
    /// creation, usage recording, and resets all reject them.
    #[error("entitlement is not metered: {id}")]
    NotMetered {
        /// The offending entitlement ID.
        id: EntitlementId,
    },

    /// The entitlement has been deleted.
    #[error("entitlement deleted: {id}")]
    EntitlementDeleted {
        /// The deleted entitlement ID.
        id: EntitlementId,
    },

    /// The grant has already been voided.
    #[error("grant already voided: {id}")]
    AlreadyVoided {
        /// The grant ID.
        id: GrantId,
    },

    /// A subject already holds an active entitlement for the feature key.
    #[error("duplicate entitlement for subject {subject} and feature {feature_key}")]
    DuplicateEntitlement {
        /// The subject ID.
        subject: String,
        /// The feature key.
        feature_key: String,
    },

    /// A usage event with this ID was already recorded (idempotency).
    #[error("duplicate usage event: {event_id}")]
    DuplicateEvent {
        /// The event ID that was duplicated.
        event_id: String,
    },

    /// A reset was requested at or before the latest recorded reset.
    #[error("reset out of order: requested {requested}, latest reset at {latest}")]
    ResetOutOfOrder {
        /// The requested reset time.
        requested: DateTime<Utc>,
        /// The latest recorded reset time.
        latest: DateTime<Utc>,
    },

    /// A history or value query with an empty or inverted window.
    #[error("invalid query window: from={from} must precede to={to}")]
    InvalidQueryWindow {
        /// Start of the window.
        from: DateTime<Utc>,
        /// End of the window.
        to: DateTime<Utc>,
    },

    /// Caller lacks permission for the requested operation.
    #[error("not authorized")]
    NotAuthorized,

    /// Underlying persistence is unavailable; safe to retry with backoff.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
