//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary entitlement records, keyed by entitlement ID.
    pub const ENTITLEMENTS: &str = "entitlements";

    /// Index: active entitlement per subject and feature, keyed by
    /// `subject_id || feature_key`. Value is the entitlement ID. Enforces
    /// the one-active-entitlement-per-feature rule.
    pub const ENTITLEMENTS_BY_SUBJECT: &str = "entitlements_by_subject";

    /// Grant records, keyed by `grant_id` (ULID).
    pub const GRANTS: &str = "grants";

    /// Index: grants by entitlement, keyed by `entitlement_id || grant_id`.
    /// Value is empty (index only).
    pub const GRANTS_BY_ENTITLEMENT: &str = "grants_by_entitlement";

    /// Reset events, keyed by
    /// `entitlement_id || at_millis (BE) || reset_id`. The timestamp
    /// component makes reset history range-scannable in time order.
    pub const RESETS: &str = "resets";

    /// Usage events for idempotency, keyed by `event_id`.
    pub const USAGE_EVENTS: &str = "usage_events";

    /// Index: usage by entitlement and time, keyed by
    /// `entitlement_id || at_millis (BE) || event_id`. Value is empty.
    pub const USAGE_BY_ENTITLEMENT: &str = "usage_by_entitlement";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ENTITLEMENTS,
        cf::ENTITLEMENTS_BY_SUBJECT,
        cf::GRANTS,
        cf::GRANTS_BY_ENTITLEMENT,
        cf::RESETS,
        cf::USAGE_EVENTS,
        cf::USAGE_BY_ENTITLEMENT,
    ]
}
