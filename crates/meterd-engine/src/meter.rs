//! The usage accumulator boundary.
//!
//! Raw usage comes from a metering pipeline the engine does not own. The
//! `UsageMeter` trait is that boundary: the engine only needs cumulative
//! usage over a time range and the raw events for history windows. The
//! shipped implementation reads the store's time-indexed usage column
//! family, fed by the ingestion endpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use meterd_core::{EntitlementId, Result, UsageEvent};
use meterd_store::Store;

/// Read-only usage query capability.
pub trait UsageMeter: Send + Sync {
    /// Cumulative usage for an entitlement with `from <= at < to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails.
    fn query_usage(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;

    /// Usage events for an entitlement with `from <= at < to`, time-ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails.
    fn list_events(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>>;
}

/// Store-backed usage meter reading the `usage_by_entitlement` index.
pub struct StoreMeter<S> {
    store: Arc<S>,
}

impl<S> StoreMeter<S> {
    /// Create a meter over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Store> UsageMeter for StoreMeter<S> {
    fn query_usage(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self.store.usage_in_range(entitlement_id, from, to)?)
    }

    fn list_events(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>> {
        Ok(self.store.list_usage(entitlement_id, from, to)?)
    }
}
