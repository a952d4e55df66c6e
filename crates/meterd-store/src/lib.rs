//! `RocksDB` storage layer for meterd.
//!
//! This crate provides persistent storage for entitlements, grants, reset
//! events, and usage events using `RocksDB` with column families for
//! efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `entitlements`: primary entitlement records, keyed by entitlement ID
//! - `entitlements_by_subject`: active entitlement per subject+feature
//! - `grants`: grant records, keyed by grant ID (ULID)
//! - `grants_by_entitlement`: index for listing an entitlement's grants
//! - `resets`: reset events, time-ordered per entitlement
//! - `usage_events`: usage events keyed by event ID (idempotency)
//! - `usage_by_entitlement`: time-ordered usage index for range queries
//!
//! All time ranges are half-open `[from, to)`.
//!
//! # Example
//!
//! ```no_run
//! use meterd_store::{RocksStore, Store};
//! use meterd_core::{Entitlement, EntitlementKind, SubjectId};
//!
//! let store = RocksStore::open("/tmp/meterd-db").unwrap();
//!
//! let ent = Entitlement::new(
//!     SubjectId::generate(),
//!     "api_requests".into(),
//!     EntitlementKind::Metered,
//! );
//! store.create_entitlement(&ent).unwrap();
//!
//! let retrieved = store.get_entitlement(&ent.id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use meterd_core::{Entitlement, EntitlementId, Grant, GrantId, ResetEvent, SubjectId, UsageEvent};

/// The storage trait defining all ledger operations.
///
/// This trait abstracts the storage layer, allowing different backends
/// (`RocksDB` in production, potentially in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Entitlement Operations
    // =========================================================================

    /// Create an entitlement and its subject-feature index entry atomically.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateEntitlement` if the subject already
    /// holds an active (non-deleted) entitlement for the feature key.
    fn create_entitlement(&self, entitlement: &Entitlement) -> Result<()>;

    /// Get an entitlement by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_entitlement(&self, entitlement_id: &EntitlementId) -> Result<Option<Entitlement>>;

    /// Insert or update an entitlement record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_entitlement(&self, entitlement: &Entitlement) -> Result<()>;

    /// Find the active entitlement for a subject and feature key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_entitlement(
        &self,
        subject_id: &SubjectId,
        feature_key: &str,
    ) -> Result<Option<Entitlement>>;

    /// Soft-delete an entitlement: record the deletion time and free the
    /// subject-feature slot, atomically. Returns the updated record.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the entitlement doesn't exist.
    /// - `StoreError::EntitlementDeleted` if it is already deleted.
    fn delete_entitlement(
        &self,
        entitlement_id: &EntitlementId,
        at: DateTime<Utc>,
    ) -> Result<Entitlement>;

    // =========================================================================
    // Grant Operations
    // =========================================================================

    /// Insert a grant and its entitlement index entry atomically, after
    /// verifying the owning entitlement accepts grants.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the entitlement doesn't exist.
    /// - `StoreError::NotMetered` if the entitlement is not metered.
    /// - `StoreError::EntitlementDeleted` if the entitlement is deleted.
    fn create_grant(&self, grant: &Grant) -> Result<()>;

    /// Get a grant by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_grant(&self, grant_id: &GrantId) -> Result<Option<Grant>>;

    /// Void a grant: record the cutoff time. Returns the updated grant.
    ///
    /// Voiding never rewrites history; queries before the cutoff are
    /// unaffected.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the grant doesn't exist.
    /// - `StoreError::AlreadyVoided` if the grant is already voided.
    fn void_grant(&self, grant_id: &GrantId, at: DateTime<Utc>) -> Result<Grant>;

    /// List an entitlement's grants, ordered by
    /// `(priority ascending, grant ID ascending)`. Grant ids are ULIDs, so
    /// the secondary order is creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_grants(&self, entitlement_id: &EntitlementId, include_voided: bool)
        -> Result<Vec<Grant>>;

    // =========================================================================
    // Reset Operations
    // =========================================================================

    /// Persist a reset atomically: the reset event, the updated entitlement
    /// (new period start and anchor), and any recurrence child grants
    /// commit in one write batch or not at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn apply_reset(
        &self,
        reset: &ResetEvent,
        entitlement: &Entitlement,
        child_grants: &[Grant],
    ) -> Result<()>;

    /// List reset events with `from <= at < to`, in time order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_resets(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ResetEvent>>;

    /// The latest reset with `at <= upto`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn last_reset_at_or_before(
        &self,
        entitlement_id: &EntitlementId,
        upto: DateTime<Utc>,
    ) -> Result<Option<ResetEvent>>;

    /// The latest reset with `at < before`, if any.
    ///
    /// Used for closing snapshots: the period in force just before an
    /// instant is governed by the last reset strictly preceding it, even
    /// when another reset lands exactly on the instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn last_reset_before(
        &self,
        entitlement_id: &EntitlementId,
        before: DateTime<Utc>,
    ) -> Result<Option<ResetEvent>>;

    // =========================================================================
    // Usage Operations
    // =========================================================================

    /// Record a usage event and its time index atomically.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateEvent` if the event ID was already
    /// recorded.
    fn record_usage(&self, event: &UsageEvent) -> Result<()>;

    /// Check whether a usage event has already been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_usage_event(&self, event_id: &str) -> Result<bool>;

    /// List usage events with `from <= at < to`, in time order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_usage(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>>;

    /// Total usage quantity with `from <= at < to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn usage_in_range(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .list_usage(entitlement_id, from, to)?
            .iter()
            .map(|e| e.quantity)
            .sum())
    }
}
