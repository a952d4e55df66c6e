//! The engine facade: ledger mutations and value queries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use meterd_core::{
    Entitlement, EntitlementId, EntitlementKind, EntitlementValue, Grant, GrantId, MeterError,
    Recurrence, Result, RolloverPolicy, SubjectId, UsageEvent,
};
use meterd_store::Store;

use crate::balance::{self, GrantBalance};
use crate::locks::{EntitlementLocks, SubjectFeatureLocks};
use crate::meter::{StoreMeter, UsageMeter};

/// Parameters for creating a grant.
#[derive(Debug, Clone)]
pub struct GrantParams {
    /// Granted quantity in base units.
    pub amount: i64,
    /// Start of the effective window (inclusive).
    pub effective_at: DateTime<Utc>,
    /// End of the effective window (exclusive).
    pub expires_at: DateTime<Utc>,
    /// Burn-down priority; lower is consumed first.
    pub priority: u8,
    /// Optional recurrence rule.
    pub recurrence: Option<Recurrence>,
    /// Optional rollover policy.
    pub rollover: Option<RolloverPolicy>,
}

/// The entitlement engine.
///
/// Wraps a `Store` with per-entitlement mutation locking, a usage meter
/// boundary, and the derived computations (burn-down, reset, history).
pub struct Engine<S> {
    pub(crate) store: Arc<S>,
    pub(crate) meter: Arc<dyn UsageMeter>,
    pub(crate) locks: EntitlementLocks,
    pub(crate) creation_locks: SubjectFeatureLocks,
}

/// A consistent read of a metered entitlement at one instant.
pub(crate) struct Snapshot {
    /// Start of the period covering the instant.
    pub period_start: DateTime<Utc>,
    /// Per-grant balances in burn-down order.
    pub balances: Vec<GrantBalance>,
    /// Usage accumulated since `period_start`, up to the snapshot bound.
    pub usage: i64,
    /// Usage beyond the total granted amount.
    pub overage: i64,
}

impl Snapshot {
    pub(crate) fn aggregate(&self) -> i64 {
        balance::aggregate(&self.balances)
    }
}

impl<S: Store + 'static> Engine<S> {
    /// Create an engine whose usage meter reads the store's own usage index.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let meter = Arc::new(StoreMeter::new(Arc::clone(&store)));
        Self::with_meter(store, meter)
    }

    /// Create an engine with an external usage meter.
    #[must_use]
    pub fn with_meter(store: Arc<S>, meter: Arc<dyn UsageMeter>) -> Self {
        Self {
            store,
            meter,
            locks: EntitlementLocks::new(),
            creation_locks: SubjectFeatureLocks::new(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // =========================================================================
    // Entitlements
    // =========================================================================

    /// Create an entitlement for a subject and feature.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::DuplicateEntitlement` if the subject already
    /// holds an active entitlement for the feature key.
    pub async fn create_entitlement(
        &self,
        subject_id: SubjectId,
        feature_key: String,
        kind: EntitlementKind,
    ) -> Result<Entitlement> {
        // The duplicate check is a read before the write; concurrent
        // creates for the same slot must serialize on the pair.
        let lock = self
            .creation_locks
            .lock_for(&(subject_id, feature_key.clone()));
        let _guard = lock.lock().await;

        let entitlement = Entitlement::new(subject_id, feature_key, kind);
        self.store.create_entitlement(&entitlement)?;

        tracing::info!(
            entitlement_id = %entitlement.id,
            subject_id = %entitlement.subject_id,
            feature_key = %entitlement.feature_key,
            "Entitlement created"
        );

        Ok(entitlement)
    }

    /// Get an entitlement by ID.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::EntitlementNotFound` if it doesn't exist.
    pub fn get_entitlement(&self, entitlement_id: &EntitlementId) -> Result<Entitlement> {
        self.store
            .get_entitlement(entitlement_id)?
            .ok_or(MeterError::EntitlementNotFound {
                id: *entitlement_id,
            })
    }

    /// Find the active entitlement for a subject and feature key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn find_entitlement(
        &self,
        subject_id: &SubjectId,
        feature_key: &str,
    ) -> Result<Option<Entitlement>> {
        Ok(self.store.find_entitlement(subject_id, feature_key)?)
    }

    /// Soft-delete an entitlement.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::EntitlementNotFound` or
    /// `MeterError::EntitlementDeleted`.
    pub async fn delete_entitlement(&self, entitlement_id: &EntitlementId) -> Result<Entitlement> {
        let existing = self.get_entitlement(entitlement_id)?;

        // Deleting frees the subject-feature slot, so it serializes with
        // creation on the pair as well as with the entitlement's own
        // mutations. The pair lock is always taken first.
        let creation_lock = self
            .creation_locks
            .lock_for(&(existing.subject_id, existing.feature_key.clone()));
        let _creation_guard = creation_lock.lock().await;
        let lock = self.locks.lock_for(entitlement_id);
        let _guard = lock.lock().await;

        let entitlement = self.store.delete_entitlement(entitlement_id, Utc::now())?;
        tracing::info!(entitlement_id = %entitlement_id, "Entitlement deleted");
        Ok(entitlement)
    }

    // =========================================================================
    // Grant Ledger
    // =========================================================================

    /// Add a grant to a metered entitlement.
    ///
    /// # Errors
    ///
    /// - `MeterError::InvalidAmount` / `MeterError::InvalidTimeRange` for
    ///   malformed parameters.
    /// - `MeterError::EntitlementNotFound`, `MeterError::NotMetered`, or
    ///   `MeterError::EntitlementDeleted` for an entitlement that cannot
    ///   accept grants.
    pub async fn add_grant(
        &self,
        entitlement_id: &EntitlementId,
        params: GrantParams,
    ) -> Result<Grant> {
        let mut grant = Grant::new(
            *entitlement_id,
            params.amount,
            params.effective_at,
            params.expires_at,
            params.priority,
        )?;
        grant.recurrence = params.recurrence;
        grant.rollover = params.rollover;

        let lock = self.locks.lock_for(entitlement_id);
        let _guard = lock.lock().await;

        self.store.create_grant(&grant)?;

        tracing::info!(
            grant_id = %grant.id,
            entitlement_id = %entitlement_id,
            amount = %grant.amount,
            priority = %grant.priority,
            "Grant created"
        );

        Ok(grant)
    }

    /// Void a grant, stopping future consumption immediately.
    ///
    /// Voiding is not retroactive: value and history queries before the
    /// void cutoff are unaffected.
    ///
    /// # Errors
    ///
    /// - `MeterError::GrantNotFound` if the grant doesn't exist.
    /// - `MeterError::AlreadyVoided` if it was already voided.
    pub async fn void_grant(&self, grant_id: &GrantId) -> Result<Grant> {
        let grant = self
            .store
            .get_grant(grant_id)?
            .ok_or(MeterError::GrantNotFound { id: *grant_id })?;

        let lock = self.locks.lock_for(&grant.entitlement_id);
        let _guard = lock.lock().await;

        let voided = self.store.void_grant(grant_id, Utc::now())?;

        tracing::info!(
            grant_id = %grant_id,
            entitlement_id = %voided.entitlement_id,
            "Grant voided"
        );

        Ok(voided)
    }

    /// List an entitlement's grants in burn-down order.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::EntitlementNotFound` if the entitlement doesn't
    /// exist.
    pub fn list_grants(
        &self,
        entitlement_id: &EntitlementId,
        include_voided: bool,
    ) -> Result<Vec<Grant>> {
        self.get_entitlement(entitlement_id)?;
        Ok(self.store.list_grants(entitlement_id, include_voided)?)
    }

    // =========================================================================
    // Usage
    // =========================================================================

    /// Record a usage event against a metered entitlement.
    ///
    /// Idempotent on `event_id`: replays fail with
    /// `MeterError::DuplicateEvent`.
    ///
    /// # Errors
    ///
    /// - `MeterError::InvalidAmount` for a negative quantity.
    /// - `MeterError::NotMetered` / `MeterError::EntitlementNotFound` /
    ///   `MeterError::EntitlementDeleted` for a bad target.
    /// - `MeterError::DuplicateEvent` on replay.
    pub async fn record_usage(&self, event: UsageEvent) -> Result<()> {
        if event.quantity < 0 {
            return Err(MeterError::InvalidAmount(event.quantity));
        }
        self.load_metered(&event.entitlement_id)?;

        let lock = self.locks.lock_for(&event.entitlement_id);
        let _guard = lock.lock().await;

        self.store.record_usage(&event)?;

        tracing::debug!(
            event_id = %event.event_id,
            entitlement_id = %event.entitlement_id,
            quantity = %event.quantity,
            "Usage recorded"
        );

        Ok(())
    }

    // =========================================================================
    // Value Query (burn-down)
    // =========================================================================

    /// Compute the entitlement's value at an instant.
    ///
    /// For metered entitlements this runs the priority-ordered burn-down
    /// over the period covering `at`. The computation is pure: stored
    /// grants are never mutated.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::EntitlementNotFound` if the entitlement doesn't
    /// exist.
    pub fn entitlement_value(
        &self,
        entitlement_id: &EntitlementId,
        at: DateTime<Utc>,
    ) -> Result<EntitlementValue> {
        let entitlement = self.get_entitlement(entitlement_id)?;

        match &entitlement.kind {
            EntitlementKind::Boolean { value } => {
                let has_access = *value && !entitlement.is_deleted();
                Ok(EntitlementValue::Boolean { has_access })
            }
            EntitlementKind::Static { value } => Ok(EntitlementValue::Static {
                has_access: !entitlement.is_deleted(),
                value: value.clone(),
            }),
            EntitlementKind::Metered => {
                let snapshot = self.snapshot_at(&entitlement, at)?;
                let balance = snapshot.aggregate();
                Ok(EntitlementValue::Metered {
                    has_access: balance > 0,
                    balance,
                    usage: snapshot.usage,
                    overage: snapshot.overage,
                })
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Load an entitlement, verifying it accepts grants and usage.
    pub(crate) fn load_metered(&self, entitlement_id: &EntitlementId) -> Result<Entitlement> {
        let entitlement = self.get_entitlement(entitlement_id)?;
        if entitlement.is_deleted() {
            return Err(MeterError::EntitlementDeleted {
                id: *entitlement_id,
            });
        }
        if !entitlement.is_metered() {
            return Err(MeterError::NotMetered {
                id: *entitlement_id,
            });
        }
        Ok(entitlement)
    }

    /// Compute per-grant balances for a metered entitlement at `at`.
    ///
    /// The period start is the latest reset at or before `at` (falling back
    /// to the entitlement's creation). Usage at the query instant itself
    /// counts, hence the 1ms-exclusive upper bound.
    pub(crate) fn snapshot_at(
        &self,
        entitlement: &Entitlement,
        at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let last_reset = self.store.last_reset_at_or_before(&entitlement.id, at)?;
        let period_start = last_reset
            .as_ref()
            .map_or(entitlement.created_at, |reset| reset.at);

        let usage =
            self.meter
                .query_usage(&entitlement.id, period_start, at + Duration::milliseconds(1))?;

        // Voided grants are listed and filtered by time so that queries
        // before the void cutoff still see them.
        let grants = self.store.list_grants(&entitlement.id, true)?;
        let starting: Vec<(GrantId, i64)> = grants
            .iter()
            .filter(|g| g.active_at(at))
            .map(|g| (g.id, balance::starting_balance(g, last_reset.as_ref())))
            .collect();

        let (balances, overage) = balance::burn_down(&starting, usage);

        Ok(Snapshot {
            period_start,
            balances,
            usage,
            overage,
        })
    }

    /// Compute per-grant balances just before `end`.
    ///
    /// The governing reset is the last one strictly before `end` and the
    /// usage range is half-open `[period_start, end)`, so a reset or grant
    /// edge landing exactly on `end` does not leak into the closing state.
    pub(crate) fn snapshot_before(
        &self,
        entitlement: &Entitlement,
        end: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let last_reset = self.store.last_reset_before(&entitlement.id, end)?;
        let period_start = last_reset
            .as_ref()
            .map_or(entitlement.created_at, |reset| reset.at);

        let usage = self.meter.query_usage(&entitlement.id, period_start, end)?;

        let grants = self.store.list_grants(&entitlement.id, true)?;
        let starting: Vec<(GrantId, i64)> = grants
            .iter()
            .filter(|g| g.active_before(end))
            .map(|g| (g.id, balance::starting_balance(g, last_reset.as_ref())))
            .collect();

        let (balances, overage) = balance::burn_down(&starting, usage);

        Ok(Snapshot {
            period_start,
            balances,
            usage,
            overage,
        })
    }
}
