//! Grant types for meterd.
//!
//! A grant issues a quantity of usage credit against a metered entitlement,
//! bounded by an effective window. Grants are immutable after creation; the
//! only later state change is voiding, which records a cutoff time and never
//! rewrites history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntitlementId, GrantId, MeterError};

/// A usage credit grant against a metered entitlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    /// Unique grant ID (ULID, time-ordered).
    pub id: GrantId,

    /// The entitlement this grant belongs to.
    pub entitlement_id: EntitlementId,

    /// Granted quantity in base units. Non-negative.
    pub amount: i64,

    /// Start of the effective window (inclusive).
    pub effective_at: DateTime<Utc>,

    /// End of the effective window (exclusive). The grant has no effect at
    /// or after this instant.
    pub expires_at: DateTime<Utc>,

    /// Burn-down priority. Lower values are consumed first; ties are broken
    /// by ascending grant ID (creation order).
    pub priority: u8,

    /// Optional recurrence rule. A reset whose closing period saw this
    /// grant's window end spawns a fresh child grant; the original is
    /// never mutated.
    pub recurrence: Option<Recurrence>,

    /// Optional rollover policy applied at each period reset.
    pub rollover: Option<RolloverPolicy>,

    /// When the grant was voided, if it was. Voiding stops future
    /// consumption immediately but is not retroactive.
    pub voided_at: Option<DateTime<Utc>>,

    /// When the grant was created.
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// Create a new grant, validating the amount and effective window.
    ///
    /// # Errors
    ///
    /// - `MeterError::InvalidAmount` if `amount` is negative.
    /// - `MeterError::InvalidTimeRange` if `effective_at >= expires_at`.
    pub fn new(
        entitlement_id: EntitlementId,
        amount: i64,
        effective_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        priority: u8,
    ) -> Result<Self, MeterError> {
        if amount < 0 {
            return Err(MeterError::InvalidAmount(amount));
        }
        if effective_at >= expires_at {
            return Err(MeterError::InvalidTimeRange {
                effective_at,
                expires_at,
            });
        }

        Ok(Self {
            id: GrantId::generate(),
            entitlement_id,
            amount,
            effective_at,
            expires_at,
            priority,
            recurrence: None,
            rollover: None,
            voided_at: None,
            created_at: Utc::now(),
        })
    }

    /// Set the recurrence rule.
    #[must_use]
    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    /// Set the rollover policy.
    #[must_use]
    pub fn with_rollover(mut self, rollover: RolloverPolicy) -> Self {
        self.rollover = Some(rollover);
        self
    }

    /// Whether the grant is active at `at`: the effective window covers the
    /// instant and the grant was not voided at or before it.
    #[must_use]
    pub fn active_at(&self, at: DateTime<Utc>) -> bool {
        if at < self.effective_at || at >= self.expires_at {
            return false;
        }
        match self.voided_at {
            Some(voided_at) => at < voided_at,
            None => true,
        }
    }

    /// Whether the grant is active in the interval leading up to `at`: it
    /// became effective before the instant and neither expired nor was
    /// voided before it. A grant expiring or voided exactly at `at` still
    /// counts; one becoming effective exactly at `at` does not.
    #[must_use]
    pub fn active_before(&self, at: DateTime<Utc>) -> bool {
        if self.effective_at >= at || self.expires_at < at {
            return false;
        }
        match self.voided_at {
            Some(voided_at) => voided_at >= at,
            None => true,
        }
    }

    /// Apply this grant's rollover policy to a pre-reset balance.
    ///
    /// Without a policy the balance carries over unchanged.
    #[must_use]
    pub fn rollover_balance(&self, balance_before: i64) -> i64 {
        match &self.rollover {
            Some(policy) => policy.apply(balance_before),
            None => balance_before,
        }
    }
}

/// Rollover policy governing how much unused balance carries into the next
/// usage period at reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverPolicy {
    /// Upper bound on the carried-over balance.
    pub max_amount: i64,

    /// Lower bound on the carried-over balance.
    pub min_amount: i64,
}

impl RolloverPolicy {
    /// `balance_after = min(max_amount, max(balance_before, min_amount))`.
    #[must_use]
    pub fn apply(&self, balance_before: i64) -> i64 {
        self.max_amount.min(balance_before.max(self.min_amount))
    }
}

/// Recurrence rule: when the grant's window ends within a usage period,
/// the reset closing that period issues an equivalent child grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// How long each recurring child grant remains effective.
    pub interval: RecurrenceInterval,
}

/// Interval between recurring grant issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceInterval {
    /// One day.
    Day,
    /// One week.
    Week,
    /// One month (30 days).
    Month,
    /// One year (365 days).
    Year,
}

impl RecurrenceInterval {
    /// The interval as a chrono duration.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        match self {
            Self::Day => chrono::Duration::days(1),
            Self::Week => chrono::Duration::weeks(1),
            Self::Month => chrono::Duration::days(30),
            Self::Year => chrono::Duration::days(365),
        }
    }
}
