//! The history reconstructor.
//!
//! Balance history is never stored; it is rebuilt from the ledger. Two
//! shapes are offered: burn-down segments, which cut the query range at
//! every reset and grant window edge so the balance trajectory is piecewise
//! explainable, and fixed-size windows aligned to a timezone offset for
//! charting.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use meterd_core::{
    EntitlementId, GrantId, MeterError, Result, UsagePeriod, WindowSize,
};
use meterd_store::Store;

use crate::balance;
use crate::engine::Engine;

/// One segment of a burn-down history.
///
/// Segments are half-open and exactly partition the query range; a new
/// segment starts at every reset and at every grant window edge inside the
/// range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurndownSegment {
    /// The segment's span, `[start, end)`.
    pub period: UsagePeriod,

    /// Usage accumulated within the segment.
    pub usage: i64,

    /// Aggregate balance at the segment start.
    pub balance_at_start: i64,

    /// Aggregate balance just before the segment end.
    pub balance_at_end: i64,

    /// Grants active at the segment start, in burn-down order.
    pub active_grants: Vec<GrantId>,
}

/// Consumption attributed to one grant within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantBurn {
    /// The grant.
    pub grant_id: GrantId,

    /// Quantity consumed from the grant in the window.
    pub burned: i64,
}

/// One fixed-size window of usage and balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageWindow {
    /// The window's span, clamped to the query range.
    pub period: UsagePeriod,

    /// Usage accumulated within the window.
    pub usage: i64,

    /// Aggregate balance just before the window end.
    pub balance_at_end: i64,

    /// Per-grant consumption within the window. Grants with nothing burned
    /// are omitted.
    pub grant_burns: Vec<GrantBurn>,
}

impl<S: Store + 'static> Engine<S> {
    /// Reconstruct the burn-down history of a metered entitlement over
    /// `[from, to)`.
    ///
    /// # Errors
    ///
    /// - `MeterError::InvalidQueryWindow` if `from >= to`.
    /// - `MeterError::EntitlementNotFound` / `MeterError::NotMetered` for a
    ///   bad target.
    pub fn burndown_history(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BurndownSegment>> {
        if from >= to {
            return Err(MeterError::InvalidQueryWindow { from, to });
        }
        let entitlement = self.get_entitlement(entitlement_id)?;
        if !entitlement.is_metered() {
            return Err(MeterError::NotMetered {
                id: *entitlement_id,
            });
        }

        let grants = self.store.list_grants(entitlement_id, true)?;

        let mut bounds = BTreeSet::new();
        bounds.insert(from);
        bounds.insert(to);
        for reset in self.store.list_resets(entitlement_id, from, to)? {
            if reset.at > from {
                bounds.insert(reset.at);
            }
        }
        for grant in &grants {
            let edges = [Some(grant.effective_at), Some(grant.expires_at), grant.voided_at];
            for edge in edges.into_iter().flatten() {
                if edge > from && edge < to {
                    bounds.insert(edge);
                }
            }
        }

        let bounds: Vec<DateTime<Utc>> = bounds.into_iter().collect();
        let mut segments = Vec::with_capacity(bounds.len() - 1);
        for pair in bounds.windows(2) {
            let (start, end) = (pair[0], pair[1]);

            let opening = self.snapshot_at(&entitlement, start)?;
            let closing = self.snapshot_before(&entitlement, end)?;
            let usage = self.meter.query_usage(entitlement_id, start, end)?;
            let active_grants = grants
                .iter()
                .filter(|g| g.active_at(start))
                .map(|g| g.id)
                .collect();

            segments.push(BurndownSegment {
                period: UsagePeriod::new(start, end),
                usage,
                balance_at_start: opening.aggregate(),
                balance_at_end: closing.aggregate(),
                active_grants,
            });
        }

        Ok(segments)
    }

    /// Reconstruct windowed history over `[from, to)` with fixed-size
    /// windows aligned to `tz`. The first and last windows are clamped to
    /// the query range.
    ///
    /// Per-grant burns are clamped at zero; a reset inside a window can
    /// restore balance, which does not count as negative consumption.
    ///
    /// # Errors
    ///
    /// - `MeterError::InvalidQueryWindow` if `from >= to`.
    /// - `MeterError::EntitlementNotFound` / `MeterError::NotMetered` for a
    ///   bad target.
    pub fn windowed_history(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        window_size: WindowSize,
        tz: FixedOffset,
    ) -> Result<Vec<UsageWindow>> {
        if from >= to {
            return Err(MeterError::InvalidQueryWindow { from, to });
        }
        let entitlement = self.get_entitlement(entitlement_id)?;
        if !entitlement.is_metered() {
            return Err(MeterError::NotMetered {
                id: *entitlement_id,
            });
        }

        let grants = self.store.list_grants(entitlement_id, true)?;

        let mut windows = Vec::new();
        let mut cursor = window_size.truncate(from, tz);
        while cursor < to {
            let next = window_size.advance(cursor, tz);
            let start = cursor.max(from);
            let end = next.min(to);
            cursor = next;
            if start >= end {
                continue;
            }

            let usage = self.meter.query_usage(entitlement_id, start, end)?;
            let opening = self.snapshot_at(&entitlement, start)?;
            let closing = self.snapshot_before(&entitlement, end)?;

            let opening_reset = self.store.last_reset_before(entitlement_id, end)?;
            let opening_balances: HashMap<GrantId, i64> = opening
                .balances
                .iter()
                .map(|b| (b.grant_id, b.balance))
                .collect();

            let mut grant_burns = Vec::new();
            for computed in &closing.balances {
                // A grant that became effective mid-window has no opening
                // balance; burn from its period-starting balance instead.
                let before = opening_balances.get(&computed.grant_id).copied().or_else(|| {
                    grants
                        .iter()
                        .find(|g| g.id == computed.grant_id)
                        .map(|g| balance::starting_balance(g, opening_reset.as_ref()))
                });
                let burned = before.map_or(0, |b| (b - computed.balance).max(0));
                if burned > 0 {
                    grant_burns.push(GrantBurn {
                        grant_id: computed.grant_id,
                        burned,
                    });
                }
            }

            windows.push(UsageWindow {
                period: UsagePeriod::new(start, end),
                usage,
                balance_at_end: closing.aggregate(),
                grant_burns,
            });
        }

        Ok(windows)
    }
}
