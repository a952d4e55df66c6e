//! The burn-down calculator.
//!
//! Balance is derived, never stored: at any instant it is the grants'
//! period-starting balances minus the usage accumulated since the period
//! start, consumed in priority order. The walk here is pure integer
//! arithmetic over an ordered snapshot, so it is safe to recompute under
//! arbitrary read concurrency.

use meterd_core::{Grant, GrantId, ResetEvent};

/// The computed balance of one grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantBalance {
    /// The grant.
    pub grant_id: GrantId,

    /// Remaining balance, clipped to `[0, starting balance]`.
    pub balance: i64,
}

/// A grant's starting balance for the current period.
///
/// The last reset's recorded rollover outcome wins; a grant with no
/// outcome (issued or made effective after the reset) starts at its full
/// amount.
#[must_use]
pub fn starting_balance(grant: &Grant, last_reset: Option<&ResetEvent>) -> i64 {
    last_reset
        .and_then(|reset| reset.balance_after(grant.id))
        .unwrap_or(grant.amount)
}

/// Walk grants in priority order, consuming `usage` from each starting
/// balance until the usage is exhausted or the grants run out.
///
/// Grants must already be ordered `(priority asc, id asc)`. Returns the
/// per-grant balances and the overage (usage beyond the total granted
/// amount, which is not an error).
#[must_use]
pub fn burn_down(starting: &[(GrantId, i64)], usage: i64) -> (Vec<GrantBalance>, i64) {
    let mut remaining = usage.max(0);
    let mut balances = Vec::with_capacity(starting.len());

    for &(grant_id, start) in starting {
        let start = start.max(0);
        let burned = remaining.min(start);
        remaining -= burned;
        balances.push(GrantBalance {
            grant_id,
            balance: start - burned,
        });
    }

    (balances, remaining)
}

/// Aggregate balance across grants.
#[must_use]
pub fn aggregate(balances: &[GrantBalance]) -> i64 {
    balances.iter().map(|b| b.balance).sum()
}
