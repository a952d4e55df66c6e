//! Reset event types.
//!
//! A reset closes one usage period and opens the next. It records the
//! rollover outcome for every grant that was active at the reset instant,
//! and optionally moves the period anchor. Reset events partition time:
//! history queries never cross one implicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntitlementId, GrantId, ResetId};

/// A recorded period reset for an entitlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetEvent {
    /// Unique reset ID (ULID, time-ordered).
    pub id: ResetId,

    /// The entitlement that was reset.
    pub entitlement_id: EntitlementId,

    /// The instant the reset took effect. Start of the new period.
    pub at: DateTime<Utc>,

    /// The new period anchor, if the caller moved it.
    pub new_anchor: Option<DateTime<Utc>>,

    /// Per-grant rollover outcomes, one for each grant active at `at`.
    pub outcomes: Vec<GrantRollover>,
}

impl ResetEvent {
    /// Create a reset event record.
    #[must_use]
    pub fn new(
        entitlement_id: EntitlementId,
        at: DateTime<Utc>,
        new_anchor: Option<DateTime<Utc>>,
        outcomes: Vec<GrantRollover>,
    ) -> Self {
        Self {
            id: ResetId::generate(),
            entitlement_id,
            at,
            new_anchor,
            outcomes,
        }
    }

    /// Look up the post-reset balance recorded for a grant, if any.
    #[must_use]
    pub fn balance_after(&self, grant_id: GrantId) -> Option<i64> {
        self.outcomes
            .iter()
            .find(|o| o.grant_id == grant_id)
            .map(|o| o.balance_after)
    }
}

/// The rollover outcome for one grant at a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRollover {
    /// The grant.
    pub grant_id: GrantId,

    /// Balance immediately before the reset.
    pub balance_before: i64,

    /// Balance after applying the grant's rollover policy. This is the
    /// grant's starting balance for the new period.
    pub balance_after: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_after_lookup() {
        let ent = EntitlementId::generate();
        let grant_id = GrantId::generate();
        let reset = ResetEvent::new(
            ent,
            Utc::now(),
            None,
            vec![GrantRollover {
                grant_id,
                balance_before: 5,
                balance_after: 10,
            }],
        );

        assert_eq!(reset.balance_after(grant_id), Some(10));
        assert_eq!(reset.balance_after(GrantId::generate()), None);
    }
}
