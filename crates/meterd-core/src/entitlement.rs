//! Entitlement types for meterd.
//!
//! An entitlement is a subject's right to access a feature. Metered
//! entitlements carry grants and accumulate usage; boolean and static
//! entitlements only answer access checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntitlementId, SubjectId};

/// A subject's entitlement to a feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    /// Unique entitlement ID.
    pub id: EntitlementId,

    /// The subject (customer) this entitlement belongs to.
    pub subject_id: SubjectId,

    /// The feature this entitlement gates, e.g. `"api_requests"`.
    pub feature_key: String,

    /// Kind-specific data.
    pub kind: EntitlementKind,

    /// Start of the current usage period. Advanced by each reset.
    pub current_period_start: DateTime<Utc>,

    /// The period anchor: the reference instant usage periods are aligned
    /// to. A reset may move it.
    pub period_anchor: DateTime<Utc>,

    /// When the entitlement was soft-deleted, if it was.
    pub deleted_at: Option<DateTime<Utc>>,

    /// When the entitlement was created.
    pub created_at: DateTime<Utc>,

    /// When the entitlement was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Entitlement {
    /// Create a new entitlement. The current period starts now and the
    /// anchor defaults to the creation instant.
    #[must_use]
    pub fn new(subject_id: SubjectId, feature_key: String, kind: EntitlementKind) -> Self {
        let now = Utc::now();
        Self {
            id: EntitlementId::generate(),
            subject_id,
            feature_key,
            kind,
            current_period_start: now,
            period_anchor: now,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this entitlement is metered.
    #[must_use]
    pub const fn is_metered(&self) -> bool {
        matches!(self.kind, EntitlementKind::Metered)
    }

    /// Whether this entitlement has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Kind of entitlement, carried as a tagged variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EntitlementKind {
    /// Metered: access is governed by grant balances burnt down by usage.
    Metered,

    /// Boolean: a plain on/off switch.
    Boolean {
        /// Whether access is granted.
        value: bool,
    },

    /// Static: access plus an opaque configuration value.
    Static {
        /// The configured value exposed to callers.
        value: serde_json::Value,
    },
}

/// The computed value of an entitlement at a point in time.
///
/// The shape varies by entitlement kind, keyed by the `type` discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EntitlementValue {
    /// Metered value: balance, usage, and overage for the current period.
    Metered {
        /// Whether the subject has access (aggregate balance > 0).
        has_access: bool,
        /// Aggregate remaining balance across active grants.
        balance: i64,
        /// Usage accumulated since the period start.
        usage: i64,
        /// Usage beyond the total granted amount. Not an error.
        overage: i64,
    },

    /// Boolean value.
    Boolean {
        /// Whether the subject has access.
        has_access: bool,
    },

    /// Static value.
    Static {
        /// Whether the subject has access.
        has_access: bool,
        /// The configured value.
        value: serde_json::Value,
    },
}

impl EntitlementValue {
    /// Whether the subject has access.
    #[must_use]
    pub const fn has_access(&self) -> bool {
        match self {
            Self::Metered { has_access, .. }
            | Self::Boolean { has_access }
            | Self::Static { has_access, .. } => *has_access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entitlement_is_not_deleted() {
        let ent = Entitlement::new(
            SubjectId::generate(),
            "api_requests".into(),
            EntitlementKind::Metered,
        );
        assert!(ent.is_metered());
        assert!(!ent.is_deleted());
        assert_eq!(ent.current_period_start, ent.period_anchor);
    }

    #[test]
    fn kind_discriminant_serializes() {
        let kind = EntitlementKind::Boolean { value: true };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "boolean");
        assert_eq!(json["value"], true);
    }

    #[test]
    fn value_has_access_across_variants() {
        let metered = EntitlementValue::Metered {
            has_access: true,
            balance: 40,
            usage: 60,
            overage: 0,
        };
        assert!(metered.has_access());

        let boolean = EntitlementValue::Boolean { has_access: false };
        assert!(!boolean.has_access());

        let json = serde_json::to_value(&metered).unwrap();
        assert_eq!(json["type"], "metered");
        assert_eq!(json["balance"], 40);
    }
}
