//! Error types for meterd storage.

use meterd_core::MeterError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed. Safe to retry with backoff.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record ("entitlement", "grant", ...).
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// The entitlement is not of metered kind.
    #[error("entitlement is not metered: {id}")]
    NotMetered {
        /// The offending entitlement ID.
        id: String,
    },

    /// The entitlement has been deleted.
    #[error("entitlement deleted: {id}")]
    EntitlementDeleted {
        /// The deleted entitlement ID.
        id: String,
    },

    /// The grant is already voided.
    #[error("grant already voided: {id}")]
    AlreadyVoided {
        /// The grant ID.
        id: String,
    },

    /// A subject already holds an active entitlement for the feature key.
    #[error("duplicate entitlement for subject {subject} and feature {feature_key}")]
    DuplicateEntitlement {
        /// The subject ID.
        subject: String,
        /// The feature key.
        feature_key: String,
    },

    /// A usage event with this ID was already recorded.
    #[error("duplicate usage event: {event_id}")]
    DuplicateEvent {
        /// The event ID that was duplicated.
        event_id: String,
    },
}

impl From<StoreError> for MeterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(msg) => Self::Storage(msg),
            StoreError::Serialization(msg) => Self::Serialization(msg),
            StoreError::NotFound { entity, id } => match entity {
                "entitlement" => id.parse().map_or_else(
                    |_| Self::Storage(format!("entitlement not found: {id}")),
                    |id| Self::EntitlementNotFound { id },
                ),
                "grant" => id.parse().map_or_else(
                    |_| Self::Storage(format!("grant not found: {id}")),
                    |id| Self::GrantNotFound { id },
                ),
                _ => Self::Storage(format!("{entity} not found: {id}")),
            },
            StoreError::NotMetered { id } => id.parse().map_or_else(
                |_| Self::Storage(format!("entitlement is not metered: {id}")),
                |id| Self::NotMetered { id },
            ),
            StoreError::EntitlementDeleted { id } => id.parse().map_or_else(
                |_| Self::Storage(format!("entitlement deleted: {id}")),
                |id| Self::EntitlementDeleted { id },
            ),
            StoreError::AlreadyVoided { id } => id.parse().map_or_else(
                |_| Self::Storage(format!("grant already voided: {id}")),
                |id| Self::AlreadyVoided { id },
            ),
            StoreError::DuplicateEntitlement {
                subject,
                feature_key,
            } => Self::DuplicateEntitlement {
                subject,
                feature_key,
            },
            StoreError::DuplicateEvent { event_id } => Self::DuplicateEvent { event_id },
        }
    }
}
