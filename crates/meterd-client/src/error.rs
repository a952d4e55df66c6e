//! Client error types.

/// Errors that can occur when using the meterd client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Duplicate event (already recorded).
    #[error("duplicate event: {event_id}")]
    DuplicateEvent {
        /// The event ID.
        event_id: String,
    },

    /// Entitlement not found.
    #[error("entitlement not found: {entitlement_id}")]
    EntitlementNotFound {
        /// The entitlement ID.
        entitlement_id: String,
    },

    /// A reset was requested at or before the latest recorded one.
    #[error("reset out of order")]
    ResetOutOfOrder,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
