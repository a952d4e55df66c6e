//! Key encoding utilities for `RocksDB`.
//!
//! Composite keys concatenate fixed-width components so prefix iteration
//! yields records in the natural order: grant ids are time-ordered ULIDs,
//! and timestamps are encoded big-endian so byte order equals time order.

use chrono::{DateTime, Utc};

use meterd_core::{EntitlementId, GrantId, ResetId, SubjectId};

/// Create an entitlement key from an entitlement ID.
#[must_use]
pub fn entitlement_key(entitlement_id: &EntitlementId) -> Vec<u8> {
    entitlement_id.as_bytes().to_vec()
}

/// Create the subject-feature index key.
///
/// Format: `subject_id (16 bytes) || feature_key (UTF-8)`
#[must_use]
pub fn subject_feature_key(subject_id: &SubjectId, feature_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + feature_key.len());
    key.extend_from_slice(subject_id.as_bytes());
    key.extend_from_slice(feature_key.as_bytes());
    key
}

/// Create a grant key from a grant ID.
#[must_use]
pub fn grant_key(grant_id: &GrantId) -> Vec<u8> {
    grant_id.to_bytes().to_vec()
}

/// Create an entitlement-grant index key.
///
/// Format: `entitlement_id (16 bytes) || grant_id (16 bytes)`
///
/// ULID grant ids sort by creation time, so iteration yields grants in
/// creation order.
#[must_use]
pub fn entitlement_grant_key(entitlement_id: &EntitlementId, grant_id: &GrantId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(entitlement_id.as_bytes());
    key.extend_from_slice(&grant_id.to_bytes());
    key
}

/// Create a prefix for iterating all grants of an entitlement.
#[must_use]
pub fn entitlement_grants_prefix(entitlement_id: &EntitlementId) -> Vec<u8> {
    entitlement_id.as_bytes().to_vec()
}

/// Extract the grant ID from an entitlement-grant index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_grant_id(key: &[u8]) -> GrantId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    GrantId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a reset key.
///
/// Format: `entitlement_id (16) || at_millis (8, big-endian) || reset_id (16)`
#[must_use]
pub fn reset_key(entitlement_id: &EntitlementId, at: DateTime<Utc>, reset_id: &ResetId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(entitlement_id.as_bytes());
    key.extend_from_slice(&timestamp_be(at));
    key.extend_from_slice(&reset_id.to_bytes());
    key
}

/// Create a usage-event key from an event ID.
#[must_use]
pub fn usage_event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Create an entitlement-usage index key.
///
/// Format: `entitlement_id (16) || at_millis (8, big-endian) || event_id`
#[must_use]
pub fn entitlement_usage_key(
    entitlement_id: &EntitlementId,
    at: DateTime<Utc>,
    event_id: &str,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(24 + event_id.len());
    key.extend_from_slice(entitlement_id.as_bytes());
    key.extend_from_slice(&timestamp_be(at));
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// Create a time-bounded prefix start for entitlement-scoped time scans.
///
/// Works for both the resets and usage indexes, whose keys begin with
/// `entitlement_id || at_millis (BE)`.
#[must_use]
pub fn entitlement_time_start(entitlement_id: &EntitlementId, from: DateTime<Utc>) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(entitlement_id.as_bytes());
    key.extend_from_slice(&timestamp_be(from));
    key
}

/// Extract the event ID from an entitlement-usage index key.
///
/// # Panics
///
/// Panics if the key is shorter than 24 bytes or the event ID is not UTF-8.
#[must_use]
pub fn extract_event_id(key: &[u8]) -> String {
    String::from_utf8(key[24..].to_vec()).expect("valid UTF-8 event id")
}

/// Extract the timestamp component from an entitlement-scoped time key.
///
/// # Panics
///
/// Panics if the key is shorter than 24 bytes.
#[must_use]
pub fn extract_timestamp_millis(key: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[16..24]);
    u64::from_be_bytes(bytes)
}

/// Encode a timestamp as 8 big-endian bytes of non-negative milliseconds.
///
/// Pre-epoch instants clamp to zero; the ledger never stores them.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn timestamp_be(at: DateTime<Utc>) -> [u8; 8] {
    (at.timestamp_millis().max(0) as u64).to_be_bytes()
}
