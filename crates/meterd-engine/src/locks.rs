//! Keyed mutation locks.
//!
//! Grant creation, voiding, usage recording, and resets for a single
//! entitlement must not interleave: a void racing a reset could observe a
//! half-applied period. Entitlement creation has its own race (two creates
//! for the same subject and feature both passing the duplicate check), so
//! the registry is generic over the key: per entitlement for mutations,
//! per subject-feature pair for creation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use meterd_core::{EntitlementId, SubjectId};

/// Registry of keyed async mutexes.
///
/// Locks are created lazily on first use and kept for the lifetime of the
/// registry; key counts are bounded by the tenant, so the registry is not
/// reaped.
pub struct LockRegistry<K> {
    inner: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

/// Per-entitlement mutation locks.
pub type EntitlementLocks = LockRegistry<EntitlementId>;

/// Locks serializing entitlement creation per subject-feature slot.
pub type SubjectFeatureLocks = LockRegistry<(SubjectId, String)>;

impl<K> Default for LockRegistry<K> {
    fn default() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> LockRegistry<K> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock for a key.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex is poisoned, which can only happen if a
    /// previous caller panicked while holding it.
    #[must_use]
    pub fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("lock registry poisoned");
        map.entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_entitlement_shares_a_lock() {
        let locks = EntitlementLocks::new();
        let id = EntitlementId::generate();

        let a = locks.lock_for(&id);
        let b = locks.lock_for(&id);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_entitlements_do_not_contend() {
        let locks = EntitlementLocks::new();
        let a = locks.lock_for(&EntitlementId::generate());
        let b = locks.lock_for(&EntitlementId::generate());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn subject_feature_pairs_key_independently() {
        let locks = SubjectFeatureLocks::new();
        let subject = SubjectId::generate();

        let a = locks.lock_for(&(subject, "api_requests".into()));
        let b = locks.lock_for(&(subject, "api_requests".into()));
        let c = locks.lock_for(&(subject, "storage_bytes".into()));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn lock_serializes_critical_sections() {
        let locks = EntitlementLocks::new();
        let id = EntitlementId::generate();

        let lock = locks.lock_for(&id);
        let guard = lock.lock().await;

        let second = locks.lock_for(&id);
        assert!(second.try_lock().is_err());

        drop(guard);
        assert!(second.try_lock().is_ok());
    }
}
