//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, Options,
    WriteBatch,
};

use meterd_core::{Entitlement, EntitlementId, Grant, GrantId, ResetEvent, SubjectId, UsageEvent};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<rocksdb::MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read an entitlement, verifying it accepts grants and usage.
    fn load_metered_entitlement(&self, entitlement_id: &EntitlementId) -> Result<Entitlement> {
        let entitlement =
            self.get_entitlement(entitlement_id)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "entitlement",
                    id: entitlement_id.to_string(),
                })?;

        if entitlement.is_deleted() {
            return Err(StoreError::EntitlementDeleted {
                id: entitlement_id.to_string(),
            });
        }
        if !entitlement.is_metered() {
            return Err(StoreError::NotMetered {
                id: entitlement_id.to_string(),
            });
        }

        Ok(entitlement)
    }

    /// Collect entitlement-scoped index keys with `from <= at < to`.
    fn scan_time_range(
        &self,
        cf_name: &str,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::entitlement_key(entitlement_id);
        let start = keys::entitlement_time_start(entitlement_id, from);
        let to_millis = u64::from_be_bytes(keys::timestamp_be(to));

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward));

        let mut matched = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }
            if keys::extract_timestamp_millis(&key) >= to_millis {
                break;
            }

            matched.push(key.to_vec());
        }

        Ok(matched)
    }

    /// The latest reset whose instant satisfies `keep`, scanning key
    /// buckets up to the millisecond of `bound`.
    ///
    /// Keys bucket instants at millisecond granularity, so the scan bound
    /// is inclusive and `keep` decides on the exact stored instant.
    fn last_reset_matching(
        &self,
        entitlement_id: &EntitlementId,
        bound: DateTime<Utc>,
        keep: impl Fn(DateTime<Utc>) -> bool,
    ) -> Result<Option<ResetEvent>> {
        let cf = self.cf(cf::RESETS)?;
        let prefix = keys::entitlement_key(entitlement_id);
        let bound_millis = u64::from_be_bytes(keys::timestamp_be(bound));

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut last: Option<ResetEvent> = None;
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }
            if keys::extract_timestamp_millis(&key) > bound_millis {
                break;
            }

            let reset: ResetEvent = Self::deserialize(&value)?;
            if keep(reset.at) {
                last = Some(reset);
            }
        }

        Ok(last)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Entitlement Operations
    // =========================================================================

    fn create_entitlement(&self, entitlement: &Entitlement) -> Result<()> {
        let cf_ents = self.cf(cf::ENTITLEMENTS)?;
        let cf_by_subject = self.cf(cf::ENTITLEMENTS_BY_SUBJECT)?;

        let index_key =
            keys::subject_feature_key(&entitlement.subject_id, &entitlement.feature_key);

        // An existing index entry means an active entitlement already holds
        // this subject+feature slot.
        if let Some(existing) = self
            .db
            .get_cf(&cf_by_subject, &index_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            let existing_id: EntitlementId = Self::deserialize(&existing)?;
            if self.get_entitlement(&existing_id)?.is_some_and(|e| !e.is_deleted()) {
                return Err(StoreError::DuplicateEntitlement {
                    subject: entitlement.subject_id.to_string(),
                    feature_key: entitlement.feature_key.clone(),
                });
            }
        }

        let ent_key = keys::entitlement_key(&entitlement.id);
        let ent_value = Self::serialize(entitlement)?;
        let index_value = Self::serialize(&entitlement.id)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_ents, &ent_key, &ent_value);
        batch.put_cf(&cf_by_subject, &index_key, &index_value);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_entitlement(&self, entitlement_id: &EntitlementId) -> Result<Option<Entitlement>> {
        let cf = self.cf(cf::ENTITLEMENTS)?;
        let key = keys::entitlement_key(entitlement_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_entitlement(&self, entitlement: &Entitlement) -> Result<()> {
        let cf = self.cf(cf::ENTITLEMENTS)?;
        let key = keys::entitlement_key(&entitlement.id);
        let value = Self::serialize(entitlement)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn find_entitlement(
        &self,
        subject_id: &SubjectId,
        feature_key: &str,
    ) -> Result<Option<Entitlement>> {
        let cf_by_subject = self.cf(cf::ENTITLEMENTS_BY_SUBJECT)?;
        let index_key = keys::subject_feature_key(subject_id, feature_key);

        let Some(data) = self
            .db
            .get_cf(&cf_by_subject, index_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let entitlement_id: EntitlementId = Self::deserialize(&data)?;
        Ok(self
            .get_entitlement(&entitlement_id)?
            .filter(|e| !e.is_deleted()))
    }

    fn delete_entitlement(
        &self,
        entitlement_id: &EntitlementId,
        at: DateTime<Utc>,
    ) -> Result<Entitlement> {
        let mut entitlement =
            self.get_entitlement(entitlement_id)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "entitlement",
                    id: entitlement_id.to_string(),
                })?;

        if entitlement.is_deleted() {
            return Err(StoreError::EntitlementDeleted {
                id: entitlement_id.to_string(),
            });
        }

        entitlement.deleted_at = Some(at);
        entitlement.updated_at = at;

        let cf_ents = self.cf(cf::ENTITLEMENTS)?;
        let cf_by_subject = self.cf(cf::ENTITLEMENTS_BY_SUBJECT)?;

        let ent_key = keys::entitlement_key(entitlement_id);
        let index_key =
            keys::subject_feature_key(&entitlement.subject_id, &entitlement.feature_key);
        let ent_value = Self::serialize(&entitlement)?;

        // Removing the index frees the subject+feature slot for a
        // replacement entitlement.
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_ents, &ent_key, &ent_value);
        batch.delete_cf(&cf_by_subject, &index_key);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(entitlement)
    }

    // =========================================================================
    // Grant Operations
    // =========================================================================

    fn create_grant(&self, grant: &Grant) -> Result<()> {
        self.load_metered_entitlement(&grant.entitlement_id)?;

        let cf_grants = self.cf(cf::GRANTS)?;
        let cf_by_ent = self.cf(cf::GRANTS_BY_ENTITLEMENT)?;

        let grant_key = keys::grant_key(&grant.id);
        let index_key = keys::entitlement_grant_key(&grant.entitlement_id, &grant.id);
        let value = Self::serialize(grant)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_grants, &grant_key, &value);
        batch.put_cf(&cf_by_ent, &index_key, []); // Index entry (empty value)

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_grant(&self, grant_id: &GrantId) -> Result<Option<Grant>> {
        let cf = self.cf(cf::GRANTS)?;
        let key = keys::grant_key(grant_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn void_grant(&self, grant_id: &GrantId, at: DateTime<Utc>) -> Result<Grant> {
        let mut grant = self.get_grant(grant_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "grant",
            id: grant_id.to_string(),
        })?;

        if grant.voided_at.is_some() {
            return Err(StoreError::AlreadyVoided {
                id: grant_id.to_string(),
            });
        }

        grant.voided_at = Some(at);

        let cf = self.cf(cf::GRANTS)?;
        let key = keys::grant_key(grant_id);
        let value = Self::serialize(&grant)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(grant)
    }

    fn list_grants(
        &self,
        entitlement_id: &EntitlementId,
        include_voided: bool,
    ) -> Result<Vec<Grant>> {
        let cf_by_ent = self.cf(cf::GRANTS_BY_ENTITLEMENT)?;
        let prefix = keys::entitlement_grants_prefix(entitlement_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_ent, IteratorMode::From(&prefix, Direction::Forward));

        let mut grants = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let grant_id = keys::extract_grant_id(&key);
            if let Some(grant) = self.get_grant(&grant_id)? {
                if include_voided || grant.voided_at.is_none() {
                    grants.push(grant);
                }
            }
        }

        // Priority first; grant ids are ULIDs so the secondary key is
        // creation time, the documented tie-break.
        grants.sort_by_key(|g| (g.priority, g.id));

        Ok(grants)
    }

    // =========================================================================
    // Reset Operations
    // =========================================================================

    fn apply_reset(
        &self,
        reset: &ResetEvent,
        entitlement: &Entitlement,
        child_grants: &[Grant],
    ) -> Result<()> {
        let cf_resets = self.cf(cf::RESETS)?;
        let cf_ents = self.cf(cf::ENTITLEMENTS)?;
        let cf_grants = self.cf(cf::GRANTS)?;
        let cf_by_ent = self.cf(cf::GRANTS_BY_ENTITLEMENT)?;

        let reset_key = keys::reset_key(&reset.entitlement_id, reset.at, &reset.id);
        let ent_key = keys::entitlement_key(&entitlement.id);

        let reset_value = Self::serialize(reset)?;
        let ent_value = Self::serialize(entitlement)?;

        // Snapshot, rollover outcome, new period, and recurrence children
        // commit as one batch or not at all.
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_resets, &reset_key, &reset_value);
        batch.put_cf(&cf_ents, &ent_key, &ent_value);

        for child in child_grants {
            let grant_key = keys::grant_key(&child.id);
            let index_key = keys::entitlement_grant_key(&child.entitlement_id, &child.id);
            let value = Self::serialize(child)?;
            batch.put_cf(&cf_grants, &grant_key, &value);
            batch.put_cf(&cf_by_ent, &index_key, []);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_resets(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ResetEvent>> {
        let matched = self.scan_time_range(cf::RESETS, entitlement_id, from, to)?;
        let cf = self.cf(cf::RESETS)?;

        let mut resets = Vec::with_capacity(matched.len());
        for key in matched {
            if let Some(data) = self
                .db
                .get_cf(&cf, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                resets.push(Self::deserialize(&data)?);
            }
        }

        Ok(resets)
    }

    fn last_reset_at_or_before(
        &self,
        entitlement_id: &EntitlementId,
        upto: DateTime<Utc>,
    ) -> Result<Option<ResetEvent>> {
        self.last_reset_matching(entitlement_id, upto, |at| at <= upto)
    }

    fn last_reset_before(
        &self,
        entitlement_id: &EntitlementId,
        before: DateTime<Utc>,
    ) -> Result<Option<ResetEvent>> {
        self.last_reset_matching(entitlement_id, before, |at| at < before)
    }

    // =========================================================================
    // Usage Operations
    // =========================================================================

    fn record_usage(&self, event: &UsageEvent) -> Result<()> {
        if self.has_usage_event(&event.event_id)? {
            return Err(StoreError::DuplicateEvent {
                event_id: event.event_id.clone(),
            });
        }

        let cf_events = self.cf(cf::USAGE_EVENTS)?;
        let cf_by_ent = self.cf(cf::USAGE_BY_ENTITLEMENT)?;

        let event_key = keys::usage_event_key(&event.event_id);
        let index_key =
            keys::entitlement_usage_key(&event.entitlement_id, event.at, &event.event_id);
        let value = Self::serialize(event)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_events, &event_key, &value);
        batch.put_cf(&cf_by_ent, &index_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn has_usage_event(&self, event_id: &str) -> Result<bool> {
        let cf = self.cf(cf::USAGE_EVENTS)?;
        let key = keys::usage_event_key(event_id);

        let exists = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();

        Ok(exists)
    }

    fn list_usage(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>> {
        let matched = self.scan_time_range(cf::USAGE_BY_ENTITLEMENT, entitlement_id, from, to)?;
        let cf_events = self.cf(cf::USAGE_EVENTS)?;

        let mut events = Vec::with_capacity(matched.len());
        for key in matched {
            let event_id = keys::extract_event_id(&key);
            if let Some(data) = self
                .db
                .get_cf(&cf_events, keys::usage_event_key(&event_id))
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                events.push(Self::deserialize(&data)?);
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    use meterd_core::{EntitlementKind, GrantRollover};

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn metered_entitlement() -> Entitlement {
        Entitlement::new(
            SubjectId::generate(),
            "api_requests".into(),
            EntitlementKind::Metered,
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn entitlement_crud() {
        let (store, _dir) = create_test_store();
        let ent = metered_entitlement();

        store.create_entitlement(&ent).unwrap();

        let retrieved = store.get_entitlement(&ent.id).unwrap().unwrap();
        assert_eq!(retrieved.feature_key, "api_requests");

        let found = store
            .find_entitlement(&ent.subject_id, "api_requests")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, ent.id);

        let deleted = store.delete_entitlement(&ent.id, Utc::now()).unwrap();
        assert!(deleted.is_deleted());
        assert!(store
            .find_entitlement(&ent.subject_id, "api_requests")
            .unwrap()
            .is_none());
    }

    #[test]
    fn duplicate_active_entitlement_rejected() {
        let (store, _dir) = create_test_store();
        let ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let dup = Entitlement::new(ent.subject_id, "api_requests".into(), EntitlementKind::Metered);
        let result = store.create_entitlement(&dup);
        assert!(matches!(result, Err(StoreError::DuplicateEntitlement { .. })));

        // Deleting the first frees the slot.
        store.delete_entitlement(&ent.id, Utc::now()).unwrap();
        store.create_entitlement(&dup).unwrap();
    }

    #[test]
    fn grant_requires_metered_entitlement() {
        let (store, _dir) = create_test_store();
        let ent = Entitlement::new(
            SubjectId::generate(),
            "beta_access".into(),
            EntitlementKind::Boolean { value: true },
        );
        store.create_entitlement(&ent).unwrap();

        let grant = Grant::new(ent.id, 100, t0(), t0() + Duration::days(30), 0).unwrap();
        let result = store.create_grant(&grant);
        assert!(matches!(result, Err(StoreError::NotMetered { .. })));
    }

    #[test]
    fn grant_void_is_single_shot() {
        let (store, _dir) = create_test_store();
        let ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let grant = Grant::new(ent.id, 100, t0(), t0() + Duration::days(30), 0).unwrap();
        store.create_grant(&grant).unwrap();

        let voided = store.void_grant(&grant.id, t0() + Duration::days(2)).unwrap();
        assert_eq!(voided.voided_at, Some(t0() + Duration::days(2)));

        let result = store.void_grant(&grant.id, t0() + Duration::days(3));
        assert!(matches!(result, Err(StoreError::AlreadyVoided { .. })));
    }

    #[test]
    fn list_grants_orders_by_priority_then_creation() {
        let (store, _dir) = create_test_store();
        let ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let window_end = t0() + Duration::days(30);
        let low = Grant::new(ent.id, 100, t0(), window_end, 1).unwrap();
        store.create_grant(&low).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs

        let high = Grant::new(ent.id, 50, t0(), window_end, 0).unwrap();
        store.create_grant(&high).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));

        let tied = Grant::new(ent.id, 25, t0(), window_end, 0).unwrap();
        store.create_grant(&tied).unwrap();

        let grants = store.list_grants(&ent.id, true).unwrap();
        let ids: Vec<_> = grants.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![high.id, tied.id, low.id]);
    }

    #[test]
    fn list_grants_filters_voided() {
        let (store, _dir) = create_test_store();
        let ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let grant = Grant::new(ent.id, 100, t0(), t0() + Duration::days(30), 0).unwrap();
        store.create_grant(&grant).unwrap();
        store.void_grant(&grant.id, Utc::now()).unwrap();

        assert!(store.list_grants(&ent.id, false).unwrap().is_empty());
        assert_eq!(store.list_grants(&ent.id, true).unwrap().len(), 1);
    }

    #[test]
    fn reset_history_is_time_ordered() {
        let (store, _dir) = create_test_store();
        let mut ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let first_at = t0() + Duration::days(30);
        let second_at = t0() + Duration::days(60);

        let first = ResetEvent::new(ent.id, first_at, None, vec![]);
        ent.current_period_start = first_at;
        store.apply_reset(&first, &ent, &[]).unwrap();

        let second = ResetEvent::new(ent.id, second_at, None, vec![]);
        ent.current_period_start = second_at;
        store.apply_reset(&second, &ent, &[]).unwrap();

        let all = store
            .list_resets(&ent.id, t0(), t0() + Duration::days(90))
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].at, first_at);
        assert_eq!(all[1].at, second_at);

        let last = store
            .last_reset_at_or_before(&ent.id, t0() + Duration::days(45))
            .unwrap()
            .unwrap();
        assert_eq!(last.at, first_at);

        assert!(store
            .last_reset_at_or_before(&ent.id, t0() + Duration::days(29))
            .unwrap()
            .is_none());
    }

    #[test]
    fn last_reset_before_excludes_the_bound_instant() {
        let (store, _dir) = create_test_store();
        let mut ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let first_at = t0() + Duration::days(30);
        let second_at = t0() + Duration::days(60);

        let first = ResetEvent::new(ent.id, first_at, None, vec![]);
        ent.current_period_start = first_at;
        store.apply_reset(&first, &ent, &[]).unwrap();

        let second = ResetEvent::new(ent.id, second_at, None, vec![]);
        ent.current_period_start = second_at;
        store.apply_reset(&second, &ent, &[]).unwrap();

        // A reset landing exactly on the bound governs the inclusive
        // lookup but not the exclusive one.
        let inclusive = store
            .last_reset_at_or_before(&ent.id, second_at)
            .unwrap()
            .unwrap();
        assert_eq!(inclusive.at, second_at);

        let exclusive = store.last_reset_before(&ent.id, second_at).unwrap().unwrap();
        assert_eq!(exclusive.at, first_at);

        assert!(store.last_reset_before(&ent.id, first_at).unwrap().is_none());
    }

    #[test]
    fn reset_persists_outcomes_and_children() {
        let (store, _dir) = create_test_store();
        let mut ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let grant = Grant::new(ent.id, 100, t0(), t0() + Duration::days(90), 0).unwrap();
        store.create_grant(&grant).unwrap();

        let reset_at = t0() + Duration::days(30);
        let child = Grant::new(ent.id, 100, reset_at, reset_at + Duration::days(30), 0).unwrap();
        let reset = ResetEvent::new(
            ent.id,
            reset_at,
            None,
            vec![GrantRollover {
                grant_id: grant.id,
                balance_before: 40,
                balance_after: 40,
            }],
        );
        ent.current_period_start = reset_at;
        store.apply_reset(&reset, &ent, std::slice::from_ref(&child)).unwrap();

        let stored = store
            .last_reset_at_or_before(&ent.id, reset_at)
            .unwrap()
            .unwrap();
        assert_eq!(stored.balance_after(grant.id), Some(40));

        let grants = store.list_grants(&ent.id, false).unwrap();
        assert_eq!(grants.len(), 2);

        let updated = store.get_entitlement(&ent.id).unwrap().unwrap();
        assert_eq!(updated.current_period_start, reset_at);
    }

    #[test]
    fn usage_event_idempotency() {
        let (store, _dir) = create_test_store();
        let ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let event = UsageEvent::new("evt_123".into(), ent.id, 60).at(t0() + Duration::hours(1));
        store.record_usage(&event).unwrap();

        let result = store.record_usage(&event);
        assert!(matches!(result, Err(StoreError::DuplicateEvent { .. })));
    }

    #[test]
    fn usage_range_is_half_open() {
        let (store, _dir) = create_test_store();
        let ent = metered_entitlement();
        store.create_entitlement(&ent).unwrap();

        let at1 = t0() + Duration::hours(1);
        let at2 = t0() + Duration::hours(2);
        store
            .record_usage(&UsageEvent::new("evt_a".into(), ent.id, 10).at(at1))
            .unwrap();
        store
            .record_usage(&UsageEvent::new("evt_b".into(), ent.id, 20).at(at2))
            .unwrap();

        // [t0, at2) excludes the event exactly at the end bound.
        assert_eq!(store.usage_in_range(&ent.id, t0(), at2).unwrap(), 10);
        // [t0, at2 + 1ms) includes it.
        assert_eq!(
            store
                .usage_in_range(&ent.id, t0(), at2 + Duration::milliseconds(1))
                .unwrap(),
            30
        );
    }

    #[test]
    fn usage_isolated_per_entitlement() {
        let (store, _dir) = create_test_store();
        let ent_a = metered_entitlement();
        let ent_b = metered_entitlement();
        store.create_entitlement(&ent_a).unwrap();
        store.create_entitlement(&ent_b).unwrap();

        let at = t0() + Duration::hours(1);
        store
            .record_usage(&UsageEvent::new("evt_a".into(), ent_a.id, 10).at(at))
            .unwrap();
        store
            .record_usage(&UsageEvent::new("evt_b".into(), ent_b.id, 99).at(at))
            .unwrap();

        assert_eq!(
            store
                .usage_in_range(&ent_a.id, t0(), t0() + Duration::days(1))
                .unwrap(),
            10
        );
    }
}
